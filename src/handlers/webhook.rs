use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sonic_rs::{JsonValueTrait, Value};

use crate::error::{AppError, Result};
use crate::state::AppState;

/// Webhook subscription verification (`GET /webhook`). The platform sends
/// `hub.mode=subscribe` with our verify token and expects the challenge
/// echoed back.
pub async fn verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let mode = params.get("hub.mode").map(String::as_str).unwrap_or("");
    let token = params.get("hub.verify_token").map(String::as_str).unwrap_or("");
    let challenge = params.get("hub.challenge").cloned().unwrap_or_default();

    if mode == "subscribe" && token == state.config.webhook_verify_token {
        tracing::info!("Webhook verification succeeded");
        (StatusCode::OK, challenge)
    } else {
        tracing::warn!("Webhook verification failed (mode={})", mode);
        (StatusCode::FORBIDDEN, "Verification failed".to_string())
    }
}

/// Inbound message webhook (`POST /webhook`). Deliberately thin: every
/// inbound message refreshes the sender's session window; dispatching
/// beyond that belongs to the platform integration. The platform always
/// gets a 200 so it does not retry-storm us over our own failures.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    if let Err(e) = process(&state, &body).await {
        tracing::error!("Webhook processing failed: {}", e);
    }
    (StatusCode::OK, "EVENT_RECEIVED")
}

async fn process(state: &AppState, body: &[u8]) -> Result<()> {
    let payload: Value = sonic_rs::from_slice(body)
        .map_err(|e| AppError::MalformedPayload(format!("Invalid webhook body: {}", e)))?;

    if payload.get("object").is_none() {
        tracing::warn!("Webhook body without object field");
        return Ok(());
    }

    let Some(value) = payload
        .get("entry")
        .and_then(|e| e.get(0))
        .and_then(|e| e.get("changes"))
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("value"))
    else {
        return Ok(());
    };

    let incoming_id = value
        .get("metadata")
        .and_then(|m| m.get("phone_number_id"))
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if incoming_id != state.config.wa_phone_number_id {
        tracing::warn!("Webhook for foreign phone_number_id {}", incoming_id);
        return Ok(());
    }

    let Some(message) = value.get("messages").and_then(|m| m.get(0)) else {
        return Ok(());
    };
    let Some(from) = message.get("from").and_then(|v| v.as_str()) else {
        return Ok(());
    };

    // Any inbound activity keeps the session alive; the expiry watcher
    // handles the farewell when this stops happening.
    state.sessions.touch(from).await?;

    match message.get("type").and_then(|v| v.as_str()).unwrap_or("") {
        "text" => {
            let text = message
                .get("text")
                .and_then(|t| t.get("body"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            tracing::info!("Text message from {}", from);

            if text.eq_ignore_ascii_case("test") {
                state.wa.send_text(from, "hello world!").await?;
            }
        }
        "interactive" => {
            let reply_id = message
                .get("interactive")
                .and_then(|i| i.get("list_reply"))
                .and_then(|r| r.get("id"))
                .and_then(|v| v.as_str())
                .unwrap_or("");
            tracing::info!("Interactive reply from {}: {}", from, reply_id);
        }
        other => {
            tracing::debug!("Ignoring message type {:?} from {}", other, from);
        }
    }

    Ok(())
}

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, r#"{"message":"service running..."}"#)
}
