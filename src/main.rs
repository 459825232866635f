use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod state;

mod crypto {
    pub mod checksum;
    pub mod envelope;
}

mod models {
    pub mod flow;
    pub mod member;
}

mod session {
    pub mod store;
    pub mod watcher;
}

mod services {
    pub mod flow;
    pub mod pin_policy;
    pub mod plms;
    pub mod whatsapp;
}

mod handlers {
    pub mod flow;
    pub mod webhook;
}

use config::Config;
use session::watcher::{ExpiryCallback, ExpiryWatcher};
use state::AppState;

/// Sent once per expired session, right after the session key is cleared.
const FAREWELL_MESSAGE: &str =
    "Sesi Anda telah berakhir. Silakan kirim pesan kembali jika membutuhkan layanan member.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    let state = AppState::new(&config).await?;
    tracing::info!("AppState initialized");

    // Farewell capability handed to the expiry watcher; send failures are
    // the watcher's to log, not to retry.
    let farewell_sender = state.wa.clone();
    let on_expired: ExpiryCallback = Arc::new(move |phone_number: String| {
        let wa = farewell_sender.clone();
        Box::pin(async move {
            tracing::info!("Session expired for {}, sending farewell", phone_number);
            wa.send_text(&phone_number, FAREWELL_MESSAGE).await
        })
    });

    let watcher = ExpiryWatcher::new(
        state.sessions.clone(),
        on_expired,
        Duration::from_secs(config.watcher_interval_secs),
    );
    watcher.spawn();

    let app = Router::new()
        .route("/health", get(handlers::webhook::health))
        .route(
            "/webhook",
            get(handlers::webhook::verify).post(handlers::webhook::receive),
        )
        .route("/flow", post(handlers::flow::flow_exchange))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .with_state(state);

    let addr = SocketAddr::new(config.host.parse()?, config.port);
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
