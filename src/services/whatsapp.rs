use std::time::Duration;

use zeroize::Zeroizing;

use crate::config::Config;
use crate::error::Result;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v20.0";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin client for outbound WhatsApp text messages. Structured menus and
/// template builders live with the platform integration, not here.
#[derive(Clone)]
pub struct WhatsAppClient {
    http: reqwest::Client,
    access_token: Zeroizing<String>,
    messages_url: String,
}

impl WhatsAppClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;

        Ok(Self {
            http,
            access_token: config.wa_access_token.clone(),
            messages_url: format!("{}/{}/messages", GRAPH_API_BASE, config.wa_phone_number_id),
        })
    }

    /// Sends a plain text message to a user. Callers fire-and-forget: the
    /// send result never feeds back into Flow decisions.
    pub async fn send_text(&self, to: &str, body: &str) -> Result<()> {
        let payload = sonic_rs::json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        self.http
            .post(&self.messages_url)
            .bearer_auth(self.access_token.as_str())
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!("Sent text message to {}", to);
        Ok(())
    }
}
