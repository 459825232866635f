use anyhow::{Context, Result};
use std::env;
use zeroize::Zeroizing;

/// The application's configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub host: String,
    /// The port the HTTP server binds to.
    pub port: u16,
    /// The URL of the Redis server backing the session store.
    pub redis_url: String,
    /// Session liveness window in seconds; refreshed on every inbound message.
    pub session_ttl_secs: u64,
    /// How often the expiry watcher polls the session store, in seconds.
    pub watcher_interval_secs: u64,
    /// PEM-encoded RSA private key used to unwrap Flow session keys.
    pub flow_private_key: Zeroizing<String>,
    /// The flow_token bound to the member-activation Flow.
    pub flow_token_activation: String,
    /// The flow_token bound to the PIN-reset Flow.
    pub flow_token_reset_pin: String,
    /// The token the platform must present on webhook verification.
    pub webhook_verify_token: String,
    /// Bearer token for the WhatsApp Graph API.
    pub wa_access_token: Zeroizing<String>,
    /// Our WhatsApp business phone number id.
    pub wa_phone_number_id: String,
    /// Base URL of the loyalty backend (PLMS).
    pub plms_endpoint: String,
    /// PLMS login username.
    pub plms_username: String,
    /// PLMS login password.
    pub plms_password: Zeroizing<String>,
    /// Shared secret appended to every PLMS checksum.
    pub plms_secret_key: Zeroizing<String>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3006".to_string())
                .parse()
                .context("Invalid PORT")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            session_ttl_secs: env::var("SESSION_TTL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid SESSION_TTL_SECS")?,
            watcher_interval_secs: env::var("WATCHER_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .context("Invalid WATCHER_INTERVAL_SECS")?,
            flow_private_key: Zeroizing::new(
                env::var("FLOW_PRIVATE_KEY")
                    .context("FLOW_PRIVATE_KEY must be set (PEM-encoded RSA private key)")?,
            ),
            flow_token_activation: env::var("FLOW_TOKEN_ACTIVATION")
                .context("FLOW_TOKEN_ACTIVATION must be set")?,
            flow_token_reset_pin: env::var("FLOW_TOKEN_RESET_PIN")
                .context("FLOW_TOKEN_RESET_PIN must be set")?,
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .context("WEBHOOK_VERIFY_TOKEN must be set")?,
            wa_access_token: Zeroizing::new(
                env::var("WA_ACCESS_TOKEN").context("WA_ACCESS_TOKEN must be set")?,
            ),
            wa_phone_number_id: env::var("WA_PHONE_NUMBER_ID")
                .context("WA_PHONE_NUMBER_ID must be set")?,
            plms_endpoint: env::var("PLMS_ENDPOINT").context("PLMS_ENDPOINT must be set")?,
            plms_username: env::var("PLMS_USERNAME").context("PLMS_USERNAME must be set")?,
            plms_password: Zeroizing::new(
                env::var("PLMS_PASSWORD").context("PLMS_PASSWORD must be set")?,
            ),
            plms_secret_key: Zeroizing::new(
                env::var("PLMS_SECRET_KEY").context("PLMS_SECRET_KEY must be set")?,
            ),
        })
    }
}
