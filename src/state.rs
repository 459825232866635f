use redis::aio::ConnectionManager;

use crate::config::Config;
use crate::crypto::envelope::FlowCrypto;
use crate::error::Result;
use crate::models::flow::FlowTokens;
use crate::services::flow::FlowEngine;
use crate::services::plms::PlmsClient;
use crate::services::whatsapp::WhatsAppClient;
use crate::session::store::{RedisKv, SessionStore};
use std::sync::Arc;

/// The application's state. Built once at startup; every connection and
/// client is constructed here explicitly rather than lazily on first use.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Per-user session liveness records.
    pub sessions: SessionStore<RedisKv>,
    /// RSA key unwrap for encrypted Flow exchanges.
    pub flow_crypto: Arc<FlowCrypto>,
    /// The Flow screen state machine.
    pub engine: FlowEngine<PlmsClient>,
    /// Outbound WhatsApp sender.
    pub wa: WhatsAppClient,
}

impl AppState {
    /// Creates a new `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let redis_client = redis::Client::open(config.redis_url.as_str())?;
        let redis = ConnectionManager::new(redis_client).await?;
        tracing::info!("Redis connection manager initialized");

        let sessions = SessionStore::new(RedisKv(redis), config.session_ttl_secs);

        let flow_crypto = Arc::new(FlowCrypto::from_pem(&config.flow_private_key)?);
        tracing::info!("Flow private key loaded");

        let plms = PlmsClient::new(config)?;
        let tokens = FlowTokens {
            activation: config.flow_token_activation.clone(),
            reset_pin: config.flow_token_reset_pin.clone(),
        };
        let engine = FlowEngine::new(plms, tokens);

        let wa = WhatsAppClient::new(config)?;

        Ok(AppState {
            config: config.clone(),
            sessions,
            flow_crypto,
            engine,
            wa,
        })
    }
}
