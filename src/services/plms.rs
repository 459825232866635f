use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::checksum::checksum;
use crate::error::{AppError, Result};
use crate::models::member::{ActivationData, MemberRecord, response_code};

/// Upstream calls are bounded so a hung backend cannot hang the exchange.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

/// The loyalty-backend capability the Flow engine depends on. Concrete
/// implementation below; tests substitute a canned double.
pub trait MembershipApi: Clone + Send + Sync + 'static {
    fn validate_member(&self, phone: &str) -> impl Future<Output = Result<MemberRecord>> + Send;
    fn inquiry(&self, phone: &str) -> impl Future<Output = Result<MemberRecord>> + Send;
    fn member_activation(
        &self,
        data: &ActivationData,
    ) -> impl Future<Output = Result<MemberRecord>> + Send;
    fn pin_reset(&self, phone: &str, pin: &str)
    -> impl Future<Output = Result<MemberRecord>> + Send;
    fn tnc_inquiry(&self, phone: &str) -> impl Future<Output = Result<MemberRecord>> + Send;
    fn tnc_commit(&self, phone: &str) -> impl Future<Output = Result<MemberRecord>> + Send;
}

/// REST client for the loyalty backend (PLMS). Every request carries a
/// SHA-256 checksum over its fields plus the shared secret; the login token
/// is cached process-wide and refreshed on demand.
#[derive(Clone)]
pub struct PlmsClient {
    http: reqwest::Client,
    endpoint: String,
    username: String,
    password: Zeroizing<String>,
    secret_key: Zeroizing<String>,
    mode: &'static str,
    token: Arc<Mutex<Option<String>>>,
}

impl PlmsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(UPSTREAM_TIMEOUT).build()?;

        Ok(Self {
            http,
            endpoint: config.plms_endpoint.trim_end_matches('/').to_string(),
            username: config.plms_username.clone(),
            password: config.plms_password.clone(),
            secret_key: config.plms_secret_key.clone(),
            mode: "mobile",
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Returns the cached auth token, logging in first if there is none.
    async fn ensure_token(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let payload = sonic_rs::json!({
            "username": self.username,
            "password": self.password.as_str(),
            "checksum": checksum(
                &[&self.username, self.password.as_str()],
                self.secret_key.as_str(),
            ),
        });

        let record: MemberRecord = self
            .http
            .post(format!("{}/login", self.endpoint))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let token = record
            .token
            .ok_or_else(|| AppError::Upstream("Token not found in login response".to_string()))?;

        tracing::info!("PLMS login successful, token acquired");
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn post(&self, path: &str, payload: &sonic_rs::Value) -> Result<MemberRecord> {
        let record: MemberRecord = self
            .http
            .post(format!("{}/{}", self.endpoint, path))
            .json(payload)
            .send()
            .await?
            .json()
            .await?;

        tracing::debug!("PLMS {} -> response_code {}", path, record.response_code);

        if record.response_code == response_code::TOKEN_EXPIRED {
            tracing::warn!("PLMS token expired, dropping cached token");
            *self.token.lock().await = None;
        }

        Ok(record)
    }
}

impl MembershipApi for PlmsClient {
    async fn validate_member(&self, phone: &str) -> Result<MemberRecord> {
        let token = self.ensure_token().await?;
        let phone = normalize_phone(phone);

        let payload = sonic_rs::json!({
            "mode": self.mode,
            "id": phone,
            "token": token,
            "checksum": checksum(&[self.mode, &phone, &token], self.secret_key.as_str()),
        });

        self.post("validatemember", &payload).await
    }

    async fn inquiry(&self, phone: &str) -> Result<MemberRecord> {
        let token = self.ensure_token().await?;
        let phone = normalize_phone(phone);

        let payload = sonic_rs::json!({
            "mode": self.mode,
            "id": phone,
            "token": token,
            "with_balance": 1,
            "checksum": checksum(&[self.mode, &phone, &token], self.secret_key.as_str()),
        });

        self.post("inquiry", &payload).await
    }

    async fn member_activation(&self, data: &ActivationData) -> Result<MemberRecord> {
        let token = self.ensure_token().await?;
        let phone = normalize_phone(&data.phone_number);
        let birth_date = activation_birth_date(&data.birth_date);

        // Checksum field order is the backend's contract:
        // name + birth_date + phone + email + card + gender + marital +
        // address + token + secret.
        let digest = checksum(
            &[
                &data.name,
                &birth_date,
                &phone,
                &data.email,
                &data.card_number,
                &data.gender,
                &data.marital,
                &data.address,
                &token,
            ],
            self.secret_key.as_str(),
        );

        let payload = sonic_rs::json!({
            "name": data.name,
            "birth_date": birth_date,
            "phone_number": phone,
            "email": data.email,
            "card_number": data.card_number,
            "gender": data.gender,
            "marital": data.marital,
            "address": data.address,
            "token": token,
            "checksum": digest,
        });

        self.post("memberactivation", &payload).await
    }

    async fn pin_reset(&self, phone: &str, pin: &str) -> Result<MemberRecord> {
        let token = self.ensure_token().await?;
        let phone = normalize_phone(phone);

        let payload = sonic_rs::json!({
            "mode": self.mode,
            "id": phone,
            "pin": pin,
            "token": token,
            "checksum": checksum(&[self.mode, &phone, pin, &token], self.secret_key.as_str()),
        });

        self.post("pinreset", &payload).await
    }

    /// Asks whether the member has a pending terms-and-conditions
    /// acceptance; `E110` means not yet accepted.
    async fn tnc_inquiry(&self, phone: &str) -> Result<MemberRecord> {
        let token = self.ensure_token().await?;
        let phone = normalize_phone(phone);

        let payload = sonic_rs::json!({
            "mode": self.mode,
            "id": phone,
            "token": token,
            "checksum": checksum(&[self.mode, &phone, &token], self.secret_key.as_str()),
        });

        self.post("tncinquiry", &payload).await
    }

    /// Records the member's terms-and-conditions acceptance.
    async fn tnc_commit(&self, phone: &str) -> Result<MemberRecord> {
        let token = self.ensure_token().await?;
        let phone = normalize_phone(phone);

        let payload = sonic_rs::json!({
            "mode": self.mode,
            "id": phone,
            "token": token,
            "checksum": checksum(&[self.mode, &phone, &token], self.secret_key.as_str()),
        });

        self.post("tnccommit", &payload).await
    }
}

/// The backend wants local format: a leading `62` country code becomes `0`.
pub fn normalize_phone(phone: &str) -> String {
    match phone.strip_prefix("62") {
        Some(rest) => format!("0{}", rest),
        None => phone.to_string(),
    }
}

/// The activation endpoint takes `ddmmyyyy`; screens deliver `YYYY-MM-DD`.
/// Unparseable input passes through untouched and the backend rejects it.
fn activation_birth_date(raw: &str) -> String {
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => date.format("%d%m%Y").to_string(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn country_code_is_normalized() {
        assert_eq!(normalize_phone("6281234567"), "081234567");
        assert_eq!(normalize_phone("081234567"), "081234567");
    }

    #[test]
    fn activation_birth_date_is_reformatted() {
        assert_eq!(activation_birth_date("1990-01-05"), "05011990");
        assert_eq!(activation_birth_date("garbage"), "garbage");
    }
}
