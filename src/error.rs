use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// An outbound HTTP error (loyalty backend or WhatsApp Graph API).
    #[error("Upstream HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The RSA-wrapped session key could not be unwrapped.
    #[error("Key unwrap failed: {0}")]
    KeyUnwrap(String),

    /// AES-GCM authentication or decryption failure.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The request body could not be parsed into the expected shape.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The loyalty backend answered with an unusable response.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Encrypted-flow failures must stay opaque: classify and log here,
        // never echo internal detail back to the caller.
        let (status, message) = match self {
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Session store error")
            }

            AppError::Http(ref e) => {
                tracing::error!("Upstream HTTP error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upstream error")
            }

            AppError::KeyUnwrap(ref msg) => {
                tracing::warn!("Key unwrap failed: {}", msg);
                // 421 tells the platform to re-fetch our public key.
                (StatusCode::MISDIRECTED_REQUEST, "Key unwrap failed")
            }

            AppError::Decryption(ref msg) => {
                tracing::warn!("Decryption failed: {}", msg);
                (StatusCode::BAD_REQUEST, "Invalid request")
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Encryption error")
            }

            AppError::MalformedPayload(ref msg) => {
                tracing::warn!("Malformed payload: {}", msg);
                (StatusCode::BAD_REQUEST, "Invalid request")
            }

            AppError::Upstream(ref msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upstream error")
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
