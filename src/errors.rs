use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error envelope returned to API clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Payment credentials or endpoints missing from configuration. Kept
    /// distinct from `Gateway` so operators can tell a setup bug from a
    /// provider outage in the logs.
    #[error("Payment configuration error: {0}")]
    Configuration(String),

    /// The payment provider was unreachable, returned a non-success status
    /// or a malformed response. Retryable by the buyer.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl ServiceError {
    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::Internal(_)
            | Self::Configuration(_)
            | Self::Gateway(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for HTTP responses. Domain errors carry their text;
    /// infrastructure and payment-provider errors are collapsed to generic
    /// messages so credentials and provider internals never leak to buyers.
    pub fn response_message(&self) -> String {
        match self {
            Self::Database(_) | Self::Internal(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::Configuration(_) | Self::Gateway(_) => {
                "Payment could not be initiated, please try again later".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Full context stays server-side.
        match &self {
            ServiceError::Configuration(msg) => {
                tracing::error!(kind = "configuration", "payment configuration error: {msg}")
            }
            ServiceError::Gateway(msg) => {
                tracing::error!(kind = "gateway", "payment gateway error: {msg}")
            }
            ServiceError::Database(err) => tracing::error!("database error: {err}"),
            ServiceError::Internal(msg) => tracing::error!("internal error: {msg}"),
            ServiceError::Other(err) => tracing::error!("unexpected error: {err:#}"),
            _ => {}
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::Gateway("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_provider_details() {
        let msg = ServiceError::Gateway("consumer_secret rejected by provider".into())
            .response_message();
        assert!(!msg.contains("consumer_secret"));

        let msg =
            ServiceError::Configuration("PESAPAL_CONSUMER_KEY missing".into()).response_message();
        assert!(!msg.contains("PESAPAL"));

        // Domain errors keep their text.
        assert_eq!(
            ServiceError::NotFound("Order not found".into()).response_message(),
            "Not found: Order not found"
        );
        assert!(ServiceError::InsufficientStock("Saga Vol. 1".into())
            .response_message()
            .contains("Saga Vol. 1"));
    }
}
