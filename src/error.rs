use crate::guard::UpgradePrompt;
use crate::access::DenyReason;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DropError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template rendering failed: {0}")]
    Template(#[from] askama::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("Missing or invalid credentials")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    #[error("Access denied: {0}")]
    AccessDenied(DenyReason),

    #[error("Plan limit reached: {}", prompt.message)]
    LimitExceeded { prompt: UpgradePrompt },

    #[error("Feature '{feature}' is not available on the {tier} plan")]
    FeatureUnavailable { feature: String, tier: String },

    #[error("Payload too large: {size} > {max}")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("Payment provider error: {message}")]
    Provider { message: String },
}

pub type Result<T> = std::result::Result<T, DropError>;

impl DropError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::LimitExceeded { .. } | Self::FeatureUnavailable { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::AccessDenied(reason) => reason.status(),
            Self::Validation(_) | Self::InvalidEmail(_) | Self::InvalidSignature(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Http(_) | Self::Provider { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::Validation(_) => "invalid_request",
            Self::InvalidEmail(_) => "invalid_email",
            Self::AccessDenied(_) => "access_denied",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::FeatureUnavailable { .. } => "feature_unavailable",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::Http(_) | Self::Provider { .. } => "upstream_error",
            _ => "internal_error",
        }
    }

    fn details(&self) -> serde_json::Value {
        match self {
            Self::AccessDenied(reason) => json!({ "reason": reason.as_str() }),
            Self::LimitExceeded { prompt } => json!({ "upgrade": prompt }),
            Self::FeatureUnavailable { feature, tier } => {
                json!({ "feature": feature, "tier": tier })
            }
            Self::PayloadTooLarge { size, max } => json!({ "size": size, "max": max }),
            _ => json!({}),
        }
    }
}

impl IntoResponse for DropError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
                "details": self.details(),
            }
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DropError::not_found("drop").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(DropError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            DropError::AccessDenied(DenyReason::Expired).status(),
            StatusCode::GONE
        );
        assert_eq!(
            DropError::database("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_message_is_hidden() {
        let response = DropError::database("connection refused at 10.0.0.3").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
