//! Gateway error types and their HTTP mapping.

use hyper::StatusCode;
use indexswap_ratios::RatioError;
use serde_json::{json, Value};
use thiserror::Error;

/// Message returned when `type` or `value` is missing or falsy.
pub const MISSING_TYPE_OR_VALUE: &str = "Missing type or value";
/// Message returned for an unrecognised conversion type.
pub const INVALID_CONVERSION_TYPE: &str = "Invalid conversion type";
/// Message returned when `value` is present but not numeric.
pub const INVALID_VALUE: &str = "Invalid value";
/// Message returned for unknown routes.
pub const ENDPOINT_NOT_FOUND: &str = "Endpoint not found";

/// Errors surfaced to API callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// Malformed body or missing/invalid fields.
    #[error("{0}")]
    BadRequest(String),

    /// Conversion type not recognised.
    #[error("Invalid conversion type")]
    InvalidType,

    /// No ratios to answer with.
    #[error("{0}")]
    Unavailable(String),

    /// No route matched.
    #[error("Endpoint not found")]
    NotFound,
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::InvalidType => StatusCode::BAD_REQUEST,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// JSON error body.
    pub fn body(&self) -> Value {
        json!({
            "status": "error",
            "message": self.to_string(),
        })
    }
}

impl From<RatioError> for GatewayError {
    fn from(e: RatioError) -> Self {
        match e {
            RatioError::InvalidType(_) => GatewayError::InvalidType,
            other => GatewayError::Unavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::BadRequest(MISSING_TYPE_OR_VALUE.to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(GatewayError::InvalidType.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::Unavailable("down".to_string()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(GatewayError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_body() {
        assert_eq!(
            GatewayError::InvalidType.body(),
            json!({"status": "error", "message": "Invalid conversion type"})
        );
    }

    #[test]
    fn test_from_ratio_error() {
        assert_eq!(
            GatewayError::from(RatioError::InvalidType("foo_to_bar".to_string())),
            GatewayError::InvalidType
        );
        assert!(matches!(
            GatewayError::from(RatioError::ServiceUnavailable("no ratios cached".to_string())),
            GatewayError::Unavailable(msg) if msg == "Ratios unavailable: no ratios cached"
        ));
    }
}
