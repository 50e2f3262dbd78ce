//! Errors returned to the HTTP boundary.

use serde::Serialize;
use thiserror::Error;

use crate::db::StoreError;
use crate::device::validate::ValidationErrors;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid input")]
    BadRequest(ValidationErrors),

    #[error("Device with this name already exists")]
    Conflict,

    #[error("Device not found")]
    NotFound,

    #[error("Request body too large")]
    PayloadTooLarge,

    /// The detail is logged, never sent to the client
    #[error("Internal server error")]
    Internal(String),
}

/// JSON shape of every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "BadRequest",
            ServiceError::Conflict => "Conflict",
            ServiceError::NotFound => "NotFound",
            ServiceError::PayloadTooLarge => "PayloadTooLarge",
            ServiceError::Internal(_) => "InternalError",
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.kind(),
            message: self.to_string(),
            errors: match self {
                ServiceError::BadRequest(errors) => Some(errors.clone()),
                _ => None,
            },
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        ServiceError::BadRequest(errors)
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => ServiceError::NotFound,
            StoreError::DuplicateKey => ServiceError::Conflict,
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            ServiceError::from(StoreError::NotFound),
            ServiceError::NotFound
        ));
        assert!(matches!(
            ServiceError::from(StoreError::DuplicateKey),
            ServiceError::Conflict
        ));
        assert!(matches!(
            ServiceError::from(StoreError::Poisoned),
            ServiceError::Internal(_)
        ));
    }

    #[test]
    fn test_error_body_shape() {
        let body = serde_json::to_value(ServiceError::NotFound.body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": "NotFound", "message": "Device not found"})
        );

        let mut errors = ValidationErrors::default();
        errors.add("ip", "ip must be a valid IPv4/IPv6 address");
        let body = serde_json::to_value(ServiceError::BadRequest(errors).body()).unwrap();
        assert_eq!(body["error"], "BadRequest");
        assert_eq!(body["message"], "Invalid input");
        assert_eq!(body["errors"]["ip"], "ip must be a valid IPv4/IPv6 address");
    }

    #[test]
    fn test_payload_too_large_body() {
        let body = serde_json::to_value(ServiceError::PayloadTooLarge.body()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"error": "PayloadTooLarge", "message": "Request body too large"})
        );
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = ServiceError::Internal("database error: disk I/O error".to_string());
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["error"], "InternalError");
        assert_eq!(body["message"], "Internal server error");
        assert!(!body.to_string().contains("disk"));
    }
}
