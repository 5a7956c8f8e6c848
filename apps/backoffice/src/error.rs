//! # UI Error Type
//!
//! Unified error type for everything the UI calls into.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in the Back Office                        │
//! │                                                                         │
//! │  State operation (e.g. ProductsState::add_inventory)                    │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  Validation? ──── ValidationError ─────────────┐  field-level, no toast │
//! │         │                                      │                        │
//! │  Network / auth? ── ClientError ───────────────┤                        │
//! │         │                                      ▼                        │
//! │  Local store? ───── DbError ────────────────► UiError {code, message,   │
//! │         │                                      silent, field}          │
//! │         ▼                                      │                        │
//! │  Success                                       ▼                        │
//! │                                  silent? ── yes ──► redirect, no toast  │
//! │                                          └─ no ───► toast (5s)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! The React frontend receives:
//! ```json
//! { "code": "ACCESS_DENIED", "message": "Access denied: admins only", "silent": false }
//! ```

use serde::Serialize;
use shopkeep_client::ClientError;
use shopkeep_core::{CoreError, ValidationError};
use shopkeep_db::DbError;
use thiserror::Error;

/// Error returned from every state operation.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct UiError {
    /// Machine-readable error code for programmatic handling
    pub code: ErrorCode,

    /// Human-readable error message for display
    pub message: String,

    /// Expected failure (no token yet): redirect, never toast.
    pub silent: bool,

    /// Offending form field for validation errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Error codes for UI responses.
///
/// ## Usage in Frontend
/// ```typescript
/// switch (e.code) {
///   case 'VALIDATION_ERROR': highlight(e.field, e.message); break;
///   case 'ACCESS_DENIED':    showBanner(e.message); break;
///   default:                 toast(e.message);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// No session; the UI should route to login
    AuthRequired,

    /// Access token rejected after a refresh
    TokenInvalid,

    /// Refresh token rejected; session cleared
    RefreshTokenInvalid,

    /// 403 from the server
    AccessDenied,

    NetworkError,
    Timeout,

    /// Request blocked before it reached the server
    RequestCanceled,

    /// Input validation failed, nothing was sent
    ValidationError,

    /// 5xx from the server
    ServerError,

    /// Other non-2xx from the server, message passed through
    RequestFailed,

    /// Record not in local state
    NotFound,

    /// Cart operation failed
    CartError,

    /// Insufficient stock
    InsufficientStock,

    /// Response did not have the expected shape
    DecodeError,

    /// Local store failed
    StorageError,

    ConfigError,
}

pub type UiResult<T> = Result<T, UiError>;

impl UiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        UiError {
            code,
            message: message.into(),
            silent: false,
            field: None,
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        UiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn is_validation(&self) -> bool {
        self.code == ErrorCode::ValidationError
    }

    /// Whether the session is gone and the login screen should be shown.
    pub fn needs_login(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::AuthRequired | ErrorCode::TokenInvalid | ErrorCode::RefreshTokenInvalid
        )
    }
}

/// Converts client errors to UI errors.
impl From<ClientError> for UiError {
    fn from(err: ClientError) -> Self {
        let silent = err.is_silent();
        let message = err.to_string();
        let code = match &err {
            ClientError::AuthRequired => ErrorCode::AuthRequired,
            ClientError::TokenInvalid(_) => ErrorCode::TokenInvalid,
            ClientError::RefreshTokenInvalid(_) => ErrorCode::RefreshTokenInvalid,
            ClientError::AccessDenied(_) => ErrorCode::AccessDenied,
            ClientError::Network(_) => ErrorCode::NetworkError,
            ClientError::Timeout(_) => ErrorCode::Timeout,
            ClientError::RequestCanceled(_) => ErrorCode::RequestCanceled,
            ClientError::Validation(v) => return UiError::from(v.clone()),
            ClientError::Server { status, .. } if *status >= 500 => ErrorCode::ServerError,
            ClientError::Server { .. } => ErrorCode::RequestFailed,
            ClientError::Decode(e) => {
                tracing::error!(error = %e, "Unexpected response shape");
                ErrorCode::DecodeError
            }
            ClientError::Storage(_) => ErrorCode::StorageError,
            ClientError::Config(_) => ErrorCode::ConfigError,
        };
        UiError {
            code,
            message,
            silent,
            field: None,
        }
    }
}

/// Converts validation errors, keeping the field for highlighting.
impl From<ValidationError> for UiError {
    fn from(err: ValidationError) -> Self {
        UiError {
            code: ErrorCode::ValidationError,
            field: Some(err.field().to_string()),
            message: err.to_string(),
            silent: false,
        }
    }
}

/// Converts core errors to UI errors.
impl From<CoreError> for UiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => UiError::not_found("Product", &id),
            CoreError::SupplierNotFound(id) => UiError::not_found("Supplier", &id),
            CoreError::InventoryNotFound { .. } => UiError::new(ErrorCode::NotFound, err.to_string()),
            CoreError::LineNotFound { .. } | CoreError::CartEmpty => {
                UiError::new(ErrorCode::CartError, err.to_string())
            }
            CoreError::InsufficientStock { .. } => {
                UiError::new(ErrorCode::InsufficientStock, err.to_string())
            }
            CoreError::Validation(e) => e.into(),
        }
    }
}

/// Converts local store errors to UI errors.
impl From<DbError> for UiError {
    fn from(err: DbError) -> Self {
        // Log the actual error but return a generic message
        tracing::error!(error = %err, "Local store operation failed");
        UiError::new(ErrorCode::StorageError, "Local storage is unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_required_is_silent() {
        let err = UiError::from(ClientError::AuthRequired);
        assert_eq!(err.code, ErrorCode::AuthRequired);
        assert!(err.silent);
        assert!(err.needs_login());
    }

    #[test]
    fn test_server_message_passes_through() {
        let err = UiError::from(ClientError::Server {
            status: 409,
            message: "Product ID already exists".into(),
        });
        assert_eq!(err.code, ErrorCode::RequestFailed);
        assert_eq!(err.message, "Product ID already exists");
        assert!(!err.silent);

        let err = UiError::from(ClientError::Server {
            status: 502,
            message: "Bad gateway".into(),
        });
        assert_eq!(err.code, ErrorCode::ServerError);
    }

    #[test]
    fn test_validation_keeps_field() {
        let err = UiError::from(ClientError::Validation(ValidationError::Required {
            field: "email".into(),
        }));
        assert!(err.is_validation());
        assert_eq!(err.field.as_deref(), Some("email"));

        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert_eq!(json["field"], "email");
    }

    #[test]
    fn test_core_errors() {
        let err = UiError::from(CoreError::InsufficientStock {
            product_id: "P-1".into(),
            available: 2,
            requested: 3,
        });
        assert_eq!(err.code, ErrorCode::InsufficientStock);
        assert_eq!(UiError::from(CoreError::CartEmpty).code, ErrorCode::CartError);
    }
}
