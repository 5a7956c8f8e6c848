//! # Client Error Types
//!
//! Error types for everything that talks to the back office API.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Client Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Auth           │  │   Transport     │  │     Server              │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  AuthRequired   │  │  Network        │  │  Server { status, msg } │ │
//! │  │  TokenInvalid   │  │  Timeout        │  │  Decode                 │ │
//! │  │  RefreshToken.. │  │  RequestCanceled│  │                         │ │
//! │  │  AccessDenied   │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Validation    │  │     Local       │                              │
//! │  │ (never sent)    │  │  Storage        │                              │
//! │  │                 │  │  Config         │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `ClientError` is `Clone`: one failed GET is handed to every caller that
//! was sharing the in-flight request.

use shopkeep_core::{CoreError, ValidationError};
use thiserror::Error;

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Client error type covering every way a request can fail.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    // =========================================================================
    // Auth Errors
    // =========================================================================
    /// No token is held. Never shown to the user; the UI redirects instead.
    #[error("Not signed in")]
    AuthRequired,

    /// The server rejected the access token even after a refresh.
    #[error("Session is no longer valid: {0}")]
    TokenInvalid(String),

    /// Refreshing the access token failed; the session has been cleared.
    #[error("Your session has expired. Please sign in again. ({0})")]
    RefreshTokenInvalid(String),

    /// HTTP 403. The session is fine, the user lacks permission.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the server.
    #[error("Network error: {0}")]
    Network(String),

    /// No response within the configured timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// The request left but was dropped before any response arrived.
    #[error(
        "Request was blocked before reaching the server ({0}). \
         Check the API URL and its CORS / preflight configuration."
    )]
    RequestCanceled(String),

    // =========================================================================
    // Input / Response Errors
    // =========================================================================
    /// Client-side validation; the request was never built.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Non-success status. `message` is the server's own text when it sent one.
    #[error("{message}")]
    Server { status: u16, message: String },

    /// Response body did not have the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Local session/cache storage failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<shopkeep_db::DbError> for ClientError {
    fn from(err: shopkeep_db::DbError) -> Self {
        ClientError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ClientError {
    fn from(err: url::ParseError) -> Self {
        ClientError::Config(format!("invalid URL: {}", err))
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ClientError {
    fn from(err: toml::ser::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<CoreError> for ClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => ClientError::Validation(v),
            other => ClientError::Server {
                status: 0,
                message: other.to_string(),
            },
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl ClientError {
    /// Returns true if the request may be sent again.
    ///
    /// ## Retryable Errors
    /// - Network failures
    /// - Timeouts
    /// - 5xx responses
    ///
    /// Everything else (4xx, auth, validation, silent failures) is final.
    /// POST and PATCH are never resent whatever the error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Network(_) | ClientError::Timeout(_) => true,
            ClientError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Expected failures that must not produce user-visible error UI.
    pub fn is_silent(&self) -> bool {
        matches!(self, ClientError::AuthRequired)
    }

    /// Whether the user has to sign in again.
    pub fn forces_logout(&self) -> bool {
        matches!(
            self,
            ClientError::TokenInvalid(_) | ClientError::RefreshTokenInvalid(_)
        )
    }

    /// Stable error code for the UI layer.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::AuthRequired => "AUTH_REQUIRED",
            ClientError::TokenInvalid(_) => "TOKEN_INVALID",
            ClientError::RefreshTokenInvalid(_) => "REFRESH_TOKEN_INVALID",
            ClientError::AccessDenied(_) => "ACCESS_DENIED",
            ClientError::Network(_) => "NETWORK_ERROR",
            ClientError::Timeout(_) => "TIMEOUT",
            ClientError::RequestCanceled(_) => "REQUEST_CANCELED",
            ClientError::Validation(_) => "VALIDATION_ERROR",
            ClientError::Server { status, .. } if *status >= 500 => "SERVER_ERROR",
            ClientError::Server { .. } => "REQUEST_FAILED",
            ClientError::Decode(_) => "DECODE_ERROR",
            ClientError::Storage(_) => "STORAGE_ERROR",
            ClientError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// HTTP status for server-side failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } if *status > 0 => Some(*status),
            ClientError::AccessDenied(_) => Some(403),
            ClientError::TokenInvalid(_) => Some(401),
            _ => None,
        }
    }
}
