/// Comprehensive error handling for the ACME client
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Result type for ACME operations
pub type Result<T> = std::result::Result<T, AcmeError>;

/// Error types for ACME operations
#[derive(Error, Debug)]
pub enum AcmeError {
    /// Protocol-level error from ACME server
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Account-related error
    #[error("Account error: {0}")]
    Account(String),

    /// Order creation or processing error
    #[error("Order error: {status}, detail: {detail}")]
    Order { status: String, detail: String },

    /// Challenge verification failed
    #[error("Challenge failed: {challenge_type}, error: {error}")]
    Challenge {
        challenge_type: String,
        error: String,
    },

    /// Certificate-related error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// Cryptographic operation error
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Rate limited by server
    #[error("Rate limited, retry after: {0:?}")]
    RateLimited(Option<std::time::Duration>),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// PEM encoding/decoding error
    #[error("PEM error: {0}")]
    Pem(String),

    /// Database error from the store layer
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Deployment to an agent's filesystem was rejected or failed
    #[error("Deploy error: {0}")]
    Deploy(String),

    /// Reload command was rejected or failed
    #[error("Reload error: {0}")]
    Reload(String),

    /// Task-log bus error
    #[error("Task log error: {0}")]
    TaskLog(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Notification dispatch error
    #[error("Notification error: {0}")]
    Notify(String),

    /// Caller is not authenticated
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but not permitted to perform the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Admin login locked out after too many failed attempts
    #[error("Too many attempts: {0}")]
    TooManyAttempts(String),

    /// Password does not satisfy the configured complexity policy
    #[error("Weak password: {0}")]
    WeakPassword(String),
}

/// Coarse classification of an ACME/renewal failure, used by the scheduler
/// and notification dispatcher to decide retry policy and alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcmeFailureKind {
    /// Transient network/transport failure, safe to retry with backoff.
    Transient,
    /// Rejected by the CA (e.g. rate limited, bad nonce); retry with backoff.
    ServerRejected,
    /// Challenge validation failed; retry may succeed after operator fixes DNS/HTTP setup.
    ChallengeFailed,
    /// Configuration or input is wrong; retrying will not help without operator action.
    Permanent,
}

impl AcmeError {
    /// Classify this error for retry/alerting purposes.
    pub fn failure_kind(&self) -> AcmeFailureKind {
        match self {
            AcmeError::Transport(_) | AcmeError::Timeout(_) | AcmeError::Database(_) => {
                AcmeFailureKind::Transient
            }
            AcmeError::RateLimited(_) | AcmeError::Protocol(_) | AcmeError::Order { .. } => {
                AcmeFailureKind::ServerRejected
            }
            AcmeError::Challenge { .. } => AcmeFailureKind::ChallengeFailed,
            _ => AcmeFailureKind::Permanent,
        }
    }

    /// Map this error to one of the fixed external error codes used by the
    /// HTTP error envelope (`{"error": {"code": ..., "message": ...}}`).
    pub fn error_code(&self) -> &'static str {
        match self {
            AcmeError::Unauthorized(_) => "UNAUTHORIZED",
            AcmeError::Forbidden(_) => "FORBIDDEN",
            AcmeError::NotFound(_) => "NOT_FOUND",
            AcmeError::InvalidInput(_) => "INVALID_REQUEST",
            AcmeError::TooManyAttempts(_) => "TOO_MANY_ATTEMPTS",
            AcmeError::WeakPassword(_) => "WEAK_PASSWORD",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl AcmeError {
    /// Create a protocol error
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        AcmeError::Protocol(msg.into())
    }

    /// Create an account error
    pub fn account<S: Into<String>>(msg: S) -> Self {
        AcmeError::Account(msg.into())
    }

    /// Create an order error
    pub fn order<S: Into<String>>(status: S, detail: S) -> Self {
        AcmeError::Order {
            status: status.into(),
            detail: detail.into(),
        }
    }

    /// Create a challenge error
    pub fn challenge<S: Into<String>>(challenge_type: S, error: S) -> Self {
        AcmeError::Challenge {
            challenge_type: challenge_type.into(),
            error: error.into(),
        }
    }

    /// Create a certificate error
    pub fn certificate<S: Into<String>>(msg: S) -> Self {
        AcmeError::Certificate(msg.into())
    }

    /// Create a crypto error
    pub fn crypto<S: Into<String>>(msg: S) -> Self {
        AcmeError::Crypto(msg.into())
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        AcmeError::Storage(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        AcmeError::Transport(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        AcmeError::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        AcmeError::Timeout(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        AcmeError::NotFound(msg.into())
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        AcmeError::Configuration(msg.into())
    }

    /// Create a PEM error
    pub fn pem<S: Into<String>>(msg: S) -> Self {
        AcmeError::Pem(msg.into())
    }

    /// Create a deploy error
    pub fn deploy<S: Into<String>>(msg: S) -> Self {
        AcmeError::Deploy(msg.into())
    }

    /// Create a reload error
    pub fn reload<S: Into<String>>(msg: S) -> Self {
        AcmeError::Reload(msg.into())
    }

    /// Create a task log error
    pub fn tasklog<S: Into<String>>(msg: S) -> Self {
        AcmeError::TaskLog(msg.into())
    }

    /// Create a scheduler error
    pub fn scheduler<S: Into<String>>(msg: S) -> Self {
        AcmeError::Scheduler(msg.into())
    }

    /// Create a notification error
    pub fn notify<S: Into<String>>(msg: S) -> Self {
        AcmeError::Notify(msg.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        AcmeError::Unauthorized(msg.into())
    }

    /// Create a forbidden error
    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        AcmeError::Forbidden(msg.into())
    }

    /// Create a too-many-attempts error
    pub fn too_many_attempts<S: Into<String>>(msg: S) -> Self {
        AcmeError::TooManyAttempts(msg.into())
    }

    /// Create a weak-password error
    pub fn weak_password<S: Into<String>>(msg: S) -> Self {
        AcmeError::WeakPassword(msg.into())
    }
}

/// HTTP error envelope shape the agent control plane and admin boundary both
/// return: `{"error": {"code": ..., "message": ...}}` (spec §6).
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl AcmeError {
    /// HTTP status this error maps to over the agent/admin surfaces.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AcmeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AcmeError::Forbidden(_) => StatusCode::FORBIDDEN,
            AcmeError::NotFound(_) => StatusCode::NOT_FOUND,
            AcmeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AcmeError::TooManyAttempts(_) => StatusCode::TOO_MANY_REQUESTS,
            AcmeError::WeakPassword(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AcmeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorEnvelope {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(AcmeError::unauthorized("no").error_code(), "UNAUTHORIZED");
        assert_eq!(AcmeError::forbidden("no").error_code(), "FORBIDDEN");
        assert_eq!(AcmeError::not_found("no").error_code(), "NOT_FOUND");
        assert_eq!(AcmeError::invalid_input("no").error_code(), "INVALID_REQUEST");
        assert_eq!(
            AcmeError::too_many_attempts("no").error_code(),
            "TOO_MANY_ATTEMPTS"
        );
        assert_eq!(AcmeError::weak_password("no").error_code(), "WEAK_PASSWORD");
        assert_eq!(AcmeError::crypto("no").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(AcmeError::unauthorized("no").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AcmeError::forbidden("no").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AcmeError::not_found("no").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AcmeError::too_many_attempts("no").status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(AcmeError::crypto("no").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_failure_kind_classification() {
        assert_eq!(
            AcmeError::transport("down").failure_kind(),
            AcmeFailureKind::Transient
        );
        assert_eq!(
            AcmeError::challenge("dns-01", "nxdomain").failure_kind(),
            AcmeFailureKind::ChallengeFailed
        );
        assert_eq!(
            AcmeError::invalid_input("bad").failure_kind(),
            AcmeFailureKind::Permanent
        );
    }
}
