//! API error types and responses.
//!
//! Two levels of failure exist. A call-level [`ApiError`] rejects the whole
//! request and becomes the HTTP response. A per-item [`ServerError`] sits
//! inside a successful bulk response and describes why one item failed.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use orrery_core::CoreError;
use orrery_state::StateError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes carried by [`ServerError`].
pub mod codes {
    /// The entity does not exist.
    pub const NOT_FOUND: &str = "not-found";
    /// The request or the entity's state does not allow the change.
    pub const NOT_VALID: &str = "not-valid";
    /// The caller may not touch the entity.
    pub const UNAUTHORIZED: &str = "unauthorized";
    /// The caller's leadership lease is gone.
    pub const LEASE_LOST: &str = "lease-lost";
    /// The write kept conflicting with concurrent writers.
    pub const EXCESSIVE_CONTENTION: &str = "excessive-contention";
    /// The call ran out of time between attempts.
    pub const ABORTED: &str = "aborted";
    /// Anything else.
    pub const INTERNAL: &str = "internal";
}

/// API error type that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No valid credentials were presented.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller is authenticated but not allowed to do this.
    #[error("permission denied")]
    Permission,

    /// Invalid request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The state layer rejected the call.
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

/// Per-item error detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ServerError {
    /// One of the [`codes`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error with `code`.
    #[must_use]
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<&StateError> for ServerError {
    fn from(err: &StateError) -> Self {
        let code = match err {
            StateError::NotFound { .. } => codes::NOT_FOUND,
            StateError::Validation(_) | StateError::Core(_) => codes::NOT_VALID,
            StateError::LeadershipLost { .. } => codes::LEASE_LOST,
            StateError::ExcessiveContention { .. } => codes::EXCESSIVE_CONTENTION,
            StateError::Aborted => codes::ABORTED,
            StateError::Store(_) | StateError::Corrupt { .. } => {
                tracing::error!(error = %err, "State error");
                codes::INTERNAL
            }
        };
        Self::new(code, err.to_string())
    }
}

impl From<StateError> for ServerError {
    fn from(err: StateError) -> Self {
        Self::from(&err)
    }
}

impl From<CoreError> for ServerError {
    fn from(err: CoreError) -> Self {
        Self::new(codes::NOT_VALID, err.to_string())
    }
}

impl From<ApiError> for ServerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Unauthorized | ApiError::Permission => {
                Self::new(codes::UNAUTHORIZED, err.to_string())
            }
            ApiError::BadRequest(msg) => Self::new(codes::NOT_VALID, msg),
            ApiError::State(state) => Self::from(&state),
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ServerError,
}

impl ApiError {
    /// Get the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Permission => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::State(err) => match err {
                StateError::NotFound { .. } => StatusCode::NOT_FOUND,
                StateError::Validation(_) | StateError::Core(_) => StatusCode::BAD_REQUEST,
                StateError::LeadershipLost { .. } | StateError::ExcessiveContention { .. } => {
                    StatusCode::CONFLICT
                }
                StateError::Aborted => StatusCode::SERVICE_UNAVAILABLE,
                StateError::Store(_) | StateError::Corrupt { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ServerError::from(self),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_map_to_codes() {
        let cases = [
            (StateError::not_found("machine", "0"), codes::NOT_FOUND),
            (StateError::Validation("no".into()), codes::NOT_VALID),
            (
                StateError::LeadershipLost {
                    entity: "gitlab".into(),
                    reason: "gone".into(),
                },
                codes::LEASE_LOST,
            ),
            (
                StateError::ExcessiveContention { attempts: 4 },
                codes::EXCESSIVE_CONTENTION,
            ),
            (StateError::Aborted, codes::ABORTED),
        ];
        for (err, code) in cases {
            assert_eq!(ServerError::from(&err).code, code);
        }
    }

    #[test]
    fn error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Permission.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StateError::not_found("unit", "a/0")).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn permission_is_unauthorized_code() {
        assert_eq!(
            ServerError::from(ApiError::Permission).code,
            codes::UNAUTHORIZED
        );
    }
}
