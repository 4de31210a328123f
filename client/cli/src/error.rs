//! Error taxonomy for calls against the document service.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 from any authenticated endpoint. Always terminal for the session.
    #[error("session expired, log in again")]
    AuthExpired,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("login failed: {0}")]
    InvalidCredentials(String),

    /// The server answered with an `{error}` field or a non-2xx status.
    #[error("{0}")]
    Validation(String),

    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response from server: {0}")]
    ResponseShape(String),

    #[error("local file error: {0}")]
    Local(#[from] std::io::Error),
}

impl ApiError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthExpired)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
