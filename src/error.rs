use thiserror::Error;

/// Failure kinds surfaced at the data API boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The backend rejected the session token (HTTP 401). Callers should log out.
    #[error("Session expired. Please log in again.")]
    AuthenticationExpired,

    /// Any other non-2xx response, carrying the backend's message.
    #[error("{message} (HTTP {status})")]
    Api { status: u16, message: String },

    /// A write payload was rejected locally before any request was sent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed response body: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, ApiError::AuthenticationExpired)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Field must not be negative: {0}")]
    Negative(&'static str),
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
