use csvdash_types::api::ApiErrorBody;

/// Fallback shown when the server gives no readable `detail`.
pub const GENERIC_MESSAGE: &str = "An error occurred";

/// Uniform error returned by every request/response collaborator.
///
/// Display is always the human-readable message, so callers can surface
/// `err.to_string()` directly.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 401 from any endpoint. The persisted credential has already been cleared.
    #[error("{message}")]
    Unauthorized { message: String },

    /// Any other non-success status (validation, forbidden, not found, ...).
    #[error("{message}")]
    Status { status: u16, message: String },

    /// Rejected locally before a request was made.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error("invalid response from server: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("local storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// Build an error from an HTTP status and the raw response body.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let message = detail_message(body);
        if status == 401 {
            ApiError::Unauthorized { message }
        } else {
            ApiError::Status { status, message }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Storage(e.to_string())
    }
}

/// Extract `detail` from a structured error payload, or fall back to the
/// generic message.
pub fn detail_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.message().map(str::to_string))
        .unwrap_or_else(|| GENERIC_MESSAGE.to_string())
}
