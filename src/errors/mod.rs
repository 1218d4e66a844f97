use axum::http::StatusCode;
use thiserror::Error;

/// Why a media download from the messaging provider failed.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The provider no longer knows the media id (ids are time-limited).
    #[error("media {media_id} not found or expired")]
    NotFound { media_id: String },

    #[error("provider returned HTTP {status} for media {media_id}")]
    Status { media_id: String, status: u16 },

    #[error("media {media_id} exceeds {limit} bytes")]
    TooLarge { media_id: String, limit: usize },

    #[error("transport error fetching media {media_id}: {message}")]
    Transport { media_id: String, message: String },
}

/// Typed error hierarchy for the relay.
///
/// Use at component boundaries (webhook parsing, media fetch, storage upload,
/// persistence). Leaf functions can keep using `anyhow::Result`; the `Internal`
/// variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Malformed webhook payload: {0}")]
    PayloadParse(String),

    #[error("Media fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage upload failed: {0}")]
    Storage(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `RelayError`.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Fetch and storage failures degrade to a record without a storage path
    /// instead of failing the request.
    pub fn is_degradable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Storage(_))
    }

    /// HTTP status the webhook endpoint answers with when this error escapes
    /// the relay. Only persistence failures ask the provider to redeliver.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadParse(_) => StatusCode::BAD_REQUEST,
            Self::Fetch(_) | Self::Storage(_) => StatusCode::OK,
            Self::Persistence(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<rusqlite::Error> for RelayError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
