use thiserror::Error;

/// Errors raised by the generation pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum BookError {
    /// A credential failed local validation. No network call was made.
    #[error("{0}")]
    Credential(String),

    /// The provider answered with a non-success response.
    #[error("{message}")]
    Generation {
        status: Option<u16>,
        message: String,
    },

    /// The outline completion could not be parsed as the expected JSON.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid workflow transition: {0}")]
    Workflow(String),
}

pub type BookResult<T> = Result<T, BookError>;

impl BookError {
    pub fn generation(message: impl Into<String>) -> Self {
        BookError::Generation {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        BookError::Generation {
            status: Some(status),
            message: message.into(),
        }
    }

    /// True for HTTP 429 or a provider message that mentions rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            BookError::Generation { status, message } => {
                if *status == Some(429) {
                    return true;
                }
                let lower = message.to_lowercase();
                lower.contains("rate limit")
                    || lower.contains("rate_limit")
                    || lower.contains("too many requests")
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for BookError {
    fn from(e: serde_json::Error) -> Self {
        BookError::MalformedResponse(e.to_string())
    }
}
