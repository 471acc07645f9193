use std::fmt;
use thiserror::Error;

/// Which class of upstream failure a completion request hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionFailureKind {
    Auth,
    RateLimit,
    Network,
    Upstream,
    EmptyResponse,
}

impl fmt::Display for CompletionFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Auth => "authentication failed",
            Self::RateLimit => "rate limited",
            Self::Network => "network error",
            Self::Upstream => "upstream error",
            Self::EmptyResponse => "empty response",
        };
        f.write_str(label)
    }
}

/// Why a chart-extraction reply could not be turned into analytics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChartDecodeError {
    #[error("Chart data is not valid JSON: {0}")]
    Parse(String),

    #[error("Chart data failed validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum FarmSmartError {
    #[error("Completion request failed ({kind}): {message}")]
    Completion {
        kind: CompletionFailureKind,
        message: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chart invariant violated: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    ChartDecode(#[from] ChartDecodeError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl FarmSmartError {
    pub fn completion(kind: CompletionFailureKind, message: impl Into<String>) -> Self {
        Self::Completion {
            kind,
            message: message.into(),
        }
    }

    /// The upstream failure class, when this error came from the completion service.
    pub fn completion_kind(&self) -> Option<CompletionFailureKind> {
        match self {
            Self::Completion { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FarmSmartError>;
