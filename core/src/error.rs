use slide_common::CollaboratorError;
use slide_protocol::FailureKind;
use thiserror::Error;

/// Outline extraction failures, in the order they are checked.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("model returned an empty outline")]
    EmptyPayload,

    #[error("no JSON array found in model output")]
    NoArrayFound,

    #[error("outline could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("outline contains no slides")]
    EmptyArray,
}

/// Terminal failures of a generation session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("token budget exceeded (estimated cost {estimated})")]
    BudgetExceeded { estimated: u32 },

    #[error("{0}")]
    Outline(CollaboratorError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("image generation aborted: {0}")]
    ImageCritical(CollaboratorError),

    #[error("session was superseded by a newer request")]
    Superseded,

    #[error("internal error: {0}")]
    Internal(String),
}

impl GenerationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::BudgetExceeded { .. } => FailureKind::Budget,
            GenerationError::Outline(CollaboratorError::Unauthorized(_)) => {
                FailureKind::Unauthorized
            }
            GenerationError::Outline(_) => FailureKind::Network,
            GenerationError::Parse(_) => FailureKind::Parse,
            GenerationError::ImageCritical(_) => FailureKind::ImageCritical,
            GenerationError::Superseded => FailureKind::Superseded,
            GenerationError::Internal(_) => FailureKind::Internal,
        }
    }
}
