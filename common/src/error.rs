use thiserror::Error;

/// Failure reported by a generative collaborator (text or image).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty response")]
    EmptyResponse,
}

impl CollaboratorError {
    /// Quota or rate exhaustion invalidates a whole generation.
    pub fn is_quota_exhaustion(&self) -> bool {
        matches!(self, CollaboratorError::RateLimited(_))
    }

    /// Classify a non-success HTTP response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {status}: {body}");
        if body.contains("insufficient_quota") || body.contains("billing_hard_limit_reached") {
            return CollaboratorError::RateLimited(detail);
        }
        match status {
            401 | 403 => CollaboratorError::Unauthorized(detail),
            402 | 429 => CollaboratorError::RateLimited(detail),
            _ => CollaboratorError::NetworkFailure(detail),
        }
    }
}
