use serde::{Deserialize, Serialize};
use slide_common::{GenerationRequest, SlideDraft};
use uuid::Uuid;

/// Identity of one generation session.
///
/// `generation` increases with every submit, so anything tagged with an older
/// value belongs to a superseded session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId {
    pub id: Uuid,
    pub generation: u64,
}

impl SessionId {
    pub fn new(generation: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
        }
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.id, self.generation)
    }
}

/// Why a session ended without a deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Budget,
    Network,
    Unauthorized,
    Parse,
    ImageCritical,
    Superseded,
    Stalled,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    SessionStarted {
        session: SessionId,
    },
    Progress {
        session: SessionId,
        progress: f32,
        step: String,
    },
    OutlineReady {
        session: SessionId,
        slides: Vec<SlideDraft>,
    },
    SlideImageFailed {
        session: SessionId,
        index: usize,
        message: String,
    },
    Completed {
        session: SessionId,
        slides: Vec<SlideDraft>,
        markdown: String,
    },
    Failed {
        session: SessionId,
        kind: FailureKind,
        message: String,
    },
}

impl Event {
    pub fn session(&self) -> SessionId {
        match self {
            Event::SessionStarted { session }
            | Event::Progress { session, .. }
            | Event::OutlineReady { session, .. }
            | Event::SlideImageFailed { session, .. }
            | Event::Completed { session, .. }
            | Event::Failed { session, .. } => *session,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Completed { .. } | Event::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Op {
    Submit { request: GenerationRequest },
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub op: Op,
}

impl Submission {
    pub fn new(op: Op) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            op,
        }
    }
}
