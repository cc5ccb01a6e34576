use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use slide_common::SlideDraft;
use slide_protocol::{Event, FailureKind, SessionId};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;

/// Lifecycle of the newest session as reported by
/// `GenerationStateMachine::session_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing submitted yet, or the last session was cancelled or its deck closed.
    Idle,
    Generating,
    Completed,
    Failed,
}

/// Error shown on the home view after a session ended badly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalError {
    pub kind: FailureKind,
    pub message: String,
}

/// Tracked state of the one live generation.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    pub id: SessionId,
    pub progress: f32,
    pub step: String,
    pub slides: Vec<SlideDraft>,
    pub started_at: Instant,
}

impl GenerationSession {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            progress: 0.0,
            step: String::new(),
            slides: Vec::new(),
            started_at: Instant::now(),
        }
    }

    /// Progress never moves backwards while generating.
    pub fn apply_progress(&mut self, progress: f32, step: &str) {
        let progress = progress.clamp(0.0, 1.0);
        if progress >= self.progress {
            self.progress = progress;
            self.step = step.to_string();
        }
    }
}

/// Session identity plus a view of the newest generation number.
///
/// Holders compare the two to find out whether their session was superseded.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    session: SessionId,
    current: Arc<AtomicU64>,
}

impl SessionTicket {
    pub fn new(session: SessionId, current: Arc<AtomicU64>) -> Self {
        Self { session, current }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.session.generation
    }
}

/// Sends session-tagged events from the pipeline to the state machine.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    ticket: SessionTicket,
    tx: UnboundedSender<Event>,
}

impl ProgressReporter {
    pub fn new(ticket: SessionTicket, tx: UnboundedSender<Event>) -> Self {
        Self { ticket, tx }
    }

    pub fn session(&self) -> SessionId {
        self.ticket.session()
    }

    pub fn is_current(&self) -> bool {
        self.ticket.is_current()
    }

    pub fn progress(&self, progress: f32, step: impl Into<String>) {
        self.emit(Event::Progress {
            session: self.session(),
            progress,
            step: step.into(),
        });
    }

    /// Events from a superseded session are not sent at all.
    pub fn emit(&self, event: Event) {
        if !self.is_current() {
            tracing::debug!("Dropping event from superseded session {}", self.session());
            return;
        }
        if self.tx.send(event).is_err() {
            tracing::debug!("State machine gone; dropping event for {}", self.session());
        }
    }
}
