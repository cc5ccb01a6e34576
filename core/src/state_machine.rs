//! Lifecycle of generation sessions: home, generating, editing.
//!
//! The machine owns the one tracked session. Pipelines run on spawned tasks and
//! talk back only through session-tagged [`Event`]s; anything tagged with an
//! older session is dropped on arrival.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use slide_common::{GenerationRequest, SlideDraft};
use slide_protocol::{Event, FailureKind, Op, SessionId, Submission};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::archive::ArchiveSink;
use crate::budget::TokenBudgetGuard;
use crate::deck::EditableDeck;
use crate::markdown::MarkdownAssembler;
use crate::error::GenerationError;
use crate::pipeline::{Collaborators, GenerationPipeline};
use crate::prompt::estimate_cost;
use crate::session::{GenerationSession, ProgressReporter, SessionState, SessionTicket, TerminalError};

pub const DEFAULT_STUCK_TIMEOUT: Duration = Duration::from_secs(300);
const STUCK_RECHECK: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub enum Phase {
    Home,
    Generating,
    Editing(EditableDeck),
}

pub struct GenerationStateMachine {
    pipeline: Arc<GenerationPipeline>,
    budget: Arc<dyn TokenBudgetGuard>,
    archive: Arc<dyn ArchiveSink>,
    phase: Phase,
    session: Option<GenerationSession>,
    topic: Option<String>,
    assembler: Option<MarkdownAssembler>,
    last_error: Option<TerminalError>,
    generation: Arc<AtomicU64>,
    tx: UnboundedSender<Event>,
    rx: UnboundedReceiver<Event>,
    task: Option<JoinHandle<()>>,
    stuck_timeout: Duration,
    next_stuck_check: Option<Instant>,
}

impl GenerationStateMachine {
    pub fn new(collaborators: &Collaborators, pipeline: GenerationPipeline) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            pipeline: Arc::new(pipeline),
            budget: Arc::clone(&collaborators.budget),
            archive: Arc::clone(&collaborators.archive),
            phase: Phase::Home,
            session: None,
            topic: None,
            assembler: None,
            last_error: None,
            generation: Arc::new(AtomicU64::new(0)),
            tx,
            rx,
            task: None,
            stuck_timeout: DEFAULT_STUCK_TIMEOUT,
            next_stuck_check: None,
        }
    }

    pub fn with_stuck_timeout(mut self, timeout: Duration) -> Self {
        self.stuck_timeout = timeout;
        self
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_generating(&self) -> bool {
        matches!(self.phase, Phase::Generating)
    }

    pub fn session(&self) -> Option<&GenerationSession> {
        self.session.as_ref()
    }

    pub fn session_state(&self) -> SessionState {
        match (&self.session, &self.phase) {
            (Some(_), _) => SessionState::Generating,
            (None, Phase::Editing(_)) => SessionState::Completed,
            (None, _) if self.last_error.is_some() => SessionState::Failed,
            (None, _) => SessionState::Idle,
        }
    }

    pub fn progress(&self) -> f32 {
        self.session.as_ref().map_or(0.0, |s| s.progress)
    }

    pub fn step(&self) -> &str {
        self.session.as_ref().map_or("", |s| s.step.as_str())
    }

    /// Slides of the running session, available once the outline is parsed.
    pub fn draft_slides(&self) -> &[SlideDraft] {
        self.session.as_ref().map(|s| s.slides.as_slice()).unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<&TerminalError> {
        self.last_error.as_ref()
    }

    pub fn deck(&self) -> Option<&EditableDeck> {
        match &self.phase {
            Phase::Editing(deck) => Some(deck),
            _ => None,
        }
    }

    pub fn deck_mut(&mut self) -> Option<&mut EditableDeck> {
        match &mut self.phase {
            Phase::Editing(deck) => Some(deck),
            _ => None,
        }
    }

    pub fn handle_submission(&mut self, submission: Submission) -> Result<Option<SessionId>, GenerationError> {
        tracing::debug!("Submission {}: {:?}", submission.id, submission.op);
        match submission.op {
            Op::Submit { request } => self.submit(request).map(Some),
            Op::Close => {
                self.close();
                Ok(None)
            }
        }
    }

    /// Start a new session for `request`.
    ///
    /// Always forcibly supersedes whatever session is tracked: a stuck or
    /// still-running older session never blocks a new submission. The older
    /// task keeps running but everything it reports is ignored. Must be called
    /// from within a tokio runtime.
    pub fn submit(&mut self, request: GenerationRequest) -> Result<SessionId, GenerationError> {
        if let Some(old) = &self.session {
            tracing::info!("Superseding session {}", old.id);
        }
        if matches!(self.phase, Phase::Editing(_)) {
            tracing::info!("Closing editor for a new generation");
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.reset_to_home();
        self.last_error = None;

        let estimated = estimate_cost(&request);
        if !self.budget.can_proceed(estimated) {
            let err = GenerationError::BudgetExceeded { estimated };
            tracing::warn!("Refusing generation for '{}': {}", request.topic, err);
            self.last_error = Some(TerminalError {
                kind: err.kind(),
                message: err.to_string(),
            });
            return Err(err);
        }

        let id = SessionId::new(generation);
        self.session = Some(GenerationSession::new(id));
        self.topic = Some(request.topic.clone());
        self.assembler = Some(self.pipeline.assembler_for(&request));
        self.phase = Phase::Generating;
        self.next_stuck_check = Some(Instant::now() + self.stuck_timeout);

        let reporter = ProgressReporter::new(
            SessionTicket::new(id, Arc::clone(&self.generation)),
            self.tx.clone(),
        );
        let pipeline = Arc::clone(&self.pipeline);
        tracing::info!(
            "Starting session {} for '{}' ({} slides, ~{} tokens)",
            id,
            request.topic,
            request.slide_count,
            estimated
        );
        self.task = Some(tokio::spawn(async move {
            let session = reporter.session();
            reporter.emit(Event::SessionStarted { session });
            let event = match pipeline.run(&request, &reporter).await {
                Ok((slides, markdown)) => Event::Completed {
                    session,
                    slides,
                    markdown,
                },
                Err(err) => Event::Failed {
                    session,
                    kind: err.kind(),
                    message: err.to_string(),
                },
            };
            reporter.emit(event);
        }));
        Ok(id)
    }

    /// Leave the editor. Returns false when there was no deck open.
    pub fn close(&mut self) -> bool {
        if matches!(self.phase, Phase::Editing(_)) {
            self.phase = Phase::Home;
            return true;
        }
        false
    }

    /// Abandon the running session without recording an error.
    pub fn cancel(&mut self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        tracing::info!("Cancelling session {}", session.id);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.reset_to_home();
        true
    }

    /// Apply one event. Returns false when it was dropped as stale.
    pub async fn apply_event(&mut self, event: Event) -> bool {
        let Some(current) = self.session.as_ref().map(|s| s.id) else {
            tracing::debug!("No session tracked; dropping {:?}", event.session());
            return false;
        };
        if event.session() != current {
            tracing::debug!("Dropping event from stale session {}", event.session());
            return false;
        }

        match event {
            Event::SessionStarted { .. } => {}
            Event::Progress { progress, step, .. } => {
                if let Some(session) = self.session.as_mut() {
                    session.apply_progress(progress, &step);
                }
            }
            Event::OutlineReady { slides, .. } => {
                if let Some(session) = self.session.as_mut() {
                    session.slides = slides;
                }
            }
            Event::SlideImageFailed { index, message, .. } => {
                tracing::debug!("Slide {} has no image: {}", index + 1, message);
            }
            Event::Completed { slides, markdown, .. } => self.complete(slides, markdown).await,
            Event::Failed { kind, message, .. } => self.fail(TerminalError { kind, message }),
        }
        true
    }

    /// Reset a session that has produced no terminal signal for too long.
    ///
    /// Only fires once the pipeline task is gone; a slow but live pipeline is
    /// left alone.
    pub fn check_stuck(&mut self, now: Instant) -> bool {
        if !self.is_generating() {
            return false;
        }
        let Some(session) = &self.session else {
            return false;
        };
        if now.saturating_duration_since(session.started_at) < self.stuck_timeout {
            return false;
        }
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        tracing::warn!(
            "Session {} stopped without finishing after {:?}; returning home",
            session.id,
            self.stuck_timeout
        );
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.fail(TerminalError {
            kind: FailureKind::Stalled,
            message: "generation stopped responding and was reset".to_string(),
        });
        true
    }

    /// Wait for the next event that changes the tracked session.
    ///
    /// Returns `None` once nothing is generating.
    pub async fn next_update(&mut self) -> Option<Event> {
        loop {
            if !self.is_generating() {
                return None;
            }
            let check_at = self
                .next_stuck_check
                .unwrap_or_else(|| Instant::now() + self.stuck_timeout);
            tokio::select! {
                biased;
                event = self.rx.recv() => {
                    let event = event?;
                    if self.apply_event(event.clone()).await {
                        return Some(event);
                    }
                }
                _ = tokio::time::sleep_until(check_at) => {
                    let session = self.session.as_ref().map(|s| s.id);
                    let now = Instant::now();
                    if self.check_stuck(now) {
                        if let (Some(session), Some(error)) = (session, self.last_error.clone()) {
                            return Some(Event::Failed {
                                session,
                                kind: error.kind,
                                message: error.message,
                            });
                        }
                        return None;
                    }
                    self.next_stuck_check = Some(now + STUCK_RECHECK);
                }
            }
        }
    }

    /// Drive the running session to its end, handing every update to `on_event`.
    pub async fn run_until_settled(&mut self, mut on_event: impl FnMut(&Event)) -> &Phase {
        while let Some(event) = self.next_update().await {
            on_event(&event);
        }
        &self.phase
    }

    async fn complete(&mut self, slides: Vec<SlideDraft>, markdown: String) {
        let finished = self.session.as_ref().is_some_and(|s| s.progress >= 1.0);
        if !finished || slides.is_empty() {
            self.fail(TerminalError {
                kind: FailureKind::Internal,
                message: "generation finished without a complete deck".to_string(),
            });
            return;
        }

        let Some(assembler) = self.assembler.take() else {
            self.fail(TerminalError {
                kind: FailureKind::Internal,
                message: "no assembler recorded for the finished session".to_string(),
            });
            return;
        };
        let topic = self.topic.take().unwrap_or_default();
        let mut deck = EditableDeck::from_generated(topic, slides, markdown, assembler);
        let charts = deck.charts();
        match self
            .archive
            .archive(deck.topic(), deck.markdown(), deck.slides(), &charts)
            .await
        {
            Ok(record) => deck.set_archive_id(record.id),
            Err(e) => tracing::warn!("Failed to archive deck: {}", e),
        }

        tracing::info!("Deck ready: {} slides", deck.slides().len());
        self.session = None;
        self.task = None;
        self.next_stuck_check = None;
        self.phase = Phase::Editing(deck);
    }

    fn fail(&mut self, error: TerminalError) {
        tracing::error!("Generation failed ({:?}): {}", error.kind, error.message);
        self.last_error = Some(error);
        self.reset_to_home();
    }

    fn reset_to_home(&mut self) {
        self.phase = Phase::Home;
        self.session = None;
        self.topic = None;
        self.assembler = None;
        self.task = None;
        self.next_stuck_check = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveError;
    use crate::budget::{FixedBudget, UnlimitedBudget};
    use crate::charts::InMemoryChartRegistry;
    use crate::client::{ImageGenerator, TextGenerator};
    use async_trait::async_trait;
    use slide_chatgpt::ChatMessage;
    use slide_common::{ArchivedDeck, ChartRef, CollaboratorError};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    const OUTLINE: &str = r#"[
        {"title": "A", "content": "- a", "visualStyle": "image-right", "imagePrompt": "pa"},
        {"title": "B", "content": "- b", "visualStyle": "image-left", "imagePrompt": "pb"}
    ]"#;

    struct Text {
        delay_ms: u64,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Text {
        async fn generate(&self, _model: &str, _messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(OUTLINE.to_string())
        }
    }

    struct Panicking;

    #[async_trait]
    impl TextGenerator for Panicking {
        async fn generate(&self, _model: &str, _messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
            panic!("collaborator blew up");
        }
    }

    struct Images;

    #[async_trait]
    impl ImageGenerator for Images {
        async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError> {
            Ok(format!("https://img/{prompt}.png"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        decks: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ArchiveSink for Recorder {
        async fn archive(
            &self,
            topic: &str,
            markdown: &str,
            slides: &[SlideDraft],
            charts: &[ChartRef],
        ) -> Result<ArchivedDeck, ArchiveError> {
            self.decks.lock().unwrap().push(topic.to_string());
            Ok(ArchivedDeck {
                id: format!("deck-{topic}"),
                title: topic.to_string(),
                topic: topic.to_string(),
                markdown: markdown.to_string(),
                slides: slides.iter().map(Into::into).collect(),
                charts: charts.to_vec(),
                created_at: chrono::Utc::now(),
            })
        }
    }

    fn machine(
        text: Arc<dyn TextGenerator>,
        budget: Arc<dyn TokenBudgetGuard>,
        archive: Arc<Recorder>,
    ) -> GenerationStateMachine {
        let collaborators = Collaborators {
            text,
            images: Arc::new(Images),
            budget,
            archive,
            charts: Arc::new(InMemoryChartRegistry::default()),
        };
        let pipeline = GenerationPipeline::new(&collaborators, "test-model", Some(1));
        GenerationStateMachine::new(&collaborators, pipeline)
    }

    fn text(delay_ms: u64) -> Arc<Text> {
        Arc::new(Text {
            delay_ms,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_success_lands_in_editor_and_archives() {
        let archive = Arc::new(Recorder::default());
        let mut sm = machine(text(0), Arc::new(UnlimitedBudget), archive.clone());
        assert_eq!(sm.session_state(), SessionState::Idle);
        sm.submit(GenerationRequest::new("Rust", 2)).unwrap();
        assert!(sm.is_generating());
        assert_eq!(sm.session_state(), SessionState::Generating);

        let mut progress = Vec::new();
        sm.run_until_settled(|event| {
            if let Event::Progress { progress: p, .. } = event {
                progress.push(*p);
            }
        })
        .await;

        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(progress.last().copied(), Some(1.0));
        let deck = sm.deck().unwrap();
        assert_eq!(deck.slides().len(), 2);
        assert_eq!(deck.archive_id(), Some("deck-Rust"));
        assert!(deck.markdown().contains("# A\n\n![bg right:40%](https://img/pa.png)"));
        assert_eq!(archive.decks.lock().unwrap().len(), 1);
        assert!(sm.session().is_none());
        assert_eq!(sm.session_state(), SessionState::Completed);
        assert!(sm.last_error().is_none());
    }

    #[tokio::test]
    async fn test_budget_refusal_makes_no_calls() {
        let text = text(0);
        let archive = Arc::new(Recorder::default());
        let mut sm = machine(text.clone(), Arc::new(FixedBudget { limit: 100 }), archive);

        let err = sm.submit(GenerationRequest::new("Rust", 3)).unwrap_err();
        assert!(matches!(err, GenerationError::BudgetExceeded { .. }));
        assert!(matches!(sm.phase(), Phase::Home));
        assert_eq!(sm.last_error().map(|e| e.kind), Some(FailureKind::Budget));
        assert_eq!(sm.session_state(), SessionState::Failed);
        assert!(sm.next_update().await.is_none());
        assert_eq!(text.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_submission_supersedes_older() {
        let archive = Arc::new(Recorder::default());
        let mut sm = machine(text(1_000), Arc::new(UnlimitedBudget), archive.clone());

        let first = sm.submit(GenerationRequest::new("Old", 2)).unwrap();
        let second = sm.submit(GenerationRequest::new("New", 2)).unwrap();
        assert_ne!(first, second);

        let mut seen = Vec::new();
        sm.run_until_settled(|event| seen.push(event.session())).await;

        assert!(seen.iter().all(|s| *s == second));
        assert_eq!(sm.deck().unwrap().topic(), "New");
        assert_eq!(*archive.decks.lock().unwrap(), vec!["New".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_event_is_dropped() {
        let mut sm = machine(text(0), Arc::new(UnlimitedBudget), Arc::new(Recorder::default()));
        let current = sm.submit(GenerationRequest::new("Rust", 2)).unwrap();
        let stale = SessionId::new(current.generation + 7);

        let applied = sm
            .apply_event(Event::Failed {
                session: stale,
                kind: FailureKind::Network,
                message: "old".to_string(),
            })
            .await;
        assert!(!applied);
        assert!(sm.is_generating());
        assert!(sm.last_error().is_none());
    }

    #[tokio::test]
    async fn test_completed_before_full_progress_is_rejected() {
        let mut sm = machine(text(0), Arc::new(UnlimitedBudget), Arc::new(Recorder::default()));
        let id = sm.submit(GenerationRequest::new("Rust", 2)).unwrap();
        assert!(sm.cancel());
        assert_eq!(sm.session_state(), SessionState::Idle);
        let id2 = sm.submit(GenerationRequest::new("Rust", 2)).unwrap();
        assert_ne!(id, id2);

        sm.apply_event(Event::Progress {
            session: id2,
            progress: 0.5,
            step: "half".to_string(),
        })
        .await;
        sm.apply_event(Event::Completed {
            session: id2,
            slides: Vec::new(),
            markdown: String::new(),
        })
        .await;
        assert!(matches!(sm.phase(), Phase::Home));
        assert_eq!(sm.last_error().map(|e| e.kind), Some(FailureKind::Internal));
        assert_eq!(sm.progress(), 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_session_returns_home() {
        let mut sm = machine(Arc::new(Panicking), Arc::new(UnlimitedBudget), Arc::new(Recorder::default()))
            .with_stuck_timeout(Duration::from_secs(60));
        sm.submit(GenerationRequest::new("Rust", 2)).unwrap();

        let mut last = None;
        sm.run_until_settled(|event| last = Some(event.clone())).await;

        assert!(matches!(sm.phase(), Phase::Home));
        assert_eq!(sm.last_error().map(|e| e.kind), Some(FailureKind::Stalled));
        assert!(matches!(last, Some(Event::Failed { kind: FailureKind::Stalled, .. })));
    }

    #[tokio::test]
    async fn test_close_and_resubmit_from_editor() {
        let mut sm = machine(text(0), Arc::new(UnlimitedBudget), Arc::new(Recorder::default()));
        sm.submit(GenerationRequest::new("One", 2)).unwrap();
        sm.run_until_settled(|_| {}).await;
        assert!(sm.deck().is_some());

        sm.submit(GenerationRequest::new("Two", 2)).unwrap();
        assert!(sm.is_generating());
        sm.run_until_settled(|_| {}).await;
        assert_eq!(sm.deck().unwrap().topic(), "Two");

        assert!(sm.close());
        assert!(!sm.close());
        assert!(matches!(sm.phase(), Phase::Home));
        assert_eq!(sm.session_state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_submissions_drive_the_machine() {
        let mut sm = machine(text(0), Arc::new(UnlimitedBudget), Arc::new(Recorder::default()));
        let id = sm
            .handle_submission(Submission::new(Op::Submit {
                request: GenerationRequest::new("Ops", 2),
            }))
            .unwrap();
        assert!(id.is_some());
        assert_eq!(sm.step(), "");

        sm.next_update().await;
        sm.run_until_settled(|_| {}).await;
        let deck = sm.deck_mut().unwrap();
        deck.set_layout(0, slide_common::VisualStyle::FullBleed).unwrap();
        assert!(deck.markdown().contains("![bg cover brightness:0.7](https://img/pa.png)"));

        assert_eq!(sm.handle_submission(Submission::new(Op::Close)).unwrap(), None);
        assert!(sm.deck().is_none());
    }
}
