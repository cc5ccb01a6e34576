//! Generation core: prompt, outline, images, markdown and the session lifecycle.

pub mod archive;
pub mod budget;
pub mod charts;
pub mod client;
pub mod deck;
pub mod error;
pub mod image_fanout;
pub mod markdown;
pub mod outline_parser;
pub mod pipeline;
pub mod prompt;
pub mod session;
pub mod state_machine;

pub use archive::{ArchiveError, ArchiveSink, JsonDeckStore};
pub use budget::{FixedBudget, TokenBudgetGuard, UnlimitedBudget};
pub use charts::{ChartRegistry, InMemoryChartRegistry};
pub use client::{ImageGenerator, OpenAiAdapter, OutlineClient, StubClient, TextGenerator};
pub use deck::{DeckError, EditableDeck, SlideEdit};
pub use error::{GenerationError, ParseError};
pub use image_fanout::{FanOutReport, ImageFanOut, SlideImageFailure};
pub use markdown::{LayoutPicker, MarkdownAssembler};
pub use outline_parser::parse_outline;
pub use pipeline::{Collaborators, GenerationPipeline};
pub use prompt::{estimate_cost, PromptCompiler, StylizationBand};
pub use session::{GenerationSession, ProgressReporter, SessionState, SessionTicket, TerminalError};
pub use state_machine::{GenerationStateMachine, Phase, DEFAULT_STUCK_TIMEOUT};
