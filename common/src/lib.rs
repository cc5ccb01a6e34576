//! Shared data model, configuration and helpers for the slide workspace.

pub mod config;
pub mod error;
pub mod file_utils;
pub mod types;

pub use config::{ConfigError, SlideConfig};
pub use error::CollaboratorError;
pub use types::{
    ArchivedDeck, ChartRef, GenerationRequest, Language, SlideDraft, SlideRecord, VisualStyle,
};
