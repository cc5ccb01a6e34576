//! HTTP clients for the text and image generation collaborators.

mod client;

pub use client::{ChatMessage, OpenAiModelClient};
