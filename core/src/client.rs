use async_trait::async_trait;
use slide_chatgpt::{ChatMessage, OpenAiModelClient};
use slide_common::{file_utils::create_slug, CollaboratorError, GenerationRequest};
use std::sync::Arc;

/// Text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, CollaboratorError>;
}

/// Image-generation collaborator. Returns the URL of the generated image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Sends the compiled instruction as a single user message.
///
/// One attempt per call: there is no retry and no backoff.
pub struct OutlineClient {
    text: Arc<dyn TextGenerator>,
    model: String,
}

impl OutlineClient {
    pub fn new(text: Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        Self {
            text,
            model: model.into(),
        }
    }

    pub async fn fetch(&self, instruction: String) -> Result<String, CollaboratorError> {
        tracing::debug!("Requesting outline from {}", self.model);
        let raw = self
            .text
            .generate(&self.model, vec![ChatMessage::user(instruction)])
            .await?;
        if raw.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        tracing::debug!("Outline response: {} bytes", raw.len());
        Ok(raw)
    }
}

/// Adapter exposing [`OpenAiModelClient`] as both collaborators.
pub struct OpenAiAdapter {
    inner: OpenAiModelClient,
    temperature: f32,
    image_model: String,
    image_size: String,
}

impl OpenAiAdapter {
    pub fn new(inner: OpenAiModelClient) -> Self {
        Self {
            inner,
            temperature: 0.7,
            image_model: "dall-e-3".to_string(),
            image_size: "1792x1024".to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_image_model(mut self, model: impl Into<String>, size: impl Into<String>) -> Self {
        self.image_model = model.into();
        self.image_size = size.into();
        self
    }
}

#[async_trait]
impl TextGenerator for OpenAiAdapter {
    async fn generate(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
        self.inner.chat(model, &messages, self.temperature).await
    }
}

#[async_trait]
impl ImageGenerator for OpenAiAdapter {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError> {
        self.inner
            .generate_image(&self.image_model, prompt, &self.image_size)
            .await
    }
}

/// Offline collaborator: a canned outline and placeholder images.
pub struct StubClient {
    topic: String,
    slide_count: usize,
}

impl StubClient {
    pub fn for_request(request: &GenerationRequest) -> Self {
        Self {
            topic: request.topic.clone(),
            slide_count: request.slide_count,
        }
    }
}

#[async_trait]
impl TextGenerator for StubClient {
    async fn generate(&self, _model: &str, _messages: Vec<ChatMessage>) -> Result<String, CollaboratorError> {
        let slides: Vec<serde_json::Value> = (1..=self.slide_count)
            .map(|n| {
                let title = match n {
                    1 => format!("Introduction to {}", self.topic),
                    n if n == self.slide_count => "Summary".to_string(),
                    n => format!("{} part {}", self.topic, n - 1),
                };
                serde_json::json!({
                    "title": title,
                    "content": format!("- Key point {n}.1\n- Key point {n}.2\n- Key point {n}.3"),
                    "image_prompt": format!("{} illustration {}", self.topic, n),
                })
            })
            .collect();
        serde_json::to_string_pretty(&slides).map_err(|e| CollaboratorError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ImageGenerator for StubClient {
    async fn generate(&self, prompt: &str) -> Result<String, CollaboratorError> {
        Ok(format!("https://placehold.co/1600x900/png?text={}", create_slug(prompt)))
    }
}
