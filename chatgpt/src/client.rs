use serde::{Deserialize, Serialize};
use slide_common::CollaboratorError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

/// Minimal OpenAI-compatible client for chat completions and image generation.
///
/// Every call is a single attempt: failures are classified and returned, never retried.
pub struct OpenAiModelClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl OpenAiModelClient {
    pub fn new(api_key: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            api_base: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, CollaboratorError> {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CollaboratorError::NetworkFailure(e.to_string()))?;
        Ok(self)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .post(format!("{}/{}", self.api_base, path))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json");
        if let Ok(project) = std::env::var("OPENAI_PROJECT") {
            if !project.is_empty() {
                req = req.header("OpenAI-Project", project);
            }
        }
        if let Ok(org) = std::env::var("OPENAI_ORG") {
            if !org.is_empty() {
                req = req.header("OpenAI-Organization", org);
            }
        }
        req
    }

    async fn send<B: Serialize>(&self, path: &str, body: &B) -> Result<String, CollaboratorError> {
        let resp = self
            .post(path)
            .json(body)
            .send()
            .await
            .map_err(|e| CollaboratorError::NetworkFailure(e.to_string()))?;

        let status = resp.status();
        tracing::debug!("POST {} -> {}", path, status);

        let text = resp
            .text()
            .await
            .map_err(|e| CollaboratorError::NetworkFailure(e.to_string()))?;
        if !status.is_success() {
            tracing::debug!("openai http {}: {}", status, text);
            return Err(CollaboratorError::from_status(status.as_u16(), &text));
        }
        Ok(text)
    }

    /// Run one chat completion and return the assistant text.
    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, CollaboratorError> {
        let body = ChatRequest {
            model,
            messages,
            temperature,
        };
        let text = self.send("chat/completions", &body).await?;
        parse_chat_response(&text)
    }

    /// Generate one image and return its URL (or a data URL when only base64 is returned).
    pub async fn generate_image(
        &self,
        model: &str,
        prompt: &str,
        size: &str,
    ) -> Result<String, CollaboratorError> {
        let body = ImageRequest {
            model,
            prompt,
            n: 1,
            size,
        };
        let text = self.send("images/generations", &body).await?;
        parse_image_response(&text)
    }
}

fn parse_chat_response(text: &str) -> Result<String, CollaboratorError> {
    let parsed: ChatResponse =
        serde_json::from_str(text).map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();
    if content.trim().is_empty() {
        return Err(CollaboratorError::EmptyResponse);
    }
    Ok(content)
}

fn parse_image_response(text: &str) -> Result<String, CollaboratorError> {
    let parsed: ImageResponse =
        serde_json::from_str(text).map_err(|e| CollaboratorError::Malformed(e.to_string()))?;
    let image = parsed
        .data
        .into_iter()
        .next()
        .ok_or(CollaboratorError::EmptyResponse)?;
    match (image.url, image.b64_json) {
        (Some(url), _) if !url.is_empty() => Ok(url),
        (_, Some(b64)) if !b64.is_empty() => Ok(format!("data:image/png;base64,{b64}")),
        _ => Err(CollaboratorError::Malformed(
            "image entry has neither url nor b64_json".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"[1]"}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "[1]");
    }

    #[test]
    fn test_blank_chat_content_is_empty_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  "}}]}"#;
        assert_eq!(parse_chat_response(body), Err(CollaboratorError::EmptyResponse));
        let body = r#"{"choices":[]}"#;
        assert_eq!(parse_chat_response(body), Err(CollaboratorError::EmptyResponse));
    }

    #[test]
    fn test_chat_garbage_is_malformed() {
        assert!(matches!(
            parse_chat_response("<html>"),
            Err(CollaboratorError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_image_response() {
        let body = r#"{"created":1,"data":[{"url":"https://img/1.png"}]}"#;
        assert_eq!(parse_image_response(body).unwrap(), "https://img/1.png");

        let body = r#"{"data":[{"b64_json":"AAAA"}]}"#;
        assert_eq!(
            parse_image_response(body).unwrap(),
            "data:image/png;base64,AAAA"
        );

        assert_eq!(
            parse_image_response(r#"{"data":[]}"#),
            Err(CollaboratorError::EmptyResponse)
        );
    }

    #[test]
    fn test_api_base_trailing_slash() {
        let client = OpenAiModelClient::new("k".to_string()).with_api_base("http://localhost:8080/v1/");
        assert_eq!(client.api_base, "http://localhost:8080/v1");
    }
}
