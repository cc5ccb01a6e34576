//! Tolerant extraction of the slide outline from model output.
//!
//! Models wrap the array in code fences, prepend prose, or both. The outline is
//! recovered by stripping fences and taking everything between the first `[` and
//! the last `]`. A literal `]` in prose after the array moves the upper bound and
//! makes decoding fail; that case is reported as `DecodeFailed`, not repaired.

use serde::Deserialize;
use slide_common::{SlideDraft, VisualStyle};
use uuid::Uuid;

use crate::error::ParseError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentField {
    Text(String),
    Lines(Vec<String>),
}

impl ContentField {
    fn into_markdown(self) -> String {
        match self {
            ContentField::Text(text) => text,
            ContentField::Lines(lines) => lines
                .into_iter()
                .map(|line| {
                    let line = line.trim();
                    if line.starts_with("- ") || line.starts_with("* ") {
                        line.to_string()
                    } else {
                        format!("- {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSlide {
    #[serde(default)]
    id: Option<String>,
    title: String,
    content: ContentField,
    #[serde(default)]
    highlight: Option<String>,
    #[serde(default, alias = "visualStyle", alias = "layout", alias = "style")]
    visual_style: Option<String>,
    #[serde(alias = "imagePrompt")]
    image_prompt: String,
}

impl From<RawSlide> for SlideDraft {
    fn from(raw: RawSlide) -> Self {
        let visual_style = raw.visual_style.as_deref().and_then(|s| match s.parse::<VisualStyle>() {
            Ok(style) => Some(style),
            Err(e) => {
                tracing::debug!("{}; layout will be chosen later", e);
                None
            }
        });
        SlideDraft {
            id: raw
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            title: raw.title.trim().to_string(),
            content: raw.content.into_markdown(),
            highlight: raw.highlight.filter(|h| !h.trim().is_empty()),
            visual_style,
            image_prompt: raw.image_prompt,
            image_url: None,
        }
    }
}

/// Remove literal ```` ```json ```` and ```` ``` ```` markers anywhere in the text.
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "")
}

/// Text from the first `[` to the last `]`, inclusive.
pub fn bracket_bounds(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Decode the ordered slide list from raw model output.
pub fn parse_outline(raw: &str) -> Result<Vec<SlideDraft>, ParseError> {
    let stripped = strip_code_fences(raw);
    if stripped.trim().is_empty() {
        return Err(ParseError::EmptyPayload);
    }
    let candidate = bracket_bounds(&stripped).ok_or(ParseError::NoArrayFound)?.trim();

    let raw_slides: Vec<RawSlide> =
        serde_json::from_str(candidate).map_err(|e| ParseError::DecodeFailed(e.to_string()))?;
    if raw_slides.is_empty() {
        return Err(ParseError::EmptyArray);
    }

    Ok(raw_slides.into_iter().map(SlideDraft::from).collect())
}
