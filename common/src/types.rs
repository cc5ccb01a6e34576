use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target language for the generated deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
    pub code: String,
    pub display_name: String,
}

impl Language {
    pub fn new(code: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            display_name: display_name.into(),
        }
    }

    /// Best-effort display name for a handful of common codes.
    pub fn from_code(code: &str) -> Self {
        let display_name = match code {
            "en" => "English",
            "ja" => "Japanese",
            "zh" => "Chinese",
            "ko" => "Korean",
            "fr" => "French",
            "de" => "German",
            "es" => "Spanish",
            "it" => "Italian",
            "pt" => "Portuguese",
            other => other,
        };
        Self::new(code, display_name)
    }
}

impl Default for Language {
    fn default() -> Self {
        Self::new("en", "English")
    }
}

/// A chart artifact the user can mention from slide text (e.g. `@chart1`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    pub handle: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub chart_type: String,
    /// Rendered artifact substituted for the mention token in the final deck.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_url: Option<String>,
}

/// Parameters of a single deck generation. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub slide_count: usize,
    pub language: Language,
    pub image_style: String,
    pub stylization_level: u8,
    #[serde(default)]
    pub charts: Vec<ChartRef>,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, slide_count: usize) -> Self {
        Self {
            topic: topic.into(),
            slide_count: slide_count.max(1),
            language: Language::default(),
            image_style: "clean, modern illustration".to_string(),
            stylization_level: 50,
            charts: Vec::new(),
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_image_style(mut self, style: impl Into<String>) -> Self {
        self.image_style = style.into();
        self
    }

    pub fn with_stylization_level(mut self, level: u8) -> Self {
        self.stylization_level = level.min(100);
        self
    }

    pub fn with_charts(mut self, charts: Vec<ChartRef>) -> Self {
        self.charts = charts;
        self
    }
}

/// Slide layout. The chart family is reserved for slides mentioning a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisualStyle {
    ImageRight,
    ImageLeft,
    FullBleed,
    ChartFocus,
    ChartLarge,
    ChartSplit,
}

impl VisualStyle {
    pub const ALL: [VisualStyle; 6] = [
        VisualStyle::ImageRight,
        VisualStyle::ImageLeft,
        VisualStyle::FullBleed,
        VisualStyle::ChartFocus,
        VisualStyle::ChartLarge,
        VisualStyle::ChartSplit,
    ];

    /// Layouts eligible as a fallback for slides without a usable style.
    pub const NON_CHART: [VisualStyle; 3] = [
        VisualStyle::ImageRight,
        VisualStyle::ImageLeft,
        VisualStyle::FullBleed,
    ];

    pub fn is_chart_family(self) -> bool {
        matches!(
            self,
            VisualStyle::ChartFocus | VisualStyle::ChartLarge | VisualStyle::ChartSplit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VisualStyle::ImageRight => "image-right",
            VisualStyle::ImageLeft => "image-left",
            VisualStyle::FullBleed => "full-bleed",
            VisualStyle::ChartFocus => "chart-focus",
            VisualStyle::ChartLarge => "chart-large",
            VisualStyle::ChartSplit => "chart-split",
        }
    }
}

impl fmt::Display for VisualStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VisualStyle {
    type Err = String;

    /// Accepts kebab, snake and camel spellings (`image-right`, `image_right`, `imageRight`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        VisualStyle::ALL
            .into_iter()
            .find(|style| style.as_str().replace('-', "") == normalized)
            .ok_or_else(|| format!("unknown visual style: {s}"))
    }
}

/// One slide of an outline. Position in the outline is its identity for
/// every later stage; `id` only labels it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideDraft {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_style: Option<VisualStyle>,
    pub image_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Slide as persisted inside an [`ArchivedDeck`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideRecord {
    pub title: String,
    #[serde(default)]
    pub highlight: Option<String>,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub layout: Option<VisualStyle>,
}

impl From<&SlideDraft> for SlideRecord {
    fn from(slide: &SlideDraft) -> Self {
        Self {
            title: slide.title.clone(),
            highlight: slide.highlight.clone(),
            content: slide.content.clone(),
            image_url: slide.image_url.clone(),
            layout: slide.visual_style,
        }
    }
}

/// Historical record of a finished deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedDeck {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub markdown: String,
    pub slides: Vec<SlideRecord>,
    /// Charts the deck was assembled with, so edits re-render them the same way.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<ChartRef>,
    pub created_at: DateTime<Utc>,
}

impl ArchivedDeck {
    /// Rebuild slide drafts from the stored records so the deck can be edited
    /// again. Image prompts are not persisted and come back empty.
    pub fn drafts(&self) -> Vec<SlideDraft> {
        self.slides
            .iter()
            .enumerate()
            .map(|(i, record)| SlideDraft {
                id: format!("{}-{}", self.id, i + 1),
                title: record.title.clone(),
                content: record.content.clone(),
                highlight: record.highlight.clone(),
                visual_style: record.layout,
                image_prompt: String::new(),
                image_url: record.image_url.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_archived_deck_round_trips_to_drafts() {
        let draft = SlideDraft {
            id: "x".to_string(),
            title: "Intro".to_string(),
            content: "- a".to_string(),
            highlight: Some("key".to_string()),
            visual_style: Some(VisualStyle::FullBleed),
            image_prompt: "prompt".to_string(),
            image_url: Some("u".to_string()),
        };
        let deck = ArchivedDeck {
            id: "deck".to_string(),
            title: "Intro".to_string(),
            topic: "t".to_string(),
            markdown: String::new(),
            slides: vec![SlideRecord::from(&draft)],
            charts: Vec::new(),
            created_at: Utc::now(),
        };
        let drafts = deck.drafts();
        assert_eq!(drafts[0].id, "deck-1");
        assert_eq!(drafts[0].visual_style, Some(VisualStyle::FullBleed));
        assert_eq!(drafts[0].image_url.as_deref(), Some("u"));
        assert!(drafts[0].image_prompt.is_empty());
    }

    #[test]
    fn test_archived_deck_without_charts_still_loads() {
        let json = r##"{"id":"d","title":"T","topic":"t","markdown":"# T","slides":[],"created_at":"2025-03-14T09:26:53Z"}"##;
        let deck: ArchivedDeck = serde_json::from_str(json).unwrap();
        assert!(deck.charts.is_empty());
        assert!(!serde_json::to_string(&deck).unwrap().contains("charts"));
    }

    #[test]
    fn test_visual_style_parses_loose_spellings() {
        assert_eq!("image-right".parse::<VisualStyle>(), Ok(VisualStyle::ImageRight));
        assert_eq!("image_left".parse::<VisualStyle>(), Ok(VisualStyle::ImageLeft));
        assert_eq!("FullBleed".parse::<VisualStyle>(), Ok(VisualStyle::FullBleed));
        assert_eq!(" chart-split ".parse::<VisualStyle>(), Ok(VisualStyle::ChartSplit));
        assert!("diagonal".parse::<VisualStyle>().is_err());
    }

    #[test]
    fn test_chart_family() {
        let charts: Vec<_> = VisualStyle::ALL
            .into_iter()
            .filter(|s| s.is_chart_family())
            .collect();
        assert_eq!(charts.len(), 3);
        assert!(VisualStyle::NON_CHART.iter().all(|s| !s.is_chart_family()));
    }

    #[test]
    fn test_request_builder_clamps() {
        let request = GenerationRequest::new("Topic", 0).with_stylization_level(180);
        assert_eq!(request.slide_count, 1);
        assert_eq!(request.stylization_level, 100);
    }

    #[test]
    fn test_chart_ref_uses_type_key() {
        let chart: ChartRef = serde_json::from_str(
            r#"{"handle":"@chart1","title":"Revenue","type":"bar"}"#,
        )
        .unwrap();
        assert_eq!(chart.chart_type, "bar");
        assert!(chart.rendered_url.is_none());
    }
}
