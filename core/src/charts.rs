use anyhow::{Context, Result};
use slide_common::ChartRef;
use std::path::Path;

/// Read-only view of the charts a deck may reference.
pub trait ChartRegistry: Send + Sync {
    fn list(&self) -> Vec<ChartRef>;

    /// Look up a mention token such as `@chart1`. The leading `@` is optional.
    fn resolve(&self, mention: &str) -> Option<ChartRef>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryChartRegistry {
    charts: Vec<ChartRef>,
}

impl InMemoryChartRegistry {
    pub fn new(charts: Vec<ChartRef>) -> Self {
        Self { charts }
    }

    /// Load a JSON array of chart references.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read charts from {}", path.display()))?;
        let charts: Vec<ChartRef> = serde_json::from_str(&content)
            .with_context(|| format!("Invalid chart list in {}", path.display()))?;
        tracing::info!("Loaded {} charts from {}", charts.len(), path.display());
        Ok(Self::new(charts))
    }
}

impl ChartRegistry for InMemoryChartRegistry {
    fn list(&self) -> Vec<ChartRef> {
        self.charts.clone()
    }

    fn resolve(&self, mention: &str) -> Option<ChartRef> {
        let wanted = mention.trim_start_matches('@');
        self.charts
            .iter()
            .find(|chart| chart.handle.trim_start_matches('@') == wanted)
            .cloned()
    }
}

/// Candidate mention tokens in `text`: `@` followed by letters, digits, `-` or `_`.
pub fn mention_tokens(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'@' {
            let start = i;
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'-' || bytes[i] == b'_') {
                i += 1;
            }
            if i > start + 1 {
                tokens.push(&text[start..i]);
            }
        } else {
            i += 1;
        }
    }
    tokens
}

/// Request charts followed by every registry chart whose handle is not
/// already taken. This is the chart list of one generation run.
pub fn merge_charts(request_charts: &[ChartRef], registry: &dyn ChartRegistry) -> Vec<ChartRef> {
    let mut charts = request_charts.to_vec();
    for chart in registry.list() {
        if !charts.iter().any(|c| c.handle == chart.handle) {
            charts.push(chart);
        }
    }
    charts
}

/// Charts mentioned in `text` that the registry can resolve, in order of first mention.
pub fn mentioned_charts(registry: &dyn ChartRegistry, text: &str) -> Vec<ChartRef> {
    let mut found: Vec<ChartRef> = Vec::new();
    for token in mention_tokens(text) {
        if let Some(chart) = registry.resolve(token) {
            if !found.iter().any(|c| c.handle == chart.handle) {
                found.push(chart);
            }
        }
    }
    found
}
