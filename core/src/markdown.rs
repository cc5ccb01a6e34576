//! Slide list to Marp markdown.
//!
//! `assemble` is pure: the same slides always give byte-identical output, so the
//! editor can re-run it after every edit. Randomness lives only in
//! [`LayoutPicker`], which is applied once when a deck is first built.

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use slide_common::{ChartRef, SlideDraft, VisualStyle};

use crate::charts::{mentioned_charts, ChartRegistry, InMemoryChartRegistry};

pub const SLIDE_DELIMITER: &str = "\n---\n\n";

/// Assigns a non-chart layout to slides that came without a usable style.
pub struct LayoutPicker {
    rng: StdRng,
}

impl LayoutPicker {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Fill missing styles in place; slides that already have one are untouched.
    pub fn fill_missing(&mut self, slides: &mut [SlideDraft]) {
        for slide in slides.iter_mut().filter(|s| s.visual_style.is_none()) {
            slide.visual_style = VisualStyle::NON_CHART.choose(&mut self.rng).copied();
        }
    }
}

#[derive(Clone)]
pub struct MarkdownAssembler {
    charts: Arc<dyn ChartRegistry>,
    theme: String,
}

impl fmt::Debug for MarkdownAssembler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownAssembler")
            .field("theme", &self.theme)
            .finish_non_exhaustive()
    }
}

impl MarkdownAssembler {
    pub fn new(charts: Arc<dyn ChartRegistry>) -> Self {
        Self {
            charts,
            theme: "default".to_string(),
        }
    }

    /// Assembler resolving mentions against a fixed chart list.
    pub fn from_charts(charts: Vec<ChartRef>) -> Self {
        Self::new(Arc::new(InMemoryChartRegistry::new(charts)))
    }

    /// Every chart this assembler can resolve.
    pub fn charts(&self) -> Vec<ChartRef> {
        self.charts.list()
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn assemble(&self, slides: &[SlideDraft]) -> String {
        let mut out = format!(
            "---\nmarp: true\ntheme: {}\npaginate: true\n---\n\n",
            self.theme
        );
        for slide in slides {
            self.render_slide(&mut out, slide);
        }
        out
    }

    fn render_slide(&self, out: &mut String, slide: &SlideDraft) {
        out.push_str(&format!("# {}\n\n", slide.title.trim()));

        let mention_text = format!("{}\n{}", slide.title, slide.content);
        let charts = mentioned_charts(self.charts.as_ref(), &mention_text);
        let chart_layout = slide.visual_style.filter(|s| s.is_chart_family());

        match (chart_layout, charts.is_empty(), slide.image_url.as_deref()) {
            (Some(style), false, _) => {
                out.push_str(&format!("<!-- _class: {style} -->\n\n"));
            }
            (_, false, Some(url)) => {
                out.push_str(&format!("![bg opacity:.15]({url})\n\n"));
            }
            (_, true, Some(url)) => {
                out.push_str(&background_directive(slide.visual_style, url));
                out.push_str("\n\n");
            }
            (_, _, None) => {}
        }

        if let Some(highlight) = slide.highlight.as_deref() {
            for line in highlight.trim().lines() {
                out.push_str(&format!("> {line}\n"));
            }
            out.push('\n');
        }

        let content = slide.content.trim_end();
        if !content.is_empty() {
            out.push_str(content);
            out.push('\n');
        }

        if chart_layout.is_some() {
            for chart in charts.iter() {
                if let Some(url) = chart.rendered_url.as_deref() {
                    out.push_str(&format!("\n![{}]({url})\n", chart.title));
                }
            }
        }

        out.push_str(SLIDE_DELIMITER);
    }
}

/// Background image directive for an image layout. Slides without a style, or
/// with a chart layout but no chart mention, fall back to image-right.
fn background_directive(style: Option<VisualStyle>, url: &str) -> String {
    match style {
        Some(VisualStyle::ImageLeft) => format!("![bg left:40%]({url})"),
        Some(VisualStyle::FullBleed) => format!("![bg cover brightness:0.7]({url})"),
        _ => format!("![bg right:40%]({url})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide(title: &str, content: &str, style: Option<VisualStyle>, url: Option<&str>) -> SlideDraft {
        SlideDraft {
            id: title.to_lowercase(),
            title: title.to_string(),
            content: content.to_string(),
            highlight: None,
            visual_style: style,
            image_prompt: format!("{title} prompt"),
            image_url: url.map(str::to_string),
        }
    }

    fn assembler() -> MarkdownAssembler {
        MarkdownAssembler::new(Arc::new(InMemoryChartRegistry::new(vec![ChartRef {
            handle: "@chart1".to_string(),
            title: "Revenue".to_string(),
            description: String::new(),
            chart_type: "bar".to_string(),
            rendered_url: Some("charts/revenue.png".to_string()),
        }])))
    }

    #[test]
    fn test_full_document_layout() {
        let mut first = slide("A", "- x\n- y", Some(VisualStyle::ImageLeft), Some("https://img/a.png"));
        first.highlight = Some("Key point".to_string());
        let md = assembler().assemble(&[first, slide("B", "- z", None, None)]);

        let expected = "---\nmarp: true\ntheme: default\npaginate: true\n---\n\n\
# A\n\n![bg left:40%](https://img/a.png)\n\n> Key point\n\n- x\n- y\n\n---\n\n\
# B\n\n- z\n\n---\n\n";
        assert_eq!(md, expected);
    }

    #[test]
    fn test_headings_in_order_each_with_background() {
        let slides = vec![
            slide("A", "- x", Some(VisualStyle::ImageRight), Some("u1")),
            slide("B", "- y", Some(VisualStyle::FullBleed), Some("u2")),
            slide("C", "- z", Some(VisualStyle::ChartFocus), Some("u3")),
        ];
        let md = assembler().assemble(&slides);

        let headings: Vec<_> = md.lines().filter(|l| l.starts_with("# ")).collect();
        assert_eq!(headings, vec!["# A", "# B", "# C"]);
        assert!(md.contains("# A\n\n![bg right:40%](u1)"));
        assert!(md.contains("# B\n\n![bg cover brightness:0.7](u2)"));
        assert!(md.contains("# C\n\n![bg right:40%](u3)"));
    }

    #[test]
    fn test_chart_slide_gets_marker_and_rendered_chart() {
        let md = assembler().assemble(&[slide(
            "Growth",
            "- Revenue doubled, see @chart1",
            Some(VisualStyle::ChartLarge),
            Some("https://img/ignored.png"),
        )]);
        assert!(md.contains("<!-- _class: chart-large -->"));
        assert!(!md.contains("ignored.png"));
        assert!(md.contains("![Revenue](charts/revenue.png)"));
    }

    #[test]
    fn test_chart_mention_without_chart_layout_gets_faded_background() {
        let md = assembler().assemble(&[slide(
            "Growth @chart1",
            "- numbers",
            Some(VisualStyle::ImageRight),
            Some("https://img/g.png"),
        )]);
        assert!(md.contains("![bg opacity:.15](https://img/g.png)"));
        assert!(!md.contains("_class"));
        assert!(!md.contains("charts/revenue.png"));
    }

    #[test]
    fn test_unknown_mention_is_plain_text() {
        let md = assembler().assemble(&[slide("T", "- ping @someone", Some(VisualStyle::ChartFocus), Some("u"))]);
        assert!(md.contains("![bg right:40%](u)"));
    }

    #[test]
    fn test_assemble_is_idempotent() {
        let assembler = assembler();
        let slides = vec![
            slide("A", "- x", None, Some("u1")),
            slide("B", "- @chart1", Some(VisualStyle::ChartSplit), None),
        ];
        assert_eq!(assembler.assemble(&slides), assembler.assemble(&slides));
    }

    #[test]
    fn test_layout_picker_seeded_and_non_chart() {
        let mut a = vec![slide("A", "", None, None), slide("B", "", None, None), slide("C", "", Some(VisualStyle::ChartFocus), None)];
        let mut b = a.clone();
        LayoutPicker::new(Some(7)).fill_missing(&mut a);
        LayoutPicker::new(Some(7)).fill_missing(&mut b);

        assert_eq!(a, b);
        assert!(a[..2].iter().all(|s| s.visual_style.is_some_and(|v| !v.is_chart_family())));
        assert_eq!(a[2].visual_style, Some(VisualStyle::ChartFocus));
    }
}
