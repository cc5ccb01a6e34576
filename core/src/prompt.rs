//! Instruction text for the outline request.

use std::fmt::Write;

use slide_common::{ChartRef, GenerationRequest, VisualStyle};

use crate::charts::{merge_charts, ChartRegistry};

const OUTLINE_BASE_COST: u32 = 1_200;
const OUTLINE_COST_PER_SLIDE: u32 = 300;
const IMAGE_COST_PER_SLIDE: u32 = 1_000;

/// How much visual treatment the model should aim for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StylizationBand {
    Literal,
    Subtle,
    Balanced,
    Expressive,
}

impl StylizationBand {
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => StylizationBand::Literal,
            1..=29 => StylizationBand::Subtle,
            30..=70 => StylizationBand::Balanced,
            _ => StylizationBand::Expressive,
        }
    }

    fn instruction(self) -> &'static str {
        match self {
            StylizationBand::Literal => {
                "Keep slides text-first. Image prompts must describe plain, literal, \
                 photographic scenes with no artistic interpretation."
            }
            StylizationBand::Subtle => {
                "Keep slides mostly textual with restrained visuals. Image prompts should \
                 be realistic with light stylistic touches."
            }
            StylizationBand::Balanced => {
                "Balance text and visuals. Image prompts may use a consistent illustrative \
                 style and mix image-right, image-left and full-bleed layouts."
            }
            StylizationBand::Expressive => {
                "Make the deck visually bold. Keep bullets short, prefer full-bleed layouts \
                 for key moments and write vivid, highly stylized image prompts."
            }
        }
    }
}

/// Estimated token cost of a whole generation, outline plus one image per slide.
pub fn estimate_cost(request: &GenerationRequest) -> u32 {
    let slides = u32::try_from(request.slide_count).unwrap_or(u32::MAX);
    OUTLINE_BASE_COST
        .saturating_add(OUTLINE_COST_PER_SLIDE.saturating_mul(slides))
        .saturating_add(IMAGE_COST_PER_SLIDE.saturating_mul(slides))
}

pub struct PromptCompiler;

impl PromptCompiler {
    /// Compile the instruction using only the charts carried by the request.
    pub fn compile(request: &GenerationRequest) -> String {
        Self::render(request, &request.charts)
    }

    /// Compile the instruction advertising the request's charts plus every chart the
    /// registry knows about. Handles already on the request take precedence.
    pub fn compile_with_registry(request: &GenerationRequest, registry: &dyn ChartRegistry) -> String {
        Self::compile_with_charts(request, &merge_charts(&request.charts, registry))
    }

    /// Compile the instruction advertising exactly `charts`.
    pub fn compile_with_charts(request: &GenerationRequest, charts: &[ChartRef]) -> String {
        Self::render(request, charts)
    }

    fn render(request: &GenerationRequest, charts: &[ChartRef]) -> String {
        let mut buf = String::new();
        let _ = writeln!(
            buf,
            "You are an expert presentation designer. Create the outline of a presentation about: {}",
            request.topic.trim()
        );
        buf.push('\n');
        buf.push_str("Requirements:\n");
        let _ = writeln!(buf, "- Produce exactly {} slides.", request.slide_count);
        let _ = writeln!(
            buf,
            "- Write every title, bullet and highlight in {} (language code: {}).",
            request.language.display_name, request.language.code
        );
        buf.push_str("- Each slide has a short title and 3-5 markdown bullets, one per line, each starting with \"- \".\n");
        buf.push_str("- Optionally add a one-sentence \"highlight\" with the key takeaway.\n");
        let styles: Vec<&str> = VisualStyle::ALL.iter().map(|s| s.as_str()).collect();
        let _ = writeln!(
            buf,
            "- Pick a \"visual_style\" for each slide from: {}.",
            styles.join(", ")
        );
        let _ = writeln!(
            buf,
            "- Write an \"image_prompt\" in English describing one illustration for the slide, in this style: {}.",
            request.image_style.trim()
        );
        buf.push('\n');
        let _ = writeln!(
            buf,
            "Visual density: {}",
            StylizationBand::from_level(request.stylization_level).instruction()
        );
        buf.push('\n');

        if charts.is_empty() {
            buf.push_str("No charts are available. Do not use chart-focus, chart-large or chart-split.\n");
        } else {
            buf.push_str("Available charts (reference a chart by writing its handle in the slide text):\n");
            for chart in charts {
                let _ = write!(buf, "- {}: {}", chart.handle, chart.title);
                if !chart.chart_type.is_empty() {
                    let _ = write!(buf, " ({})", chart.chart_type);
                }
                if !chart.description.is_empty() {
                    let _ = write!(buf, " - {}", chart.description);
                }
                buf.push('\n');
            }
            buf.push_str("Chart rules:\n");
            buf.push_str("- A slide whose title or content mentions a chart handle MUST use chart-focus, chart-large or chart-split.\n");
            buf.push_str("- A slide that mentions no chart must not use a chart layout.\n");
            buf.push_str("- Mention each chart at most once and keep its handle exactly as written.\n");
        }
        buf.push('\n');

        buf.push_str("Respond with ONLY a JSON array and no other text, shaped like:\n");
        buf.push_str(
            r#"[{"title": "...", "content": "- ...\n- ...", "highlight": "...", "visual_style": "image-right", "image_prompt": "..."}]"#,
        );
        buf.push('\n');
        buf
    }
}
