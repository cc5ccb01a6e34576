use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use slide_chatgpt::OpenAiModelClient;
use slide_common::{GenerationRequest, SlideConfig, SlideDraft};
use slide_protocol::Event;

use crate::archive::{ArchiveSink, JsonDeckStore};
use crate::budget::{FixedBudget, TokenBudgetGuard, UnlimitedBudget};
use crate::charts::{merge_charts, ChartRegistry};
use crate::client::{ImageGenerator, OpenAiAdapter, OutlineClient, StubClient, TextGenerator};
use crate::error::GenerationError;
use crate::image_fanout::{ImageFanOut, IMAGE_PHASE_START};
use crate::markdown::{LayoutPicker, MarkdownAssembler};
use crate::outline_parser::parse_outline;
use crate::prompt::PromptCompiler;
use crate::session::ProgressReporter;

/// Every external service the generation core talks to, passed in explicitly.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub images: Arc<dyn ImageGenerator>,
    pub budget: Arc<dyn TokenBudgetGuard>,
    pub archive: Arc<dyn ArchiveSink>,
    pub charts: Arc<dyn ChartRegistry>,
}

impl Collaborators {
    /// OpenAI-backed collaborators configured from `config`.
    pub fn openai(config: &SlideConfig, charts: Arc<dyn ChartRegistry>) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("OPENAI_API_KEY is not set (use --offline to run without it)"))?;
        let mut client = OpenAiModelClient::new(api_key).with_api_base(config.api_base.clone());
        if let Some(secs) = config.request_timeout_secs {
            client = client.with_timeout(Duration::from_secs(secs))?;
        }
        let adapter = Arc::new(
            OpenAiAdapter::new(client)
                .with_temperature(config.temperature)
                .with_image_model(config.image_model.clone(), config.image_size.clone()),
        );
        Ok(Self {
            text: adapter.clone(),
            images: adapter,
            budget: budget_from_config(config),
            archive: Arc::new(JsonDeckStore::new(config.archive_path())),
            charts,
        })
    }

    /// Canned collaborators for running without network access.
    pub fn offline(config: &SlideConfig, request: &GenerationRequest, charts: Arc<dyn ChartRegistry>) -> Self {
        let stub = Arc::new(StubClient::for_request(request));
        Self {
            text: stub.clone(),
            images: stub,
            budget: budget_from_config(config),
            archive: Arc::new(JsonDeckStore::new(config.archive_path())),
            charts,
        }
    }
}

fn budget_from_config(config: &SlideConfig) -> Arc<dyn TokenBudgetGuard> {
    match config.token_budget {
        Some(limit) => Arc::new(FixedBudget { limit }),
        None => Arc::new(UnlimitedBudget),
    }
}

/// Runs the stages of one generation: prompt, outline, parse, images, markdown.
pub struct GenerationPipeline {
    outline: OutlineClient,
    fanout: ImageFanOut,
    charts: Arc<dyn ChartRegistry>,
    layout_seed: Option<u64>,
}

impl GenerationPipeline {
    pub fn new(collaborators: &Collaborators, text_model: impl Into<String>, layout_seed: Option<u64>) -> Self {
        Self {
            outline: OutlineClient::new(Arc::clone(&collaborators.text), text_model),
            fanout: ImageFanOut::new(Arc::clone(&collaborators.images)),
            charts: Arc::clone(&collaborators.charts),
            layout_seed,
        }
    }

    /// Assembler for one run. It knows the request's charts plus the
    /// registry's, the same list the prompt advertises.
    pub fn assembler_for(&self, request: &GenerationRequest) -> MarkdownAssembler {
        MarkdownAssembler::from_charts(merge_charts(&request.charts, self.charts.as_ref()))
    }

    pub async fn run(
        &self,
        request: &GenerationRequest,
        reporter: &ProgressReporter,
    ) -> Result<(Vec<SlideDraft>, String), GenerationError> {
        reporter.progress(0.1, "Drafting outline…");
        let assembler = self.assembler_for(request);
        let instruction = PromptCompiler::compile_with_charts(request, &assembler.charts());
        let raw = self
            .outline
            .fetch(instruction)
            .await
            .map_err(GenerationError::Outline)?;
        if !reporter.is_current() {
            return Err(GenerationError::Superseded);
        }

        let slides = parse_outline(&raw)?;
        if slides.len() != request.slide_count {
            tracing::warn!(
                "Asked for {} slides, model returned {}",
                request.slide_count,
                slides.len()
            );
        }
        tracing::info!("Outline ready with {} slides", slides.len());
        reporter.emit(Event::OutlineReady {
            session: reporter.session(),
            slides: slides.clone(),
        });
        reporter.progress(IMAGE_PHASE_START, format!("Outline ready: {} slides", slides.len()));

        let report = self.fanout.run(slides, reporter).await?;
        let mut slides = report.slides;

        reporter.progress(0.95, "Assembling deck…");
        LayoutPicker::new(self.layout_seed).fill_missing(&mut slides);
        let markdown = assembler.assemble(&slides);
        reporter.progress(1.0, "Done");
        Ok((slides, markdown))
    }
}
