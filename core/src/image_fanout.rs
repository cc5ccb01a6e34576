//! Concurrent per-slide image generation.
//!
//! One task per slide, no concurrency cap. Workers only send `(index, result)`
//! over a channel; the coordinator loop is the single owner of the completion
//! counter, the first critical error and the slide list.

use std::sync::Arc;

use slide_common::{CollaboratorError, SlideDraft};
use slide_protocol::Event;
use tokio::sync::mpsc;

use crate::client::ImageGenerator;
use crate::error::GenerationError;
use crate::session::ProgressReporter;

pub const IMAGE_PHASE_START: f32 = 0.3;
pub const IMAGE_PHASE_SPAN: f32 = 0.6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideImageFailure {
    pub index: usize,
    pub error: CollaboratorError,
}

#[derive(Debug, Clone)]
pub struct FanOutReport {
    pub slides: Vec<SlideDraft>,
    pub failures: Vec<SlideImageFailure>,
}

/// Aggregation state, owned by exactly one task.
struct Aggregator {
    total: usize,
    completed: usize,
    first_critical: Option<CollaboratorError>,
    failures: Vec<SlideImageFailure>,
}

impl Aggregator {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            first_critical: None,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, slides: &mut [SlideDraft], index: usize, result: Result<String, CollaboratorError>) {
        self.completed += 1;
        match result {
            Ok(url) => {
                if let Some(slide) = slides.get_mut(index) {
                    slide.image_url = Some(url);
                }
            }
            Err(error) if error.is_quota_exhaustion() => {
                if self.first_critical.is_none() {
                    tracing::error!("Critical image failure on slide {}: {}", index + 1, error);
                    self.first_critical = Some(error);
                } else {
                    tracing::debug!("Discarding further critical error on slide {}: {}", index + 1, error);
                }
            }
            Err(error) => {
                tracing::warn!("Slide {} keeps no image: {}", index + 1, error);
                self.failures.push(SlideImageFailure { index, error });
            }
        }
    }

    fn progress(&self) -> f32 {
        IMAGE_PHASE_START + IMAGE_PHASE_SPAN * (self.completed as f32 / self.total as f32)
    }
}

pub struct ImageFanOut {
    images: Arc<dyn ImageGenerator>,
}

impl ImageFanOut {
    pub fn new(images: Arc<dyn ImageGenerator>) -> Self {
        Self { images }
    }

    /// Request one image per slide and wait for every request to finish.
    ///
    /// Successful URLs are written back by index. Non-critical failures leave the
    /// slide without an image. A quota/rate error fails the whole run, but only
    /// after all workers have reported.
    pub async fn run(
        &self,
        mut slides: Vec<SlideDraft>,
        reporter: &ProgressReporter,
    ) -> Result<FanOutReport, GenerationError> {
        let total = slides.len();
        if total == 0 {
            return Ok(FanOutReport {
                slides,
                failures: Vec::new(),
            });
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<String, CollaboratorError>)>();
        for (index, slide) in slides.iter().enumerate() {
            let tx = tx.clone();
            let images = Arc::clone(&self.images);
            let prompt = slide.image_prompt.clone();
            tokio::spawn(async move {
                let result = images.generate(&prompt).await;
                let _ = tx.send((index, result));
            });
        }
        drop(tx);

        let mut aggregator = Aggregator::new(total);
        // Closes once every worker has sent or died: this is the join barrier.
        while let Some((index, result)) = rx.recv().await {
            if !reporter.is_current() {
                tracing::debug!("Ignoring image for slide {} of superseded session", index + 1);
                continue;
            }
            if let Err(error) = &result {
                if !error.is_quota_exhaustion() {
                    reporter.emit(Event::SlideImageFailed {
                        session: reporter.session(),
                        index,
                        message: error.to_string(),
                    });
                }
            }
            aggregator.record(&mut slides, index, result);
            reporter.progress(
                aggregator.progress(),
                format!("Rendering slide {}/{}…", aggregator.completed, total),
            );
        }

        if !reporter.is_current() {
            return Err(GenerationError::Superseded);
        }
        if aggregator.completed < total {
            tracing::warn!(
                "{} image workers ended without a result",
                total - aggregator.completed
            );
        }
        if let Some(error) = aggregator.first_critical {
            return Err(GenerationError::ImageCritical(error));
        }

        let illustrated = slides.iter().filter(|s| s.image_url.is_some()).count();
        tracing::info!("Images ready: {}/{} slides illustrated", illustrated, total);
        Ok(FanOutReport {
            slides,
            failures: aggregator.failures,
        })
    }
}
