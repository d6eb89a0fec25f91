//! Document extraction pipeline.
//!
//! Orchestrates rasterization, per-page strategy selection, the optional
//! correction pass, and aggregation into a [`DocumentResult`]. Pages are
//! processed by a bounded worker pool; within a page all strategies run
//! concurrently and all complete. Emits [`ExtractEvent`]s for progress
//! tracking; no UI concerns live here.

mod select;
mod types;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::llm::{CorrectionService, OllamaCorrector};
use crate::ocr::{OcrEngine, RecognitionEngineError, TesseractEngine};
use crate::preprocess;
use crate::raster::{PageSource, PdfRasterizer, RasterizationError};
use crate::score::score_text;

use select::{select_page, PageOutcome};

pub use types::{
    CancelHandle, CandidateOutcome, DocumentResult, ExtractEvent, PageResult, StrategyCandidate,
    PAGE_BREAK_PREFIX,
};

/// Errors that abort a whole extraction job.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Rasterization(#[from] RasterizationError),

    #[error(transparent)]
    Engine(#[from] RecognitionEngineError),

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Page worker failed: {0}")]
    Worker(String),
}

/// The multi-strategy OCR extraction pipeline.
pub struct ExtractionPipeline {
    config: ExtractionConfig,
    engine: Arc<dyn OcrEngine>,
    corrector: Option<Arc<dyn CorrectionService>>,
}

impl ExtractionPipeline {
    /// Build the production pipeline: Tesseract recognition plus, when
    /// enabled, the Ollama correction service.
    pub fn new(config: ExtractionConfig) -> Self {
        let engine: Arc<dyn OcrEngine> = Arc::new(TesseractEngine::from_config(&config));
        let corrector: Option<Arc<dyn CorrectionService>> = config
            .enable_correction
            .then(|| {
                Arc::new(OllamaCorrector::new(config.correction.clone()))
                    as Arc<dyn CorrectionService>
            });
        Self::with_parts(config, engine, corrector)
    }

    /// Build a pipeline around explicit engine and corrector instances.
    pub fn with_parts(
        config: ExtractionConfig,
        engine: Arc<dyn OcrEngine>,
        corrector: Option<Arc<dyn CorrectionService>>,
    ) -> Self {
        Self {
            config,
            engine,
            corrector,
        }
    }

    /// Extract a scanned PDF from raw bytes.
    pub async fn extract(
        &self,
        bytes: &[u8],
        events: mpsc::Sender<ExtractEvent>,
        cancel: CancelHandle,
    ) -> Result<DocumentResult, ExtractError> {
        if !self.engine.is_available() {
            return Err(
                RecognitionEngineError::EngineNotAvailable(self.engine.availability_hint()).into(),
            );
        }

        let source = PdfRasterizer::open(bytes, self.config.dpi).await?;
        self.extract_from_source(Arc::new(source), events, cancel)
            .await
    }

    /// Extract from an already-opened page source. The page order of the
    /// result always matches the source order, regardless of completion
    /// timing across workers.
    pub async fn extract_from_source(
        &self,
        source: Arc<dyn PageSource>,
        events: mpsc::Sender<ExtractEvent>,
        cancel: CancelHandle,
    ) -> Result<DocumentResult, ExtractError> {
        let started_at = Utc::now();
        let total = source.page_count();
        let workers = self.config.parallel_workers;
        let catalog = preprocess::catalog(self.config.enable_preprocessing);

        info!(
            pages = total,
            workers,
            strategies = catalog.len(),
            correction = self.corrector.is_some(),
            "starting extraction"
        );

        let _ = events
            .send(ExtractEvent::Started {
                total_pages: total as usize,
            })
            .await;

        let completed = Arc::new(AtomicUsize::new(0));
        let mut handles: Vec<JoinHandle<Result<PageOutcome, ExtractError>>> =
            Vec::with_capacity(workers);
        let mut outcomes: Vec<PageOutcome> = Vec::with_capacity(total as usize);
        let mut cancelled = false;

        for index in 0..total {
            // Coarse-grained cancellation: pages already dispatched finish
            // their in-flight strategies below.
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let engine = Arc::clone(&self.engine);
            let corrector = self.corrector.clone();
            let source = Arc::clone(&source);
            let events = events.clone();
            let completed = Arc::clone(&completed);
            let min_usable_score = self.config.min_usable_score;

            handles.push(tokio::spawn(async move {
                let page = source.render_page(index).await?;
                let _ = events
                    .send(ExtractEvent::PageStarted { page_index: index })
                    .await;

                let mut outcome =
                    select_page(engine.as_ref(), &page, catalog, min_usable_score).await;
                // The raster is no longer needed once candidates are scored.
                drop(page);

                if let Some(corrector) = corrector.as_deref() {
                    apply_correction(&mut outcome.result, corrector).await;
                }

                completed.fetch_add(1, Ordering::Relaxed);
                let _ = events
                    .send(ExtractEvent::PageCompleted {
                        page_index: index,
                        strategy: outcome.result.winning_strategy.clone(),
                        quality_score: outcome.result.quality_score,
                        success: outcome.result.success,
                        was_corrected: outcome.result.was_corrected,
                    })
                    .await;

                Ok(outcome)
            }));

            if handles.len() >= workers {
                drain_handles(&mut handles, &mut outcomes).await?;
            }
        }

        drain_handles(&mut handles, &mut outcomes).await?;

        if cancelled {
            info!(
                completed = completed.load(Ordering::Relaxed),
                total, "extraction cancelled"
            );
            return Err(ExtractError::Cancelled);
        }

        // Engine unavailability is only fatal when it hit every strategy on
        // every page; anything less degrades individual pages instead.
        if total > 0 && !outcomes.iter().any(|o| o.engine_responded) {
            return Err(RecognitionEngineError::EngineNotAvailable(
                "recognition failed for every strategy on every page".to_string(),
            )
            .into());
        }

        let pages: Vec<PageResult> = outcomes.into_iter().map(|o| o.result).collect();
        let succeeded = pages.iter().filter(|p| p.success).count();
        let failed = pages.len() - succeeded;

        let result =
            DocumentResult::from_pages(source.fingerprint(), self.config.dpi, pages, started_at);

        info!(
            pages = result.page_count,
            succeeded,
            failed,
            avg_score = result.average_quality_score,
            "extraction finished"
        );
        let _ = events
            .send(ExtractEvent::Completed { succeeded, failed })
            .await;

        Ok(result)
    }
}

/// Await dispatched page workers in dispatch order, preserving source page
/// order in the collected outcomes.
async fn drain_handles(
    handles: &mut Vec<JoinHandle<Result<PageOutcome, ExtractError>>>,
    outcomes: &mut Vec<PageOutcome>,
) -> Result<(), ExtractError> {
    for handle in handles.drain(..) {
        let outcome = handle
            .await
            .map_err(|e| ExtractError::Worker(e.to_string()))??;
        outcomes.push(outcome);
    }
    Ok(())
}

/// Run the correction pass on a finished page. The correction is kept only
/// when it strictly improves the quality score; service failures skip the
/// pass entirely.
async fn apply_correction(result: &mut PageResult, corrector: &dyn CorrectionService) {
    if result.final_text.trim().is_empty() {
        return;
    }

    match corrector.correct(&result.final_text).await {
        Ok(corrected) => {
            let corrected_score = score_text(&corrected);
            if corrected_score > result.quality_score {
                debug!(
                    page = result.page_index,
                    before = result.quality_score,
                    after = corrected_score,
                    "correction accepted"
                );
                result.character_count = corrected.chars().count();
                result.final_text = corrected;
                result.quality_score = corrected_score;
                result.was_corrected = true;
            } else {
                info!(
                    page = result.page_index,
                    before = result.quality_score,
                    after = corrected_score,
                    "correction did not improve quality, keeping original"
                );
            }
        }
        Err(e) => {
            warn!(page = result.page_index, error = %e, "correction service unavailable, skipping pass");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::llm::CorrectionServiceError;

    struct StaticCorrector {
        reply: Result<&'static str, ()>,
    }

    #[async_trait]
    impl CorrectionService for StaticCorrector {
        async fn correct(&self, _text: &str) -> Result<String, CorrectionServiceError> {
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(()) => Err(CorrectionServiceError::Connection("refused".to_string())),
            }
        }

        async fn is_available(&self) -> bool {
            self.reply.is_ok()
        }
    }

    fn garbled_page() -> PageResult {
        let text = "Th3 c@che c0ntr0ller wr1tes d1rty l1nes b@ck t0 m@in mem0ry \
                    bef0re ev1ct10n xq zz";
        PageResult {
            page_index: 0,
            character_count: text.chars().count(),
            final_text: text.to_string(),
            winning_strategy: "raw".to_string(),
            quality_score: score_text(text),
            success: true,
            was_corrected: false,
        }
    }

    #[tokio::test]
    async fn improving_correction_is_accepted() {
        let corrector = StaticCorrector {
            reply: Ok("The cache controller writes dirty lines back to main memory \
                       before eviction. Larger caches reduce miss rates but increase \
                       access latency for every reference in the hierarchy."),
        };
        let mut page = garbled_page();
        let before = page.quality_score;

        apply_correction(&mut page, &corrector).await;

        assert!(page.was_corrected);
        assert!(page.quality_score > before);
        assert!(page.final_text.starts_with("The cache controller"));
    }

    #[tokio::test]
    async fn degrading_correction_is_reverted() {
        let corrector = StaticCorrector {
            reply: Ok("zz qq xx"),
        };
        let mut page = garbled_page();
        let before = page.clone();

        apply_correction(&mut page, &corrector).await;

        assert!(!page.was_corrected);
        assert_eq!(page.final_text, before.final_text);
        assert_eq!(page.quality_score, before.quality_score);
    }

    #[tokio::test]
    async fn service_failure_skips_pass() {
        let corrector = StaticCorrector { reply: Err(()) };
        let mut page = garbled_page();
        let before = page.clone();

        apply_correction(&mut page, &corrector).await;

        assert!(!page.was_corrected);
        assert_eq!(page.final_text, before.final_text);
    }

    #[tokio::test]
    async fn empty_page_never_sent_for_correction() {
        // A corrector that would "improve" empty text must never be asked.
        let corrector = StaticCorrector {
            reply: Ok("fabricated content that was never on the page"),
        };
        let mut page = PageResult {
            page_index: 2,
            final_text: String::new(),
            winning_strategy: "raw".to_string(),
            quality_score: 0.0,
            character_count: 0,
            success: false,
            was_corrected: false,
        };

        apply_correction(&mut page, &corrector).await;

        assert!(!page.was_corrected);
        assert_eq!(page.final_text, "");
    }
}
