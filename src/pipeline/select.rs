//! Per-page strategy selection.
//!
//! Runs every catalog strategy concurrently for one page, scores each
//! candidate, and picks the winner. All strategies always complete: a fast
//! bad result must not pre-empt a slower better one. Engine failures are
//! recorded as zero-score candidates rather than raised, so a page only
//! counts as engine-dead when every strategy failed.

use std::time::Instant;

use tracing::debug;

use super::types::{CandidateOutcome, PageResult, StrategyCandidate};
use crate::ocr::OcrEngine;
use crate::preprocess::Strategy;
use crate::raster::PageImage;
use crate::score::{score_text, SCORE_EPSILON};

/// Outcome of processing one page, before the correction pass.
pub(crate) struct PageOutcome {
    pub result: PageResult,
    /// True when at least one strategy's recognition call succeeded.
    pub engine_responded: bool,
    /// One candidate per catalog strategy, in catalog order.
    pub candidates: Vec<StrategyCandidate>,
}

/// Evaluate every catalog strategy for this page and choose the best.
pub(crate) async fn select_page(
    engine: &dyn OcrEngine,
    page: &PageImage,
    catalog: &'static [Strategy],
    min_usable_score: f64,
) -> PageOutcome {
    let candidates = futures::future::join_all(
        catalog
            .iter()
            .map(|&strategy| evaluate_strategy(engine, page, strategy)),
    )
    .await;

    for candidate in &candidates {
        debug!(
            page = page.page_index(),
            strategy = candidate.strategy,
            score = candidate.quality_score,
            chars = candidate.character_count,
            elapsed_ms = candidate.elapsed.as_millis() as u64,
            failed = candidate.engine_failed(),
            "strategy candidate"
        );
    }

    // Earlier catalog entries win ties: a later candidate must beat the
    // incumbent by more than epsilon to take over.
    let mut best = 0usize;
    for (i, candidate) in candidates.iter().enumerate().skip(1) {
        if candidate.quality_score > candidates[best].quality_score + SCORE_EPSILON {
            best = i;
        }
    }

    let winner = &candidates[best];
    let final_text = winner.text.trim().to_string();
    let result = PageResult {
        page_index: page.page_index(),
        character_count: final_text.chars().count(),
        final_text,
        winning_strategy: winner.strategy.to_string(),
        quality_score: winner.quality_score,
        success: winner.quality_score >= min_usable_score && !winner.engine_failed(),
        was_corrected: false,
    };

    PageOutcome {
        result,
        engine_responded: candidates.iter().any(|c| !c.engine_failed()),
        candidates,
    }
}

/// Preprocess, recognize, and score one strategy. Never fails: engine
/// errors become a zero-score candidate.
async fn evaluate_strategy(
    engine: &dyn OcrEngine,
    page: &PageImage,
    strategy: Strategy,
) -> StrategyCandidate {
    let start = Instant::now();

    let processed = match strategy {
        Strategy::Raw => page.clone(),
        _ => {
            let source = page.image().clone();
            match tokio::task::spawn_blocking(move || strategy.apply(&source)).await {
                Ok(transformed) => page.with_image(transformed),
                Err(e) => {
                    return StrategyCandidate {
                        strategy: strategy.name(),
                        text: String::new(),
                        raw_confidence: None,
                        quality_score: 0.0,
                        character_count: 0,
                        elapsed: start.elapsed(),
                        outcome: CandidateOutcome::EngineFailed(format!(
                            "preprocessing task failed: {e}"
                        )),
                    }
                }
            }
        }
    };

    match engine.recognize(&processed).await {
        Ok(recognition) => {
            let quality_score = score_text(&recognition.text);
            StrategyCandidate {
                strategy: strategy.name(),
                character_count: recognition.text.chars().count(),
                text: recognition.text,
                raw_confidence: recognition.confidence,
                quality_score,
                elapsed: start.elapsed(),
                outcome: CandidateOutcome::Recognized,
            }
        }
        Err(e) => {
            debug!(
                page = page.page_index(),
                strategy = strategy.name(),
                error = %e,
                "recognition failed for strategy"
            );
            StrategyCandidate {
                strategy: strategy.name(),
                text: String::new(),
                raw_confidence: None,
                quality_score: 0.0,
                character_count: 0,
                elapsed: start.elapsed(),
                outcome: CandidateOutcome::EngineFailed(e.to_string()),
            }
        }
    }
}
