//! Extraction pipeline types and events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Marker inserted between pages in the combined document text.
pub const PAGE_BREAK_PREFIX: &str = "--- Page ";

/// How one (page, strategy) evaluation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// The engine returned text (possibly empty or noisy).
    Recognized,
    /// The engine call failed; the candidate scores zero.
    EngineFailed(String),
}

/// Result of applying one preprocessing strategy plus recognition to one
/// page. Ephemeral: consumed by strategy selection, retained only as
/// aggregate diagnostics.
#[derive(Debug, Clone)]
pub struct StrategyCandidate {
    pub strategy: &'static str,
    pub text: String,
    /// Engine-reported confidence, advisory only.
    pub raw_confidence: Option<f32>,
    pub quality_score: f64,
    pub character_count: usize,
    pub elapsed: Duration,
    pub outcome: CandidateOutcome,
}

impl StrategyCandidate {
    pub fn engine_failed(&self) -> bool {
        matches!(self.outcome, CandidateOutcome::EngineFailed(_))
    }
}

/// The chosen outcome for one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub page_index: u32,
    #[serde(rename = "text")]
    pub final_text: String,
    pub winning_strategy: String,
    pub quality_score: f64,
    pub character_count: usize,
    /// False when even the best strategy scored below the usability
    /// threshold. The text is still returned.
    pub success: bool,
    pub was_corrected: bool,
}

/// The artifact returned to the caller: every page in source order plus
/// document-level aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    pub job_id: String,
    /// SHA-256 of the source bytes, when the page source knows it.
    pub source_digest: Option<String>,
    pub dpi: u32,
    pub page_count: usize,
    pub pages: Vec<PageResult>,
    pub average_quality_score: f64,
    /// Successful pages over total pages.
    pub success_rate: f64,
    pub total_characters: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DocumentResult {
    /// Assemble the document artifact from per-page results. Never fails;
    /// an all-failed document yields success_rate 0 and whatever text was
    /// recovered.
    pub fn from_pages(
        source_digest: Option<String>,
        dpi: u32,
        pages: Vec<PageResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let page_count = pages.len();
        let successful = pages.iter().filter(|p| p.success).count();
        let total_characters = pages.iter().map(|p| p.character_count).sum();
        let average_quality_score = if page_count == 0 {
            0.0
        } else {
            pages.iter().map(|p| p.quality_score).sum::<f64>() / page_count as f64
        };
        let success_rate = if page_count == 0 {
            0.0
        } else {
            successful as f64 / page_count as f64
        };

        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            source_digest,
            dpi,
            page_count,
            pages,
            average_quality_score,
            success_rate,
            total_characters,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Concatenated page text with explicit page-boundary markers, in
    /// source page order. This is what downstream text analysis consumes.
    pub fn combined_text(&self) -> String {
        let mut out = String::with_capacity(self.total_characters + self.pages.len() * 16);
        for page in &self.pages {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(PAGE_BREAK_PREFIX);
            out.push_str(&(page.page_index + 1).to_string());
            out.push_str(" ---\n\n");
            out.push_str(&page.final_text);
        }
        out
    }
}

/// Events emitted during extraction, for progress display.
#[derive(Debug, Clone)]
pub enum ExtractEvent {
    /// Extraction started.
    Started { total_pages: usize },
    /// A page's strategies were dispatched.
    PageStarted { page_index: u32 },
    /// A page finished, correction pass included.
    PageCompleted {
        page_index: u32,
        strategy: String,
        quality_score: f64,
        success: bool,
        was_corrected: bool,
    },
    /// All pages finished.
    Completed { succeeded: usize, failed: usize },
}

/// Cancellation handle for a document-level job. Checked between pages:
/// in-flight pages always complete before the job observes cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: u32, text: &str, score: f64, success: bool) -> PageResult {
        PageResult {
            page_index: index,
            final_text: text.to_string(),
            winning_strategy: "raw".to_string(),
            quality_score: score,
            character_count: text.chars().count(),
            success,
            was_corrected: false,
        }
    }

    #[test]
    fn aggregates_computed() {
        let result = DocumentResult::from_pages(
            None,
            300,
            vec![page(0, "alpha", 0.8, true), page(1, "", 0.0, false)],
            Utc::now(),
        );
        assert_eq!(result.page_count, 2);
        assert_eq!(result.success_rate, 0.5);
        assert!((result.average_quality_score - 0.4).abs() < 1e-9);
        assert_eq!(result.total_characters, 5);
    }

    #[test]
    fn empty_document_aggregates_are_zero() {
        let result = DocumentResult::from_pages(None, 300, vec![], Utc::now());
        assert_eq!(result.success_rate, 0.0);
        assert_eq!(result.average_quality_score, 0.0);
        assert_eq!(result.total_characters, 0);
    }

    #[test]
    fn combined_text_marks_page_boundaries() {
        let result = DocumentResult::from_pages(
            None,
            300,
            vec![page(0, "first", 0.9, true), page(1, "second", 0.9, true)],
            Utc::now(),
        );
        let text = result.combined_text();
        assert!(text.contains("--- Page 1 ---"));
        assert!(text.contains("--- Page 2 ---"));
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }

    #[test]
    fn failed_pages_still_contribute_text() {
        let result = DocumentResult::from_pages(
            None,
            300,
            vec![page(0, "noisy but present", 0.1, false)],
            Utc::now(),
        );
        assert!(result.combined_text().contains("noisy but present"));
    }

    #[test]
    fn cancel_handle_round_trip() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn page_result_serializes_with_interface_field_names() {
        let json = serde_json::to_value(page(3, "body", 0.7, true)).unwrap();
        assert_eq!(json["page_index"], 3);
        assert_eq!(json["text"], "body");
        assert_eq!(json["success"], true);
        assert_eq!(json["was_corrected"], false);
    }
}
