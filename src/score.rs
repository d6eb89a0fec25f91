//! Quality scoring for recovered page text.
//!
//! Estimates how usable a piece of recognized text is without ever looking
//! at the source image. The score is a weighted combination of four signals:
//! printable-character density, academic-structure markers, word
//! plausibility, and length adequacy. Scores are in [0, 1]; empty text
//! scores 0.

use std::sync::LazyLock;

use regex::Regex;

/// Weight of the printable-character density signal.
const WEIGHT_DENSITY: f64 = 0.35;
/// Weight of the word-plausibility signal.
const WEIGHT_WORDS: f64 = 0.30;
/// Weight of the length-adequacy signal.
const WEIGHT_LENGTH: f64 = 0.20;
/// Weight of the academic-structure signal.
const WEIGHT_STRUCTURE: f64 = 0.15;

/// Non-whitespace character count below which text is considered empty noise.
const MIN_MEANINGFUL_CHARS: usize = 15;

/// Non-whitespace character count at which length adequacy saturates.
const LENGTH_SATURATION_CHARS: usize = 300;

/// Fraction of structural lines at which the structure signal saturates.
const STRUCTURE_SATURATION: f64 = 0.15;

/// Two candidate scores within this distance are treated as a tie.
pub const SCORE_EPSILON: f64 = 0.01;

/// Numbered or bulleted list markers at the start of a line.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•‣▪]|\d{1,3}[.)]|\([a-z0-9]{1,3}\)|[ivxIVX]{1,5}[.)])\s+\S").unwrap());

/// Section headings like "1.", "2.3", "Chapter 4", "Unit II".
static SECTION_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+(?:\.\d+)*\s+\S|(?i:chapter|section|module|unit|part|appendix)\b)").unwrap()
});

/// Common English words used by the plausibility heuristic. Small on
/// purpose: shape checks carry most of the weight, this set just anchors
/// very short tokens that the shape heuristic cannot judge.
const COMMON_WORDS: &[&str] = &[
    "the", "of", "and", "to", "in", "is", "it", "that", "for", "on", "with", "as", "are", "this",
    "be", "by", "an", "at", "or", "from", "not", "we", "can", "which", "has", "have", "was",
    "were", "will", "one", "two", "all", "each", "its", "used", "use", "also", "may", "these",
    "such", "data", "system", "value", "time", "when", "where", "between", "given", "then",
];

/// Score recovered text on the [0, 1] usability scale.
///
/// Pure and deterministic: the same input always yields the same score.
pub fn score_text(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let density = printable_density(text);
    let words = word_plausibility(text);
    let length = length_adequacy(text);
    let structure = structure_signal(text);

    let score = WEIGHT_DENSITY * density
        + WEIGHT_WORDS * words
        + WEIGHT_LENGTH * length
        + WEIGHT_STRUCTURE * structure;

    score.clamp(0.0, 1.0)
}

/// Ratio of alphanumeric, punctuation, and whitespace characters to total.
///
/// OCR noise shows up as control characters, replacement characters, and
/// stray symbols; clean text is almost entirely printable.
fn printable_density(text: &str) -> f64 {
    let mut printable = 0usize;
    let mut total = 0usize;

    for c in text.chars() {
        total += 1;
        if c.is_alphanumeric() || c.is_whitespace() || c.is_ascii_punctuation() {
            printable += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    printable as f64 / total as f64
}

/// Ratio of tokens that look like real words.
///
/// A token is plausible if it is a known common word, or if its letter shape
/// is pronounceable: contains a vowel, no absurd repeated-character or
/// consonant runs, and a sane length. Numbers count as plausible since
/// academic text is full of them.
fn word_plausibility(text: &str) -> f64 {
    let mut plausible = 0usize;
    let mut total = 0usize;

    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        total += 1;
        if is_plausible_token(token) {
            plausible += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    plausible as f64 / total as f64
}

fn is_plausible_token(token: &str) -> bool {
    if token.chars().all(|c| c.is_ascii_digit()) {
        return token.len() <= 6;
    }

    let lower = token.to_lowercase();
    if COMMON_WORDS.contains(&lower.as_str()) {
        return true;
    }

    let len = lower.chars().count();
    if len == 1 {
        return matches!(lower.as_str(), "a" | "i");
    }
    if len > 24 {
        return false;
    }

    // Mixed letter/digit tokens ("H2O", "3rd", "x86") are fine in moderation.
    let letters: Vec<char> = lower.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.is_empty() {
        return false;
    }

    if !letters.iter().any(|c| "aeiouy".contains(*c)) {
        // Consonant-only tokens pass only as uppercase abbreviations (TCP, DMA).
        return letters.len() <= 5 && token.chars().all(|c| !c.is_alphabetic() || c.is_uppercase());
    }

    // Reject runs that never occur in natural words: "aaaaa", "xwqzkt".
    let mut repeat_run = 1usize;
    let mut consonant_run = 0usize;
    let mut prev = '\0';
    for &c in &letters {
        if c == prev {
            repeat_run += 1;
            if repeat_run > 3 {
                return false;
            }
        } else {
            repeat_run = 1;
        }
        if "aeiouy".contains(c) {
            consonant_run = 0;
        } else {
            consonant_run += 1;
            if consonant_run > 5 {
                return false;
            }
        }
        prev = c;
    }

    true
}

/// Saturating length signal with a hard floor for near-empty output.
///
/// A near-empty result is almost always a failed strategy regardless of how
/// pure its few characters are, so anything under the floor scores zero.
fn length_adequacy(text: &str) -> f64 {
    let chars = text.chars().filter(|c| !c.is_whitespace()).count();
    if chars < MIN_MEANINGFUL_CHARS {
        return 0.0;
    }
    (chars as f64 / LENGTH_SATURATION_CHARS as f64).min(1.0)
}

/// Fraction of non-empty lines carrying academic structure markers, scaled
/// so a modest amount of structure saturates the signal.
fn structure_signal(text: &str) -> f64 {
    let mut structural = 0usize;
    let mut nonempty = 0usize;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        nonempty += 1;
        if LIST_MARKER.is_match(trimmed)
            || SECTION_HEADING.is_match(trimmed)
            || is_heading_like(trimmed)
        {
            structural += 1;
        }
    }

    if nonempty == 0 {
        return 0.0;
    }

    let fraction = structural as f64 / nonempty as f64;
    (fraction / STRUCTURE_SATURATION).min(1.0)
}

/// Short lines that are mostly uppercase letters read as headings.
fn is_heading_like(line: &str) -> bool {
    let chars = line.chars().count();
    if !(4..=60).contains(&chars) || line.ends_with('.') {
        return false;
    }

    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < 4 {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64 >= 0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_PAGE: &str = "INTRODUCTION TO OPERATING SYSTEMS\n\n\
        1. Processes and threads are the basic units of execution.\n\
        2. The scheduler decides which process runs next on each core.\n\n\
        A process consists of an address space and one or more threads of \
        control. The kernel maintains a process table with the state of \
        every process in the system. Context switching between processes is \
        more expensive than switching between threads because the memory \
        map must be replaced.";

    #[test]
    fn empty_text_scores_zero() {
        assert_eq!(score_text(""), 0.0);
        assert_eq!(score_text("   \n\t  "), 0.0);
    }

    #[test]
    fn score_is_bounded() {
        for text in ["", "a", CLEAN_PAGE, "\u{fffd}\u{fffd}\u{fffd}", "1234 5678"] {
            let s = score_text(text);
            assert!((0.0..=1.0).contains(&s), "score {s} out of range for {text:?}");
        }
    }

    #[test]
    fn score_is_deterministic() {
        assert_eq!(score_text(CLEAN_PAGE), score_text(CLEAN_PAGE));
    }

    #[test]
    fn clean_academic_text_scores_high() {
        assert!(score_text(CLEAN_PAGE) > 0.7);
    }

    #[test]
    fn ocr_noise_scores_low() {
        let noise = "~@#$ %^&* ()_+ \u{fffd}\u{fffd} xq zzzzzz kkkkkk wrtpq \
                     |||||| \\\\ ``` ^^^^ \u{fffd}gx\u{fffd}";
        assert!(score_text(noise) < score_text(CLEAN_PAGE));
        assert!(score_text(noise) < 0.45);
    }

    #[test]
    fn near_empty_text_penalized() {
        // Pure characters but almost no content: the length floor kicks in.
        let tiny = "zq vx";
        let s = score_text(tiny);
        assert!(s < 0.4, "near-empty text scored {s}");
    }

    #[test]
    fn structure_markers_boost_score() {
        let flat = "processes threads scheduling memory kernel virtual paging \
                    segmentation interrupts devices drivers filesystems inodes \
                    directories blocks buffers caching journaling consistency";
        let structured = format!(
            "SCHEDULING OVERVIEW\n1. {flat}\n2. {flat}\n- round robin\n- priority queues"
        );
        assert!(score_text(&structured) > score_text(flat));
    }

    #[test]
    fn plausible_tokens() {
        assert!(is_plausible_token("the"));
        assert!(is_plausible_token("scheduler"));
        assert!(is_plausible_token("CPU"));
        assert!(is_plausible_token("H2O"));
        assert!(is_plausible_token("1984"));
        assert!(!is_plausible_token("xwqzkt"));
        assert!(!is_plausible_token("aaaaaa"));
        assert!(!is_plausible_token("q"));
    }

    #[test]
    fn heading_detection() {
        assert!(is_heading_like("MEMORY MANAGEMENT"));
        assert!(!is_heading_like("This is an ordinary sentence."));
        assert!(!is_heading_like("OK"));
    }
}
