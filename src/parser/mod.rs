pub mod blocks;
pub mod classify;
pub mod clean;
pub mod ids;
pub mod pages;
pub mod sections;

use sections::{SegmentOptions, Segmentation, TitlePattern};

/// Raw extracted text → cleaned text → chapters of typed blocks.
pub fn process_document(raw: &str, patterns: &[TitlePattern], options: &SegmentOptions) -> Segmentation {
    let cleaned = clean::clean(raw);
    sections::segment(&cleaned, patterns, options)
}

// ── Tests ──
