use serde::{Deserialize, Serialize};

use super::blocks::{Block, BlockKind};
use super::ids::truncate_slug;
use super::sections::Chapter;
use crate::error::{CourseError, Result};

/// A unit bigger than this is worth starting a fresh page for.
pub const SUBSTANTIAL_UNIT_WORDS: usize = 50;
/// Chapter ids are shortened to this before the `_p{n}` suffix.
const PAGE_ID_STEM_CHARS: usize = 40;

/// Word-count bounds for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLimits {
    pub target_words: usize,
    pub min_words: usize,
    pub max_words: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        PageLimits {
            target_words: 500,
            min_words: 300,
            max_words: 700,
        }
    }
}

impl PageLimits {
    pub fn validate(&self) -> Result<()> {
        if self.min_words == 0 {
            return Err(CourseError::limits("min_words must be positive"));
        }
        if self.min_words > self.target_words {
            return Err(CourseError::limits(format!(
                "min_words ({}) exceeds target_words ({})",
                self.min_words, self.target_words
            )));
        }
        if self.target_words > self.max_words {
            return Err(CourseError::limits(format!(
                "target_words ({}) exceeds max_words ({})",
                self.target_words, self.max_words
            )));
        }
        Ok(())
    }
}

/// A display-sized slice of one chapter. Field names are part of the
/// persisted course format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub page_number: usize,
    #[serde(default)]
    pub total_pages: usize,
    #[serde(default)]
    pub original_chapter: String,
}

/// Whitespace-separated token count, the only word count used anywhere.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// One rendered block as the paginator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Unit {
    kind: BlockKind,
    text: String,
    words: usize,
}

impl Unit {
    fn from_block(block: &Block) -> Self {
        let text = block.render();
        Unit {
            kind: block.kind,
            words: word_count(&text),
            text,
        }
    }
}

/// Split a chapter into pages. Every block lands on exactly one page, in order.
pub fn paginate(chapter: &Chapter, limits: &PageLimits) -> Vec<Page> {
    let units: Vec<Unit> = chapter.blocks.iter().map(Unit::from_block).collect();
    materialize(pack(units, limits), &chapter.id, &chapter.title)
}

/// Paginate content that was rendered earlier (blank-line separated units),
/// recovering each unit's kind from its marker.
pub fn paginate_rendered(chapter_id: &str, title: &str, content: &str, limits: &PageLimits) -> Vec<Page> {
    let units: Vec<Unit> = content
        .split("\n\n")
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(|u| {
            let kind = Block::from_rendered(u).kind;
            Unit {
                kind,
                words: word_count(u),
                text: u.to_string(),
            }
        })
        .collect();
    materialize(pack(units, limits), chapter_id, title)
}

/// Greedy sequential packing; returns the units of each page.
fn pack(units: Vec<Unit>, limits: &PageLimits) -> Vec<Vec<Unit>> {
    let mut pages = Vec::new();
    let mut current: Vec<Unit> = Vec::new();
    let mut words = 0;

    for unit in units {
        if !current.is_empty() {
            let overflows = words + unit.words > limits.max_words;
            let natural_break = words >= limits.target_words && is_break_point(&unit, words, limits);
            if overflows || natural_break {
                pages.push(std::mem::take(&mut current));
                words = 0;
            }
        }
        words += unit.words;
        current.push(unit);
    }

    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

/// Once a page has reached its target, a header always starts the next page;
/// other substantial units do once the page is past its minimum.
fn is_break_point(next: &Unit, words: usize, limits: &PageLimits) -> bool {
    next.kind == BlockKind::Header || (next.words > SUBSTANTIAL_UNIT_WORDS && words > limits.min_words)
}

/// Number and title the pages of one chapter. Needs the whole batch because
/// every page carries the final page count.
fn materialize(groups: Vec<Vec<Unit>>, chapter_id: &str, title: &str) -> Vec<Page> {
    let total = groups.len();
    groups
        .into_iter()
        .enumerate()
        .map(|(i, units)| {
            let number = i + 1;
            let content = units
                .iter()
                .map(|u| u.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            Page {
                id: page_id(chapter_id, number, total),
                title: page_title(title, number, total),
                word_count: word_count(&content),
                content,
                page_number: number,
                total_pages: total,
                original_chapter: chapter_id.to_string(),
            }
        })
        .collect()
}

fn page_id(chapter_id: &str, number: usize, total: usize) -> String {
    if total == 1 {
        chapter_id.to_string()
    } else {
        format!("{}_p{}", truncate_slug(chapter_id, PAGE_ID_STEM_CHARS), number)
    }
}

fn page_title(title: &str, number: usize, total: usize) -> String {
    if total == 1 {
        title.to_string()
    } else {
        format!("{title} (Page {number}/{total})")
    }
}
