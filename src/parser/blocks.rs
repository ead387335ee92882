use serde::{Deserialize, Serialize};

use super::classify::{
    has_bullet_marker, has_sub_glyph, ClassifiedLine, LineRole, SUB_BULLET_GLYPHS,
    SUB_BULLET_MIN_INDENT, TOP_BULLET_GLYPHS,
};

/// Bullets shorter than this may be orphan topic headers.
pub const ORPHAN_TOPIC_MAX_CHARS: usize = 30;
/// How far into the following bullet the topic word must reappear.
const RESTATEMENT_WINDOW: usize = 50;
const ARTICLES: &[&str] = &["a ", "an ", "the "];

const BULLET_MARK: &str = "•";
const SUB_BULLET_MARK: &str = "◦";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Header,
    Bullet,
    SubBullet,
    Paragraph,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
}

impl Block {
    pub fn new(kind: BlockKind, text: impl Into<String>) -> Self {
        Block {
            kind,
            text: text.into(),
        }
    }

    /// Display form used for page content: upper-cased headers, marked bullets.
    pub fn render(&self) -> String {
        match self.kind {
            BlockKind::Header => self.text.to_uppercase(),
            BlockKind::Bullet => format!("{} {}", BULLET_MARK, self.text),
            BlockKind::SubBullet => format!("{} {}", SUB_BULLET_MARK, self.text),
            BlockKind::Paragraph => self.text.clone(),
        }
    }

    /// Inverse of [`Block::render`] for content that was already rendered,
    /// e.g. pages read back from an older course file. Header text stays
    /// upper-cased since the original casing is gone.
    pub fn from_rendered(unit: &str) -> Self {
        let unit = collapse_whitespace(unit);
        if let Some(rest) = unit.strip_prefix(BULLET_MARK) {
            return Block::new(BlockKind::Bullet, rest.trim_start());
        }
        if let Some(rest) = unit.strip_prefix(SUB_BULLET_MARK) {
            return Block::new(BlockKind::SubBullet, rest.trim_start());
        }
        let has_letters = unit.chars().any(char::is_alphabetic);
        let is_header = has_letters
            && unit.chars().count() < super::classify::HEADER_MAX_CHARS
            && !unit.chars().any(char::is_lowercase);
        let kind = if is_header {
            BlockKind::Header
        } else {
            BlockKind::Paragraph
        };
        Block::new(kind, unit)
    }
}

/// Nesting state carried across the builder pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListState {
    #[default]
    Flat,
    Nested,
}

/// Structural events that drive [`ListState`] transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListEvent<'a> {
    Header,
    Paragraph,
    TopBullet(&'a str),
    SubBullet,
}

impl ListState {
    pub fn next(self, event: ListEvent<'_>) -> ListState {
        match event {
            ListEvent::Header | ListEvent::Paragraph => ListState::Flat,
            ListEvent::TopBullet(text) if is_list_introducer(text) => ListState::Nested,
            ListEvent::TopBullet(_) | ListEvent::SubBullet => self,
        }
    }

    /// Kind a top-level bullet takes in this state.
    pub fn bullet_kind(self) -> BlockKind {
        match self {
            ListState::Flat => BlockKind::Bullet,
            ListState::Nested => BlockKind::SubBullet,
        }
    }
}

/// A bullet ending in `:` introduces the list that follows it.
pub fn is_list_introducer(text: &str) -> bool {
    text.trim_end().ends_with(':')
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rebuild typed blocks from classified lines in one left-to-right pass.
///
/// Never fails: anything that is not a header or bullet ends up in a paragraph.
pub fn build(lines: &[ClassifiedLine]) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut state = ListState::Flat;
    let mut i = 0;

    while i < lines.len() {
        let current = &lines[i];
        match current.role {
            LineRole::Blank => {
                flush_paragraph(&mut paragraph, &mut blocks);
                i += 1;
            }
            LineRole::Header => {
                flush_paragraph(&mut paragraph, &mut blocks);
                blocks.push(Block::new(
                    BlockKind::Header,
                    collapse_whitespace(&current.line.text),
                ));
                state = state.next(ListEvent::Header);
                i += 1;
            }
            LineRole::TopBullet => {
                flush_paragraph(&mut paragraph, &mut blocks);
                let (text, next) = merge_top_bullet(lines, i);
                if !text.is_empty() {
                    blocks.push(Block::new(state.bullet_kind(), text.clone()));
                }
                state = state.next(ListEvent::TopBullet(&text));
                i = next;
            }
            LineRole::SubBullet => {
                flush_paragraph(&mut paragraph, &mut blocks);
                let (text, next) = merge_sub_bullet(lines, i);
                if !text.is_empty() {
                    blocks.push(Block::new(BlockKind::SubBullet, text));
                }
                state = state.next(ListEvent::SubBullet);
                i = next;
            }
            LineRole::Continuation => {
                paragraph.push(&current.line.text);
                state = state.next(ListEvent::Paragraph);
                i += 1;
            }
        }
    }

    flush_paragraph(&mut paragraph, &mut blocks);
    blocks
}

fn flush_paragraph(parts: &mut Vec<&str>, blocks: &mut Vec<Block>) {
    if parts.is_empty() {
        return;
    }
    let text = collapse_whitespace(&parts.join(" "));
    parts.clear();
    if !text.is_empty() {
        blocks.push(Block::new(BlockKind::Paragraph, text));
    }
}

/// Merge a top-level bullet with its word-wrapped tail. Tails are indented
/// continuation lines shallower than a sub-bullet; blank lines (page breaks)
/// between them are skipped. Returns the text and the next unconsumed index.
fn merge_top_bullet(lines: &[ClassifiedLine], start: usize) -> (String, usize) {
    let mut text = strip_bullet_marker(&lines[start].line.text).to_string();
    let mut end = start + 1;
    let mut j = end;

    while j < lines.len() {
        let next = &lines[j];
        match next.role {
            LineRole::Blank => j += 1,
            LineRole::Continuation
                if next.line.indent > 0 && next.line.indent < SUB_BULLET_MIN_INDENT =>
            {
                text.push(' ');
                text.push_str(&next.line.text);
                j += 1;
                end = j;
            }
            _ => break,
        }
    }

    (collapse_whitespace(&text), end)
}

/// Merge a sub-bullet with deep-indented lines that carry no glyph of their own.
fn merge_sub_bullet(lines: &[ClassifiedLine], start: usize) -> (String, usize) {
    let mut text = strip_sub_glyphs(&lines[start].line.text);
    let mut end = start + 1;
    let mut j = end;

    while j < lines.len() {
        let next = &lines[j];
        match next.role {
            LineRole::Blank => j += 1,
            LineRole::SubBullet
                if next.line.indent >= SUB_BULLET_MIN_INDENT
                    && !has_sub_glyph(&next.line.text)
                    && !has_bullet_marker(&next.line.text) =>
            {
                text.push(' ');
                text.push_str(&next.line.text);
                j += 1;
                end = j;
            }
            _ => break,
        }
    }

    (collapse_whitespace(&text), end)
}

fn strip_bullet_marker(text: &str) -> &str {
    text.strip_prefix("o ")
        .or_else(|| text.strip_prefix(TOP_BULLET_GLYPHS))
        .unwrap_or(text)
        .trim_start()
}

fn strip_sub_glyphs(text: &str) -> String {
    text.replace(SUB_BULLET_GLYPHS, " ")
}

/// Reclassify short bullets that the following bullet defines as headers.
///
/// `o Agent` followed by `o An agent is ...` is a topic heading that lost its
/// typography during extraction. Best-effort: returns how many blocks changed.
pub fn promote_orphan_topics(blocks: &mut [Block]) -> usize {
    let mut promoted = 0;
    for i in 0..blocks.len().saturating_sub(1) {
        if is_orphan_topic(&blocks[i], &blocks[i + 1]) {
            tracing::debug!(topic = %blocks[i].text, "promoting orphan topic bullet to header");
            blocks[i].kind = BlockKind::Header;
            promoted += 1;
        }
    }
    promoted
}

fn is_orphan_topic(block: &Block, next: &Block) -> bool {
    if block.kind != BlockKind::Bullet
        || next.kind != BlockKind::Bullet
        || block.text.chars().count() >= ORPHAN_TOPIC_MAX_CHARS
        || is_list_introducer(&block.text)
    {
        return false;
    }

    let following = next.text.to_lowercase();
    if !ARTICLES.iter().any(|a| following.starts_with(a)) {
        return false;
    }

    let Some(topic) = block
        .text
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| w.chars().count() > 1)
    else {
        return false;
    };

    let window: String = following.chars().take(RESTATEMENT_WINDOW).collect();
    window
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == topic)
}
