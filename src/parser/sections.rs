use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{debug, warn};

use super::blocks::{build, promote_orphan_topics, Block};
use super::classify::classify_lines;
use super::ids::{slugify, IdRegistry};
use crate::error::{CourseError, Result};

pub const INTRO_ID: &str = "intro";
pub const INTRO_TITLE: &str = "Introduction";
pub const DEFAULT_MIN_CHAPTER_CHARS: usize = 50;

/// One row of the chapter-title table: where a chapter starts and what it is called.
#[derive(Debug, Clone)]
pub struct TitlePattern {
    pub pattern: Regex,
    pub id: String,
    pub title: String,
}

impl TitlePattern {
    /// Compile `pattern` case-insensitively. Without an explicit id the slug
    /// of `title` is used.
    pub fn new(pattern: &str, id: Option<&str>, title: &str) -> Result<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| CourseError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?;
        let id = id
            .map(slugify)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| slugify(title));
        Ok(TitlePattern {
            pattern: regex,
            id,
            title: title.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOptions {
    /// Chapters whose body is shorter than this are treated as stray fragments.
    pub min_chapter_chars: usize,
    pub promote_orphan_topics: bool,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        SegmentOptions {
            min_chapter_chars: DEFAULT_MIN_CHAPTER_CHARS,
            promote_orphan_topics: true,
        }
    }
}

/// Chapters plus what the heuristics had to absorb along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub chapters: Vec<Chapter>,
    /// No title pattern matched; the whole document became the intro chapter.
    pub segmentation_gap: bool,
    pub unmatched_patterns: Vec<String>,
    pub dropped_fragments: usize,
    pub promoted_topics: usize,
}

/// Where a chapter starts in the cleaned text.
#[derive(Debug, Clone, Copy)]
struct Cut {
    /// Start of the line holding the match.
    start: usize,
    /// End of the matched title text.
    title_end: usize,
    pattern: usize,
}

/// Split a cleaned document into chapters at each title pattern's first match.
///
/// Text before the first match becomes the `intro` chapter. Each chapter's
/// text keeps its title line, so every non-blank line lands in exactly one
/// chapter (unless the chapter is dropped as a fragment).
pub fn segment(cleaned: &str, patterns: &[TitlePattern], options: &SegmentOptions) -> Segmentation {
    let mut report = Segmentation::default();
    let cuts = locate_cuts(cleaned, patterns, &mut report);
    report.segmentation_gap = cuts.is_empty() && !patterns.is_empty();
    if report.segmentation_gap {
        warn!(patterns = patterns.len(), "no chapter title matched; using a single intro chapter");
    }

    let mut ids = IdRegistry::default();
    let intro_end = cuts.first().map_or(cleaned.len(), |c| c.start);
    let intro = &cleaned[..intro_end];
    if cuts.is_empty() {
        if !intro.trim().is_empty() {
            push_chapter(&mut report, &mut ids, INTRO_ID, INTRO_TITLE, intro, options);
        }
    } else if keep_body(intro, INTRO_ID, options, &mut report) {
        push_chapter(&mut report, &mut ids, INTRO_ID, INTRO_TITLE, intro, options);
    }

    for (k, cut) in cuts.iter().enumerate() {
        let end = cuts.get(k + 1).map_or(cleaned.len(), |next| next.start);
        let pattern = &patterns[cut.pattern];
        let body = &cleaned[cut.title_end..end];
        if keep_body(body, &pattern.id, options, &mut report) {
            let text = &cleaned[cut.start..end];
            push_chapter(&mut report, &mut ids, &pattern.id, &pattern.title, text, options);
        }
    }

    report
}

/// First match of every pattern, ordered by position, overlaps dropped.
fn locate_cuts(cleaned: &str, patterns: &[TitlePattern], report: &mut Segmentation) -> Vec<Cut> {
    let mut cuts: Vec<Cut> = patterns
        .iter()
        .enumerate()
        .filter_map(|(idx, p)| match p.pattern.find(cleaned) {
            Some(m) => Some(Cut {
                start: line_start(cleaned, m.start()),
                title_end: m.end(),
                pattern: idx,
            }),
            None => {
                debug!(chapter = %p.id, "title pattern not found");
                report.unmatched_patterns.push(p.id.clone());
                None
            }
        })
        .collect();
    cuts.sort_by_key(|c| (c.start, c.pattern));

    let mut kept: Vec<Cut> = Vec::with_capacity(cuts.len());
    for cut in cuts {
        if let Some(prev) = kept.last() {
            if cut.start < prev.title_end.max(prev.start + 1) {
                warn!(chapter = %patterns[cut.pattern].id, "title overlaps an earlier chapter title; skipped");
                report.unmatched_patterns.push(patterns[cut.pattern].id.clone());
                continue;
            }
        }
        kept.push(cut);
    }
    kept
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |i| i + 1)
}

fn keep_body(body: &str, id: &str, options: &SegmentOptions, report: &mut Segmentation) -> bool {
    let chars = body.trim().chars().count();
    if chars == 0 {
        debug!(chapter = id, "empty chapter dropped");
        return false;
    }
    if chars < options.min_chapter_chars {
        warn!(chapter = id, chars, "chapter below minimum length dropped");
        report.dropped_fragments += 1;
        return false;
    }
    true
}

fn push_chapter(
    report: &mut Segmentation,
    ids: &mut IdRegistry,
    id: &str,
    title: &str,
    text: &str,
    options: &SegmentOptions,
) {
    let mut blocks = build(&classify_lines(text));
    if options.promote_orphan_topics {
        report.promoted_topics += promote_orphan_topics(&mut blocks);
    }
    if blocks.is_empty() {
        debug!(chapter = id, "no blocks reconstructed; chapter dropped");
        return;
    }
    report.chapters.push(Chapter {
        id: ids.claim(id),
        title: title.to_string(),
        blocks,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::blocks::BlockKind;
    use crate::parser::clean::clean;

    fn patterns(rows: &[(&str, Option<&str>, &str)]) -> Vec<TitlePattern> {
        rows.iter()
            .map(|(p, id, t)| TitlePattern::new(p, *id, t).unwrap())
            .collect()
    }

    fn ids(seg: &Segmentation) -> Vec<&str> {
        seg.chapters.iter().map(|c| c.id.as_str()).collect()
    }

    const BODY: &str = "Insurance is the transfer of risk from an individual to a larger group of insureds.";

    #[test]
    fn splits_at_first_occurrence_in_document_order() {
        let text = format!("LEGAL CONCEPTS\n{BODY}\nTHE NATURE OF INSURANCE\n{BODY}\nLEGAL CONCEPTS again\n{BODY}");
        let table = patterns(&[
            (r"THE NATURE OF INSURANCE", Some("nature"), "The Nature of Insurance"),
            (r"LEGAL CONCEPTS", None, "Legal Concepts of Insurance"),
        ]);
        let seg = segment(&text, &table, &SegmentOptions::default());
        assert_eq!(ids(&seg), vec!["legal_concepts_of_insurance", "nature"]);
        // The second "LEGAL CONCEPTS" is not re-matched; it stays inside "nature".
        let nature = &seg.chapters[1];
        assert!(nature.blocks.iter().any(|b| b.text.contains("LEGAL CONCEPTS again")));
        assert!(!seg.segmentation_gap);
    }

    #[test]
    fn leading_text_becomes_intro() {
        let text = format!("{BODY}\nANNUITIES\n{BODY}");
        let table = patterns(&[("ANNUITIES", None, "Annuities")]);
        let seg = segment(&text, &table, &SegmentOptions::default());
        assert_eq!(ids(&seg), vec![INTRO_ID, "annuities"]);
        assert_eq!(seg.chapters[0].title, INTRO_TITLE);
    }

    #[test]
    fn no_match_is_a_segmentation_gap() {
        let table = patterns(&[("SOCIAL SECURITY", None, "Social Security")]);
        let seg = segment(BODY, &table, &SegmentOptions::default());
        assert!(seg.segmentation_gap);
        assert_eq!(ids(&seg), vec![INTRO_ID]);
        assert_eq!(seg.unmatched_patterns, vec!["social_security".to_string()]);
    }

    #[test]
    fn gap_keeps_short_documents() {
        let seg = segment("Tiny note", &[], &SegmentOptions::default());
        assert_eq!(ids(&seg), vec![INTRO_ID]);
        assert!(!seg.segmentation_gap);
    }

    #[test]
    fn empty_and_short_chapters_dropped() {
        let text = format!("ANNUITIES\nGROUP LIFE\nshort residue\nRETIREMENT PLANS\n{BODY}");
        let table = patterns(&[
            ("ANNUITIES", None, "Annuities"),
            ("GROUP LIFE", None, "Group Life Insurance"),
            ("RETIREMENT PLANS", None, "Retirement Plans"),
        ]);
        let seg = segment(&text, &table, &SegmentOptions::default());
        assert_eq!(ids(&seg), vec!["retirement_plans"]);
        assert_eq!(seg.dropped_fragments, 1);
    }

    #[test]
    fn duplicate_ids_are_disambiguated() {
        let text = format!("PART ONE\n{BODY}\nPART TWO\n{BODY}");
        let table = patterns(&[
            ("PART ONE", Some("part"), "Part One"),
            ("PART TWO", Some("part"), "Part Two"),
        ]);
        let seg = segment(&text, &table, &SegmentOptions::default());
        assert_eq!(ids(&seg), vec!["part", "part_2"]);
    }

    #[test]
    fn overlapping_titles_skip_the_later_pattern() {
        let text = format!("LIFE INSURANCE POLICY PROVISIONS\n{BODY}");
        let table = patterns(&[
            ("LIFE INSURANCE POLICY", None, "Policy Types"),
            ("POLICY PROVISIONS", None, "Policy Provisions"),
        ]);
        let seg = segment(&text, &table, &SegmentOptions::default());
        assert_eq!(ids(&seg), vec!["policy_types"]);
        assert_eq!(seg.unmatched_patterns, vec!["policy_provisions".to_string()]);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = TitlePattern::new("(unclosed", None, "Broken").unwrap_err();
        assert!(matches!(err, CourseError::Pattern { .. }));
    }

    #[test]
    fn orphan_promotion_can_be_disabled() {
        let text = " o Agent\n o An agent represents the insurer in a contract of insurance";
        let on = segment(text, &[], &SegmentOptions::default());
        assert_eq!(on.promoted_topics, 1);
        assert_eq!(on.chapters[0].blocks[0].kind, BlockKind::Header);

        let options = SegmentOptions {
            promote_orphan_topics: false,
            ..SegmentOptions::default()
        };
        let off = segment(text, &[], &options);
        assert_eq!(off.promoted_topics, 0);
        assert_eq!(off.chapters[0].blocks[0].kind, BlockKind::Bullet);
    }

    #[test]
    fn every_line_lands_in_one_chapter() {
        let raw = std::fs::read_to_string("tests/fixtures/florida_laws.txt").unwrap();
        let cleaned = clean(&raw);
        let table = patterns(&[
            (r"FLORIDA LAWS, RULES, AND REGULATIONS COMMON TO ALL LINES OF\s*INSURANCE", Some("common_all_lines"), "Florida Laws Common to All Lines of Insurance"),
            (r"FLORIDA LAWS, RULES, AND REGULATIONS PERTINENT TO LIFE INSURANCE", Some("life_insurance"), "Florida Laws Pertinent to Life Insurance"),
            (r"FLORIDA LAWS, RULES, AND REGULATIONS PERTINENT TO HEALTH", Some("health_insurance"), "Florida Laws Pertinent to Health Insurance"),
        ]);
        let seg = segment(&cleaned, &table, &SegmentOptions::default());
        assert_eq!(ids(&seg), vec!["common_all_lines", "life_insurance", "health_insurance"]);

        let block_words: Vec<String> = seg
            .chapters
            .iter()
            .flat_map(|c| c.blocks.iter())
            .flat_map(|b| b.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let source_words: Vec<String> = classify_lines(&cleaned)
            .into_iter()
            .filter(|l| l.role != crate::parser::classify::LineRole::Blank)
            .flat_map(|l| {
                l.line
                    .text
                    .replace(crate::parser::classify::SUB_BULLET_GLYPHS, " ")
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|w| w != "o" && w != "•")
            .collect();
        assert_eq!(block_words, source_words);
    }
}
