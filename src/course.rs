use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::parser::ids::{slugify, IdRegistry};
use crate::parser::pages::{paginate, paginate_rendered, Page, PageLimits};
use crate::parser::sections::{Chapter, SegmentOptions, TitlePattern};

static PAGE_SUFFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" \(Page \d+/\d+\)$").unwrap());

/// Identity of a course, supplied by configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CourseMeta {
    pub course_id: String,
    pub title: String,
    pub description: String,
}

/// The persisted course document.
///
/// Older files carry their entries under `chapters`, either as rendered
/// chapters (`id`, `title`, `content`) or as pages; both load into `pages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub course_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub total_chapters: usize,
    #[serde(default)]
    pub total_pages: usize,
    #[serde(alias = "chapters", default)]
    pub pages: Vec<Page>,
}

/// What one build absorbed instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub course_id: String,
    pub chapters: usize,
    pub pages: usize,
    pub words: usize,
    pub segmentation_gap: bool,
    pub unmatched_patterns: Vec<String>,
    pub dropped_fragments: usize,
    pub promoted_topics: usize,
}

impl BuildReport {
    pub fn print(&self) {
        println!(
            "{}: {} chapters, {} pages, {} words",
            self.course_id, self.chapters, self.pages, self.words
        );
        if self.segmentation_gap {
            println!("  no chapter title matched; whole document kept as one chapter");
        }
        for pattern in &self.unmatched_patterns {
            println!("  unmatched title: {pattern}");
        }
        if self.dropped_fragments > 0 {
            println!("  dropped {} short fragments", self.dropped_fragments);
        }
        if self.promoted_topics > 0 {
            println!("  promoted {} orphan topics to headers", self.promoted_topics);
        }
    }
}

/// Page-size summary of a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CourseStats {
    pub chapters: usize,
    pub pages: usize,
    pub words: usize,
    pub shortest: usize,
    pub longest: usize,
}

impl CourseStats {
    pub fn mean(&self) -> usize {
        if self.pages == 0 {
            0
        } else {
            self.words / self.pages
        }
    }
}

impl Course {
    /// Paginate every chapter and concatenate the pages in chapter order.
    pub fn assemble(meta: &CourseMeta, chapters: &[Chapter], limits: &PageLimits) -> Course {
        let pages: Vec<Page> = chapters.iter().flat_map(|c| paginate(c, limits)).collect();
        Course::from_pages(meta, chapters.len(), pages)
    }

    fn from_pages(meta: &CourseMeta, total_chapters: usize, mut pages: Vec<Page>) -> Course {
        let mut ids = IdRegistry::default();
        for page in &mut pages {
            page.id = ids.claim_page(&page.id, page.page_number);
        }
        Course {
            course_id: meta.course_id.clone(),
            title: meta.title.clone(),
            description: meta.description.clone(),
            total_chapters,
            total_pages: pages.len(),
            pages,
        }
    }

    pub fn meta(&self) -> CourseMeta {
        CourseMeta {
            course_id: self.course_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }

    /// Re-run pagination over already persisted content.
    ///
    /// Legacy chapter entries are paginated from their rendered content.
    /// Consecutive pages of one original chapter are stitched back together
    /// first, so repaginating a paged course with new limits is lossless.
    pub fn repaginate(&self, limits: &PageLimits) -> Course {
        let groups = regroup(&self.pages);
        debug!(course = %self.course_id, chapters = groups.len(), "repaginating");
        let pages: Vec<Page> = groups
            .iter()
            .flat_map(|g| paginate_rendered(&g.id, &g.title, &g.content, limits))
            .collect();
        Course::from_pages(&self.meta(), groups.len(), pages)
    }

    pub fn stats(&self) -> CourseStats {
        let counts: Vec<usize> = self.pages.iter().map(|p| p.word_count).collect();
        CourseStats {
            chapters: regroup(&self.pages).len(),
            pages: counts.len(),
            words: counts.iter().sum(),
            shortest: counts.iter().copied().min().unwrap_or(0),
            longest: counts.iter().copied().max().unwrap_or(0),
        }
    }

    pub fn from_json(json: &str) -> Result<Course> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Clean, segment, paginate and assemble one course from its source text.
pub fn build_course(
    meta: &CourseMeta,
    raw: &str,
    patterns: &[TitlePattern],
    options: &SegmentOptions,
    limits: &PageLimits,
) -> (Course, BuildReport) {
    let seg = crate::parser::process_document(raw, patterns, options);
    if seg.segmentation_gap {
        warn!(course = %meta.course_id, "segmentation gap");
    }
    let course = Course::assemble(meta, &seg.chapters, limits);
    let report = BuildReport {
        course_id: meta.course_id.clone(),
        chapters: course.total_chapters,
        pages: course.total_pages,
        words: course.pages.iter().map(|p| p.word_count).sum(),
        segmentation_gap: seg.segmentation_gap,
        unmatched_patterns: seg.unmatched_patterns,
        dropped_fragments: seg.dropped_fragments,
        promoted_topics: seg.promoted_topics,
    };
    info!(
        course = %report.course_id,
        chapters = report.chapters,
        pages = report.pages,
        words = report.words,
        "course built"
    );
    (course, report)
}

/// One original chapter recovered from persisted entries.
struct ChapterText {
    id: String,
    title: String,
    content: String,
}

fn regroup(entries: &[Page]) -> Vec<ChapterText> {
    let mut groups: Vec<ChapterText> = Vec::new();
    let mut open: Option<&str> = None;

    for entry in entries {
        let paged = entry.page_number > 0 && !entry.original_chapter.is_empty();
        if paged && open == Some(entry.original_chapter.as_str()) && entry.page_number > 1 {
            if let Some(group) = groups.last_mut() {
                group.content.push_str("\n\n");
                group.content.push_str(&entry.content);
                continue;
            }
        }

        let (id, title) = if paged {
            let id = slugify(&entry.original_chapter);
            let title = PAGE_SUFFIX_RE.replace(&entry.title, "").into_owned();
            (if id.is_empty() { entry.id.clone() } else { id }, title)
        } else {
            (entry.id.clone(), entry.title.clone())
        };
        groups.push(ChapterText {
            id,
            title,
            content: entry.content.clone(),
        });
        open = paged.then_some(entry.original_chapter.as_str());
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::blocks::{Block, BlockKind};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn meta() -> CourseMeta {
        CourseMeta {
            course_id: "florida_laws_lh".to_string(),
            title: "Florida Laws - Life & Health".to_string(),
            description: "State laws, rules and regulations".to_string(),
        }
    }

    fn words(n: usize) -> String {
        vec!["policy"; n].join(" ")
    }

    fn chapter(id: &str, title: &str, paragraphs: &[usize]) -> Chapter {
        Chapter {
            id: id.to_string(),
            title: title.to_string(),
            blocks: paragraphs
                .iter()
                .map(|&n| Block::new(BlockKind::Paragraph, words(n)))
                .collect(),
        }
    }

    #[test]
    fn assemble_concatenates_in_chapter_order() {
        let chapters = vec![
            chapter("licensing", "Licensing", &[600, 600]),
            chapter("annuities", "Annuities", &[100]),
        ];
        let course = Course::assemble(&meta(), &chapters, &PageLimits::default());
        let ids: Vec<&str> = course.pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["licensing_p1", "licensing_p2", "annuities"]);
        assert_eq!(course.total_pages, 3);
        assert_eq!(course.total_chapters, 2);
    }

    #[test]
    fn colliding_page_ids_are_disambiguated() {
        // Both ids truncate to the same 40-char stem.
        let chapters = vec![
            chapter("requirements_for_licensing_of_insurance_agents", "A", &[650, 650]),
            chapter("requirements_for_licensing_of_insurance_adjusters", "B", &[650, 650]),
        ];
        let course = Course::assemble(&meta(), &chapters, &PageLimits::default());
        let ids: Vec<&str> = course.pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "requirements_for_licensing_of_insurance_p1",
                "requirements_for_licensing_of_insurance_p2",
                "requirements_for_licensing_of_insurance_p1_p1",
                "requirements_for_licensing_of_insurance_p2_p2",
            ]
        );
    }

    #[test]
    fn json_shape_is_camel_case_with_snake_case_pages() {
        let course = Course::assemble(&meta(), &[chapter("licensing", "Licensing", &[20])], &PageLimits::default());
        let value: serde_json::Value = serde_json::from_str(&course.to_json_pretty().unwrap()).unwrap();
        assert_eq!(value["courseId"], "florida_laws_lh");
        assert_eq!(value["totalPages"], 1);
        assert_eq!(value["pages"][0]["word_count"], 20);
        assert_eq!(value["pages"][0]["original_chapter"], "licensing");
        assert!(value.get("chapters").is_none());
    }

    #[test]
    fn legacy_chapters_field_is_read_and_repaginated() {
        let json = format!(
            r#"{{"courseId":"review_notes_lh","title":"Review Notes","description":"",
                "chapters":[{{"id":"general_insurance","title":"General Insurance",
                "content":"GENERAL INSURANCE\n\n{}\n\n• {}\n\n{}"}}]}}"#,
            words(400),
            words(200),
            words(300)
        );
        let course = Course::from_json(&json).unwrap();
        assert_eq!(course.pages.len(), 1);
        assert_eq!(course.pages[0].page_number, 0);

        let paged = course.repaginate(&PageLimits::default());
        let ids: Vec<&str> = paged.pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["general_insurance_p1", "general_insurance_p2"]);
        assert_eq!(paged.pages[1].title, "General Insurance (Page 2/2)");
        assert_eq!(paged.total_chapters, 1);
    }

    #[test]
    fn repaginate_stitches_pages_back_together() {
        let chapters = vec![
            chapter("licensing", "Licensing", &[300, 300, 300]),
            chapter("annuities", "Annuities", &[100]),
        ];
        let course = Course::assemble(&meta(), &chapters, &PageLimits::default());
        let wide = PageLimits {
            target_words: 1000,
            min_words: 500,
            max_words: 2000,
        };
        let again = course.repaginate(&wide);
        let titles: Vec<&str> = again.pages.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Licensing", "Annuities"]);
        assert_eq!(again.pages[0].id, "licensing");
        assert_eq!(again.pages[0].word_count, 900);

        let restored = again.repaginate(&PageLimits::default());
        assert_eq!(restored, course);
    }

    #[test]
    fn stats_summarize_pages() {
        let chapters = vec![chapter("licensing", "Licensing", &[600, 600]), chapter("annuities", "Annuities", &[100])];
        let stats = Course::assemble(&meta(), &chapters, &PageLimits::default()).stats();
        assert_eq!(stats.chapters, 2);
        assert_eq!(stats.pages, 3);
        assert_eq!(stats.words, 1300);
        assert_eq!(stats.shortest, 100);
        assert_eq!(stats.longest, 600);
        assert_eq!(stats.mean(), 433);
    }

    #[test]
    fn build_course_reports_absorbed_fallbacks() {
        let patterns = vec![TitlePattern::new("ANNUITIES", None, "Annuities").unwrap()];
        let (course, report) = build_course(
            &meta(),
            "No titles in this short document at all.",
            &patterns,
            &SegmentOptions::default(),
            &PageLimits::default(),
        );
        assert!(report.segmentation_gap);
        assert_eq!(report.unmatched_patterns, vec!["annuities".to_string()]);
        assert_eq!(course.pages.len(), 1);
        assert_eq!(course.pages[0].id, "intro");
        assert_eq!(report.words, 8);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Course::from_json("{\"courseId\": 3}").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn page_ids_unique_within_course(
            specs in proptest::collection::vec(
                (prop::sample::select(vec!["licensing", "licensing_p1", "licensing_p2", "annuities"]),
                 proptest::collection::vec(1usize..700, 1..5)),
                1..8,
            )
        ) {
            let chapters: Vec<Chapter> = specs
                .iter()
                .map(|(id, paras)| chapter(id, id, paras))
                .collect();
            let course = Course::assemble(&meta(), &chapters, &PageLimits::default());
            let unique: HashSet<&str> = course.pages.iter().map(|p| p.id.as_str()).collect();
            prop_assert_eq!(unique.len(), course.pages.len());
        }
    }
}
