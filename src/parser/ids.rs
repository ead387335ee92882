use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Maximum length of a chapter slug.
pub const SLUG_MAX_CHARS: usize = 50;

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// Lowercase, collapse every non-alphanumeric run to `_`, trim, truncate.
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    let slug = NON_ALNUM_RE.replace_all(&lower, "_");
    truncate_slug(slug.trim_matches('_'), SLUG_MAX_CHARS)
}

/// Truncate to `max` characters without leaving a trailing `_`.
pub fn truncate_slug(slug: &str, max: usize) -> String {
    let cut: String = slug.chars().take(max).collect();
    cut.trim_end_matches('_').to_string()
}

/// Hands out identifiers that are unique within one course.
#[derive(Debug, Default)]
pub struct IdRegistry {
    taken: HashSet<String>,
}

impl IdRegistry {
    /// Claim `base`, or `base_2`, `base_3`... when it is taken.
    pub fn claim(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "untitled" } else { base };
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        self.claim_suffixed(base, |n| format!("{base}_{n}"))
    }

    /// Claim a page id; a collision first tries the page-number suffix.
    pub fn claim_page(&mut self, base: &str, page_number: usize) -> String {
        let base = if base.is_empty() { "untitled" } else { base };
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let with_page = format!("{base}_p{page_number}");
        if self.taken.insert(with_page.clone()) {
            tracing::debug!(id = %with_page, "page id collision resolved");
            return with_page;
        }
        self.claim_suffixed(&with_page, |n| format!("{with_page}_{n}"))
    }

    fn claim_suffixed(&mut self, base: &str, candidate: impl Fn(usize) -> String) -> String {
        let mut n = 2;
        loop {
            let id = candidate(n);
            if self.taken.insert(id.clone()) {
                tracing::debug!(base, id = %id, "id collision resolved");
                return id;
            }
            n += 1;
        }
    }
}
