use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

/// Boilerplate rules as `(name, pattern, replacement)`, applied in order.
/// Specific phrases come before the shorter phrases they contain.
const BOILERPLATE: &[(&str, &str, &str)] = &[
    ("publisher_tagline", r"xcel\s+an?\s+stc\s+company", ""),
    (
        "copyright_reserved",
        r"copyright\s*©\s*(?:\d{4}\s*)?xcel\s*solutions\.?\s*all\s*rights\s*reserved\.?",
        "",
    ),
    ("copyright_year", r"copyright\s*©\s*\d{4}\s*xcel\s*solutions\.?", ""),
    ("publisher_domain", r"xcelsolutions\.com", ""),
    ("publisher_name", r"xcel\s+solutions", ""),
    ("phone_number", r"\b\d{3}[ \t]*-[ \t]*\d{3}[ \t]*-[ \t]*\d{4}\b", ""),
    (
        "running_header",
        r"\|[ \t]*review notes - life and health insurance[ \t]*\|",
        "",
    ),
    ("page_label", r"page[ \t]+\d+[ \t]*$", ""),
    ("page_number_line", r"^[ \t]*\d{2,3}[ \t]*$", ""),
];

struct Rule {
    name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    BOILERPLATE
        .iter()
        .map(|&(name, pattern, replacement)| Rule {
            name,
            pattern: RegexBuilder::new(pattern)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .unwrap(),
            replacement,
        })
        .collect()
});

static TRAILING_WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)[ \t\x0B]+$").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip publisher boilerplate and page artifacts, then normalize blank-line runs.
///
/// Leading indentation is kept intact. Passes repeat until nothing changes, so
/// `clean(clean(x)) == clean(x)`.
pub fn clean(text: &str) -> String {
    let mut current = clean_pass(text);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// One substitution pass. Every step only removes or shortens text, so the
/// fixpoint loop in [`clean`] terminates.
fn clean_pass(text: &str) -> String {
    // A form feed prefixing a line would otherwise count as indentation.
    let mut out = text.replace("\r\n", "\n").replace(['\r', '\x0C'], "\n");

    for rule in RULES.iter() {
        if let Cow::Owned(replaced) = rule.pattern.replace_all(&out, rule.replacement) {
            tracing::trace!(rule = rule.name, "boilerplate removed");
            out = replaced;
        }
    }

    let out = TRAILING_WS_RE.replace_all(&out, "");
    let out = BLANK_RUN_RE.replace_all(&out, "\n\n");
    out.trim_start_matches('\n').trim_end().to_string()
}
