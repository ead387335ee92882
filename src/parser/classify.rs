/// Lines indented this much or less may open a top-level bullet.
pub const TOP_BULLET_MAX_INDENT: usize = 2;
/// Lines indented this much or more are sub-bullets (or their wrapped tails).
pub const SUB_BULLET_MIN_INDENT: usize = 8;
/// Zero-indent lines longer than this are prose, not headers.
pub const HEADER_MAX_CHARS: usize = 60;

/// Glyphs that open a top-level bullet.
pub const TOP_BULLET_GLYPHS: &[char] = &['•', '\u{f0b7}'];
/// Private-use glyphs the extractor leaves where sub-item bullets were.
pub const SUB_BULLET_GLYPHS: &[char] = &['\u{f0a7}', '\u{f09f}', '◦'];

/// One physical line: trimmed text plus its leading-whitespace width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    pub index: usize,
    pub indent: usize,
    pub text: String,
}

impl RawLine {
    pub fn new(index: usize, line: &str) -> Self {
        let body = line.trim_start();
        let indent = line.chars().count() - body.chars().count();
        RawLine {
            index,
            indent,
            text: body.trim_end().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineRole {
    Header,
    TopBullet,
    SubBullet,
    Continuation,
    Blank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub line: RawLine,
    pub role: LineRole,
}

struct Rule {
    role: LineRole,
    applies: fn(&str, usize) -> bool,
}

/// Checked in order; the first rule that applies wins, `Header` otherwise.
const RULES: &[Rule] = &[
    Rule {
        role: LineRole::Blank,
        applies: is_blank,
    },
    Rule {
        role: LineRole::TopBullet,
        applies: is_top_bullet,
    },
    Rule {
        role: LineRole::SubBullet,
        applies: is_sub_bullet,
    },
    Rule {
        role: LineRole::Continuation,
        applies: is_prose,
    },
];

/// Context-free role of a single line from its trimmed text and indentation.
pub fn classify(text: &str, indent: usize) -> LineRole {
    RULES
        .iter()
        .find(|rule| (rule.applies)(text, indent))
        .map(|rule| rule.role)
        .unwrap_or(LineRole::Header)
}

/// Classify every line of a cleaned document.
///
/// After the per-line pass, a short zero-indent line whose next non-blank line
/// is an indented continuation is demoted from `Header` to `Continuation`: it
/// opens a wrapped paragraph rather than naming a topic.
pub fn classify_lines(text: &str) -> Vec<ClassifiedLine> {
    let lines: Vec<RawLine> = text
        .lines()
        .enumerate()
        .map(|(i, l)| RawLine::new(i, l))
        .collect();
    let mut roles: Vec<LineRole> = lines.iter().map(|l| classify(&l.text, l.indent)).collect();

    for i in 0..roles.len() {
        if roles[i] != LineRole::Header {
            continue;
        }
        let next = (i + 1..roles.len()).find(|&j| roles[j] != LineRole::Blank);
        if let Some(j) = next {
            if roles[j] == LineRole::Continuation && lines[j].indent > 0 {
                tracing::debug!(line = lines[i].index, "paragraph opener, not a header");
                roles[i] = LineRole::Continuation;
            }
        }
    }

    lines
        .into_iter()
        .zip(roles)
        .map(|(line, role)| ClassifiedLine { line, role })
        .collect()
}

/// True when the text opens with `o ` or a top-level bullet glyph.
pub fn has_bullet_marker(text: &str) -> bool {
    text.starts_with("o ") || text.starts_with(TOP_BULLET_GLYPHS)
}

pub fn has_sub_glyph(text: &str) -> bool {
    text.contains(SUB_BULLET_GLYPHS)
}

fn is_blank(text: &str, _indent: usize) -> bool {
    let t = text.trim();
    t.is_empty() || t.chars().all(|c| c.is_ascii_digit())
}

fn is_top_bullet(text: &str, indent: usize) -> bool {
    indent <= TOP_BULLET_MAX_INDENT && has_bullet_marker(text)
}

fn is_sub_bullet(text: &str, indent: usize) -> bool {
    indent >= SUB_BULLET_MIN_INDENT || has_sub_glyph(text)
}

/// Indented non-bullet text is a wrapped tail; an over-long zero-indent line is
/// prose. Both fall back to `Continuation`.
fn is_prose(text: &str, indent: usize) -> bool {
    indent > 0 || text.chars().count() > HEADER_MAX_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(text: &str) -> Vec<LineRole> {
        classify_lines(text).into_iter().map(|c| c.role).collect()
    }

    #[test]
    fn raw_line_counts_indent() {
        let line = RawLine::new(3, "   o Agent   ");
        assert_eq!(line.index, 3);
        assert_eq!(line.indent, 3);
        assert_eq!(line.text, "o Agent");
    }

    #[test]
    fn blank_lines() {
        assert_eq!(classify("", 0), LineRole::Blank);
        assert_eq!(classify("\x0C", 0), LineRole::Blank);
        assert_eq!(classify("7", 0), LineRole::Blank);
        assert_eq!(classify("104", 12), LineRole::Blank);
    }

    #[test]
    fn top_bullets() {
        assert_eq!(classify("o Eligibility requirements:", 1), LineRole::TopBullet);
        assert_eq!(classify("o Agent", 0), LineRole::TopBullet);
        assert_eq!(classify("• Insurer", 2), LineRole::TopBullet);
        // Too deep for a top-level bullet.
        assert_eq!(classify("o Agent", 9), LineRole::SubBullet);
    }

    #[test]
    fn sub_bullets() {
        assert_eq!(classify("\u{f0a7} Must be 18 or older", 10), LineRole::SubBullet);
        assert_eq!(classify("\u{f09f} Glyph alone is enough", 4), LineRole::SubBullet);
        assert_eq!(classify("deep wrapped text", 12), LineRole::SubBullet);
    }

    #[test]
    fn headers_and_prose() {
        assert_eq!(classify("Legal Concepts of Insurance", 0), LineRole::Header);
        assert_eq!(classify("wrapped tail of a bullet", 3), LineRole::Continuation);
        let long = "An insurance contract is a legal agreement between two parties called the insurer";
        assert!(long.len() > HEADER_MAX_CHARS);
        assert_eq!(classify(long, 0), LineRole::Continuation);
    }

    #[test]
    fn header_ceiling_is_inclusive() {
        let at_ceiling = "x".repeat(HEADER_MAX_CHARS);
        assert_eq!(classify(&at_ceiling, 0), LineRole::Header);
        let over = "x".repeat(HEADER_MAX_CHARS + 1);
        assert_eq!(classify(&over, 0), LineRole::Continuation);
    }

    #[test]
    fn paragraph_opener_is_demoted() {
        let text = "Insurance is the transfer\n   of risk from one party to another.\nNext Topic\n o A bullet";
        assert_eq!(
            roles(text),
            vec![
                LineRole::Continuation,
                LineRole::Continuation,
                LineRole::Header,
                LineRole::TopBullet,
            ]
        );
    }

    #[test]
    fn opener_lookahead_skips_blank_lines() {
        let text = "Short opener\n\n   indented tail";
        assert_eq!(
            roles(text),
            vec![LineRole::Continuation, LineRole::Blank, LineRole::Continuation]
        );
    }

    #[test]
    fn header_before_sub_bullet_stays_header() {
        let text = "Requirements\n          \u{f0a7} Must be 18 or older";
        assert_eq!(roles(text), vec![LineRole::Header, LineRole::SubBullet]);
    }

    #[test]
    fn empty_document() {
        assert!(classify_lines("").is_empty());
    }
}
