//! Post-processing: deterministic cleanup of model-generated summaries.
//!
//! Even well-prompted models occasionally wrap the answer in code fences,
//! open with a preamble such as "Here is the summary:", use `\r\n` line
//! endings or leave zero-width characters behind. These rules fix those
//! quirks without touching content, so the prompt can stay focused on what
//! to summarise.
//!
//! ## Rule Order
//!
//! Fences are stripped first so the preamble rule sees the real first line.
//! Line endings are normalised before any per-line rule. Length bounding
//! runs last so it measures the text that is actually stored.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw completion and bound its length.
///
/// Rules (applied in order):
/// 1. Strip outer code fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Drop a leading "Here is the summary:" style preamble
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive newlines down to one blank line
/// 6. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 7. Trim, then cap at `max_chars` characters on a char boundary
pub fn clean_summary(raw: &str, max_chars: usize) -> String {
    let s = strip_outer_fences(raw);
    let s = normalise_line_endings(&s);
    let s = strip_preamble(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    let s = remove_invisible_chars(&s);
    truncate_chars(s.trim(), max_chars)
}

// ── Rule 1: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Drop preamble ────────────────────────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:sure[,!.]?\s*)?here(?: is|'s) (?:a |the |your )?(?:concise |brief |short )?summary[^\n]*:\s*\n").unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").to_string()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse blank runs ──────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 6: Remove invisible Unicode characters ──────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 7: Length bound ─────────────────────────────────────────────────────

/// Keep at most `max_chars` characters, ending with `…` when cut.
pub fn truncate_chars(input: &str, max_chars: usize) -> String {
    if max_chars == 0 {
        return String::new();
    }
    match input.char_indices().nth(max_chars) {
        None => input.to_string(),
        Some(_) => {
            let keep = max_chars - 1;
            let end = input
                .char_indices()
                .nth(keep)
                .map(|(i, _)| i)
                .unwrap_or(input.len());
            format!("{}…", input[..end].trim_end())
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_outer_fences("```markdown\nA summary.\n```"), "A summary.");
        assert_eq!(strip_outer_fences("```\nA summary.\n```"), "A summary.");
        assert_eq!(strip_outer_fences("A summary."), "A summary.");
    }

    #[test]
    fn test_inner_fences_are_kept() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_outer_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_strip_preamble() {
        assert_eq!(
            strip_preamble("Here is a concise summary of the document:\nThe report..."),
            "The report..."
        );
        assert_eq!(strip_preamble("Sure! Here's the summary:\nText"), "Text");
        assert_eq!(
            strip_preamble("Here is what the report found."),
            "Here is what the report found."
        );
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("  hello   \nworld  "), "  hello\nworld");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_chars("abcdefghijk", 5), "abcd…");
        assert_eq!(truncate_chars("Привіт світ", 4), "При…");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn test_clean_summary_full_pipeline() {
        let input = "```text\r\nHere is the summary:\r\nThe report covers Q3.   \r\n\r\n\r\n\r\nRevenue grew\u{200B}.\r\n```";
        assert_eq!(
            clean_summary(input, 6000),
            "The report covers Q3.\n\nRevenue grew."
        );
    }

    #[test]
    fn test_clean_summary_whitespace_only() {
        assert_eq!(clean_summary("  \n\n ", 100), "");
    }
}
