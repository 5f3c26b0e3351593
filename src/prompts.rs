//! Prompts for document summarisation.
//!
//! Every prompt lives here so prompt changes touch one file and unit tests can
//! inspect the exact text sent upstream. Callers can override the system
//! prompt via [`crate::config::IngestConfig::system_prompt`]; the template is
//! used only when no override is provided.

/// Default system prompt template.
///
/// `{language}` and `{words}` are substituted by [`system_prompt`].
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an expert document analyst. Summarise the document excerpt supplied by the user.

Follow these rules precisely:

1. LANGUAGE
   - Write the summary in {language}, whatever the language of the document

2. LENGTH
   - At most {words} words
   - Prefer short paragraphs; use a bulleted list only for enumerations

3. CONTENT
   - State what the document is, its main points and any conclusions
   - Mention tables or figures when the structural hints show they exist
   - Use only information present in the excerpt; do not invent facts
   - If the excerpt is marked as truncated, do not speculate about the omitted part

4. OUTPUT FORMAT
   - Output ONLY the summary text
   - Do NOT wrap it in code fences
   - Do NOT add a preamble such as "Here is the summary""#;

/// Fixed summary used when a document has no extractable text.
///
/// No upstream call is made in that case.
pub const EMPTY_DOCUMENT_SUMMARY: &str = "No text content found in the document.";

/// Marker inserted between the lead and the tail of a truncated excerpt.
pub fn omission_marker(omitted_chars: usize) -> String {
    format!("\n\n[… {omitted_chars} characters omitted …]\n\n")
}

/// Render the default system prompt for a language and word budget.
pub fn system_prompt(language: &str, words: usize) -> String {
    DEFAULT_SYSTEM_PROMPT
        .replace("{language}", language)
        .replace("{words}", &words.to_string())
}

/// Structural facts about the document, passed alongside the excerpt so the
/// summary can refer to the document's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuralHints {
    pub pages: usize,
    pub images: usize,
    pub tables: usize,
    /// Characters of extracted text left out of the excerpt.
    pub omitted_chars: usize,
}

/// Build the user message: hints block followed by the excerpt.
pub fn user_message(hints: &StructuralHints, excerpt: &str) -> String {
    let truncation = if hints.omitted_chars > 0 {
        format!(
            "yes ({} characters omitted from the middle/end)",
            hints.omitted_chars
        )
    } else {
        "no".to_string()
    };
    format!(
        "Document structure:\n\
         - pages: {}\n\
         - images: {}\n\
         - tables: {}\n\
         - excerpt truncated: {}\n\n\
         Document text:\n\"\"\"\n{}\n\"\"\"",
        hints.pages, hints.images, hints.tables, truncation, excerpt
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_substitutes_placeholders() {
        let p = system_prompt("Ukrainian", 300);
        assert!(p.contains("Write the summary in Ukrainian"));
        assert!(p.contains("At most 300 words"));
        assert!(!p.contains("{language}"));
        assert!(!p.contains("{words}"));
    }

    #[test]
    fn user_message_includes_hints() {
        let hints = StructuralHints {
            pages: 3,
            images: 1,
            tables: 2,
            omitted_chars: 0,
        };
        let msg = user_message(&hints, "Quarterly revenue grew.");
        assert!(msg.contains("pages: 3"));
        assert!(msg.contains("images: 1"));
        assert!(msg.contains("tables: 2"));
        assert!(msg.contains("excerpt truncated: no"));
        assert!(msg.contains("Quarterly revenue grew."));
    }

    #[test]
    fn user_message_reports_truncation() {
        let hints = StructuralHints {
            pages: 90,
            images: 0,
            tables: 0,
            omitted_chars: 4_200,
        };
        assert!(user_message(&hints, "x").contains("4200 characters omitted"));
    }
}
