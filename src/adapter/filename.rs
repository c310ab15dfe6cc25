//! Filename sanitization shared by every adapter.
//!
//! Grounded on `original_source/src/utils.py`'s `to_title_case` and
//! `sanitize_filename`, rewritten as small pure functions rather than
//! translated line-for-line.

use std::collections::HashSet;

const MAX_FILENAME_LEN: usize = 150;
const FALLBACK_TITLE: &str = "Untitled Paper";
const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '_'];

const MINOR_WORDS: &[&str] = &[
    "a", "an", "the", "and", "but", "for", "at", "by", "from", "in", "into", "of", "off", "on",
    "onto", "out", "over", "up", "with", "as", "to",
];

const ACRONYMS: &[&str] = &[
    "AI", "AGI", "LLM", "LLMS", "NLP", "RL", "RLHF", "ML", "GPT", "GAN", "KBQA", "SQL", "GUI",
    "API", "RAG",
];

/// Title-Cases `text`, preserving a fixed acronym list and lowercasing
/// minor words unless they're the first or last word.
#[must_use]
pub fn to_title_case(text: &str) -> String {
    let acronyms: HashSet<&str> = ACRONYMS.iter().copied().collect();
    let minor: HashSet<&str> = MINOR_WORDS.iter().copied().collect();

    let normalized = text.replace(['|', '*', '~', '_', '-'], " ");
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let last_index = words.len().saturating_sub(1);

    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let stripped: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
            let upper = stripped.to_uppercase();

            if !stripped.is_empty() && acronyms.contains(upper.as_str()) {
                return capitalize_acronym(word, &upper);
            }

            if is_mostly_uppercase(word) {
                return (*word).to_string();
            }

            let lower = word.to_lowercase();
            if i != 0 && i != last_index && minor.contains(lower.as_str()) {
                return lower;
            }

            capitalize_word(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize_acronym(original: &str, upper: &str) -> String {
    // Preserve any leading/trailing punctuation around the bare word.
    let start = original.find(|c: char| c.is_alphanumeric()).unwrap_or(0);
    let end = original.rfind(|c: char| c.is_alphanumeric()).map_or(original.len(), |i| i + 1);
    format!("{}{}{}", &original[..start], upper, &original[end..])
}

fn is_mostly_uppercase(word: &str) -> bool {
    let uppercase_count = word.chars().filter(|c| c.is_uppercase()).count();
    uppercase_count > 1 && word.chars().filter(|c| c.is_alphabetic()).count() > 1
}

fn capitalize_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

/// Strips reserved filesystem characters, collapses whitespace, truncates
/// to 150 characters, and appends the extension (with leading `.`).
#[must_use]
pub fn sanitize_filename(title: &str, extension: &str) -> String {
    let title_cased = to_title_case(title);
    let stripped: String =
        title_cased.chars().map(|c| if RESERVED_CHARS.contains(&c) { ' ' } else { c }).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_FILENAME_LEN).collect();
    let trimmed = truncated.trim();

    let base = if trimmed.is_empty() { FALLBACK_TITLE } else { trimmed };
    if extension.is_empty() {
        base.to_string()
    } else {
        format!("{base}{extension}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_simple_sentence() {
        assert_eq!(to_title_case("attention is all you need"), "Attention Is All You Need");
    }

    #[test]
    fn preserves_known_acronyms() {
        assert_eq!(to_title_case("llm safety and rlhf"), "LLM Safety and RLHF");
    }

    #[test]
    fn lowercases_minor_words_except_first_and_last() {
        assert_eq!(to_title_case("the art of the deal"), "The Art of the Deal");
    }

    #[test]
    fn sanitize_strips_reserved_chars() {
        let got = sanitize_filename("Report: A/B <Test>", ".pdf");
        assert!(!got.contains(['<', '>', ':', '/']));
        assert!(got.ends_with(".pdf"));
    }

    #[test]
    fn sanitize_truncates_long_titles() {
        let long_title = "word ".repeat(100);
        let got = sanitize_filename(&long_title, ".pdf");
        assert!(got.len() <= MAX_FILENAME_LEN + ".pdf".len());
    }

    #[test]
    fn sanitize_falls_back_for_empty_title() {
        assert_eq!(sanitize_filename("   ", ".pdf"), "Untitled Paper.pdf");
    }
}
