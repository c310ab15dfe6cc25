//! Category classification.
//!
//! Grounded on `original_source/src/classifier.py`: a fixed content-based
//! category set, plus an author-based override to dedicated folders.

/// Fixed category set a candidate is classified into.
pub const CATEGORIES: &[&str] = &[
    "Red Teaming",
    "Alignment Research",
    "Agentic AI",
    "Consciousness",
    "Futures",
    "Taxonomy Research",
    "AI Safety (Unspecified)",
];

const DEFAULT_CATEGORY: &str = "AI Safety (Unspecified)";

struct CategoryRule {
    category: &'static str,
    keywords: &'static [&'static str],
}

const RULES: &[CategoryRule] = &[
    CategoryRule {
        category: "Red Teaming",
        keywords: &["red team", "red-team", "jailbreak", "adversarial prompt", "attack surface"],
    },
    CategoryRule {
        category: "Alignment Research",
        keywords: &["alignment", "reward hacking", "rlhf", "value learning", "corrigibility"],
    },
    CategoryRule {
        category: "Agentic AI",
        keywords: &["agentic", "autonomous agent", "tool use", "multi-agent", "agent framework"],
    },
    CategoryRule {
        category: "Consciousness",
        keywords: &["consciousness", "sentience", "phenomenal", "qualia"],
    },
    CategoryRule {
        category: "Futures",
        keywords: &["forecasting", "scenario planning", "long-term future", "existential risk"],
    },
    CategoryRule {
        category: "Taxonomy Research",
        keywords: &["taxonomy", "classification scheme", "ontology of risks"],
    },
];

/// Authors routed to a dedicated folder regardless of content, matching a
/// configured author-override list. Kept small and explicit rather than
/// configuration-driven, mirroring the fixed list in the classifier this
/// is grounded on.
const AUTHOR_OVERRIDES: &[(&str, &str)] = &[("byrnes", "Byrnes")];

/// Classifies a candidate into one of the fixed categories, by content
/// first, then by an author-based override that takes priority.
#[must_use]
pub fn classify(title: &str, abstract_text: &str, authors: &str) -> String {
    let authors_lower = authors.to_lowercase();
    for (needle, folder) in AUTHOR_OVERRIDES {
        if authors_lower.contains(needle) {
            return (*folder).to_string();
        }
    }

    let content = format!("{} {}", title, abstract_text).to_lowercase();
    for rule in RULES {
        if rule.keywords.iter().any(|k| content.contains(k)) {
            return rule.category.to_string();
        }
    }

    DEFAULT_CATEGORY.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_alignment_content() {
        assert_eq!(classify("On Reward Hacking", "a study of reward hacking", "A. Author"), "Alignment Research");
    }

    #[test]
    fn author_override_takes_priority() {
        assert_eq!(
            classify("Some neutral title", "neutral abstract", "Steven Byrnes"),
            "Byrnes"
        );
    }

    #[test]
    fn falls_back_to_default_category() {
        assert_eq!(classify("Unrelated paper", "about nothing in particular", "Nobody"), "AI Safety (Unspecified)");
    }
}
