//! The relevance filter: a boolean query engine plus content heuristics.
//!
//! Grounded on `original_source/src/filter.py`'s `FilterManager` baseline
//! (parenthesized OR-groups joined by AND, an ANDNOT exclusion section),
//! extended with a built-in exclusion list, an aggregator heuristic, a
//! marketing heuristic, and a proximity check between adjacent required
//! groups.

mod defaults;
mod query;

pub use query::{Query, Term};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unbalanced parentheses in query")]
    UnbalancedParens,
    #[error("unbalanced quotes in query")]
    UnbalancedQuotes,
    #[error("empty group in query")]
    EmptyGroup,
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),
    #[error("query must contain at least one quoted inclusion term")]
    NoInclusionTerm,
    #[error("query must not start with ANDNOT")]
    StartsWithAndNot,
}

/// A compiled relevance filter for one query string.
#[derive(Debug, Clone)]
pub struct RelevanceFilter {
    query: Query,
    /// Maximum character distance allowed between adjacent required-group
    /// hits for the proximity check. Defaults to 10,000.
    max_distance: usize,
}

impl RelevanceFilter {
    pub fn new(query_text: &str) -> Result<Self, FilterError> {
        let query = query::parse(query_text)?;
        Ok(Self { query, max_distance: 10_000 })
    }

    #[must_use]
    pub fn with_max_distance(mut self, max_distance: usize) -> Self {
        self.max_distance = max_distance;
        self
    }

    /// Decides whether a candidate (by title/abstract) is relevant. Checks
    /// run in order; the first failing check short-circuits.
    #[must_use]
    pub fn is_relevant(&self, title: &str, abstract_text: &str) -> bool {
        let content = format!("{} {}", title, abstract_text).to_lowercase();

        if defaults::DEFAULT_EXCLUDED.iter().any(|phrase| content.contains(phrase)) {
            return false;
        }

        if is_aggregator(title, abstract_text, &content) {
            return false;
        }

        if is_marketing(title, abstract_text, &content) {
            return false;
        }

        if self.query.user_excluded.iter().any(|term| content.contains(&term.to_lowercase())) {
            return false;
        }

        if !self.query.required_groups.iter().all(|group| {
            group.iter().any(|term| content.contains(&term.to_lowercase()))
        }) {
            return false;
        }

        self.proximity_satisfied(&content)
    }

    fn proximity_satisfied(&self, content: &str) -> bool {
        if self.query.required_groups.len() < 2 {
            return true;
        }
        for window in self.query.required_groups.windows(2) {
            let positions_a = term_positions(content, &window[0]);
            let positions_b = term_positions(content, &window[1]);
            if positions_a.is_empty() || positions_b.is_empty() {
                // already guaranteed non-empty by the required_groups check,
                // but guard defensively.
                return false;
            }
            let close_enough = positions_a.iter().any(|&a| {
                positions_b.iter().any(|&b| a.abs_diff(b) <= self.max_distance)
            });
            if !close_enough {
                return false;
            }
        }
        true
    }
}

fn term_positions(content: &str, group: &[String]) -> Vec<usize> {
    let mut positions = Vec::new();
    for term in group {
        let needle = term.to_lowercase();
        let mut start = 0;
        while let Some(idx) = content[start..].find(&needle) {
            positions.push(start + idx);
            start += idx + needle.len().max(1);
        }
    }
    positions
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn url_density(text: &str) -> f64 {
    let total = word_count(text).max(1);
    let url_like = text
        .split_whitespace()
        .filter(|w| w.starts_with("http://") || w.starts_with("https://") || w.starts_with("www."))
        .count();
    url_like as f64 / total as f64
}

fn url_count(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.starts_with("http://") || w.starts_with("https://") || w.starts_with("www."))
        .count()
}

fn list_marker_count(text: &str) -> usize {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            trimmed.starts_with('-')
                || trimmed.starts_with('*')
                || trimmed.split('.').next().is_some_and(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
        })
        .count()
}

fn is_aggregator(title: &str, abstract_text: &str, content: &str) -> bool {
    let title_lower = title.to_lowercase();
    let words = word_count(abstract_text);

    let research_exempt = words >= 150
        && defaults::RESEARCH_INDICATOR_WORDS
            .iter()
            .filter(|w| content.contains(*w))
            .count()
            >= 3;
    if research_exempt {
        return false;
    }

    let title_roundup = defaults::AGGREGATOR_TITLE_MARKERS.iter().any(|m| title_lower.contains(m))
        && abstract_text.len() < 100;
    let dense_short = words < 300 && url_density(abstract_text) > 0.40;
    let many_links = words < 500 && url_count(abstract_text) >= 10 && list_marker_count(abstract_text) >= 5;

    title_roundup || dense_short || many_links
}

fn is_marketing(title: &str, abstract_text: &str, content: &str) -> bool {
    let marketing_hits = defaults::MARKETING_PHRASES.iter().filter(|p| content.contains(**p)).count();
    if marketing_hits >= 2 {
        return true;
    }

    let title_lower = title.to_lowercase();
    let has_verb = defaults::ANNOUNCEMENT_VERBS.iter().any(|v| title_lower.contains(v));
    let has_noun = defaults::ANNOUNCEMENT_NOUNS.iter().any(|n| title_lower.contains(n));
    has_verb && has_noun && word_count(abstract_text) < 150
}
