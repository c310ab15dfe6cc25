//! Source adapter contract and registry.
//!
//! Each concrete adapter is registered independently by
//! `build_default_adapter_registry`; a construction failure for one adapter
//! logs a warning but does not prevent the others from registering.

mod anthology;
mod blog_graphql;
pub mod classify;
pub mod filename;
mod lab_scraper;
mod oai_pmh;
mod openreview;
mod preprint;

pub use anthology::AnthologyAdapter;
pub use blog_graphql::BlogAdapter;
pub use lab_scraper::LabBlogAdapter;
pub use oai_pmh::ConferenceFeedAdapter;
pub use openreview::ReviewPlatformAdapter;
pub use preprint::PreprintAdapter;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("malformed response from source: {0}")]
    MalformedResponse(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single search result from an adapter, prior to relevance filtering and
/// dedup. Every adapter exposes exactly two operations: `search` and
/// `download`.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub source_id: String,
    pub title: String,
    pub authors: String,
    pub published_date: Option<String>,
    pub abstract_text: String,
    pub source_url: String,
    pub pdf_url: Option<String>,
    pub language: Option<String>,
}

/// Cooperative cancellation: checked between candidates and before network
/// calls.
pub type CancelSignal = tokio::sync::watch::Receiver<bool>;

#[must_use]
pub fn is_cancelled(signal: &CancelSignal) -> bool {
    *signal.borrow()
}

/// The uniform contract every source implements.
///
/// Uses `async_trait`: dynamic dispatch via `Box<dyn SourceAdapter>`
/// requires it, since native async trait methods are not object-safe.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable display/identity name, used for staging subdirectories, the
    /// worker registry, and rollback's `source` matching.
    fn name(&self) -> &str;

    async fn search(
        &self,
        query: &str,
        start_date: Option<&str>,
        max_results: u32,
        cancel: &CancelSignal,
    ) -> Result<Vec<Candidate>, AdapterError>;

    /// Downloads the candidate's artifact into `staging_dir`, returning the
    /// path it was written to. Idempotent: if a file already exists at the
    /// computed path, returns that path without re-downloading.
    async fn download(
        &self,
        candidate: &Candidate,
        staging_dir: &std::path::Path,
    ) -> Result<std::path::PathBuf, AdapterError>;
}

/// Builds the default adapter registry, one entry per configured source.
/// Adapters disabled via configuration, or that fail to construct (e.g. a
/// malformed base URL), are skipped with a warning rather than aborting the
/// whole registry.
#[must_use]
pub fn build_default_adapter_registry(config: &Config) -> HashMap<String, Box<dyn SourceAdapter>> {
    let mut registry: HashMap<String, Box<dyn SourceAdapter>> = HashMap::new();

    let enabled = |name: &str| config.adapters.get(name).is_none_or(|a| a.enabled);

    if enabled("preprint") {
        registry.insert("preprint".to_string(), Box::new(PreprintAdapter::new()));
    }
    if enabled("blog") {
        registry.insert("blog".to_string(), Box::new(BlogAdapter::new()));
    }
    if enabled("conference_feed") {
        match ConferenceFeedAdapter::new() {
            Ok(adapter) => {
                registry.insert("conference_feed".to_string(), Box::new(adapter));
            }
            Err(error) => warn!(%error, "conference feed adapter unavailable"),
        }
    }
    if enabled("review_platform") {
        registry.insert("review_platform".to_string(), Box::new(ReviewPlatformAdapter::new()));
    }
    if enabled("anthology") {
        registry.insert("anthology".to_string(), Box::new(AnthologyAdapter::new()));
    }
    if enabled("lab_blogs") {
        registry.insert("lab_blogs".to_string(), Box::new(LabBlogAdapter::new()));
    }

    registry
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn registry_includes_all_enabled_adapters_by_default() {
        let config = Config::default();
        let registry = build_default_adapter_registry(&config);
        assert_eq!(registry.len(), 6);
    }

    #[test]
    fn registry_skips_disabled_adapters() {
        let mut config = Config::default();
        config.adapters.insert(
            "blog".to_string(),
            crate::config::AdapterConfig { enabled: false, ..Default::default() },
        );
        let registry = build_default_adapter_registry(&config);
        assert!(!registry.contains_key("blog"));
        assert_eq!(registry.len(), 5);
    }
}
