//! The open preprint server adapter.
//!
//! Grounded on `original_source/src/searchers/arxiv_searcher.py`: a simple
//! paginated listing API returning Atom-like entries, each carrying a
//! direct PDF URL.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use super::filename::sanitize_filename;
use super::{AdapterError, CancelSignal, Candidate, SourceAdapter, is_cancelled};

const BASE_URL: &str = "https://export.arxiv.org/api/query";
const DEFAULT_PAGE_SIZE: u32 = 50;

pub struct PreprintAdapter {
    client: Client,
}

impl PreprintAdapter {
    #[must_use]
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("paperbot/0.1")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for PreprintAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, serde::Deserialize)]
struct FeedEnvelope {
    #[serde(rename = "entry", default)]
    entries: Vec<FeedEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct FeedEntry {
    title: String,
    summary: String,
    #[serde(rename = "id")]
    entry_id: String,
    #[serde(default, rename = "author")]
    authors: Vec<FeedAuthor>,
    published: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct FeedAuthor {
    name: String,
}

#[async_trait]
impl SourceAdapter for PreprintAdapter {
    fn name(&self) -> &str {
        "preprint"
    }

    #[instrument(skip(self, cancel))]
    async fn search(
        &self,
        query: &str,
        start_date: Option<&str>,
        max_results: u32,
        cancel: &CancelSignal,
    ) -> Result<Vec<Candidate>, AdapterError> {
        if is_cancelled(cancel) {
            return Ok(Vec::new());
        }

        let mut search_query = query.to_string();
        if let Some(start) = start_date {
            search_query.push_str(&format!(" AND submittedDate:[{start} TO *]"));
        }

        let response = self
            .client
            .get(BASE_URL)
            .query(&[
                ("search_query", search_query.as_str()),
                ("max_results", &max_results.min(DEFAULT_PAGE_SIZE).to_string()),
            ])
            .send()
            .await?;
        let body = response.text().await?;

        let feed: FeedEnvelope = quick_xml::de::from_str(&body)
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;

        let candidates = feed
            .entries
            .into_iter()
            .map(|entry| Candidate {
                source_id: entry.entry_id.clone(),
                title: entry.title.split_whitespace().collect::<Vec<_>>().join(" "),
                authors: entry.authors.into_iter().map(|a| a.name).collect::<Vec<_>>().join(", "),
                published_date: entry.published,
                abstract_text: entry.summary.trim().to_string(),
                pdf_url: Some(entry.entry_id.replace("/abs/", "/pdf/")),
                source_url: entry.entry_id,
                language: None,
            })
            .collect();

        Ok(candidates)
    }

    #[instrument(skip(self, candidate))]
    async fn download(
        &self,
        candidate: &Candidate,
        staging_dir: &Path,
    ) -> Result<PathBuf, AdapterError> {
        let Some(pdf_url) = &candidate.pdf_url else {
            return Err(AdapterError::Download("candidate has no pdf_url".to_string()));
        };

        let filename = sanitize_filename(&candidate.title, ".pdf");
        let category_dir = staging_dir.join(super::classify::classify(
            &candidate.title,
            &candidate.abstract_text,
            &candidate.authors,
        ));
        tokio::fs::create_dir_all(&category_dir).await?;
        let target = category_dir.join(&filename);

        if target.exists() {
            debug!(path = %target.display(), "already downloaded, skipping");
            return Ok(target);
        }

        let bytes = self.client.get(pdf_url).send().await?.bytes().await?;
        tokio::fs::write(&target, &bytes).await?;
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn adapter_name_is_preprint() {
        assert_eq!(PreprintAdapter::new().name(), "preprint");
    }
}
