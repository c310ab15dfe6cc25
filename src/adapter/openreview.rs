//! The reviewing-platform adapter: a JSON search API plus attached-PDF
//! download.
//!
//! No direct original_source counterpart; grounded on the `BaseSearcher`
//! contract and the plain-JSON `reqwest` + `serde::Deserialize` pattern
//! used by the other JSON-backed adapters in this module.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use super::filename::sanitize_filename;
use super::{AdapterError, CancelSignal, Candidate, SourceAdapter, is_cancelled};

const SEARCH_URL: &str = "https://review-platform.example.org/api/notes/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    notes: Vec<Note>,
}

#[derive(Debug, Deserialize)]
struct Note {
    id: String,
    content: NoteContent,
    #[serde(rename = "pdate")]
    publication_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NoteContent {
    title: String,
    #[serde(default)]
    authors: Vec<String>,
    abstract_field: Option<String>,
    pdf: Option<String>,
}

pub struct ReviewPlatformAdapter {
    client: Client,
}

impl ReviewPlatformAdapter {
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

impl Default for ReviewPlatformAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for ReviewPlatformAdapter {
    fn name(&self) -> &str {
        "review_platform"
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

        let mut params = vec![("term", query.to_string()), ("limit", max_results.to_string())];
        if let Some(start) = start_date {
            params.push(("after", start.to_string()));
        }

        let response: SearchResponse =
            self.client.get(SEARCH_URL).query(&params).send().await?.json().await?;

        Ok(response
            .notes
            .into_iter()
            .map(|note| {
                let url = format!("https://review-platform.example.org/forum?id={}", note.id);
                Candidate {
                    source_id: note.id,
                    title: note.content.title,
                    authors: note.content.authors.join(", "),
                    published_date: note.publication_date,
                    abstract_text: note.content.abstract_field.unwrap_or_default(),
                    pdf_url: note.content.pdf,
                    source_url: url,
                    language: None,
                }
            })
            .collect())
    }

    #[instrument(skip(self, candidate))]
    async fn download(
        &self,
        candidate: &Candidate,
        staging_dir: &Path,
    ) -> Result<PathBuf, AdapterError> {
        let Some(pdf_path) = &candidate.pdf_url else {
            return Err(AdapterError::Download("note has no attached pdf".to_string()));
        };
        let pdf_url = format!("https://review-platform.example.org{pdf_path}");

        let filename = sanitize_filename(&candidate.title, ".pdf");
        let category_dir = staging_dir.join(super::classify::classify(
            &candidate.title,
            &candidate.abstract_text,
            &candidate.authors,
        ));
        tokio::fs::create_dir_all(&category_dir).await?;
        let target = category_dir.join(&filename);
        if target.exists() {
            return Ok(target);
        }

        let bytes = self.client.get(&pdf_url).send().await?.bytes().await?;
        tokio::fs::write(&target, &bytes).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_name_is_review_platform() {
        assert_eq!(ReviewPlatformAdapter::new().name(), "review_platform");
    }
}
