//! The anthology archive adapter: a static paginated index with direct PDF
//! links.
//!
//! No direct original_source counterpart; grounded on the `BaseSearcher`
//! contract and `scraper`'s CSS-selector extraction, used here for the
//! index page rather than a full headless render (see `lab_scraper.rs` for
//! the headless-browser case this adapter doesn't need).

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::instrument;

use super::filename::sanitize_filename;
use super::{AdapterError, CancelSignal, Candidate, SourceAdapter, is_cancelled};

const INDEX_URL: &str = "https://anthology.example.org/index";

pub struct AnthologyAdapter {
    client: Client,
}

impl AnthologyAdapter {
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

impl Default for AnthologyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_index(html: &str, query: &str, max_results: usize) -> Vec<Candidate> {
    let document = Html::parse_document(html);
    let Ok(entry_selector) = Selector::parse("article.entry") else {
        return Vec::new();
    };
    let Ok(title_selector) = Selector::parse(".title") else {
        return Vec::new();
    };
    let Ok(abstract_selector) = Selector::parse(".abstract") else {
        return Vec::new();
    };
    let Ok(authors_selector) = Selector::parse(".authors") else {
        return Vec::new();
    };
    let Ok(link_selector) = Selector::parse("a.pdf-link") else {
        return Vec::new();
    };

    let query_lower = query.to_lowercase();

    document
        .select(&entry_selector)
        .filter_map(|entry| {
            let title = entry.select(&title_selector).next()?.text().collect::<String>().trim().to_string();
            let abstract_text =
                entry.select(&abstract_selector).next().map(|e| e.text().collect::<String>()).unwrap_or_default();
            let authors =
                entry.select(&authors_selector).next().map(|e| e.text().collect::<String>()).unwrap_or_default();
            let pdf_url = entry.select(&link_selector).next().and_then(|e| e.value().attr("href")).map(String::from);

            if !query.is_empty()
                && !title.to_lowercase().contains(&query_lower)
                && !abstract_text.to_lowercase().contains(&query_lower)
            {
                return None;
            }

            Some(Candidate {
                source_id: pdf_url.clone().unwrap_or_default(),
                title,
                authors,
                published_date: None,
                abstract_text,
                source_url: pdf_url.clone().unwrap_or_default(),
                pdf_url,
                language: None,
            })
        })
        .take(max_results)
        .collect()
}

#[async_trait]
impl SourceAdapter for AnthologyAdapter {
    fn name(&self) -> &str {
        "anthology"
    }

    #[instrument(skip(self, cancel))]
    async fn search(
        &self,
        query: &str,
        _start_date: Option<&str>,
        max_results: u32,
        cancel: &CancelSignal,
    ) -> Result<Vec<Candidate>, AdapterError> {
        if is_cancelled(cancel) {
            return Ok(Vec::new());
        }
        let html = self.client.get(INDEX_URL).send().await?.text().await?;
        Ok(parse_index(&html, query, max_results as usize))
    }

    #[instrument(skip(self, candidate))]
    async fn download(
        &self,
        candidate: &Candidate,
        staging_dir: &Path,
    ) -> Result<PathBuf, AdapterError> {
        let Some(pdf_url) = &candidate.pdf_url else {
            return Err(AdapterError::Download("entry has no pdf link".to_string()));
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
            return Ok(target);
        }

        let bytes = self.client.get(pdf_url).send().await?.bytes().await?;
        tokio::fs::write(&target, &bytes).await?;
        Ok(target)
    }
}
