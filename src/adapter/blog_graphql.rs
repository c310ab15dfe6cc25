//! The community blog adapter, queried via GraphQL.
//!
//! No direct original_source counterpart exists for this adapter (the
//! Python pack only implements the preprint searcher in full); grounded
//! instead on the `BaseSearcher` contract (`searchers/base.py`) and
//! `graphql_client`'s `Response<T>` envelope, used here without a
//! macro-generated query type since the service's schema isn't vendored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use graphql_client::Response;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::filename::sanitize_filename;
use super::{AdapterError, CancelSignal, Candidate, SourceAdapter, is_cancelled};

const ENDPOINT: &str = "https://blog.example.org/graphql";
const QUERY: &str = r"
query SearchPosts($query: String!, $since: String, $first: Int!) {
  searchPosts(query: $query, since: $since, first: $first) {
    id
    title
    excerpt
    authorNames
    publishedAt
    url
  }
}
";

#[derive(Debug, Serialize)]
struct SearchPostsVariables<'a> {
    query: &'a str,
    since: Option<&'a str>,
    first: i64,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: SearchPostsVariables<'a>,
}

#[derive(Debug, Deserialize)]
struct SearchPostsData {
    #[serde(rename = "searchPosts")]
    search_posts: Vec<BlogPost>,
}

#[derive(Debug, Deserialize)]
struct BlogPost {
    id: String,
    title: String,
    excerpt: String,
    #[serde(rename = "authorNames", default)]
    author_names: Vec<String>,
    #[serde(rename = "publishedAt")]
    published_at: Option<String>,
    url: String,
}

pub struct BlogAdapter {
    client: Client,
}

impl BlogAdapter {
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

impl Default for BlogAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for BlogAdapter {
    fn name(&self) -> &str {
        "blog"
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

        let body = GraphQlRequest {
            query: QUERY,
            variables: SearchPostsVariables { query, since: start_date, first: i64::from(max_results) },
        };

        let response: Response<SearchPostsData> =
            self.client.post(ENDPOINT).json(&body).send().await?.json().await?;

        if let Some(errors) = response.errors {
            if !errors.is_empty() {
                return Err(AdapterError::MalformedResponse(
                    errors.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; "),
                ));
            }
        }

        let data = response.data.ok_or_else(|| {
            AdapterError::MalformedResponse("graphql response had no data".to_string())
        })?;

        Ok(data
            .search_posts
            .into_iter()
            .map(|post| Candidate {
                source_id: post.id,
                title: post.title,
                authors: post.author_names.join(", "),
                published_date: post.published_at,
                abstract_text: post.excerpt,
                pdf_url: None,
                source_url: post.url,
                language: None,
            })
            .collect())
    }

    #[instrument(skip(self, candidate))]
    async fn download(
        &self,
        candidate: &Candidate,
        staging_dir: &Path,
    ) -> Result<PathBuf, AdapterError> {
        // The blog has no direct PDF; persist the rendered page body as the
        // artifact. A richer renderer can replace this file in place later.
        let filename = sanitize_filename(&candidate.title, ".html");
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

        let body = self.client.get(&candidate.source_url).send().await?.text().await?;
        tokio::fs::write(&target, body).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_name_is_blog() {
        assert_eq!(BlogAdapter::new().name(), "blog");
    }
}
