//! Paper dedup/merge repository.
//!
//! Grounded on `original_source/src/storage.py`'s `add_paper` / merge /
//! `rollback_source` logic. The rollback return type is a new
//! `RollbackResult` rather than either inconsistent shape found across the
//! retrieved Python sources — see DESIGN.md Open Question 4.

use std::path::PathBuf;

use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::hashing::{normalize_title, normalize_url, stable_hash};
use super::StorageError;

/// Sentinel `pdf_path` marking a paper the user rejected; retained so its
/// hash keeps suppressing rediscovery. See DESIGN.md Open Question 1.
pub const REJECTED_SENTINEL: &str = "REJECTED";

#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub id: i64,
    pub paper_hash: i64,
    pub title_hash: i64,
    pub title: String,
    pub abstract_text: String,
    pub authors: String,
    pub published_date: Option<String>,
    pub pdf_path: String,
    pub source_url: String,
    pub downloaded_date: Option<String>,
    pub source: String,
    pub synced_to_cloud: bool,
    pub language: Option<String>,
    pub category: Option<String>,
    pub run_id: Option<String>,
}

/// A new paper to insert or merge, as produced by a worker.
#[derive(Debug, Clone)]
pub struct NewPaper {
    pub title: String,
    pub abstract_text: String,
    pub authors: String,
    pub published_date: Option<String>,
    pub pdf_path: String,
    pub source_url: String,
    pub source: String,
    pub downloaded_date: Option<String>,
    pub language: Option<String>,
    pub category: Option<String>,
    pub run_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
    pub deleted_paths: Vec<PathBuf>,
    pub affected_rows: u64,
}

fn row_to_paper(row: &sqlx::sqlite::SqliteRow) -> Paper {
    Paper {
        id: row.get("id"),
        paper_hash: row.get::<Option<i64>, _>("paper_hash").unwrap_or(0),
        title_hash: row.get("title_hash"),
        title: row.get("title"),
        abstract_text: row.get("abstract"),
        authors: row.get("authors"),
        published_date: row.get("published_date"),
        pdf_path: row.get("pdf_path"),
        source_url: row.get("source_url"),
        downloaded_date: row.get("downloaded_date"),
        source: row.get("source"),
        synced_to_cloud: row.get::<i64, _>("synced_to_cloud") != 0,
        language: row.get("language"),
        category: row.get("category"),
        run_id: row.get("run_id"),
    }
}

/// Repository of `Paper` rows against a single `Database`'s pool.
pub struct PaperStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PaperStore<'a> {
    #[must_use]
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new paper, or merges it into an existing row if its URL
    /// hash or (title, abstract-prefix) pair already exists. Returns the
    /// id of the resulting row either way.
    #[instrument(skip(self, paper), fields(title = %paper.title))]
    pub async fn add_paper(&self, paper: NewPaper) -> Result<i64, StorageError> {
        let normalized_url = normalize_url(&paper.source_url);
        let paper_hash = stable_hash(&normalized_url);
        let title_hash = stable_hash(&normalize_title(&paper.title));

        if paper_hash != 0 {
            if let Some(existing) = self.find_by_paper_hash(paper_hash).await? {
                self.merge_into(&existing, &paper, &normalized_url).await?;
                return Ok(existing.id);
            }
        }

        if let Some(existing) = self.find_title_match(title_hash, &paper).await? {
            self.merge_into(&existing, &paper, &normalized_url).await?;
            return Ok(existing.id);
        }

        // A paper_hash of 0 means the source URL was empty; store NULL so
        // SQLite's UNIQUE index doesn't collide two URL-less papers (NULL,
        // unlike 0, is never considered equal to another NULL under UNIQUE).
        let stored_hash = if paper_hash == 0 { None } else { Some(paper_hash) };

        let row_id: (i64,) = sqlx::query_as(
            "INSERT INTO papers (paper_hash, title_hash, title, abstract, authors, \
             published_date, pdf_path, source_url, downloaded_date, source, \
             synced_to_cloud, language, category, run_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?) RETURNING id",
        )
        .bind(stored_hash)
        .bind(title_hash)
        .bind(&paper.title)
        .bind(&paper.abstract_text)
        .bind(&paper.authors)
        .bind(&paper.published_date)
        .bind(&paper.pdf_path)
        .bind(&paper.source_url)
        .bind(&paper.downloaded_date)
        .bind(&paper.source)
        .bind(&paper.language)
        .bind(&paper.category)
        .bind(&paper.run_id)
        .fetch_one(self.pool)
        .await?;

        Ok(row_id.0)
    }

    async fn find_by_paper_hash(&self, paper_hash: i64) -> Result<Option<Paper>, StorageError> {
        let row = sqlx::query("SELECT * FROM papers WHERE paper_hash = ?")
            .bind(paper_hash)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_paper))
    }

    async fn find_title_match(
        &self,
        title_hash: i64,
        candidate: &NewPaper,
    ) -> Result<Option<Paper>, StorageError> {
        let rows = sqlx::query("SELECT * FROM papers WHERE title_hash = ?")
            .bind(title_hash)
            .fetch_all(self.pool)
            .await?;

        for row in &rows {
            let existing = row_to_paper(row);
            if existing.title.eq_ignore_ascii_case(&candidate.title)
                && abstract_prefix_matches(&existing.abstract_text, &candidate.abstract_text)
            {
                return Ok(Some(existing));
            }
        }
        Ok(None)
    }

    /// Non-destructive merge: extends `source`/`source_url` with the new
    /// adapter/URL if not already present. Never overwrites title,
    /// abstract, or `pdf_path`.
    async fn merge_into(
        &self,
        existing: &Paper,
        incoming: &NewPaper,
        normalized_incoming_url: &str,
    ) -> Result<(), StorageError> {
        let mut sources: Vec<String> =
            existing.source.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        if !sources.iter().any(|s| s.eq_ignore_ascii_case(&incoming.source)) {
            sources.push(incoming.source.clone());
        }

        let mut urls: Vec<String> =
            existing.source_url.split(';').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        let already_present = urls.iter().any(|u| normalize_url(u) == normalized_incoming_url);
        if !already_present && !incoming.source_url.is_empty() {
            urls.push(incoming.source_url.clone());
        }

        sqlx::query("UPDATE papers SET source = ?, source_url = ? WHERE id = ?")
            .bind(sources.join(", "))
            .bind(urls.join(";"))
            .bind(existing.id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_latest_date(&self) -> Result<Option<String>, StorageError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT MAX(published_date) FROM papers")
                .fetch_optional(self.pool)
                .await?;
        Ok(row.and_then(|(d,)| d))
    }

    pub async fn get_papers_by_run_id(&self, run_id: &str) -> Result<Vec<Paper>, StorageError> {
        let rows = sqlx::query("SELECT * FROM papers WHERE run_id = ?")
            .bind(run_id)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.iter().map(row_to_paper).collect())
    }

    pub async fn get_unsynced(&self) -> Result<Vec<Paper>, StorageError> {
        let rows = sqlx::query("SELECT * FROM papers WHERE synced_to_cloud = 0 AND pdf_path != ''")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.iter().map(row_to_paper).collect())
    }

    pub async fn mark_synced(&self, ids: &[i64]) -> Result<(), StorageError> {
        for id in ids {
            sqlx::query("UPDATE papers SET synced_to_cloud = 1 WHERE id = ?")
                .bind(id)
                .execute(self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn update_pdf_path(&self, paper_hash: i64, new_path: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE papers SET pdf_path = ?, synced_to_cloud = 1 WHERE paper_hash = ?")
            .bind(new_path)
            .bind(paper_hash)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Same as `update_pdf_path`, but keyed on the row's primary key rather
    /// than `paper_hash`. Needed for URL-less papers, whose `paper_hash` is
    /// stored as `NULL` and so can never be matched back via the hash.
    pub async fn update_pdf_path_by_id(&self, id: i64, new_path: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE papers SET pdf_path = ?, synced_to_cloud = 1 WHERE id = ?")
            .bind(new_path)
            .bind(id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Looks up a paper by its current `pdf_path` (the staging location a
    /// worker wrote it to). Used by the commit step to find the row a
    /// staged file belongs to before rewriting its path to the library.
    pub async fn find_by_pdf_path(&self, pdf_path: &str) -> Result<Option<Paper>, StorageError> {
        let row = sqlx::query("SELECT * FROM papers WHERE pdf_path = ?")
            .bind(pdf_path)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_paper))
    }

    pub async fn exists_by_url(&self, url: &str) -> Result<bool, StorageError> {
        let hash = stable_hash(&normalize_url(url));
        if hash == 0 {
            return Ok(false);
        }
        let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM papers WHERE paper_hash = ?")
            .bind(hash)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Deletes or detaches rows produced by `source_name` at or after
    /// `started_at`. Rows solely owned by the source are deleted and their
    /// `pdf_path` returned for filesystem cleanup; multi-source rows are
    /// detached (the source name and its URL stripped) but kept.
    #[instrument(skip(self))]
    pub async fn rollback_source(
        &self,
        source_name: &str,
        started_at: &str,
    ) -> Result<RollbackResult, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM papers WHERE source LIKE ? AND (downloaded_date IS NULL OR downloaded_date >= ?)",
        )
        .bind(format!("%{source_name}%"))
        .bind(started_at)
        .fetch_all(self.pool)
        .await?;

        let mut result = RollbackResult::default();

        for row in &rows {
            let paper = row_to_paper(row);
            let sources: Vec<&str> = paper.source.split(',').map(str::trim).collect();
            let is_sole_owner = sources.len() == 1 && sources[0].eq_ignore_ascii_case(source_name);

            if is_sole_owner {
                sqlx::query("DELETE FROM papers WHERE id = ?")
                    .bind(paper.id)
                    .execute(self.pool)
                    .await?;
                if !paper.pdf_path.is_empty() && paper.pdf_path != REJECTED_SENTINEL {
                    result.deleted_paths.push(PathBuf::from(paper.pdf_path));
                }
                result.affected_rows += 1;
            } else {
                let remaining: Vec<&str> =
                    sources.into_iter().filter(|s| !s.eq_ignore_ascii_case(source_name)).collect();
                sqlx::query("UPDATE papers SET source = ? WHERE id = ?")
                    .bind(remaining.join(", "))
                    .bind(paper.id)
                    .execute(self.pool)
                    .await?;
                result.affected_rows += 1;
            }
        }

        Ok(result)
    }
}

fn abstract_prefix_matches(a: &str, b: &str) -> bool {
    let norm = |s: &str| normalize_title(s);
    let a = norm(a);
    let b = norm(b);
    let len = a.len().min(b.len()).min(500);
    a.get(..len) == b.get(..len)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::storage::Database;

    fn sample(title: &str, url: &str, source: &str) -> NewPaper {
        NewPaper {
            title: title.to_string(),
            abstract_text: "an abstract about methods and results".to_string(),
            authors: "A. Author".to_string(),
            published_date: None,
            pdf_path: String::new(),
            source_url: url.to_string(),
            source: source.to_string(),
            downloaded_date: None,
            language: None,
            category: None,
            run_id: Some("run-1".to_string()),
        }
    }

    #[tokio::test]
    async fn p1_unique_paper_hash_enforced_via_merge() {
        let db = Database::new_in_memory().await.expect("db");
        let store = PaperStore::new(db.pool());

        let id1 = store
            .add_paper(sample("T", "http://example.com/x?utm_source=foo", "A"))
            .await
            .expect("insert");
        let id2 = store
            .add_paper(sample("T", "https://example.com/x", "B"))
            .await
            .expect("merge");

        assert_eq!(id1, id2);
        let rows = store.get_papers_by_run_id("run-1").await.expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "A, B");
        assert_eq!(rows[0].source_url.split(';').count(), 2);
    }

    #[tokio::test]
    async fn s5_rollback_deletes_sole_owned_rows_and_detaches_shared_rows() {
        let db = Database::new_in_memory().await.expect("db");
        let store = PaperStore::new(db.pool());

        store.add_paper(sample("Solo One", "https://example.com/1", "S")).await.expect("insert");
        store.add_paper(sample("Solo Two", "https://example.com/2", "S")).await.expect("insert");
        let shared_id = store.add_paper(sample("Shared", "https://example.com/3", "S")).await.expect("insert");
        store.add_paper(sample("Shared", "https://example.com/3", "T")).await.expect("merge");

        let result = store.rollback_source("S", "1970-01-01").await.expect("rollback");
        assert_eq!(result.affected_rows, 3);

        let remaining = store.get_papers_by_run_id("run-1").await.expect("query");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, shared_id);
        assert_eq!(remaining[0].source, "T");
    }

    #[tokio::test]
    async fn rejected_sentinel_is_not_returned_for_filesystem_deletion() {
        let db = Database::new_in_memory().await.expect("db");
        let store = PaperStore::new(db.pool());
        let mut paper = sample("Rejected Paper", "https://example.com/rej", "S");
        paper.pdf_path = REJECTED_SENTINEL.to_string();
        store.add_paper(paper).await.expect("insert");

        let result = store.rollback_source("S", "1970-01-01").await.expect("rollback");
        assert!(result.deleted_paths.is_empty());
    }
}
