//! Per-source worker loop.
//!
//! Grounded on `original_source/src/worker.py`, generalized across all six
//! adapters instead of one. Runs as a `tokio::task` rather than an OS
//! process (see DESIGN.md Open Question 5).

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::adapter::{AdapterError, CancelSignal, SourceAdapter, is_cancelled};
use crate::bus::{BusMessage, ProgressBus, RunMode};
use crate::config::Config;
use crate::filter::RelevanceFilter;
use crate::storage::{Database, NewPaper};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("backfill run for {source} produced zero new papers and zero duplicates")]
    BackfillEmpty { source: String },
}

pub struct WorkerParams {
    pub query: String,
    pub start_date: Option<String>,
    pub run_id: String,
    pub mode: RunMode,
    pub max_per_agent: Option<u32>,
    pub per_query_limit: u32,
}

pub struct WorkerOutcome {
    pub found: u32,
    pub kept: u32,
    pub downloaded: u32,
    pub duplicates: u32,
}

/// Runs one adapter's worker to completion. Errors are returned to the
/// caller (the supervisor), which is responsible for emitting `ERROR` and
/// applying the retry/rollback policy — this function itself only emits
/// non-terminal progress via the bus.
#[instrument(skip(adapter, filter, db, bus, cancel, params), fields(source = adapter.name()))]
pub async fn run_worker(
    adapter: Arc<dyn SourceAdapter>,
    filter: Arc<RelevanceFilter>,
    db: Arc<Database>,
    config: Arc<Config>,
    bus: ProgressBus,
    cancel: CancelSignal,
    params: WorkerParams,
) -> Result<WorkerOutcome, WorkerError> {
    let source = adapter.name().to_string();
    bus.update_row(&source, "Running", Some(&params.run_id)).await;

    let candidates =
        adapter.search(&params.query, params.start_date.as_deref(), params.per_query_limit, &cancel).await?;
    let found = candidates.len() as u32;
    bus.send(BusMessage::UpdateRow {
        source: source.clone(),
        status: "Running".to_string(),
        count: Some(found),
        details: Some(format!("found {found}")),
        run_id: Some(params.run_id.clone()),
        mode: Some(params.mode.to_string()),
    })
    .await;

    let kept: Vec<_> = candidates.into_iter().filter(|c| filter.is_relevant(&c.title, &c.abstract_text)).collect();
    let kept_count = kept.len() as u32;
    bus.send(BusMessage::UpdateRow {
        source: source.clone(),
        status: "Running".to_string(),
        count: Some(kept_count),
        details: Some(format!("kept {kept_count}")),
        run_id: Some(params.run_id.clone()),
        mode: Some(params.mode.to_string()),
    })
    .await;

    if matches!(params.mode, RunMode::Test) {
        bus.update_row(&source, "Complete", Some(&params.run_id)).await;
        return Ok(WorkerOutcome { found, kept: kept_count, downloaded: 0, duplicates: 0 });
    }

    let store = crate::storage::PaperStore::new(db.pool());
    let mut downloaded = 0u32;
    let mut duplicates = 0u32;
    let limit = params.max_per_agent.unwrap_or(u32::MAX) as usize;

    for (i, candidate) in kept.into_iter().take(limit).enumerate() {
        if is_cancelled(&cancel) {
            break;
        }

        let library_duplicate = config.cloud_storage.check_duplicates
            && library_has_filename(&config.papers_dir, &candidate.title).await;

        if store.exists_by_url(&candidate.source_url).await? || library_duplicate {
            duplicates += 1;
        } else {
            let staging_dir = config.staging_dir.join(&source);
            let path = adapter.download(&candidate, &staging_dir).await?;
            let category = crate::adapter::classify::classify(
                &candidate.title,
                &candidate.abstract_text,
                &candidate.authors,
            );
            store
                .add_paper(NewPaper {
                    title: candidate.title,
                    abstract_text: candidate.abstract_text,
                    authors: candidate.authors,
                    published_date: candidate.published_date,
                    pdf_path: path.to_string_lossy().into_owned(),
                    source_url: candidate.source_url,
                    source: source.clone(),
                    downloaded_date: Some(params.run_id.clone()),
                    language: candidate.language,
                    category: Some(category),
                    run_id: Some(params.run_id.clone()),
                })
                .await?;
            downloaded += 1;
        }

        let details = if matches!(params.mode, RunMode::Backfill) {
            format!("New: {downloaded}, Duplicates: {duplicates}")
        } else {
            format!("Downloading ({}/{})", i + 1, limit.min(kept_count as usize))
        };
        bus.send(BusMessage::UpdateRow {
            source: source.clone(),
            status: "Running".to_string(),
            count: Some(downloaded),
            details: Some(details),
            run_id: Some(params.run_id.clone()),
            mode: Some(params.mode.to_string()),
        })
        .await;
    }

    if matches!(params.mode, RunMode::Backfill) && downloaded == 0 && duplicates == 0 {
        return Err(WorkerError::BackfillEmpty { source });
    }

    bus.update_row(&source, "Complete", Some(&params.run_id)).await;
    Ok(WorkerOutcome { found, kept: kept_count, downloaded, duplicates })
}

/// Walks the whole library tree looking for a file whose name matches the
/// title's sanitized filename under any extension an adapter downloads
/// (`.pdf` or `.html`). A second, filename-based duplicate check on top of
/// the URL-hash check in storage, catching papers moved or renamed into the
/// library by hand.
async fn library_has_filename(papers_dir: &Path, title: &str) -> bool {
    let targets = [
        crate::adapter::filename::sanitize_filename(title, ".pdf"),
        crate::adapter::filename::sanitize_filename(title, ".html"),
    ];

    let mut dirs = vec![papers_dir.to_path_buf()];
    while let Some(dir) = dirs.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else { continue };
            if file_type.is_dir() {
                dirs.push(entry.path());
            } else if entry.file_name().to_str().is_some_and(|name| targets.iter().any(|t| t == name)) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn backfill_details_format_lists_new_and_duplicate_counts() {
        // Purely a formatting check; exercised end-to-end in the worker
        // integration tests under tests/.
        let downloaded = 2;
        let duplicates = 3;
        let details = format!("New: {downloaded}, Duplicates: {duplicates}");
        assert_eq!(details, "New: 2, Duplicates: 3");
    }

    #[tokio::test]
    async fn library_has_filename_finds_match_in_nested_category_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let category_dir = dir.path().join("safety");
        std::fs::create_dir_all(&category_dir).expect("mkdir");
        std::fs::write(category_dir.join("Attention Is All You Need.pdf"), b"bytes").expect("write");

        assert!(library_has_filename(dir.path(), "Attention is all you need").await);
        assert!(!library_has_filename(dir.path(), "Some Other Paper").await);
    }
}
