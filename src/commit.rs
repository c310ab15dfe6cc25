//! Two-stage commit: staged PDFs are promoted into the library and the
//! working database is merged into the production store.
//!
//! Grounded on `original_source/src/staging.py` (conflict resolution) and
//! `original_source/src/cloud_transfer.py` (backup archive), built with a
//! move-then-verify discipline: the database pointer is only updated after
//! the filesystem move succeeds.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument, warn};
use zip::write::SimpleFileOptions;

use crate::config::Config;
use crate::storage::{Database, PaperStore};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("commit cancelled by user")]
    Cancelled,
}

/// How to handle a staged file whose library target already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Overwrite,
    Skip,
    CancelAll,
}

/// Caller-supplied resolver asked once per conflicting path; returning
/// `CancelAll` aborts the remainder of the commit, leaving already-moved
/// files in place (the commit is not atomic across files, only the
/// database write per file is).
pub trait ConflictResolver {
    fn resolve(&mut self, staged: &Path, target: &Path) -> ConflictPolicy;
}

/// Resolves every conflict the same way; useful for `--force` CLI flags and
/// for tests.
pub struct FixedPolicy(pub ConflictPolicy);

impl ConflictResolver for FixedPolicy {
    fn resolve(&mut self, _staged: &Path, _target: &Path) -> ConflictPolicy {
        self.0
    }
}

#[derive(Debug, Default, Clone)]
pub struct CommitReport {
    pub moved: u32,
    pub overwritten: u32,
    pub skipped: u32,
    pub cancelled: bool,
}

/// Walks `staging_dir`, moves each file into `papers_dir/<category>/...`,
/// and updates the production store's `pdf_path`/`synced_to_cloud` for the
/// matching row. A working copy merge is the caller's responsibility
/// (typically a prior `sqlx` attach/copy step against `working_db`); this
/// function only handles the filesystem promotion + pointer update half of
/// the two-stage commit.
#[instrument(skip(db, resolver))]
pub async fn commit_staging(
    config: &Config,
    db: &Database,
    resolver: &mut dyn ConflictResolver,
) -> Result<CommitReport, CommitError> {
    let store = PaperStore::new(db.pool());
    let mut report = CommitReport::default();

    let mut categories = tokio::fs::read_dir(&config.staging_dir).await?;
    let mut staged_files = Vec::new();
    while let Some(category_entry) = categories.next_entry().await? {
        if !category_entry.file_type().await?.is_dir() {
            continue;
        }
        let mut files = tokio::fs::read_dir(category_entry.path()).await?;
        while let Some(file_entry) = files.next_entry().await? {
            if file_entry.file_type().await?.is_file() {
                staged_files.push(file_entry.path());
            }
        }
    }

    for staged in staged_files {
        let Some(category) = staged.parent().and_then(|p| p.file_name()) else { continue };
        let Some(filename) = staged.file_name() else { continue };
        let target = config.papers_dir.join(category).join(filename);

        if target.exists() {
            match resolver.resolve(&staged, &target) {
                ConflictPolicy::Skip => {
                    report.skipped += 1;
                    continue;
                }
                ConflictPolicy::CancelAll => {
                    report.cancelled = true;
                    return Ok(report);
                }
                ConflictPolicy::Overwrite => report.overwritten += 1,
            }
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let owning_row = store.find_by_pdf_path(&staged.to_string_lossy()).await?;

        tokio::fs::rename(&staged, &target).await.or_else(|_| std::fs::copy(&staged, &target).map(|_| ()))?;

        if let Some(row) = owning_row {
            store.update_pdf_path_by_id(row.id, &target.to_string_lossy()).await?;
        } else {
            warn!(path = %staged.display(), "staged file has no matching database row");
        }
        report.moved += 1;
    }

    clear_empty_staging_dirs(&config.staging_dir).await;
    info!(moved = report.moved, overwritten = report.overwritten, skipped = report.skipped, "commit complete");
    Ok(report)
}

async fn clear_empty_staging_dirs(staging_dir: &Path) {
    let Ok(mut entries) = tokio::fs::read_dir(staging_dir).await else { return };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.is_dir() {
            let _ = tokio::fs::remove_dir(&path).await;
        }
    }
}

/// Marks every unsynced row as synced after a successful cloud upload step.
/// The upload transport itself is an external collaborator and out of
/// scope here.
pub async fn mark_all_synced(db: &Database) -> Result<u32, CommitError> {
    let store = PaperStore::new(db.pool());
    let unsynced = store.get_unsynced().await?;
    let ids: Vec<i64> = unsynced.iter().map(|p| p.id).collect();
    let count = ids.len() as u32;
    store.mark_synced(&ids).await?;
    Ok(count)
}

/// Produces `Research_Backup_<MMDDYY.ss>.zip` containing the library tree
/// plus `metadata.db`, written under `cloud_storage.backup_path` (falling
/// back to the library's parent directory).
#[instrument(skip(config))]
pub fn create_backup_archive(config: &Config, timestamp: chrono::DateTime<chrono::Local>) -> Result<PathBuf, CommitError> {
    let backup_dir = config
        .cloud_storage
        .backup_path
        .clone()
        .or_else(|| config.papers_dir.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&backup_dir)?;

    let name = format!("Research_Backup_{}.zip", timestamp.format("%m%d%y.%S"));
    let archive_path = backup_dir.join(name);
    let file = std::fs::File::create(&archive_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    if config.papers_dir.is_dir() {
        add_dir_to_zip(&mut writer, &config.papers_dir, &config.papers_dir, &options)?;
    }
    if config.db_path.is_file() {
        writer.start_file("metadata.db", options)?;
        let bytes = std::fs::read(&config.db_path)?;
        std::io::Write::write_all(&mut writer, &bytes)?;
    }
    writer.finish()?;
    Ok(archive_path)
}

fn add_dir_to_zip(
    writer: &mut zip::ZipWriter<std::fs::File>,
    root: &Path,
    dir: &Path,
    options: &SimpleFileOptions,
) -> Result<(), CommitError> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path.strip_prefix(root).unwrap_or(&path);
        let rel_name = format!("Library/{}", rel.to_string_lossy());
        if path.is_dir() {
            add_dir_to_zip(writer, root, &path, options)?;
        } else {
            writer.start_file(rel_name, *options)?;
            let bytes = std::fs::read(&path)?;
            std::io::Write::write_all(writer, &bytes)?;
        }
    }
    Ok(())
}

pub fn warn_if_library_unreadable(config: &Config) {
    if !config.papers_dir.exists() {
        warn!(path = %config.papers_dir.display(), "library root does not exist yet");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.staging_dir = root.join("staging");
        config.papers_dir = root.join("library");
        config.db_path = root.join("metadata.db");
        config
    }

    #[tokio::test]
    async fn commit_moves_staged_files_into_library() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.staging_dir.join("papers")).expect("mkdir");
        std::fs::write(config.staging_dir.join("papers").join("a.pdf"), b"pdf bytes").expect("write");

        let db = Database::new_in_memory().await.expect("db");
        let mut resolver = FixedPolicy(ConflictPolicy::Overwrite);
        let report = commit_staging(&config, &db, &mut resolver).await.expect("commit");

        assert_eq!(report.moved, 1);
        assert!(config.papers_dir.join("papers").join("a.pdf").exists());
        assert!(!config.staging_dir.join("papers").join("a.pdf").exists());
    }

    #[tokio::test]
    async fn commit_promotes_url_less_paper_by_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(dir.path());
        let staged = config.staging_dir.join("papers").join("a.pdf");
        std::fs::create_dir_all(staged.parent().expect("parent")).expect("mkdir");
        std::fs::write(&staged, b"pdf bytes").expect("write");

        let db = Database::new_in_memory().await.expect("db");
        let store = PaperStore::new(db.pool());
        let id = store
            .add_paper(crate::storage::NewPaper {
                title: "URL-less Paper".to_string(),
                abstract_text: "an abstract".to_string(),
                authors: "A. Author".to_string(),
                published_date: None,
                pdf_path: staged.to_string_lossy().into_owned(),
                source_url: String::new(),
                source: "source_a".to_string(),
                downloaded_date: None,
                language: None,
                category: Some("papers".to_string()),
                run_id: Some("run-1".to_string()),
            })
            .await
            .expect("insert");

        let mut resolver = FixedPolicy(ConflictPolicy::Overwrite);
        let report = commit_staging(&config, &db, &mut resolver).await.expect("commit");
        assert_eq!(report.moved, 1);

        let rows = store.get_papers_by_run_id("run-1").await.expect("query");
        let row = rows.iter().find(|p| p.id == id).expect("row still present");
        assert!(row.synced_to_cloud);
        assert!(row.pdf_path.starts_with(&config.papers_dir.to_string_lossy().into_owned()));
    }

    #[tokio::test]
    async fn commit_cancel_all_stops_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config(dir.path());
        std::fs::create_dir_all(config.staging_dir.join("papers")).expect("mkdir");
        std::fs::write(config.staging_dir.join("papers").join("a.pdf"), b"1").expect("write");
        std::fs::create_dir_all(config.papers_dir.join("papers")).expect("mkdir");
        std::fs::write(config.papers_dir.join("papers").join("a.pdf"), b"2").expect("write");

        let db = Database::new_in_memory().await.expect("db");
        let mut resolver = FixedPolicy(ConflictPolicy::CancelAll);
        let report = commit_staging(&config, &db, &mut resolver).await.expect("commit");

        assert!(report.cancelled);
        assert_eq!(report.moved, 0);
    }

    #[test]
    fn backup_archive_is_created_with_expected_name_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = test_config(dir.path());
        config.cloud_storage.backup_path = Some(dir.path().join("backups"));
        std::fs::create_dir_all(&config.papers_dir).expect("mkdir");
        std::fs::write(&config.db_path, b"fake db").expect("write");

        let timestamp = chrono::Local.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let archive = create_backup_archive(&config, timestamp).expect("archive");
        assert!(archive.file_name().unwrap().to_string_lossy().starts_with("Research_Backup_"));
        assert!(archive.exists());
    }
}
