//! Integration tests exercising the supervisor/worker/storage pipeline
//! end to end with a stub adapter (no network).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use paperbot_core::adapter::{AdapterError, CancelSignal, Candidate, SourceAdapter};
use paperbot_core::{Config, Database, RelevanceFilter, RunMode, Supervisor};
use tempfile::TempDir;

struct StubAdapter {
    name: String,
    candidates: Vec<Candidate>,
    download_calls: AtomicUsize,
}

impl StubAdapter {
    fn new(name: &str, candidates: Vec<Candidate>) -> Self {
        Self { name: name.to_string(), candidates, download_calls: AtomicUsize::new(0) }
    }
}

fn candidate(title: &str, url: &str) -> Candidate {
    Candidate {
        source_id: title.to_string(),
        title: title.to_string(),
        authors: "A. Researcher".to_string(),
        published_date: Some("2026-01-01".to_string()),
        abstract_text: "a detailed technical discussion of alignment methods and experiments"
            .to_string(),
        source_url: url.to_string(),
        pdf_url: Some(url.to_string()),
        language: Some("en".to_string()),
    }
}

#[async_trait]
impl SourceAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        _query: &str,
        _start_date: Option<&str>,
        _max_results: u32,
        _cancel: &CancelSignal,
    ) -> Result<Vec<Candidate>, AdapterError> {
        Ok(self.candidates.clone())
    }

    async fn download(&self, candidate: &Candidate, staging_dir: &Path) -> Result<PathBuf, AdapterError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::create_dir_all(staging_dir).await?;
        let path = staging_dir.join(format!("{}.pdf", candidate.source_id));
        tokio::fs::write(&path, b"stub pdf bytes").await?;
        Ok(path)
    }
}

fn test_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.db_path = dir.path().join("metadata.db");
    config.staging_dir = dir.path().join("staging");
    config.papers_dir = dir.path().join("library");
    config
}

#[tokio::test]
async fn daily_run_downloads_kept_candidates_and_dedups_across_sources() {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(test_config(&dir));
    let db = Arc::new(Database::new(&config.db_path).await.unwrap());
    let filter = Arc::new(RelevanceFilter::new(r#"("alignment")"#).unwrap());

    let (mut supervisor, mut receiver) = Supervisor::new(config.clone(), db.clone(), filter);

    let shared_url = "https://example.com/papers/shared";
    let adapter_a = Arc::new(StubAdapter::new(
        "source_a",
        vec![candidate("Shared Paper", shared_url), candidate("Only In A", "https://example.com/a")],
    ));
    let adapter_b =
        Arc::new(StubAdapter::new("source_b", vec![candidate("Shared Paper", shared_url)]));

    supervisor.start_worker("source_a", adapter_a, RunMode::Daily, r#"("alignment")"#.to_string(), None);
    supervisor.start_worker("source_b", adapter_b, RunMode::Daily, r#"("alignment")"#.to_string(), None);

    let outcomes = supervisor.drive(&mut receiver).await;
    assert_eq!(outcomes.len(), 2);
    let total_downloaded: u32 = outcomes.iter().map(|o| o.downloaded).sum();
    let total_duplicates: u32 = outcomes.iter().map(|o| o.duplicates).sum();
    assert_eq!(total_downloaded, 2);
    assert_eq!(total_duplicates, 1);

    let store = paperbot_core::PaperStore::new(db.pool());
    let rows = store.get_papers_by_run_id(supervisor.run_id()).await.unwrap();
    assert_eq!(rows.len(), 2);
    let shared = rows.iter().find(|p| p.title == "Shared Paper").unwrap();
    let mut sources: Vec<&str> = shared.source.split(',').map(str::trim).collect();
    sources.sort_unstable();
    assert_eq!(sources, vec!["source_a", "source_b"]);
}

#[tokio::test]
async fn test_mode_never_writes_to_storage() {
    let dir = TempDir::new().unwrap();
    let config = Arc::new(test_config(&dir));
    let db = Arc::new(Database::new(&config.db_path).await.unwrap());
    let filter = Arc::new(RelevanceFilter::new(r#"("alignment")"#).unwrap());
    let (mut supervisor, mut receiver) = Supervisor::new(config, db.clone(), filter);

    let adapter = Arc::new(StubAdapter::new(
        "source_a",
        vec![candidate("Test Mode Paper", "https://example.com/test")],
    ));
    supervisor.start_worker("source_a", adapter, RunMode::Test, r#"("alignment")"#.to_string(), None);
    let outcomes = supervisor.drive(&mut receiver).await;

    assert_eq!(outcomes[0].kept, 1);
    assert_eq!(outcomes[0].downloaded, 0);

    let store = paperbot_core::PaperStore::new(db.pool());
    let rows = store.get_papers_by_run_id(supervisor.run_id()).await.unwrap();
    assert!(rows.is_empty());
}

#[tokio::test]
async fn commit_promotes_staged_files_and_updates_pdf_path() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let db = Database::new(&config.db_path).await.unwrap();

    let store = paperbot_core::PaperStore::new(db.pool());
    let staged_path = config.staging_dir.join("methods").join("paper.pdf");
    tokio::fs::create_dir_all(staged_path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&staged_path, b"staged bytes").await.unwrap();

    store
        .add_paper(paperbot_core::storage::NewPaper {
            title: "Staged Paper".to_string(),
            abstract_text: "an abstract".to_string(),
            authors: "A. Author".to_string(),
            published_date: None,
            pdf_path: staged_path.to_string_lossy().into_owned(),
            source_url: "https://example.com/staged".to_string(),
            source: "source_a".to_string(),
            downloaded_date: None,
            language: None,
            category: Some("methods".to_string()),
            run_id: Some("run-1".to_string()),
        })
        .await
        .unwrap();

    let mut resolver = paperbot_core::commit::FixedPolicy(paperbot_core::commit::ConflictPolicy::Overwrite);
    let report = paperbot_core::commit::commit_staging(&config, &db, &mut resolver).await.unwrap();

    assert_eq!(report.moved, 1);
    assert!(config.papers_dir.join("methods").join("paper.pdf").exists());
}
