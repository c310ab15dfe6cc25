//! CLI entry point for the paperbot tool.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use paperbot_core::commit::{self, ConflictPolicy, FixedPolicy};
use paperbot_core::{
    build_default_adapter_registry, Config, Database, InstanceLock, PaperStore, RelevanceFilter, Supervisor,
};
use tracing::{debug, error, info};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(code) => code,
        Err(error) => {
            error!(%error, "paperbot exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = if let Some(path) = &args.config {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?
    } else {
        Config::load().context("loading configuration")?
    };

    match args.command {
        Command::Run { mode, query, start_date, force } => run_ingest(config, mode.into(), query, start_date, force).await,
        Command::Commit { overwrite } => run_commit(config, overwrite).await,
        Command::Backup => run_backup(config),
        Command::Rollback { source, since } => run_rollback(config, source, since).await,
    }
}

async fn run_ingest(
    config: Config,
    mode: paperbot_core::RunMode,
    query: String,
    start_date: Option<String>,
    force: bool,
) -> Result<ExitCode> {
    let library_root = config.papers_dir.clone();
    let lock = InstanceLock::acquire(&library_root, force).context("acquiring instance lock")?;

    let filter = Arc::new(RelevanceFilter::new(&query).context("parsing relevance query")?);
    let db = Arc::new(Database::new(&config.db_path).await.context("opening database")?);

    let mut start_date = start_date;
    if matches!(mode, paperbot_core::RunMode::Daily) && start_date.is_none() {
        let store = PaperStore::new(db.pool());
        if let Ok(Some(latest)) = store.get_latest_date().await {
            start_date = apply_date_overlap(&latest, config.date_overlap_days);
        }
    }

    let registry = build_default_adapter_registry(&config);
    if registry.is_empty() {
        info!("no adapters enabled; nothing to do");
        lock.release();
        return Ok(ExitCode::SUCCESS);
    }

    let config = Arc::new(config);
    let (mut supervisor, mut receiver) = Supervisor::new(config.clone(), db.clone(), filter);
    info!(run_id = supervisor.run_id(), adapters = registry.len(), "starting run");

    for (name, adapter) in registry {
        supervisor.start_worker(&name, Arc::from(adapter), mode.clone(), query.clone(), start_date.clone());
    }

    let outcomes = supervisor.drive(&mut receiver).await;
    let total_downloaded: u32 = outcomes.iter().map(|o| o.downloaded).sum();
    let total_found: u32 = outcomes.iter().map(|o| o.found).sum();
    info!(found = total_found, downloaded = total_downloaded, "run complete");

    lock.release();

    if matches!(mode, paperbot_core::RunMode::Backfill) && outcomes.is_empty() {
        return Ok(ExitCode::from(1));
    }
    Ok(ExitCode::SUCCESS)
}

/// Shifts `latest` (a `published_date`, `YYYY-MM-DD...`) back by
/// `overlap_days` so a daily run re-checks the tail of the previous run
/// instead of starting exactly where it left off. Returns `None` if
/// `latest` isn't parseable as a date, leaving `start_date` unset.
fn apply_date_overlap(latest: &str, overlap_days: u32) -> Option<String> {
    let date_part = latest.get(0..10)?;
    let date = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    let shifted = date - chrono::Duration::days(i64::from(overlap_days));
    Some(shifted.format("%Y-%m-%d").to_string())
}

async fn run_commit(config: Config, overwrite: bool) -> Result<ExitCode> {
    let db = Database::new(&config.db_path).await.context("opening database")?;
    let mut resolver = FixedPolicy(if overwrite { ConflictPolicy::Overwrite } else { ConflictPolicy::Skip });
    let report = commit::commit_staging(&config, &db, &mut resolver).await.context("committing staging")?;
    info!(moved = report.moved, overwritten = report.overwritten, skipped = report.skipped, "commit finished");
    Ok(ExitCode::SUCCESS)
}

fn run_backup(config: Config) -> Result<ExitCode> {
    let archive = commit::create_backup_archive(&config, chrono::Local::now()).context("creating backup archive")?;
    info!(path = %archive.display(), "backup archive created");
    Ok(ExitCode::SUCCESS)
}

async fn run_rollback(config: Config, source: String, since: String) -> Result<ExitCode> {
    let db = Arc::new(Database::new(&config.db_path).await.context("opening database")?);
    let filter = Arc::new(RelevanceFilter::new(r#"("rollback")"#).context("building rollback filter")?);
    let (supervisor, _receiver) = Supervisor::new(Arc::new(config), db, filter);
    let result = supervisor.rollback_public(&source, &since).await.context("rolling back source")?;
    info!(deleted_files = result.0, affected_rows = result.1, "rollback complete");
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn apply_date_overlap_shifts_back_by_whole_days() {
        let shifted = apply_date_overlap("2026-07-15", 3).expect("valid date");
        assert_eq!(shifted, "2026-07-12");
    }

    #[test]
    fn apply_date_overlap_accepts_a_full_timestamp_prefix() {
        let shifted = apply_date_overlap("2026-07-15T00:00:00Z", 1).expect("valid date");
        assert_eq!(shifted, "2026-07-14");
    }

    #[test]
    fn apply_date_overlap_rejects_unparseable_input() {
        assert!(apply_date_overlap("not-a-date", 1).is_none());
    }
}
