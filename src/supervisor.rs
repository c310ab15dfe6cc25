//! Supervises the worker pool: spawning, heartbeat timeouts, rollback, and
//! bounded retry.
//!
//! Grounded on `original_source/src/supervisor.py` near 1:1, adapted to
//! `tokio::task::spawn` isolation instead of `multiprocessing.Process`
//! (DESIGN.md Open Question 5).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::adapter::SourceAdapter;
use crate::bus::{BusMessage, ProgressBus, ProgressBusReceiver, RunMode};
use crate::config::Config;
use crate::filter::RelevanceFilter;
use crate::storage::{Database, PaperStore};
use crate::worker::{self, WorkerOutcome, WorkerParams};

/// How long a worker gets to notice its cancel signal and exit on its own
/// before `check_timeouts` forces an abort.
const TIMEOUT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything needed to (re)spawn a worker, plus its retry count. Kept in
/// its own map so it survives a worker's `JoinHandle` being reaped.
struct WorkerMeta {
    adapter: Arc<dyn SourceAdapter>,
    mode: RunMode,
    query: String,
    start_date: Option<String>,
    retries: u32,
    run_started_at: String,
}

/// Owns the worker registry and drives one run to completion.
pub struct Supervisor {
    run_id: String,
    config: Arc<Config>,
    db: Arc<Database>,
    filter: Arc<RelevanceFilter>,
    handles: HashMap<String, JoinHandle<Result<WorkerOutcome, worker::WorkerError>>>,
    meta: HashMap<String, WorkerMeta>,
    heartbeats: Arc<DashMap<String, Instant>>,
    /// Per-worker graceful-stop signal, created fresh each time the worker
    /// is (re)spawned. `check_timeouts` sends on this before ever aborting.
    cancels: HashMap<String, watch::Sender<bool>>,
    /// Deadline by which a worker sent a cancel signal must have finished
    /// on its own, past which `check_timeouts` aborts it.
    pending_abort: HashMap<String, Instant>,
    bus: ProgressBus,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        db: Arc<Database>,
        filter: Arc<RelevanceFilter>,
    ) -> (Self, ProgressBusReceiver) {
        let run_id = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let (bus, receiver) = ProgressBus::new();
        (
            Self {
                run_id,
                config,
                db,
                filter,
                handles: HashMap::new(),
                meta: HashMap::new(),
                heartbeats: Arc::new(DashMap::new()),
                cancels: HashMap::new(),
                pending_abort: HashMap::new(),
                bus,
            },
            receiver,
        )
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn bus(&self) -> &ProgressBus {
        &self.bus
    }

    /// Spawns a worker for `adapter` under `display_name`, unless one is
    /// already running. Spawn parameters are retained in `meta` so a later
    /// `handle_error` can restart the same adapter without extra input.
    #[instrument(skip(self, adapter, query, start_date), fields(source = %display_name))]
    pub fn start_worker(
        &mut self,
        display_name: &str,
        adapter: Arc<dyn SourceAdapter>,
        mode: RunMode,
        query: String,
        start_date: Option<String>,
    ) {
        if self.handles.get(display_name).is_some_and(|h| !h.is_finished()) {
            return;
        }

        let limits = match mode {
            RunMode::Test => &self.config.mode_settings.testing,
            RunMode::Daily => &self.config.mode_settings.daily,
            RunMode::Backfill => &self.config.mode_settings.backfill,
        };

        let params = WorkerParams {
            query: query.clone(),
            start_date: start_date.clone(),
            run_id: self.run_id.clone(),
            mode: mode.clone(),
            max_per_agent: limits.max_papers_per_agent,
            per_query_limit: limits.per_query_limit,
        };

        let db = self.db.clone();
        let config = self.config.clone();
        let filter = self.filter.clone();
        let bus = self.bus.clone();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let name = display_name.to_string();
        self.heartbeats.insert(name.clone(), Instant::now());
        self.pending_abort.remove(&name);
        self.cancels.insert(name.clone(), cancel_tx);

        let spawned_adapter = adapter.clone();
        let handle = tokio::spawn(async move {
            worker::run_worker(spawned_adapter, filter, db, config, bus, cancel_rx, params).await
        });
        self.handles.insert(name.clone(), handle);

        let retries = self.meta.get(display_name).map_or(0, |m| m.retries);
        self.meta.insert(
            name,
            WorkerMeta { adapter, mode, query, start_date, retries, run_started_at: self.run_id.clone() },
        );
    }

    /// Refreshes a worker's heartbeat; call this whenever an `UpdateRow`
    /// message arrives on the bus for that source.
    pub fn touch_heartbeat(&self, source: &str) {
        self.heartbeats.insert(source.to_string(), Instant::now());
    }

    /// Checks every live worker against `worker_timeout`; should be called
    /// at least once a second. A worker that just crossed the timeout is
    /// sent a cooperative cancel signal and given `TIMEOUT_GRACE_PERIOD` to
    /// exit on its own; only a worker still running once that deadline
    /// passes is forcibly aborted.
    #[instrument(skip(self))]
    pub async fn check_timeouts(&mut self) {
        let timeout = Duration::from_secs(self.config.retry_settings.worker_timeout_secs);

        let newly_expired: Vec<String> = self
            .handles
            .iter()
            .filter(|(name, h)| {
                !h.is_finished()
                    && !self.pending_abort.contains_key(*name)
                    && self.heartbeats.get(*name).is_some_and(|hb| hb.elapsed() > timeout)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in newly_expired {
            warn!(source = %name, "worker heartbeat timeout; sending cancel signal");
            if let Some(cancel) = self.cancels.get(&name) {
                let _ = cancel.send(true);
            }
            self.pending_abort.insert(name, Instant::now() + TIMEOUT_GRACE_PERIOD);
        }

        let overdue: Vec<String> = self
            .pending_abort
            .iter()
            .filter(|(name, deadline)| {
                Instant::now() >= **deadline && self.handles.get(*name).is_some_and(|h| !h.is_finished())
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in overdue {
            warn!(source = %name, "worker did not stop within grace period; aborting");
            self.pending_abort.remove(&name);
            self.cancels.remove(&name);
            if let Some(handle) = self.handles.remove(&name) {
                handle.abort();
            }
            self.handle_error(&name, "Worker timeout - no response".to_string(), None).await;
        }
    }

    /// Applies the rollback + bounded-retry policy for a failed worker.
    /// `source`'s entry in `meta` must still exist (it is never removed
    /// except on a final `HALTED` outcome).
    #[instrument(skip(self, stack))]
    pub async fn handle_error(&mut self, source: &str, error: String, stack: Option<String>) {
        self.bus.update_row(source, "FAILED", Some(&self.run_id)).await;
        self.bus.log(format!("CRITICAL: {source} errored ({error}); starting recovery")).await;

        let started_at =
            self.meta.get(source).map_or_else(|| self.run_id.clone(), |m| m.run_started_at.clone());
        match self.rollback_source(source, &started_at).await {
            Ok((files, rows)) => {
                self.bus
                    .log(format!("rollback for {source}: deleted {rows} db entries, {files} files"))
                    .await;
            }
            Err(e) => warn!(%e, source, "rollback failed"),
        }

        self.bus
            .send(BusMessage::Error { source: source.to_string(), run_id: self.run_id.clone(), error, stack })
            .await;

        let retries = self.meta.get(source).map_or(0, |m| m.retries);
        if retries < self.config.retry_settings.max_worker_retries {
            tokio::time::sleep(Duration::from_secs(self.config.retry_settings.worker_retry_delay_secs)).await;

            let respawn = self
                .meta
                .get_mut(source)
                .map(|m| {
                    m.retries += 1;
                    (m.adapter.clone(), m.mode.clone(), m.query.clone(), m.start_date.clone())
                });

            if let Some((adapter, mode, query, start_date)) = respawn {
                info!(source, retries = retries + 1, "restarting worker after rollback");
                self.start_worker(source, adapter, mode, query, start_date);
            }
        } else {
            self.bus.update_row(source, "HALTED", Some(&self.run_id)).await;
            self.meta.remove(source);
        }
    }

    /// Public entry point for the CLI's standalone `rollback` subcommand,
    /// run outside of any worker failure.
    pub async fn rollback_public(&self, source: &str, since: &str) -> Result<(usize, u64), SupervisorError> {
        self.rollback_source(source, since).await
    }

    async fn rollback_source(&self, source: &str, started_at: &str) -> Result<(usize, u64), SupervisorError> {
        let store = PaperStore::new(self.db.pool());
        let normalized = source.to_lowercase().replace(' ', "");
        let result = store.rollback_source(&normalized, started_at).await?;

        let library_root = self.config.cloud_storage.path.clone();
        let mut deleted_files = 0usize;
        for path in &result.deleted_paths {
            if let Some(root) = &library_root {
                if path.starts_with(root) {
                    warn!(path = %path.display(), "refusing to delete file under library root");
                    continue;
                }
            }
            if path.exists() && std::fs::remove_file(path).is_ok() {
                deleted_files += 1;
            }
        }

        deleted_files += self.scan_and_delete_stale_staging(source, started_at).await;

        Ok((deleted_files, result.affected_rows))
    }

    async fn scan_and_delete_stale_staging(&self, source: &str, started_at: &str) -> usize {
        let Ok(run_started) = chrono::NaiveDateTime::parse_from_str(started_at, "%Y-%m-%d %H:%M:%S") else {
            return 0;
        };
        let cutoff = run_started - chrono::Duration::seconds(1);

        let source_dir = self.config.staging_dir.join(source);
        let Ok(mut entries) = tokio::fs::read_dir(&source_dir).await else {
            return 0;
        };
        let mut deleted = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let Ok(metadata) = entry.metadata().await else { continue };
            let Ok(modified) = metadata.modified() else { continue };
            let modified_dt: chrono::DateTime<chrono::Local> = modified.into();
            if modified_dt.naive_local() >= cutoff {
                if let Some(root) = &self.config.cloud_storage.path {
                    if path.starts_with(root) {
                        continue;
                    }
                }
                if tokio::fs::remove_file(&path).await.is_ok() {
                    deleted += 1;
                }
            }
        }
        deleted
    }

    #[must_use]
    pub fn is_any_alive(&self) -> bool {
        self.handles.values().any(|h| !h.is_finished())
    }

    pub fn stop_all(&mut self) {
        for cancel in self.cancels.values() {
            let _ = cancel.send(true);
        }
        for handle in self.handles.values() {
            handle.abort();
        }
        self.cancels.clear();
        self.pending_abort.clear();
    }

    /// Drains finished worker handles, applying the retry/rollback policy
    /// to any that errored or panicked, returning the outcomes of those
    /// that finished successfully this pass.
    async fn reap_finished(&mut self) -> Vec<WorkerOutcome> {
        let finished: Vec<String> =
            self.handles.iter().filter(|(_, h)| h.is_finished()).map(|(n, _)| n.clone()).collect();

        let mut outcomes = Vec::new();
        for name in finished {
            let Some(handle) = self.handles.remove(&name) else { continue };
            self.cancels.remove(&name);
            self.pending_abort.remove(&name);
            match handle.await {
                Ok(Ok(outcome)) => {
                    self.bus.update_row(&name, "Complete", Some(&self.run_id)).await;
                    self.meta.remove(&name);
                    outcomes.push(outcome);
                }
                Ok(Err(error)) => self.handle_error(&name, error.to_string(), None).await,
                Err(join_error) => {
                    self.handle_error(&name, format!("worker task panicked: {join_error}"), None).await;
                }
            }
        }
        outcomes
    }

    /// Drives every started worker to completion: consumes bus messages
    /// (refreshing heartbeats on `UpdateRow`), polls for timeouts, and
    /// applies the retry policy to failures, returning every successful
    /// outcome once no worker remains alive.
    #[instrument(skip(self, receiver))]
    pub async fn drive(&mut self, receiver: &mut ProgressBusReceiver) -> Vec<WorkerOutcome> {
        let mut outcomes = Vec::new();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                maybe_msg = receiver.receiver.recv() => {
                    match maybe_msg {
                        Some(BusMessage::UpdateRow { source, .. }) => self.touch_heartbeat(&source),
                        Some(BusMessage::Log { text }) => info!(%text, "progress"),
                        Some(_) | None => {}
                    }
                }
                _ = ticker.tick() => {
                    self.check_timeouts().await;
                }
            }

            outcomes.extend(self.reap_finished().await);

            if !self.is_any_alive() {
                break;
            }
        }

        outcomes
    }
}
