//! Top-level error type aggregating the per-module error enums.
//!
//! Each module (storage, filter, adapter, supervisor, commit, config) owns
//! its own `thiserror` enum at the seam where it can actually fail; this
//! type exists only so the CLI binary has one `Result` to bubble up through
//! `anyhow`.

use thiserror::Error;

use crate::commit::CommitError;
use crate::config::ConfigError;
use crate::filter::FilterError;
use crate::storage::StorageError;
use crate::supervisor::SupervisorError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    /// Every worker returned zero new papers in BACKFILL mode.
    #[error("backfill run produced no new papers from any source")]
    BackfillEmpty,
}

pub type CoreResult<T> = Result<T, CoreError>;
