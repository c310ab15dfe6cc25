//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Resilient, multi-source research-paper ingestion pipeline.
///
/// Paperbot runs a pool of source adapters against a relevance query,
/// dedupes and stores the results, and commits accepted papers into a
/// local library.
#[derive(Parser, Debug)]
#[command(name = "paperbot")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a config file, overriding the normal discovery order
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the ingestion pipeline once
    Run {
        /// Run mode: test (small, no persistence), daily (incremental), or
        /// backfill (full historical sweep)
        #[arg(long, value_enum, default_value_t = ModeArg::Test)]
        mode: ModeArg,

        /// Boolean relevance query, e.g. `("alignment" OR "safety") AND "llm"`
        #[arg(long)]
        query: String,

        /// Earliest publish date to consider (YYYY-MM-DD); ignored in test mode
        #[arg(long)]
        start_date: Option<String>,

        /// Remove a stale instance lock instead of erroring out
        #[arg(long)]
        force: bool,
    },
    /// Promote staged PDFs into the library and update the production store
    Commit {
        /// Overwrite any library file a staged file collides with
        #[arg(long)]
        overwrite: bool,
    },
    /// Create a compressed backup archive of the library and database
    Backup,
    /// Delete or detach every row and file a source contributed since a
    /// given run
    Rollback {
        /// Source adapter name, e.g. `preprints`
        source: String,
        /// Run start timestamp (`YYYY-MM-DD HH:MM:SS`) to roll back from
        #[arg(long)]
        since: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeArg {
    Test,
    Daily,
    Backfill,
}

impl From<ModeArg> for paperbot_core::RunMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Test => paperbot_core::RunMode::Test,
            ModeArg::Daily => paperbot_core::RunMode::Daily,
            ModeArg::Backfill => paperbot_core::RunMode::Backfill,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_subcommand_parses_required_query() {
        let args = Args::try_parse_from(["paperbot", "run", "--query", r#"("x")"#]).unwrap();
        match args.command {
            Command::Run { query, mode, .. } => {
                assert_eq!(query, r#"("x")"#);
                assert_eq!(mode, ModeArg::Test);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn run_without_query_is_rejected() {
        let result = Args::try_parse_from(["paperbot", "run"]);
        assert!(result.is_err());
    }

    #[test]
    fn mode_flag_accepts_backfill() {
        let args =
            Args::try_parse_from(["paperbot", "run", "--query", "\"x\"", "--mode", "backfill"])
                .unwrap();
        match args.command {
            Command::Run { mode, .. } => assert_eq!(mode, ModeArg::Backfill),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rollback_requires_source_and_since() {
        let args = Args::try_parse_from([
            "paperbot",
            "rollback",
            "preprints",
            "--since",
            "2026-01-01 00:00:00",
        ])
        .unwrap();
        match args.command {
            Command::Rollback { source, since } => {
                assert_eq!(source, "preprints");
                assert_eq!(since, "2026-01-01 00:00:00");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verbose_flag_increments_count() {
        let args = Args::try_parse_from(["paperbot", "-vv", "run", "--query", "\"x\""]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn help_flag_shows_usage() {
        let result = Args::try_parse_from(["paperbot", "--help"]);
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn backup_subcommand_parses_with_no_args() {
        let args = Args::try_parse_from(["paperbot", "backup"]).unwrap();
        assert!(matches!(args.command, Command::Backup));
    }
}
