//! Command-line arguments and their mapping to tail settings.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use oplog_core::config::{DEFAULT_AWAIT_INTERVAL_MS, DEFAULT_BATCH_SIZE};
use oplog_core::TailConfig;
use oplog_proto::{LogicalTimestamp, OpKind};

use crate::formatter::OutputFormat;

/// Default oplog directory.
pub const DEFAULT_DATA_PATH: &str = "./oplog-data";

/// Oplog command-line tool.
#[derive(Parser, Debug)]
#[command(name = "oplog")]
#[command(version, about = "Append to, resolve, and tail an operation log", long_about = None)]
pub struct Args {
    /// Path to the oplog storage directory.
    #[arg(short, long, global = true, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Output format for records.
    #[arg(long, global = true, default_value = "json", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Append one record stamped with the current time.
    Append(AppendArgs),

    /// Print the most recent record at or before a timestamp.
    Latest {
        /// Upper bound, as `epoch:ordinal`. Omit for the newest record.
        #[arg(long)]
        at_or_before: Option<LogicalTimestamp>,
    },

    /// Stream records as they are appended.
    Tail(TailArgs),
}

/// Operation kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OpArg {
    Insert,
    Update,
    Delete,
    Command,
    Noop,
}

impl From<OpArg> for OpKind {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::Insert => OpKind::Insert,
            OpArg::Update => OpKind::Update,
            OpArg::Delete => OpKind::Delete,
            OpArg::Command => OpKind::Command,
            OpArg::Noop => OpKind::Noop,
        }
    }
}

/// Arguments for `append`.
#[derive(ClapArgs, Debug)]
pub struct AppendArgs {
    /// Operation kind.
    #[arg(long, value_enum, default_value = "insert")]
    pub op: OpArg,

    /// Namespace the operation applies to.
    #[arg(long)]
    pub namespace: String,

    /// Identifier of the affected document.
    #[arg(long)]
    pub id: String,

    /// Document body as JSON.
    #[arg(long)]
    pub body: Option<String>,
}

/// Arguments for `tail`.
#[derive(ClapArgs, Debug)]
pub struct TailArgs {
    /// Resume strictly after this exact timestamp.
    #[arg(long, conflicts_with_all = ["resume_at_or_before", "from_latest"])]
    pub after: Option<LogicalTimestamp>,

    /// Resume after the most recent record at or before this timestamp.
    #[arg(long, conflicts_with = "from_latest")]
    pub resume_at_or_before: Option<LogicalTimestamp>,

    /// Resume after the newest record, delivering only new appends.
    #[arg(long)]
    pub from_latest: bool,

    /// Stop after this many pulls.
    #[arg(long)]
    pub max_iterations: Option<u64>,

    /// Records per pull.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Milliseconds a pull waits at the tail for new records.
    #[arg(long, default_value_t = DEFAULT_AWAIT_INTERVAL_MS)]
    pub await_ms: u64,

    /// Append JSON-line records read from stdin while tailing.
    #[arg(long)]
    pub ingest_stdin: bool,
}

/// Where a tail starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeFrom {
    /// Every record in the log.
    Beginning,
    /// Strictly after an exact timestamp.
    After(LogicalTimestamp),
    /// After the record the resolver finds for this bound; `None` is the newest.
    Resolved(Option<LogicalTimestamp>),
}

/// Settings for a `tail` run.
#[derive(Debug, Clone)]
pub struct TailOptions {
    pub resume: ResumeFrom,
    pub max_iterations: Option<u64>,
    pub ingest_stdin: bool,
    pub tail: TailConfig,
}

impl TailArgs {
    /// Convert command-line arguments to tail settings.
    pub fn into_config(self) -> TailOptions {
        let resume = if let Some(ts) = self.after {
            ResumeFrom::After(ts)
        } else if let Some(bound) = self.resume_at_or_before {
            ResumeFrom::Resolved(Some(bound))
        } else if self.from_latest {
            ResumeFrom::Resolved(None)
        } else {
            ResumeFrom::Beginning
        };

        TailOptions {
            resume,
            max_iterations: self.max_iterations,
            ingest_stdin: self.ingest_stdin,
            tail: TailConfig::new()
                .with_batch_size(self.batch_size)
                .with_await_interval(Duration::from_millis(self.await_ms)),
        }
    }
}
