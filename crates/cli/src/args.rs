// crates/cli/src/args.rs
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use jobtrail_core::SetKind;

/// jobtrail - inspect and maintain background job history
#[derive(Parser, Debug)]
#[command(name = "jobtrail")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML settings file
    #[arg(short, long, env = "JOBTRAIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the SQLite history store (default: ~/.cache/jobtrail/jobtrail.db)
    #[arg(long, env = "JOBTRAIL_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List job classes with their counters
    Classes,

    /// List one page of a class's jobs
    List {
        class: String,
        /// Which set to list: running, finished or linear
        #[arg(long, default_value = "running")]
        kind: SetKind,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u64,
        /// Page size (default: the configured page size)
        #[arg(long)]
        page_size: Option<u64>,
        /// Oldest first instead of newest first
        #[arg(long)]
        asc: bool,
    },

    /// Print one job record
    Show { class: String, job_id: String },

    /// Mark a job failed with the cancellation message
    Cancel { class: String, job_id: String },

    /// Delete a job record and its set memberships
    Purge { class: String, job_id: String },

    /// Purge a job only if no set refers to it
    SafePurge { class: String, job_id: String },

    /// Re-enqueue a job with its recorded arguments
    Retry { class: String, job_id: String },

    /// Ask the worker running a job to terminate it
    Kill { class: String, job_id: String },

    /// Delete all history of one class
    PurgeClass { class: String },

    /// Delete all history of every class
    PurgeAll,

    /// Remove records no set refers to
    Fixup { class: Option<String> },

    /// Cancel running jobs older than the purge age
    SweepStale { class: Option<String> },

    /// Show (or consume) pending kill requests for a host
    Kills {
        hostname: String,
        /// Clear the requests after reading them
        #[arg(long)]
        take: bool,
    },
}
