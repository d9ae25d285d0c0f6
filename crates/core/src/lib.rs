// crates/core/src/lib.rs
//! Execution-history ledger for background jobs.
//!
//! Records start/end times, worker identity, arguments and failures for every
//! job instance, and tracks per-class running, finished and linear sets in a
//! shared [`KvStore`].
pub mod cleaner;
pub mod codec;
pub mod config;
pub mod cutting_block;
pub mod error;
pub mod history;
pub mod host;
pub mod job;
pub mod job_set;
pub mod keys;
pub mod ledger;
pub mod record;
pub mod registry;
pub mod store;

pub use cleaner::Cleaner;
pub use codec::{ArgDecompressor, GzipArgs};
pub use config::{ClassOverrides, ClassSettings, HistorySettings, PAGE_SIZE};
pub use cutting_block::CuttingBlock;
pub use error::*;
pub use history::{ClassSummary, HistoryBase};
pub use host::{Clock, HostInfo, LocalHost, ManualClock, StaticHost, SystemClock};
pub use job::{Job, JobFailure, CANCEL_MESSAGE};
pub use job_set::{JobPage, JobSet, PageRequest};
pub use keys::{Aggregate, KeySpace, SetKind};
pub use ledger::JobHistory;
pub use record::{JobRecord, RecordState};
pub use registry::{JobClass, JobQueue, JobRegistry, ListQueue, QueuedJob};
pub use store::{KvStore, MemoryStore, ScoredMember, SortOrder};
