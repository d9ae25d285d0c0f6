// crates/core/src/job.rs
//! Lifecycle of one job instance: `unstarted → running → finished`.
//!
//! `finished` splits into succeeded (no `error` field) and failed. The only
//! way out of `finished` is [`Job::purge`], which deletes the record.
//!
//! The first terminal transition wins: `end_time` is claimed with an atomic
//! set-if-absent, and later `finish`/`failed`/`cancel` calls report `false`
//! without touching the record or the counters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{LedgerResult, StoreResult};
use crate::history::HistoryBase;
use crate::job_set::JobSet;
use crate::keys::SetKind;
use crate::ledger::Ledger;
use crate::record::{self, JobRecord, RecordState};
use crate::store::SortOrder;

/// Error written by [`Job::cancel`].
pub const CANCEL_MESSAGE: &str =
    "Unknown - Job failed to signal ending after the configured purge time or was canceled manually.";

/// Upper bound on eviction rounds in one sweep; concurrent starts can refill
/// the running set while a sweep is in progress.
const MAX_SWEEP_ROUNDS: usize = 8;

/// Why a job failed, as reported by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailure {
    /// The payload raised an error.
    Error { message: String },
    /// The worker process exited abnormally while running the job.
    DirtyExit {
        message: String,
        process_status: String,
    },
}

impl JobFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::message(err.to_string())
    }

    pub fn dirty_exit(message: impl Into<String>, process_status: impl Into<String>) -> Self {
        Self::DirtyExit {
            message: message.into(),
            process_status: process_status.into(),
        }
    }

    /// Text stored in the record's `error` field.
    pub fn describe(&self) -> String {
        match self {
            JobFailure::Error { message } => message.clone(),
            JobFailure::DirtyExit {
                message,
                process_status,
            } => format!("{message} (exit status: {process_status})"),
        }
    }
}

/// Handle on one job record plus its set memberships.
pub struct Job {
    ledger: Arc<Ledger>,
    history: HistoryBase,
    class_name: String,
    job_id: String,
    job_key: String,
    state: RecordState,
}

impl Job {
    pub(crate) fn new(ledger: Arc<Ledger>, class_name: &str, job_id: &str) -> Self {
        let history = HistoryBase::new(Arc::clone(&ledger), class_name);
        let job_key = ledger.keys.job(class_name, job_id);
        Self {
            ledger,
            history,
            class_name: class_name.to_string(),
            job_id: job_id.to_string(),
            job_key,
            state: RecordState::Unloaded,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_key(&self) -> &str {
        &self.job_key
    }

    pub fn history(&self) -> &HistoryBase {
        &self.history
    }

    // -----------------------------------------------------------------------
    // Loaded record
    // -----------------------------------------------------------------------

    /// The record, loading it from the store if not loaded yet.
    pub async fn record(&mut self) -> StoreResult<JobRecord> {
        if let Some(record) = self.state.get() {
            return Ok(record.clone());
        }
        let fields = self.ledger.store.hgetall(&self.job_key).await?;
        let record = JobRecord::from_fields(&fields);
        self.state = RecordState::Loaded(record.clone());
        Ok(record)
    }

    /// Drop the loaded record so the next read goes to the store.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub async fn worker_host(&mut self) -> StoreResult<Option<String>> {
        Ok(self.record().await?.hostname)
    }

    pub async fn worker_pid(&mut self) -> StoreResult<Option<u32>> {
        Ok(self.record().await?.pid)
    }

    pub async fn start_time(&mut self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.record().await?.start_time)
    }

    pub async fn end_time(&mut self) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self.record().await?.end_time)
    }

    pub async fn duration(&mut self) -> StoreResult<Option<chrono::Duration>> {
        let now = self.ledger.clock.now();
        Ok(self.record().await?.duration(now))
    }

    /// Arguments as recorded at start.
    pub async fn args(&mut self) -> StoreResult<Vec<Value>> {
        Ok(self.record().await?.args)
    }

    /// Arguments decoded through the class's decompressor, if it declares one.
    pub async fn uncompressed_args(&mut self) -> LedgerResult<Vec<Value>> {
        let args = self.args().await?;
        match self.ledger.registry.decompressor(&self.class_name) {
            Some(codec) if codec.is_compressed(&args) => Ok(codec.decompress(&args)?),
            _ => Ok(args),
        }
    }

    pub async fn error(&mut self) -> StoreResult<Option<String>> {
        Ok(self.record().await?.error)
    }

    pub async fn succeeded(&mut self) -> StoreResult<bool> {
        Ok(self.record().await?.succeeded())
    }

    pub async fn finished(&mut self) -> StoreResult<bool> {
        Ok(self.record().await?.is_finished())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Record the start of this job and return the class's running count.
    ///
    /// Reaching the class history length sweeps older running entries until
    /// the running set is back under it.
    pub async fn start(&mut self, args: &[Value]) -> LedgerResult<u64> {
        let encoded_args = record::encode_args(args)?;
        let now = self.ledger.clock.now();
        let score = now.timestamp_millis();

        let running = self
            .history
            .running_jobs()
            .add_job(&self.job_id, score)
            .await?;
        if !self.history.settings().exclude_from_linear {
            self.history
                .linear_jobs()
                .add_job(&self.job_id, score)
                .await?;
        }

        self.ledger
            .store
            .hset(
                &self.job_key,
                &[
                    (record::START_TIME, record::format_time(now)),
                    (record::ARGS, encoded_args),
                    (record::HOSTNAME, self.ledger.host.hostname()),
                    (record::PID, self.ledger.host.pid().to_string()),
                ],
            )
            .await?;
        self.ledger
            .store
            .zadd(&self.ledger.keys.class_list(), &self.class_name, score)
            .await?;
        let max_running = self.history.observe_running(running).await?;
        self.reset();

        debug!(
            job_class = %self.class_name,
            job_id = %self.job_id,
            running,
            max_running,
            "Job started"
        );

        if running >= self.history.class_history_len() {
            self.sweep_running(running).await?;
        }
        Ok(running)
    }

    /// Mark the job finished. Returns `false` if it was already finished.
    pub async fn finish(&mut self) -> LedgerResult<bool> {
        self.terminate(None).await
    }

    /// Record a failure and finish. Returns `false` if it was already finished.
    pub async fn failed(&mut self, failure: &JobFailure) -> LedgerResult<bool> {
        self.terminate(Some(failure.describe())).await
    }

    /// Fail the job with [`CANCEL_MESSAGE`]. Used by operators and by sweeps.
    pub async fn cancel(&mut self) -> LedgerResult<bool> {
        let cancelled = self.terminate(Some(CANCEL_MESSAGE.to_string())).await?;
        if cancelled {
            info!(job_class = %self.class_name, job_id = %self.job_id, "Job cancelled");
        }
        Ok(cancelled)
    }

    async fn terminate(&mut self, error: Option<String>) -> LedgerResult<bool> {
        let now = self.ledger.clock.now();
        let claimed = self
            .ledger
            .store
            .hsetnx(&self.job_key, record::END_TIME, &record::format_time(now))
            .await?;
        if !claimed {
            debug!(
                job_class = %self.class_name,
                job_id = %self.job_id,
                "Job already finished; ignoring terminal transition"
            );
            self.settle_membership(now).await?;
            self.reset();
            return Ok(false);
        }

        let failed = error.is_some();
        if let Some(message) = error {
            self.ledger
                .store
                .hset(&self.job_key, &[(record::ERROR, message)])
                .await?;
            self.history.record_failure().await?;
        }
        self.move_to_finished(now.timestamp_millis()).await?;
        self.history.record_finish().await?;
        self.reset();

        debug!(
            job_class = %self.class_name,
            job_id = %self.job_id,
            failed,
            "Job finished"
        );

        self.trim_finished().await?;
        Ok(true)
    }

    /// Add to finished before leaving running, so the id is never in neither.
    async fn move_to_finished(&self, score_ms: i64) -> StoreResult<()> {
        self.history
            .finished_jobs()
            .add_job(&self.job_id, score_ms)
            .await?;
        self.history.running_jobs().remove_job(&self.job_id).await?;
        Ok(())
    }

    /// An already-finished job still listed as running was left behind by a
    /// transition that died half way; finish the move.
    async fn settle_membership(&self, now: DateTime<Utc>) -> StoreResult<()> {
        if !self.history.running_jobs().includes_job(&self.job_id).await? {
            return Ok(());
        }
        let end_time = self
            .ledger
            .store
            .hget(&self.job_key, record::END_TIME)
            .await?
            .and_then(|raw| record::parse_time(record::END_TIME, &raw))
            .unwrap_or(now);
        self.move_to_finished(end_time.timestamp_millis()).await
    }

    // -----------------------------------------------------------------------
    // Operator actions
    // -----------------------------------------------------------------------

    /// Delete the record and every set membership, cancelling first if the
    /// job is still running so failure counts stay honest.
    pub async fn purge(&mut self) -> LedgerResult<()> {
        self.reset();
        let record = self.record().await?;
        if record.exists() && !record.is_finished() {
            self.cancel().await?;
        }
        self.erase().await?;
        info!(job_class = %self.class_name, job_id = %self.job_id, "Job purged");
        Ok(())
    }

    /// Purge only if no set references the job. Returns whether it purged.
    pub async fn safe_purge(&mut self) -> LedgerResult<bool> {
        for kind in SetKind::ALL {
            if self.history.job_set(kind).includes_job(&self.job_id).await? {
                debug!(
                    job_class = %self.class_name,
                    job_id = %self.job_id,
                    set = %kind,
                    "Job still tracked; not purging"
                );
                return Ok(false);
            }
        }
        self.purge().await?;
        Ok(true)
    }

    /// Re-enqueue the job with its recorded arguments.
    ///
    /// Returns `false` when the class is not registered or no queue is
    /// attached. The ledger is untouched; the new run gets a new job id.
    pub async fn retry(&mut self) -> LedgerResult<bool> {
        if self.ledger.registry.resolve(&self.class_name).is_none() {
            debug!(job_class = %self.class_name, "Cannot retry unregistered job class");
            return Ok(false);
        }
        let Some(queue) = self.ledger.registry.queue().cloned() else {
            debug!(job_class = %self.class_name, "No queue attached; cannot retry");
            return Ok(false);
        };
        let args = self.args().await?;
        queue.enqueue(&self.class_name, args).await?;
        info!(job_class = %self.class_name, job_id = %self.job_id, "Job retried");
        Ok(true)
    }

    /// Ask the worker running this job to terminate by putting its pid in
    /// the host's cutting block. Best effort: returns `false` instead of
    /// failing when there is no live worker to signal or the publish fails.
    pub async fn kill(&mut self) -> LedgerResult<bool> {
        self.reset();
        let record = self.record().await?;
        if record.is_finished() {
            debug!(job_class = %self.class_name, job_id = %self.job_id, "Job already finished; not killing");
            return Ok(false);
        }
        let (Some(hostname), Some(pid)) = (record.hostname, record.pid) else {
            debug!(job_class = %self.class_name, job_id = %self.job_id, "No worker recorded; not killing");
            return Ok(false);
        };

        let key = self.ledger.keys.cutting_block(&hostname);
        let published = async {
            self.ledger.store.rpush(&key, &pid.to_string()).await?;
            self.ledger
                .store
                .expire(&key, self.ledger.settings.kill_expiry())
                .await
        }
        .await;

        match published {
            Ok(_) => {
                info!(
                    job_class = %self.class_name,
                    job_id = %self.job_id,
                    hostname = %hostname,
                    pid,
                    "Kill requested"
                );
                Ok(true)
            }
            Err(e) => {
                warn!(
                    job_class = %self.class_name,
                    job_id = %self.job_id,
                    error = %e,
                    "Failed to publish kill request (non-fatal)"
                );
                Ok(false)
            }
        }
    }

    /// Remove from all three sets and delete the record.
    async fn erase(&mut self) -> StoreResult<()> {
        for kind in SetKind::ALL {
            self.history.job_set(kind).remove_job(&self.job_id).await?;
        }
        self.ledger.store.del(&[self.job_key.clone()]).await?;
        self.reset();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Growth bounds
    // -----------------------------------------------------------------------

    /// Bring the running set back under the class history length.
    ///
    /// Stale entries (older than the purge age) go first, then oldest-first
    /// down to the sweep target. The job being started is never evicted.
    async fn sweep_running(&self, running: u64) -> LedgerResult<u64> {
        let settings = self.history.settings().clone();
        let running_set = self.history.running_jobs();
        let mut evicted = 0u64;

        if let Some(cutoff) = settings.stale_before(self.ledger.clock.now()) {
            let stale_before = cutoff.timestamp_millis();
            for member in running_set.all(SortOrder::Asc).await? {
                if member.score >= stale_before {
                    break;
                }
                if member.member != self.job_id {
                    self.evict(&running_set, &member.member).await?;
                    evicted += 1;
                }
            }
        }

        let target = settings.sweep_target_len();
        for _ in 0..MAX_SWEEP_ROUNDS {
            let size = running_set.num_jobs().await?;
            if size <= target {
                break;
            }
            let excess = size - target;
            let candidates: Vec<String> = running_set
                .oldest(excess + 1)
                .await?
                .into_iter()
                .map(|m| m.member)
                .filter(|id| *id != self.job_id)
                .take(usize::try_from(excess).unwrap_or(usize::MAX))
                .collect();
            if candidates.is_empty() {
                break;
            }
            for job_id in candidates {
                self.evict(&running_set, &job_id).await?;
                evicted += 1;
            }
        }

        let remaining = running_set.num_jobs().await?;
        if remaining >= settings.history_len {
            warn!(
                job_class = %self.class_name,
                remaining,
                history_len = settings.history_len,
                "Running set still at history length after sweep"
            );
        }
        info!(
            job_class = %self.class_name,
            running_before = running,
            evicted,
            remaining,
            "Swept running jobs"
        );
        Ok(evicted)
    }

    async fn evict(&self, running_set: &JobSet, job_id: &str) -> LedgerResult<()> {
        let mut job = Job::new(Arc::clone(&self.ledger), &self.class_name, job_id);
        job.cancel().await?;
        running_set.remove_job(job_id).await?;
        Ok(())
    }

    /// Drop the oldest finished entries beyond the history length. Records
    /// still in the linear set are kept; only their finished membership goes.
    async fn trim_finished(&self) -> StoreResult<u64> {
        let cap = self.history.class_history_len();
        let finished = self.history.finished_jobs();
        let size = finished.num_jobs().await?;
        if size <= cap {
            return Ok(0);
        }

        let linear = self.history.linear_jobs();
        let mut trimmed = 0;
        for member in finished.oldest(size - cap).await? {
            finished.remove_job(&member.member).await?;
            if !linear.includes_job(&member.member).await? {
                self.ledger
                    .store
                    .del(&[self.ledger.keys.job(&self.class_name, &member.member)])
                    .await?;
            }
            trimmed += 1;
        }
        debug!(job_class = %self.class_name, trimmed, "Trimmed finished jobs");
        Ok(trimmed)
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("class_name", &self.class_name)
            .field("job_id", &self.job_id)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_descriptions() {
        assert_eq!(JobFailure::message("boom").describe(), "boom");
        assert_eq!(
            JobFailure::dirty_exit("Child process received unhandled signal", "pid 311 SIGKILL")
                .describe(),
            "Child process received unhandled signal (exit status: pid 311 SIGKILL)"
        );

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert_eq!(JobFailure::from_error(&io).describe(), "disk full");
    }
}
