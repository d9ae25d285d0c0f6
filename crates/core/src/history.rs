// crates/core/src/history.rs
//! Per-class aggregates and configuration.

use std::sync::Arc;

use serde::Serialize;

use crate::config::ClassSettings;
use crate::error::StoreResult;
use crate::job_set::JobSet;
use crate::keys::{Aggregate, SetKind};
use crate::ledger::Ledger;

/// Counts and aggregates for one class, as shown on a listing screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSummary {
    pub class_name: String,
    pub running: u64,
    pub finished: u64,
    pub linear: u64,
    pub max_running: i64,
    pub total_failed: i64,
    pub total_finished: i64,
    pub last_run_ms: Option<i64>,
}

#[derive(Clone)]
pub struct HistoryBase {
    ledger: Arc<Ledger>,
    class_name: String,
    settings: ClassSettings,
}

impl HistoryBase {
    pub(crate) fn new(ledger: Arc<Ledger>, class_name: &str) -> Self {
        let settings = ledger.settings.for_class(class_name);
        Self {
            ledger,
            class_name: class_name.to_string(),
            settings,
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn settings(&self) -> &ClassSettings {
        &self.settings
    }

    pub fn class_history_len(&self) -> u64 {
        self.settings.history_len
    }

    pub fn page_size(&self) -> u64 {
        self.ledger.settings.page_size
    }

    pub fn job_set(&self, kind: SetKind) -> JobSet {
        JobSet::new(
            Arc::clone(&self.ledger.store),
            &self.ledger.keys,
            &self.class_name,
            kind,
        )
    }

    pub fn running_jobs(&self) -> JobSet {
        self.job_set(SetKind::Running)
    }

    pub fn finished_jobs(&self) -> JobSet {
        self.job_set(SetKind::Finished)
    }

    pub fn linear_jobs(&self) -> JobSet {
        self.job_set(SetKind::Linear)
    }

    pub fn aggregate_key(&self, aggregate: Aggregate) -> String {
        self.ledger.keys.aggregate(&self.class_name, aggregate)
    }

    pub fn max_running_key(&self) -> String {
        self.aggregate_key(Aggregate::MaxRunning)
    }

    pub fn total_failed_key(&self) -> String {
        self.aggregate_key(Aggregate::TotalFailed)
    }

    /// Missing counters read as zero so a purged class recreates them lazily.
    async fn counter(&self, aggregate: Aggregate) -> StoreResult<i64> {
        Ok(self
            .ledger
            .store
            .get_counter(&self.aggregate_key(aggregate))
            .await?
            .unwrap_or(0))
    }

    pub async fn max_running_jobs(&self) -> StoreResult<i64> {
        self.counter(Aggregate::MaxRunning).await
    }

    pub async fn total_failed_jobs(&self) -> StoreResult<i64> {
        self.counter(Aggregate::TotalFailed).await
    }

    pub async fn total_finished_jobs(&self) -> StoreResult<i64> {
        self.counter(Aggregate::TotalFinished).await
    }

    /// Raise the high-water mark to `running` and return the stored maximum.
    pub(crate) async fn observe_running(&self, running: u64) -> StoreResult<i64> {
        let running = i64::try_from(running).unwrap_or(i64::MAX);
        self.ledger
            .store
            .set_max(&self.max_running_key(), running)
            .await
    }

    pub(crate) async fn record_failure(&self) -> StoreResult<i64> {
        self.ledger.store.incr(&self.total_failed_key()).await
    }

    pub(crate) async fn record_finish(&self) -> StoreResult<i64> {
        self.ledger
            .store
            .incr(&self.aggregate_key(Aggregate::TotalFinished))
            .await
    }

    pub async fn summary(&self) -> StoreResult<ClassSummary> {
        let running = self.running_jobs();
        let finished = self.finished_jobs();
        let linear = self.linear_jobs();
        let last_run_ms = match linear.latest_job().await? {
            Some(latest) => Some(latest.score),
            None => running.latest_job().await?.map(|m| m.score),
        };
        Ok(ClassSummary {
            class_name: self.class_name.clone(),
            running: running.num_jobs().await?,
            finished: finished.num_jobs().await?,
            linear: linear.num_jobs().await?,
            max_running: self.max_running_jobs().await?,
            total_failed: self.total_failed_jobs().await?,
            total_finished: self.total_finished_jobs().await?,
            last_run_ms,
        })
    }
}

impl std::fmt::Debug for HistoryBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryBase")
            .field("class_name", &self.class_name)
            .field("settings", &self.settings)
            .finish()
    }
}
