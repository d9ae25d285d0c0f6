// crates/core/src/cleaner.rs
//! Bulk maintenance that works on the store directly instead of through
//! per-job transitions.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::LedgerResult;
use crate::history::HistoryBase;
use crate::job::Job;
use crate::keys::{Aggregate, SetKind};
use crate::ledger::Ledger;
use crate::store::SortOrder;

pub struct Cleaner {
    ledger: Arc<Ledger>,
}

impl Cleaner {
    pub(crate) fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    async fn class_names(&self) -> LedgerResult<Vec<String>> {
        Ok(self
            .ledger
            .store
            .zrange(&self.ledger.keys.class_list(), SortOrder::Asc, 0, None)
            .await?
            .into_iter()
            .map(|m| m.member)
            .collect())
    }

    /// Record keys of a class: every set member plus any stragglers found
    /// by prefix.
    async fn record_keys(&self, class_name: &str) -> LedgerResult<Vec<String>> {
        let keys = &self.ledger.keys;
        let mut record_keys = self.scan_records(class_name).await?;
        let history = HistoryBase::new(Arc::clone(&self.ledger), class_name);
        for kind in SetKind::ALL {
            for member in history.job_set(kind).all(SortOrder::Asc).await? {
                record_keys.push(keys.job(class_name, &member.member));
            }
        }
        record_keys.sort();
        record_keys.dedup();
        Ok(record_keys)
    }

    /// Record keys under the class prefix that belong to this class.
    async fn scan_records(&self, class_name: &str) -> LedgerResult<Vec<String>> {
        let keys = &self.ledger.keys;
        let classes = self.class_names().await?;
        Ok(self
            .ledger
            .store
            .scan_prefix(&keys.job_prefix(class_name))
            .await?
            .into_iter()
            .filter(|key| keys.scanned_job_id(class_name, key, &classes).is_some())
            .collect())
    }

    /// Remove every record, set and counter of one class. Counters read as
    /// zero afterwards and are recreated by the next start.
    pub async fn purge_class(&self, class_name: &str) -> LedgerResult<u64> {
        let keys = &self.ledger.keys;
        let record_keys = self.record_keys(class_name).await?;
        let records = self.ledger.store.del(&record_keys).await?;

        let mut class_keys: Vec<String> = SetKind::ALL
            .iter()
            .map(|kind| keys.set(class_name, *kind))
            .collect();
        class_keys.extend(
            Aggregate::ALL
                .iter()
                .map(|aggregate| keys.aggregate(class_name, *aggregate)),
        );
        self.ledger.store.del(&class_keys).await?;
        self.ledger
            .store
            .zrem(&keys.class_list(), class_name)
            .await?;

        info!(job_class = class_name, records, "Purged class history");
        Ok(records)
    }

    /// [`Cleaner::purge_class`] for every known class.
    pub async fn purge_all_jobs(&self) -> LedgerResult<u64> {
        let mut records = 0;
        for class_name in self.class_names().await? {
            records += self.purge_class(&class_name).await?;
        }
        self.ledger
            .store
            .del(&[self.ledger.keys.class_list()])
            .await?;
        info!(records, "Purged all job history");
        Ok(records)
    }

    /// Delete records no set refers to. Returns how many were removed.
    pub async fn fixup_class(&self, class_name: &str) -> LedgerResult<u64> {
        let keys = &self.ledger.keys;
        let mut removed = 0;
        for key in self.scan_records(class_name).await? {
            let Some(job_id) = keys.job_id_from_key(class_name, &key) else {
                continue;
            };
            let mut job = Job::new(Arc::clone(&self.ledger), class_name, job_id);
            if job.safe_purge().await? {
                removed += 1;
            }
        }
        debug!(job_class = class_name, removed, "Fixed up orphaned records");
        Ok(removed)
    }

    pub async fn fixup_all(&self) -> LedgerResult<u64> {
        let mut removed = 0;
        for class_name in self.class_names().await? {
            removed += self.fixup_class(&class_name).await?;
        }
        Ok(removed)
    }

    /// Cancel running jobs older than the class purge age, regardless of
    /// how full the running set is.
    pub async fn cancel_stale_running(&self, class_name: &str) -> LedgerResult<u64> {
        let history = HistoryBase::new(Arc::clone(&self.ledger), class_name);
        let Some(cutoff) = history.settings().stale_before(self.ledger.clock.now()) else {
            return Ok(0);
        };
        let stale_before = cutoff.timestamp_millis();
        let mut cancelled = 0;
        for member in history.running_jobs().all(SortOrder::Asc).await? {
            if member.score >= stale_before {
                break;
            }
            let mut job = Job::new(Arc::clone(&self.ledger), class_name, &member.member);
            job.cancel().await?;
            history.running_jobs().remove_job(&member.member).await?;
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(job_class = class_name, cancelled, "Cancelled stale running jobs");
        }
        Ok(cancelled)
    }

    pub async fn cancel_all_stale_running(&self) -> LedgerResult<u64> {
        let mut cancelled = 0;
        for class_name in self.class_names().await? {
            cancelled += self.cancel_stale_running(&class_name).await?;
        }
        Ok(cancelled)
    }
}
