// crates/core/src/ledger.rs
//! Entry point tying the store, settings, registry and host identity together.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cleaner::Cleaner;
use crate::config::HistorySettings;
use crate::cutting_block::CuttingBlock;
use crate::error::LedgerResult;
use crate::history::{ClassSummary, HistoryBase};
use crate::host::{Clock, HostInfo, LocalHost, SystemClock};
use crate::job::Job;
use crate::keys::KeySpace;
use crate::registry::JobRegistry;
use crate::store::{KvStore, SortOrder};

/// Shared state behind every handle the ledger hands out.
pub(crate) struct Ledger {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) keys: KeySpace,
    pub(crate) settings: HistorySettings,
    pub(crate) registry: JobRegistry,
    pub(crate) host: Arc<dyn HostInfo>,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Execution-history ledger for a job queue.
///
/// Cheap to clone; every clone shares the same store handle.
#[derive(Clone)]
pub struct JobHistory {
    inner: Arc<Ledger>,
}

impl JobHistory {
    /// Ledger with the local host identity, system clock and an empty registry.
    pub fn new(store: Arc<dyn KvStore>, settings: HistorySettings) -> Self {
        let keys = KeySpace::new(settings.namespace.clone());
        Self {
            inner: Arc::new(Ledger {
                store,
                keys,
                settings,
                registry: JobRegistry::new(),
                host: Arc::new(LocalHost::new()),
                clock: Arc::new(SystemClock),
            }),
        }
    }

    pub fn with_registry(self, registry: JobRegistry) -> Self {
        self.rebuild(|ledger| ledger.registry = registry)
    }

    pub fn with_host(self, host: Arc<dyn HostInfo>) -> Self {
        self.rebuild(|ledger| ledger.host = host)
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.rebuild(|ledger| ledger.clock = clock)
    }

    fn rebuild(self, change: impl FnOnce(&mut Ledger)) -> Self {
        let current = &self.inner;
        let mut ledger = Ledger {
            store: Arc::clone(&current.store),
            keys: current.keys.clone(),
            settings: current.settings.clone(),
            registry: current.registry.clone(),
            host: Arc::clone(&current.host),
            clock: Arc::clone(&current.clock),
        };
        change(&mut ledger);
        Self {
            inner: Arc::new(ledger),
        }
    }

    pub fn settings(&self) -> &HistorySettings {
        &self.inner.settings
    }

    pub fn keys(&self) -> &KeySpace {
        &self.inner.keys
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.inner.store
    }

    /// Handle for an existing (or not yet started) job instance.
    pub fn job(&self, class_name: &str, job_id: &str) -> Job {
        Job::new(Arc::clone(&self.inner), class_name, job_id)
    }

    /// Start a new job instance with a generated id.
    pub async fn start_job(&self, class_name: &str, args: &[Value]) -> LedgerResult<Job> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let mut job = self.job(class_name, &job_id);
        job.start(args).await?;
        Ok(job)
    }

    pub fn history(&self, class_name: &str) -> HistoryBase {
        HistoryBase::new(Arc::clone(&self.inner), class_name)
    }

    pub fn cleaner(&self) -> Cleaner {
        Cleaner::new(Arc::clone(&self.inner))
    }

    pub fn cutting_block(&self) -> CuttingBlock {
        CuttingBlock::new(Arc::clone(&self.inner.store), self.inner.keys.clone())
    }

    /// Every class that has started a job, by name.
    pub async fn class_names(&self) -> LedgerResult<Vec<String>> {
        let mut names: Vec<String> = self
            .inner
            .store
            .zrange(&self.inner.keys.class_list(), SortOrder::Asc, 0, None)
            .await?
            .into_iter()
            .map(|m| m.member)
            .collect();
        names.sort();
        debug!(count = names.len(), "Listed job classes");
        Ok(names)
    }

    /// Summary row for every known class.
    pub async fn class_summaries(&self) -> LedgerResult<Vec<ClassSummary>> {
        let mut summaries = Vec::new();
        for name in self.class_names().await? {
            summaries.push(self.history(&name).summary().await?);
        }
        Ok(summaries)
    }
}

impl std::fmt::Debug for JobHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHistory")
            .field("keys", &self.inner.keys)
            .field("registry", &self.inner.registry)
            .finish_non_exhaustive()
    }
}
