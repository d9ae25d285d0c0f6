// crates/core/src/job_set.rs
//! One of the three per-class job id sets.
//!
//! Backed by a store ordered set so membership and cardinality come from a
//! single atomic call; concurrent `add_job`s for the same class never lose an
//! update.

use std::sync::Arc;

use serde::Serialize;

use crate::error::StoreResult;
use crate::keys::{KeySpace, SetKind};
use crate::store::{KvStore, ScoredMember, SortOrder};

/// A page request against a job set. `page_num` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_num: u64,
    pub page_size: u64,
    pub order: SortOrder,
}

impl PageRequest {
    pub fn new(page_num: u64, page_size: u64) -> Self {
        Self {
            page_num: page_num.max(1),
            page_size: page_size.max(1),
            order: SortOrder::Desc,
        }
    }

    pub fn ordered(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    fn offset(&self) -> u64 {
        (self.page_num - 1).saturating_mul(self.page_size)
    }
}

/// One page of job ids plus the total needed to render pagination.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub kind: SetKind,
    pub page_num: u64,
    pub page_size: u64,
    pub total: u64,
    pub jobs: Vec<ScoredMember>,
}

#[derive(Clone)]
pub struct JobSet {
    store: Arc<dyn KvStore>,
    class_name: String,
    kind: SetKind,
    key: String,
}

impl JobSet {
    pub fn new(store: Arc<dyn KvStore>, keys: &KeySpace, class_name: &str, kind: SetKind) -> Self {
        Self {
            store,
            class_name: class_name.to_string(),
            kind,
            key: keys.set(class_name, kind),
        }
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Insert `job_id` scored by `score_ms` and return the new cardinality.
    pub async fn add_job(&self, job_id: &str, score_ms: i64) -> StoreResult<u64> {
        self.store.zadd(&self.key, job_id, score_ms).await
    }

    pub async fn remove_job(&self, job_id: &str) -> StoreResult<bool> {
        self.store.zrem(&self.key, job_id).await
    }

    pub async fn includes_job(&self, job_id: &str) -> StoreResult<bool> {
        Ok(self.store.zscore(&self.key, job_id).await?.is_some())
    }

    pub async fn num_jobs(&self) -> StoreResult<u64> {
        self.store.zcard(&self.key).await
    }

    /// Score (milliseconds since epoch) the job was added with.
    pub async fn score_of(&self, job_id: &str) -> StoreResult<Option<i64>> {
        self.store.zscore(&self.key, job_id).await
    }

    pub async fn page(&self, request: PageRequest) -> StoreResult<JobPage> {
        let total = self.num_jobs().await?;
        let jobs = self
            .store
            .zrange(&self.key, request.order, request.offset(), Some(request.page_size))
            .await?;
        Ok(JobPage {
            kind: self.kind,
            page_num: request.page_num,
            page_size: request.page_size,
            total,
            jobs,
        })
    }

    /// Up to `limit` members, lowest score first.
    pub async fn oldest(&self, limit: u64) -> StoreResult<Vec<ScoredMember>> {
        self.store
            .zrange(&self.key, SortOrder::Asc, 0, Some(limit))
            .await
    }

    pub async fn all(&self, order: SortOrder) -> StoreResult<Vec<ScoredMember>> {
        self.store.zrange(&self.key, order, 0, None).await
    }

    pub async fn latest_job(&self) -> StoreResult<Option<ScoredMember>> {
        Ok(self
            .store
            .zrange(&self.key, SortOrder::Desc, 0, Some(1))
            .await?
            .into_iter()
            .next())
    }
}

impl std::fmt::Debug for JobSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSet")
            .field("class_name", &self.class_name)
            .field("kind", &self.kind)
            .field("key", &self.key)
            .finish()
    }
}
