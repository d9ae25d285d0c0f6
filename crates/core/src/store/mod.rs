//! Key-value store abstraction the ledger is written against.
//!
//! The ledger only needs a handful of primitives, each of which must be atomic
//! on its own: hash field writes, ordered-set inserts that report the new
//! cardinality, counters with increment and raise-to-max, and lists with an
//! expiry. Multi-step sequences built on top of them are not transactional.

pub mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

pub use memory::MemoryStore;

/// Enumeration order for ordered-set reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Lowest score first.
    Asc,
    /// Highest score first.
    #[default]
    Desc,
}

/// A member of an ordered set together with its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredMember {
    pub member: String,
    pub score: i64,
}

/// Storage primitives consumed by the ledger.
///
/// Implementations:
/// - [`MemoryStore`]: in-process maps, used by tests and embedders without a
///   shared backend
/// - `jobtrail_db::SqliteStore`: durable store shared between worker processes
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read one hash field.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Read every field of a hash. Missing keys yield an empty map.
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Set several hash fields. Each field write is atomic; the batch need not be.
    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;

    /// Set a hash field only if it is absent. Returns `true` if the write happened.
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool>;

    /// Delete keys of any type. Returns how many existed.
    async fn del(&self, keys: &[String]) -> StoreResult<u64>;

    /// Increment a counter (missing counters start at zero) and return the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Raise a counter to `value` if it is lower. Returns the stored value afterwards.
    async fn set_max(&self, key: &str, value: i64) -> StoreResult<i64>;

    /// Read a counter.
    async fn get_counter(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Insert or re-score a member and return the set's cardinality afterwards.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> StoreResult<u64>;

    /// Remove a member. Returns `true` if it was present.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool>;

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<i64>>;

    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    /// Ordered slice of a set. Ties on score are broken by member name.
    async fn zrange(
        &self,
        key: &str,
        order: SortOrder,
        offset: u64,
        limit: Option<u64>,
    ) -> StoreResult<Vec<ScoredMember>>;

    /// Append to a list and return its length.
    async fn rpush(&self, key: &str, value: &str) -> StoreResult<u64>;

    /// Expire a key after `ttl`. Returns `false` if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Whole list, oldest entry first. Expired lists read as empty.
    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Remove a list and return its entries, oldest first, as one atomic
    /// step. Expired or missing lists yield an empty vec.
    async fn ltake(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Every live key starting with `prefix`, in lexical order.
    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;
}
