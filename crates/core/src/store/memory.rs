//! In-memory [`KvStore`] for tests and single-process embedders.
//!
//! Mirrors the semantics of the durable backend without any I/O. Expiry is
//! tracked with `tokio::time::Instant`, so tests can drive it with
//! `tokio::time::pause()` / `advance()`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{KvStore, ScoredMember, SortOrder};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Entry {
    Hash(HashMap<String, String>),
    Counter(i64),
    Sorted(HashMap<String, i64>),
    List(Vec<String>),
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    expiry: HashMap<String, Instant>,
}

impl Inner {
    /// Drop `key` if its expiry has passed.
    fn evict_expired(&mut self, key: &str) {
        if let Some(deadline) = self.expiry.get(key) {
            if *deadline <= Instant::now() {
                self.expiry.remove(key);
                self.entries.remove(key);
            }
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        self.evict_expired(key);
        self.entries.get_mut(key)
    }

    fn hash_mut(&mut self, key: &str) -> StoreResult<&mut HashMap<String, String>> {
        self.evict_expired(key);
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()))
        {
            Entry::Hash(map) => Ok(map),
            _ => Err(wrong_type(key)),
        }
    }

    fn sorted_mut(&mut self, key: &str) -> StoreResult<&mut HashMap<String, i64>> {
        self.evict_expired(key);
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Sorted(HashMap::new()))
        {
            Entry::Sorted(set) => Ok(set),
            _ => Err(wrong_type(key)),
        }
    }

    fn counter_mut(&mut self, key: &str) -> StoreResult<&mut i64> {
        self.evict_expired(key);
        match self
            .entries
            .entry(key.to_string())
            .or_insert(Entry::Counter(0))
        {
            Entry::Counter(value) => Ok(value),
            _ => Err(wrong_type(key)),
        }
    }

    fn list_mut(&mut self, key: &str) -> StoreResult<&mut Vec<String>> {
        self.evict_expired(key);
        match self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()))
        {
            Entry::List(list) => Ok(list),
            _ => Err(wrong_type(key)),
        }
    }

    /// Remove a container that became empty, matching the durable backend
    /// where empty collections have no rows.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key) {
            Some(Entry::Hash(map)) => map.is_empty(),
            Some(Entry::Sorted(set)) => set.is_empty(),
            Some(Entry::List(list)) => list.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
            self.expiry.remove(key);
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

/// In-process store guarded by a single async mutex.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys (test helper).
    pub async fn key_count(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let keys: Vec<String> = inner.entries.keys().cloned().collect();
        for key in &keys {
            inner.evict_expired(key);
        }
        inner.entries.len()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            None => Ok(None),
            Some(Entry::Hash(map)) => Ok(map.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            None => Ok(HashMap::new()),
            Some(Entry::Hash(map)) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let map = inner.hash_mut(key)?;
        for (field, value) in fields {
            map.insert((*field).to_string(), value.clone());
        }
        inner.drop_if_empty(key);
        Ok(())
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let map = inner.hash_mut(key)?;
        if map.contains_key(field) {
            return Ok(false);
        }
        map.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let mut removed = 0;
        for key in keys {
            inner.evict_expired(key);
            inner.expiry.remove(key);
            if inner.entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;
        let value = inner.counter_mut(key)?;
        *value += 1;
        Ok(*value)
    }

    async fn set_max(&self, key: &str, value: i64) -> StoreResult<i64> {
        let mut inner = self.inner.lock().await;
        let current = inner.counter_mut(key)?;
        if value > *current {
            *current = value;
        }
        Ok(*current)
    }

    async fn get_counter(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            None => Ok(None),
            Some(Entry::Counter(value)) => Ok(Some(*value)),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let set = inner.sorted_mut(key)?;
        set.insert(member.to_string(), score);
        Ok(set.len() as u64)
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let removed = match inner.live(key) {
            None => false,
            Some(Entry::Sorted(set)) => set.remove(member).is_some(),
            Some(_) => return Err(wrong_type(key)),
        };
        inner.drop_if_empty(key);
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<i64>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            None => Ok(None),
            Some(Entry::Sorted(set)) => Ok(set.get(member).copied()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            None => Ok(0),
            Some(Entry::Sorted(set)) => Ok(set.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn zrange(
        &self,
        key: &str,
        order: SortOrder,
        offset: u64,
        limit: Option<u64>,
    ) -> StoreResult<Vec<ScoredMember>> {
        let mut inner = self.inner.lock().await;
        let mut members: Vec<ScoredMember> = match inner.live(key) {
            None => return Ok(Vec::new()),
            Some(Entry::Sorted(set)) => set
                .iter()
                .map(|(member, score)| ScoredMember {
                    member: member.clone(),
                    score: *score,
                })
                .collect(),
            Some(_) => return Err(wrong_type(key)),
        };
        members.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.member.cmp(&b.member)));
        if order == SortOrder::Desc {
            members.reverse();
        }
        let limit = limit.map(|l| l as usize).unwrap_or(usize::MAX);
        Ok(members
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .collect())
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let list = inner.list_mut(key)?;
        list.push(value.to_string());
        Ok(list.len() as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        if inner.live(key).is_none() {
            return Ok(false);
        }
        inner.expiry.insert(key.to_string(), Instant::now() + ttl);
        Ok(true)
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        match inner.live(key) {
            None => Ok(Vec::new()),
            Some(Entry::List(list)) => Ok(list.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn ltake(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let taken = match inner.live(key) {
            None => return Ok(Vec::new()),
            Some(Entry::List(list)) => std::mem::take(list),
            Some(_) => return Err(wrong_type(key)),
        };
        inner.drop_if_empty(key);
        Ok(taken)
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let candidates: Vec<String> = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        let mut live = Vec::with_capacity(candidates.len());
        for key in candidates {
            if inner.live(&key).is_some() {
                live.push(key);
            }
        }
        Ok(live)
    }
}
