// crates/core/src/cutting_block.rs
//! Worker-side view of kill requests.
//!
//! [`Job::kill`](crate::job::Job::kill) appends a pid to
//! `cutting_block.<host>` with a short expiry. Workers poll their own host's
//! list and terminate any listed pid they own. Unconsumed requests expire.

use std::sync::Arc;

use tracing::debug;

use crate::error::StoreResult;
use crate::keys::KeySpace;
use crate::store::KvStore;

#[derive(Clone)]
pub struct CuttingBlock {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl CuttingBlock {
    pub fn new(store: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Pending pids for `hostname`, without consuming them.
    pub async fn pending(&self, hostname: &str) -> StoreResult<Vec<u32>> {
        let raw = self.store.lrange(&self.keys.cutting_block(hostname)).await?;
        Ok(raw.iter().filter_map(|pid| pid.parse().ok()).collect())
    }

    /// Read and clear the pending pids for `hostname` in one store call, so
    /// a kill pushed concurrently is either returned here or left pending.
    pub async fn take(&self, hostname: &str) -> StoreResult<Vec<u32>> {
        let raw = self.store.ltake(&self.keys.cutting_block(hostname)).await?;
        let pids: Vec<u32> = raw.iter().filter_map(|pid| pid.parse().ok()).collect();
        if !raw.is_empty() {
            debug!(hostname, count = pids.len(), "Took kill requests");
        }
        Ok(pids)
    }
}
