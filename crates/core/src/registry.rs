// crates/core/src/registry.rs
//
// Job-class registry: which classes can be re-enqueued by `retry`, and which
// declare compressed arguments. Replaces looking classes up by name at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::codec::ArgDecompressor;
use crate::error::QueueError;
use crate::keys::KeySpace;
use crate::store::KvStore;

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// The execution engine's enqueue primitive.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, class_name: &str, args: Vec<Value>) -> Result<(), QueueError>;
}

/// Payload pushed by [`ListQueue`].
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct QueuedJob {
    pub class: String,
    pub args: Vec<Value>,
}

/// Queue adapter that appends `{"class", "args"}` JSON onto the store list
/// `queue.<class>`, for engines that poll the shared store.
#[derive(Clone)]
pub struct ListQueue {
    store: Arc<dyn KvStore>,
    keys: KeySpace,
}

impl ListQueue {
    pub fn new(store: Arc<dyn KvStore>, keys: KeySpace) -> Self {
        Self { store, keys }
    }
}

#[async_trait]
impl JobQueue for ListQueue {
    async fn enqueue(&self, class_name: &str, args: Vec<Value>) -> Result<(), QueueError> {
        let payload = QueuedJob {
            class: class_name.to_string(),
            args,
        };
        let encoded = serde_json::to_string(&payload).map_err(|e| QueueError::Enqueue {
            class_name: class_name.to_string(),
            message: e.to_string(),
        })?;
        let depth = self.store.rpush(&self.keys.queue(class_name), &encoded).await?;
        debug!(job_class = class_name, depth, "Enqueued job");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// What the ledger knows about a registered job class.
#[derive(Clone, Default)]
pub struct JobClass {
    pub decompressor: Option<Arc<dyn ArgDecompressor>>,
}

impl JobClass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decompressor(mut self, decompressor: Arc<dyn ArgDecompressor>) -> Self {
        self.decompressor = Some(decompressor);
        self
    }
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    classes: HashMap<String, JobClass>,
    queue: Option<Arc<dyn JobQueue>>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.classes.keys().collect();
        names.sort();
        f.debug_struct("JobRegistry")
            .field("classes", &names)
            .field("has_queue", &self.queue.is_some())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn register(mut self, class_name: impl Into<String>, class: JobClass) -> Self {
        self.classes.insert(class_name.into(), class);
        self
    }

    pub fn resolve(&self, class_name: &str) -> Option<&JobClass> {
        self.classes.get(class_name)
    }

    pub fn queue(&self) -> Option<&Arc<dyn JobQueue>> {
        self.queue.as_ref()
    }

    pub fn decompressor(&self, class_name: &str) -> Option<&Arc<dyn ArgDecompressor>> {
        self.resolve(class_name)?.decompressor.as_ref()
    }
}
