// crates/core/src/host.rs
//! Host/process identity and wall clock, injected so tests can pin them.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Identity of the worker process executing a job.
pub trait HostInfo: Send + Sync {
    fn hostname(&self) -> String;
    fn pid(&self) -> u32;
}

/// The current process on the local machine. Captured once at construction.
#[derive(Debug, Clone)]
pub struct LocalHost {
    hostname: String,
    pid: u32,
}

impl LocalHost {
    pub fn new() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
        }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInfo for LocalHost {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn pid(&self) -> u32 {
        self.pid
    }
}

/// Fixed identity, for tests and for recording on behalf of another process.
#[derive(Debug, Clone)]
pub struct StaticHost {
    pub hostname: String,
    pub pid: u32,
}

impl StaticHost {
    pub fn new(hostname: impl Into<String>, pid: u32) -> Self {
        Self {
            hostname: hostname.into(),
            pid,
        }
    }
}

impl HostInfo for StaticHost {
    fn hostname(&self) -> String {
        self.hostname.clone()
    }

    fn pid(&self) -> u32 {
        self.pid
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        match self.now.write() {
            Ok(mut now) => *now += by,
            Err(e) => tracing::error!("RwLock poisoned advancing clock: {e}"),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(e) => *e.into_inner(),
        }
    }
}
