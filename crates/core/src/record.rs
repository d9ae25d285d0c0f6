// crates/core/src/record.rs
//! The stored job record and its lenient decoding.
//!
//! Records are written piecemeal by concurrent workers and a crash can leave
//! any subset of fields behind, so decoding never fails: missing or garbled
//! fields read as absent.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";
pub const ARGS: &str = "args";
pub const HOSTNAME: &str = "hostname";
pub const PID: &str = "pid";
pub const ERROR: &str = "error";

/// Snapshot of one job record as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobRecord {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub args: Vec<Value>,
    pub hostname: Option<String>,
    pub pid: Option<u32>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        Self {
            start_time: fields.get(START_TIME).and_then(|v| parse_time(START_TIME, v)),
            end_time: fields.get(END_TIME).and_then(|v| parse_time(END_TIME, v)),
            args: fields.get(ARGS).map(|v| decode_args(v)).unwrap_or_default(),
            hostname: fields.get(HOSTNAME).filter(|h| !h.is_empty()).cloned(),
            pid: fields.get(PID).and_then(|v| v.trim().parse().ok()).filter(|p| *p > 0),
            error: fields.get(ERROR).cloned(),
        }
    }

    /// `true` once any terminal transition has landed.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Elapsed time from start to end, or to `now` while still running.
    pub fn duration(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or(now) - start)
    }

    /// A record with no start time was never (fully) written.
    pub fn exists(&self) -> bool {
        self.start_time.is_some()
    }
}

/// Loaded view of a record held by a [`Job`](crate::job::Job).
///
/// Every mutation through the job resets it to `Unloaded`, so a stale snapshot
/// is never served after the job's own writes.
#[derive(Debug, Clone, Default)]
pub enum RecordState {
    #[default]
    Unloaded,
    Loaded(JobRecord),
}

impl RecordState {
    pub fn get(&self) -> Option<&JobRecord> {
        match self {
            RecordState::Unloaded => None,
            RecordState::Loaded(record) => Some(record),
        }
    }

    pub fn reset(&mut self) {
        *self = RecordState::Unloaded;
    }
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_time(field: &str, raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(field, value = raw, error = %e, "Unreadable timestamp in job record");
            None
        }
    }
}

pub fn encode_args(args: &[Value]) -> Result<String, serde_json::Error> {
    serde_json::to_string(args)
}

fn decode_args(raw: &str) -> Vec<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => items,
        Ok(Value::Null) => Vec::new(),
        Ok(other) => vec![other],
        Err(e) => {
            warn!(error = %e, "Unreadable args in job record");
            Vec::new()
        }
    }
}
