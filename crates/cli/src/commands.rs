// crates/cli/src/commands.rs
//! Command execution. Every command produces one JSON value for stdout.

use anyhow::{bail, Result};
use jobtrail_core::{JobHistory, JobRecord, PageRequest, SortOrder};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::args::Command;

/// One job as printed by `show`.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub class: String,
    pub job_id: String,
    #[serde(flatten)]
    pub record: JobRecord,
    pub uncompressed_args: Vec<Value>,
    pub finished: bool,
    pub succeeded: bool,
    pub duration_ms: Option<i64>,
}

pub async fn execute(ledger: &JobHistory, command: &Command) -> Result<Value> {
    debug!(?command, "Executing command");
    let output = match command {
        Command::Classes => serde_json::to_value(ledger.class_summaries().await?)?,

        Command::List {
            class,
            kind,
            page,
            page_size,
            asc,
        } => {
            let history = ledger.history(class);
            let order = if *asc { SortOrder::Asc } else { SortOrder::Desc };
            let request = PageRequest::new(*page, page_size.unwrap_or(history.page_size()))
                .ordered(order);
            serde_json::to_value(history.job_set(*kind).page(request).await?)?
        }

        Command::Show { class, job_id } => serde_json::to_value(show(ledger, class, job_id).await?)?,

        Command::Cancel { class, job_id } => {
            let changed = ledger.job(class, job_id).cancel().await?;
            action("cancel", class, job_id, changed)
        }
        Command::Purge { class, job_id } => {
            ledger.job(class, job_id).purge().await?;
            action("purge", class, job_id, true)
        }
        Command::SafePurge { class, job_id } => {
            let changed = ledger.job(class, job_id).safe_purge().await?;
            action("safe_purge", class, job_id, changed)
        }
        Command::Retry { class, job_id } => {
            let changed = ledger.job(class, job_id).retry().await?;
            action("retry", class, job_id, changed)
        }
        Command::Kill { class, job_id } => {
            let changed = ledger.job(class, job_id).kill().await?;
            action("kill", class, job_id, changed)
        }

        Command::PurgeClass { class } => {
            let records = ledger.cleaner().purge_class(class).await?;
            json!({ "class": class, "records": records })
        }
        Command::PurgeAll => {
            let records = ledger.cleaner().purge_all_jobs().await?;
            json!({ "records": records })
        }
        Command::Fixup { class } => {
            let cleaner = ledger.cleaner();
            let removed = match class {
                Some(class) => cleaner.fixup_class(class).await?,
                None => cleaner.fixup_all().await?,
            };
            json!({ "removed": removed })
        }
        Command::SweepStale { class } => {
            let cleaner = ledger.cleaner();
            let cancelled = match class {
                Some(class) => cleaner.cancel_stale_running(class).await?,
                None => cleaner.cancel_all_stale_running().await?,
            };
            json!({ "cancelled": cancelled })
        }

        Command::Kills { hostname, take } => {
            let block = ledger.cutting_block();
            let pids = if *take {
                block.take(hostname).await?
            } else {
                block.pending(hostname).await?
            };
            json!({ "hostname": hostname, "pids": pids })
        }
    };
    Ok(output)
}

async fn show(ledger: &JobHistory, class: &str, job_id: &str) -> Result<JobView> {
    let mut job = ledger.job(class, job_id);
    let record = job.record().await?;
    if !record.exists() && !record.is_finished() {
        bail!("no record for {class} job {job_id}");
    }
    Ok(JobView {
        class: class.to_string(),
        job_id: job_id.to_string(),
        uncompressed_args: job.uncompressed_args().await?,
        finished: record.is_finished(),
        succeeded: record.succeeded(),
        duration_ms: job.duration().await?.map(|d| d.num_milliseconds()),
        record,
    })
}

fn action(name: &str, class: &str, job_id: &str, changed: bool) -> Value {
    json!({ "action": name, "class": class, "job_id": job_id, "changed": changed })
}
