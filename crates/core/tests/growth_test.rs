//! Integration tests for the running-set sweep and the finished-set trim.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jobtrail_core::{
    ClassOverrides, HistorySettings, JobHistory, KvStore, ManualClock, MemoryStore, SetKind,
    SortOrder, StaticHost, CANCEL_MESSAGE,
};
use pretty_assertions::assert_eq;

fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn ledger(overrides: ClassOverrides) -> (Arc<MemoryStore>, Arc<ManualClock>, JobHistory) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(epoch()));
    let settings = HistorySettings {
        namespace: None,
        ..HistorySettings::default()
    }
    .with_class("SyncJob", overrides);
    let ledger = JobHistory::new(store.clone(), settings)
        .with_host(Arc::new(StaticHost::new("worker-1", 100)))
        .with_clock(clock.clone());
    (store, clock, ledger)
}

async fn ids(ledger: &JobHistory, kind: SetKind) -> Vec<String> {
    ledger
        .history("SyncJob")
        .job_set(kind)
        .all(SortOrder::Asc)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.member)
        .collect()
}

#[tokio::test]
async fn test_sweep_evicts_oldest_running() {
    let (_store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(3),
        ..ClassOverrides::default()
    });

    for id in ["j1", "j2", "j3"] {
        ledger.job("SyncJob", id).start(&[]).await.unwrap();
        clock.advance(Duration::seconds(1));
    }

    assert_eq!(ids(&ledger, SetKind::Running).await, vec!["j2", "j3"]);
    assert_eq!(ids(&ledger, SetKind::Finished).await, vec!["j1"]);

    let mut evicted = ledger.job("SyncJob", "j1");
    assert_eq!(evicted.error().await.unwrap().as_deref(), Some(CANCEL_MESSAGE));
    let history = ledger.history("SyncJob");
    assert_eq!(history.total_failed_jobs().await.unwrap(), 1);
    assert_eq!(history.max_running_jobs().await.unwrap(), 3);
}

#[tokio::test]
async fn test_sweep_never_evicts_the_starting_job() {
    let (_store, _clock, ledger) = ledger(ClassOverrides {
        history_len: Some(2),
        ..ClassOverrides::default()
    });

    // Same clock tick, so the tie-break ranks the starting job "a" oldest.
    ledger.job("SyncJob", "b").start(&[]).await.unwrap();
    ledger.job("SyncJob", "a").start(&[]).await.unwrap();

    assert_eq!(ids(&ledger, SetKind::Running).await, vec!["a"]);
    let mut survivor = ledger.job("SyncJob", "a");
    assert!(!survivor.finished().await.unwrap());
}

#[tokio::test]
async fn test_sweep_cancels_stale_before_counting() {
    let (_store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(5),
        sweep_target: Some(3),
        purge_age_secs: Some(60),
        ..ClassOverrides::default()
    });

    for id in ["s1", "s2", "s3", "s4"] {
        ledger.job("SyncJob", id).start(&[]).await.unwrap();
        clock.advance(Duration::seconds(1));
    }
    clock.advance(Duration::seconds(120));
    let running = ledger.job("SyncJob", "s5").start(&[]).await.unwrap();

    assert_eq!(running, 5);
    assert_eq!(ids(&ledger, SetKind::Running).await, vec!["s5"]);
    assert_eq!(
        ledger.history("SyncJob").total_failed_jobs().await.unwrap(),
        4
    );
}

#[tokio::test]
async fn test_sweep_respects_explicit_target() {
    let (_store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(4),
        sweep_target: Some(1),
        ..ClassOverrides::default()
    });

    for id in ["j1", "j2", "j3", "j4"] {
        ledger.job("SyncJob", id).start(&[]).await.unwrap();
        clock.advance(Duration::seconds(1));
    }

    assert_eq!(ids(&ledger, SetKind::Running).await, vec!["j4"]);
    assert_eq!(ids(&ledger, SetKind::Finished).await.len(), 3);
}

#[tokio::test]
async fn test_running_below_threshold_is_untouched() {
    let (_store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(10),
        purge_age_secs: Some(1),
        ..ClassOverrides::default()
    });

    for id in ["j1", "j2"] {
        ledger.job("SyncJob", id).start(&[]).await.unwrap();
        clock.advance(Duration::seconds(30));
    }

    // Stale, but the threshold was never reached.
    assert_eq!(ids(&ledger, SetKind::Running).await, vec!["j1", "j2"]);
}

#[tokio::test]
async fn test_finished_trim_deletes_unlinked_records() {
    let (store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(2),
        exclude_from_linear: Some(true),
        ..ClassOverrides::default()
    });

    for id in ["f1", "f2", "f3"] {
        let mut job = ledger.job("SyncJob", id);
        job.start(&[]).await.unwrap();
        clock.advance(Duration::seconds(1));
        job.finish().await.unwrap();
    }

    assert_eq!(ids(&ledger, SetKind::Finished).await, vec!["f2", "f3"]);
    assert!(store.hgetall("SyncJob.job.f1").await.unwrap().is_empty());
    assert!(!store.hgetall("SyncJob.job.f2").await.unwrap().is_empty());
    assert_eq!(
        ledger.history("SyncJob").total_finished_jobs().await.unwrap(),
        3
    );
}

#[tokio::test]
async fn test_finished_trim_keeps_linear_records() {
    let (store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(2),
        ..ClassOverrides::default()
    });

    for id in ["f1", "f2", "f3"] {
        let mut job = ledger.job("SyncJob", id);
        job.start(&[]).await.unwrap();
        clock.advance(Duration::seconds(1));
        job.finish().await.unwrap();
    }

    assert_eq!(ids(&ledger, SetKind::Finished).await, vec!["f2", "f3"]);
    assert_eq!(ids(&ledger, SetKind::Linear).await, vec!["f1", "f2", "f3"]);
    assert!(!store.hgetall("SyncJob.job.f1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sweep_with_unbounded_purge_age_skips_stale_pass() {
    let (_store, clock, ledger) = ledger(ClassOverrides {
        history_len: Some(2),
        purge_age_secs: Some(10_000_000_000_000),
        ..ClassOverrides::default()
    });
    assert!(ledger.settings().validate().is_ok());

    ledger.job("SyncJob", "a").start(&[]).await.unwrap();
    clock.advance(Duration::seconds(1));
    ledger.job("SyncJob", "b").start(&[]).await.unwrap();

    assert_eq!(ids(&ledger, SetKind::Running).await, vec!["b"]);
    assert_eq!(ids(&ledger, SetKind::Finished).await, vec!["a"]);
    assert_eq!(
        ledger.cleaner().cancel_stale_running("SyncJob").await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_code_built_history_len_below_minimum_keeps_finished_job() {
    let (_store, _clock, ledger) = ledger(ClassOverrides {
        history_len: Some(0),
        ..ClassOverrides::default()
    });

    let mut job = ledger.job("SyncJob", "j1");
    job.start(&[]).await.unwrap();
    assert!(job.finish().await.unwrap());

    assert_eq!(ids(&ledger, SetKind::Finished).await, vec!["j1"]);
    assert_eq!(ids(&ledger, SetKind::Running).await, Vec::<String>::new());
    assert_eq!(ledger.history("SyncJob").class_history_len(), 2);
}
