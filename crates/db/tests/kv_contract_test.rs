//! KvStore contract, checked against both the in-memory and SQLite stores.

use std::sync::Arc;
use std::time::Duration;

use jobtrail_core::{KvStore, MemoryStore, ScoredMember, SortOrder, StoreError};
use jobtrail_db::SqliteStore;
use pretty_assertions::assert_eq;

async fn stores() -> Vec<(&'static str, Arc<dyn KvStore>)> {
    vec![
        ("memory", Arc::new(MemoryStore::new())),
        ("sqlite", Arc::new(SqliteStore::new_in_memory().await.unwrap())),
    ]
}

fn scored(member: &str, score: i64) -> ScoredMember {
    ScoredMember {
        member: member.to_string(),
        score,
    }
}

#[tokio::test]
async fn test_hash_fields() {
    for (name, store) in stores().await {
        store
            .hset("job.1", &[("start_time", "t0".to_string()), ("pid", "7".to_string())])
            .await
            .unwrap();
        assert_eq!(store.hget("job.1", "pid").await.unwrap().as_deref(), Some("7"), "{name}");
        assert_eq!(store.hget("job.1", "error").await.unwrap(), None, "{name}");
        assert_eq!(store.hget("job.missing", "pid").await.unwrap(), None, "{name}");

        store.hset("job.1", &[("pid", "8".to_string())]).await.unwrap();
        let all = store.hgetall("job.1").await.unwrap();
        assert_eq!(all.len(), 2, "{name}");
        assert_eq!(all["pid"], "8", "{name}");
        assert!(store.hgetall("job.missing").await.unwrap().is_empty(), "{name}");
    }
}

#[tokio::test]
async fn test_hsetnx_first_writer_wins() {
    for (name, store) in stores().await {
        assert!(store.hsetnx("job.1", "end_time", "first").await.unwrap(), "{name}");
        assert!(!store.hsetnx("job.1", "end_time", "second").await.unwrap(), "{name}");
        assert_eq!(
            store.hget("job.1", "end_time").await.unwrap().as_deref(),
            Some("first"),
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_counters() {
    for (name, store) in stores().await {
        assert_eq!(store.get_counter("failed").await.unwrap(), None, "{name}");
        assert_eq!(store.incr("failed").await.unwrap(), 1, "{name}");
        assert_eq!(store.incr("failed").await.unwrap(), 2, "{name}");

        assert_eq!(store.set_max("max", 3).await.unwrap(), 3, "{name}");
        assert_eq!(store.set_max("max", 1).await.unwrap(), 3, "{name}");
        assert_eq!(store.set_max("max", 9).await.unwrap(), 9, "{name}");
        assert_eq!(store.get_counter("max").await.unwrap(), Some(9), "{name}");
    }
}

#[tokio::test]
async fn test_sorted_sets() {
    for (name, store) in stores().await {
        assert_eq!(store.zadd("running", "b", 20).await.unwrap(), 1, "{name}");
        assert_eq!(store.zadd("running", "a", 20).await.unwrap(), 2, "{name}");
        assert_eq!(store.zadd("running", "c", 10).await.unwrap(), 3, "{name}");
        // Re-scoring keeps the cardinality.
        assert_eq!(store.zadd("running", "c", 5).await.unwrap(), 3, "{name}");

        assert_eq!(store.zscore("running", "c").await.unwrap(), Some(5), "{name}");
        assert_eq!(store.zcard("running").await.unwrap(), 3, "{name}");

        let asc = store
            .zrange("running", SortOrder::Asc, 0, None)
            .await
            .unwrap();
        assert_eq!(asc, vec![scored("c", 5), scored("a", 20), scored("b", 20)], "{name}");

        let desc_page = store
            .zrange("running", SortOrder::Desc, 1, Some(1))
            .await
            .unwrap();
        assert_eq!(desc_page, vec![scored("a", 20)], "{name}");

        assert!(store.zrem("running", "a").await.unwrap(), "{name}");
        assert!(!store.zrem("running", "a").await.unwrap(), "{name}");
        assert!(!store.zrem("missing", "a").await.unwrap(), "{name}");
    }
}

#[tokio::test]
async fn test_empty_set_has_no_key() {
    for (name, store) in stores().await {
        store.zadd("class.running_jobs", "1", 1).await.unwrap();
        store.zrem("class.running_jobs", "1").await.unwrap();
        assert!(store.scan_prefix("class.").await.unwrap().is_empty(), "{name}");
        assert_eq!(store.zcard("class.running_jobs").await.unwrap(), 0, "{name}");
    }
}

#[tokio::test]
async fn test_lists_and_expiry() {
    for (name, store) in stores().await {
        assert_eq!(store.rpush("block.h", "11").await.unwrap(), 1, "{name}");
        assert_eq!(store.rpush("block.h", "12").await.unwrap(), 2, "{name}");
        assert_eq!(store.lrange("block.h").await.unwrap(), vec!["11", "12"], "{name}");

        assert!(!store.expire("block.none", Duration::from_secs(1)).await.unwrap(), "{name}");
        assert!(store.expire("block.h", Duration::from_millis(50)).await.unwrap(), "{name}");
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(store.lrange("block.h").await.unwrap().is_empty(), "{name}");
        assert!(store.scan_prefix("block.").await.unwrap().is_empty(), "{name}");
        // An expired key can be reused from scratch.
        assert_eq!(store.rpush("block.h", "13").await.unwrap(), 1, "{name}");
    }
}

#[tokio::test]
async fn test_ltake_drains_list() {
    for (name, store) in stores().await {
        for pid in ["11", "12", "13"] {
            store.rpush("block.h", pid).await.unwrap();
        }
        assert_eq!(
            store.ltake("block.h").await.unwrap(),
            vec!["11", "12", "13"],
            "{name}"
        );
        assert!(store.ltake("block.h").await.unwrap().is_empty(), "{name}");
        assert!(store.lrange("block.h").await.unwrap().is_empty(), "{name}");
        assert!(store.scan_prefix("block.").await.unwrap().is_empty(), "{name}");

        store.hset("job.1", &[("pid", "1".to_string())]).await.unwrap();
        assert!(
            matches!(store.ltake("job.1").await, Err(StoreError::WrongType { .. })),
            "{name}"
        );
    }
}

#[tokio::test]
async fn test_ltake_loses_nothing_under_concurrent_pushes() {
    for (name, store) in stores().await {
        let pusher = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for pid in 0..50 {
                    store.rpush("block.h", &pid.to_string()).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };
        let mut taken = Vec::new();
        while !pusher.is_finished() {
            taken.extend(store.ltake("block.h").await.unwrap());
            tokio::task::yield_now().await;
        }
        pusher.await.unwrap();
        taken.extend(store.ltake("block.h").await.unwrap());

        let expected: Vec<String> = (0..50).map(|pid: i32| pid.to_string()).collect();
        assert_eq!(taken, expected, "{name}");
    }
}

#[tokio::test]
async fn test_del_and_scan_prefix() {
    for (name, store) in stores().await {
        store.hset("c.job.1", &[("a", "1".to_string())]).await.unwrap();
        store.hset("c.job.2", &[("a", "1".to_string())]).await.unwrap();
        store.hset("c.jobx", &[("a", "1".to_string())]).await.unwrap();
        store.incr("d.total").await.unwrap();

        assert_eq!(
            store.scan_prefix("c.job.").await.unwrap(),
            vec!["c.job.1", "c.job.2"],
            "{name}"
        );

        let removed = store
            .del(&["c.job.1".to_string(), "c.job.9".to_string(), "d.total".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2, "{name}");
        assert_eq!(store.get_counter("d.total").await.unwrap(), None, "{name}");
        assert_eq!(store.scan_prefix("").await.unwrap(), vec!["c.job.2", "c.jobx"], "{name}");
    }
}

#[tokio::test]
async fn test_wrong_type_is_rejected() {
    for (name, store) in stores().await {
        store.incr("counter").await.unwrap();
        let err = store.zadd("counter", "m", 1).await.unwrap_err();
        assert!(matches!(err, StoreError::WrongType { ref key } if key == "counter"), "{name}");
        assert!(store.hgetall("counter").await.is_err(), "{name}");
    }
}
