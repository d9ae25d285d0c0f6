// crates/db/src/kv_store.rs
//! [`KvStore`] over SQLite tables.
//!
//! Every live key has a row in `kv_keys` holding its type and optional
//! expiry; values live in one table per type. Each write runs in a
//! transaction whose first statement is a write, so SQLite takes the write
//! lock up front and concurrent writers wait on `busy_timeout` instead of
//! failing a lock upgrade.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqliteConnection;

use jobtrail_core::{KvStore, ScoredMember, SortOrder, StoreError, StoreResult};

use crate::SqliteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Hash,
    Counter,
    Sorted,
    List,
}

impl Kind {
    fn as_str(self) -> &'static str {
        match self {
            Kind::Hash => "hash",
            Kind::Counter => "counter",
            Kind::Sorted => "zset",
            Kind::List => "list",
        }
    }
}

const VALUE_TABLES: &[&str] = &["kv_hash", "kv_counter", "kv_zset", "kv_list"];

pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::backend(err)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Delete the value rows of `key` (not its `kv_keys` row).
pub(crate) async fn delete_values(
    conn: &mut SqliteConnection,
    key: &str,
) -> Result<(), sqlx::Error> {
    for table in VALUE_TABLES {
        let sql = format!("DELETE FROM {table} WHERE key = ?");
        sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Drop `key` entirely if its expiry has passed.
async fn drop_if_expired(conn: &mut SqliteConnection, key: &str) -> Result<(), sqlx::Error> {
    let expired = sqlx::query(
        "DELETE FROM kv_keys WHERE key = ? AND expires_at IS NOT NULL AND expires_at <= ?",
    )
    .bind(key)
    .bind(now_ms())
    .execute(&mut *conn)
    .await?
    .rows_affected()
        > 0;
    if expired {
        delete_values(conn, key).await?;
    }
    Ok(())
}

/// Register `key` as `kind`, failing if it already holds another type.
async fn claim(conn: &mut SqliteConnection, key: &str, kind: Kind) -> StoreResult<()> {
    drop_if_expired(conn, key).await.map_err(backend)?;
    sqlx::query("INSERT INTO kv_keys (key, kind) VALUES (?, ?) ON CONFLICT(key) DO NOTHING")
        .bind(key)
        .bind(kind.as_str())
        .execute(&mut *conn)
        .await
        .map_err(backend)?;
    let (stored,): (String,) = sqlx::query_as("SELECT kind FROM kv_keys WHERE key = ?")
        .bind(key)
        .fetch_one(&mut *conn)
        .await
        .map_err(backend)?;
    if stored != kind.as_str() {
        return Err(wrong_type(key));
    }
    Ok(())
}

impl SqliteStore {
    /// Whether `key` is live and of `kind`. Live keys of another kind are
    /// an error.
    async fn holds(&self, key: &str, kind: Kind) -> StoreResult<bool> {
        let stored: Option<(String,)> = sqlx::query_as(
            "SELECT kind FROM kv_keys WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(self.pool())
        .await
        .map_err(backend)?;
        match stored {
            None => Ok(false),
            Some((stored,)) if stored == kind.as_str() => Ok(true),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn count_members(conn: &mut SqliteConnection, table: &str, key: &str) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table} WHERE key = ?");
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(backend)?;
        Ok(count as u64)
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        if !self.holds(key, Kind::Hash).await? {
            return Ok(None);
        }
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_hash WHERE key = ? AND field = ?")
                .bind(key)
                .bind(field)
                .fetch_optional(self.pool())
                .await
                .map_err(backend)?;
        Ok(row.map(|(value,)| value))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        if !self.holds(key, Kind::Hash).await? {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT field, value FROM kv_hash WHERE key = ?")
                .bind(key)
                .fetch_all(self.pool())
                .await
                .map_err(backend)?;
        Ok(rows.into_iter().collect())
    }

    async fn hset(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await.map_err(backend)?;
        claim(&mut tx, key, Kind::Hash).await?;
        for (field, value) in fields {
            sqlx::query(
                "INSERT INTO kv_hash (key, field, value) VALUES (?, ?, ?)
                 ON CONFLICT(key, field) DO UPDATE SET value = excluded.value",
            )
            .bind(key)
            .bind(*field)
            .bind(value.as_str())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)
    }

    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        claim(&mut tx, key, Kind::Hash).await?;
        let written = sqlx::query(
            "INSERT INTO kv_hash (key, field, value) VALUES (?, ?, ?)
             ON CONFLICT(key, field) DO NOTHING",
        )
        .bind(key)
        .bind(field)
        .bind(value)
        .execute(&mut *tx)
        .await
        .map_err(backend)?
        .rows_affected()
            > 0;
        tx.commit().await.map_err(backend)?;
        Ok(written)
    }

    async fn del(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool().begin().await.map_err(backend)?;
        let mut removed = 0;
        for key in keys {
            drop_if_expired(&mut tx, key).await.map_err(backend)?;
            let existed = sqlx::query("DELETE FROM kv_keys WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(backend)?
                .rows_affected()
                > 0;
            if existed {
                delete_values(&mut tx, key).await.map_err(backend)?;
                removed += 1;
            }
        }
        tx.commit().await.map_err(backend)?;
        Ok(removed)
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        claim(&mut tx, key, Kind::Counter).await?;
        let (value,): (i64,) = sqlx::query_as(
            "INSERT INTO kv_counter (key, value) VALUES (?, 1)
             ON CONFLICT(key) DO UPDATE SET value = value + 1
             RETURNING value",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(value)
    }

    async fn set_max(&self, key: &str, value: i64) -> StoreResult<i64> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        claim(&mut tx, key, Kind::Counter).await?;
        let (stored,): (i64,) = sqlx::query_as(
            "INSERT INTO kv_counter (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)
             RETURNING value",
        )
        .bind(key)
        .bind(value)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;
        tx.commit().await.map_err(backend)?;
        Ok(stored)
    }

    async fn get_counter(&self, key: &str) -> StoreResult<Option<i64>> {
        if !self.holds(key, Kind::Counter).await? {
            return Ok(None);
        }
        let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM kv_counter WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(backend)?;
        Ok(row.map(|(value,)| value))
    }

    async fn zadd(&self, key: &str, member: &str, score: i64) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        claim(&mut tx, key, Kind::Sorted).await?;
        sqlx::query(
            "INSERT INTO kv_zset (key, member, score) VALUES (?, ?, ?)
             ON CONFLICT(key, member) DO UPDATE SET score = excluded.score",
        )
        .bind(key)
        .bind(member)
        .bind(score)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        let count = Self::count_members(&mut tx, "kv_zset", key).await?;
        tx.commit().await.map_err(backend)?;
        Ok(count)
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        drop_if_expired(&mut tx, key).await.map_err(backend)?;
        let stored: Option<(String,)> = sqlx::query_as("SELECT kind FROM kv_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        match stored {
            None => return Ok(false),
            Some((kind,)) if kind != Kind::Sorted.as_str() => return Err(wrong_type(key)),
            Some(_) => {}
        }

        let removed = sqlx::query("DELETE FROM kv_zset WHERE key = ? AND member = ?")
            .bind(key)
            .bind(member)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected()
            > 0;
        if removed && Self::count_members(&mut tx, "kv_zset", key).await? == 0 {
            sqlx::query("DELETE FROM kv_keys WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(removed)
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<i64>> {
        if !self.holds(key, Kind::Sorted).await? {
            return Ok(None);
        }
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT score FROM kv_zset WHERE key = ? AND member = ?")
                .bind(key)
                .bind(member)
                .fetch_optional(self.pool())
                .await
                .map_err(backend)?;
        Ok(row.map(|(score,)| score))
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        if !self.holds(key, Kind::Sorted).await? {
            return Ok(0);
        }
        let mut conn = self.pool().acquire().await.map_err(backend)?;
        Self::count_members(&mut conn, "kv_zset", key).await
    }

    async fn zrange(
        &self,
        key: &str,
        order: SortOrder,
        offset: u64,
        limit: Option<u64>,
    ) -> StoreResult<Vec<ScoredMember>> {
        if !self.holds(key, Kind::Sorted).await? {
            return Ok(Vec::new());
        }
        let order_by = match order {
            SortOrder::Asc => "score ASC, member ASC",
            SortOrder::Desc => "score DESC, member DESC",
        };
        let sql = format!(
            "SELECT member, score FROM kv_zset WHERE key = ? ORDER BY {order_by} LIMIT ? OFFSET ?"
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .bind(key)
            .bind(limit.map_or(-1, to_i64))
            .bind(to_i64(offset))
            .fetch_all(self.pool())
            .await
            .map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    async fn rpush(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        claim(&mut tx, key, Kind::List).await?;
        sqlx::query("INSERT INTO kv_list (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        let len = Self::count_members(&mut tx, "kv_list", key).await?;
        tx.commit().await.map_err(backend)?;
        Ok(len)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let deadline = now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));
        let mut tx = self.pool().begin().await.map_err(backend)?;
        drop_if_expired(&mut tx, key).await.map_err(backend)?;
        let updated = sqlx::query("UPDATE kv_keys SET expires_at = ? WHERE key = ?")
            .bind(deadline)
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?
            .rows_affected()
            > 0;
        tx.commit().await.map_err(backend)?;
        Ok(updated)
    }

    async fn lrange(&self, key: &str) -> StoreResult<Vec<String>> {
        if !self.holds(key, Kind::List).await? {
            return Ok(Vec::new());
        }
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT value FROM kv_list WHERE key = ? ORDER BY id")
                .bind(key)
                .fetch_all(self.pool())
                .await
                .map_err(backend)?;
        Ok(rows.into_iter().map(|(value,)| value).collect())
    }

    async fn ltake(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut tx = self.pool().begin().await.map_err(backend)?;
        drop_if_expired(&mut tx, key).await.map_err(backend)?;
        let stored: Option<(String,)> = sqlx::query_as("SELECT kind FROM kv_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?;
        match stored {
            None => {
                tx.commit().await.map_err(backend)?;
                return Ok(Vec::new());
            }
            Some((stored,)) if stored != Kind::List.as_str() => return Err(wrong_type(key)),
            Some(_) => {}
        }

        // RETURNING row order is unspecified.
        let mut rows: Vec<(i64, String)> =
            sqlx::query_as("DELETE FROM kv_list WHERE key = ? RETURNING id, value")
                .bind(key)
                .fetch_all(&mut *tx)
                .await
                .map_err(backend)?;
        sqlx::query("DELETE FROM kv_keys WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        rows.sort_by_key(|(id, _)| *id);
        Ok(rows.into_iter().map(|(_, value)| value).collect())
    }

    async fn scan_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM kv_keys
             WHERE substr(key, 1, length(?)) = ?
               AND (expires_at IS NULL OR expires_at > ?)
             ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .bind(now_ms())
        .fetch_all(self.pool())
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(|(key,)| key).collect())
    }
}
