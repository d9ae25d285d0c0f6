/// Inline SQL migrations for the key-value schema.
///
/// Each entry runs once and is recorded in `_migrations` by its 1-based
/// position, so entries are append-only.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: key directory. One row per live key; `kind` pins the
    // value type and `expires_at` (unix ms) is optional.
    r#"
CREATE TABLE IF NOT EXISTS kv_keys (
    key TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    expires_at INTEGER
);
"#,
    // Migration 2: hash fields (job records)
    r#"
CREATE TABLE IF NOT EXISTS kv_hash (
    key TEXT NOT NULL,
    field TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (key, field)
);
"#,
    // Migration 3: counters (per-class aggregates)
    r#"
CREATE TABLE IF NOT EXISTS kv_counter (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
"#,
    // Migration 4: ordered sets (running/finished/linear, class list)
    r#"
CREATE TABLE IF NOT EXISTS kv_zset (
    key TEXT NOT NULL,
    member TEXT NOT NULL,
    score INTEGER NOT NULL,
    PRIMARY KEY (key, member)
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_kv_zset_score ON kv_zset(key, score, member);
"#,
    // Migration 6: lists (cutting blocks, queues)
    r#"
CREATE TABLE IF NOT EXISTS kv_list (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL,
    value TEXT NOT NULL
);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_kv_list_key ON kv_list(key, id);
"#,
    r#"
CREATE INDEX IF NOT EXISTS idx_kv_keys_expiry ON kv_keys(expires_at) WHERE expires_at IS NOT NULL;
"#,
];
