//! SQLite schema and the low-level hash / sorted-set / counter primitives.
//!
//! Every function takes `&Connection`, so the same primitives work inside a
//! transaction (`rusqlite::Transaction` derefs to `Connection`) — that is
//! what lets `TaskStore` compose them into atomic multi-step operations.

use rusqlite::{Connection, OptionalExtension, Result};
use yats_core::types::TaskId;

/// Initialise the storage schema in `conn`. Safe to call on every startup
/// (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS records (
            key    TEXT    NOT NULL,
            field  INTEGER NOT NULL,
            value  TEXT    NOT NULL,
            PRIMARY KEY (key, field)
        ) STRICT;

        CREATE TABLE IF NOT EXISTS due_sets (
            key    TEXT    NOT NULL,
            member INTEGER NOT NULL,
            score  REAL    NOT NULL,
            PRIMARY KEY (key, member)
        ) STRICT;

        -- Efficient polling: SELECT … WHERE key = ? AND score <= ?
        -- ORDER BY score, member
        CREATE INDEX IF NOT EXISTS idx_due_sets_score
            ON due_sets (key, score, member);

        CREATE TABLE IF NOT EXISTS counters (
            key   TEXT    NOT NULL PRIMARY KEY,
            value INTEGER NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}

pub fn hash_set(conn: &Connection, key: &str, field: TaskId, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO records (key, field, value) VALUES (?1, ?2, ?3)
         ON CONFLICT (key, field) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, field, value],
    )?;
    Ok(())
}

pub fn hash_get(conn: &Connection, key: &str, field: TaskId) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM records WHERE key = ?1 AND field = ?2",
        rusqlite::params![key, field],
        |row| row.get(0),
    )
    .optional()
}

/// One slot per requested field, input order and duplicates preserved.
pub fn hash_get_many(conn: &Connection, key: &str, fields: &[TaskId]) -> Result<Vec<Option<String>>> {
    let mut stmt = conn.prepare("SELECT value FROM records WHERE key = ?1 AND field = ?2")?;
    fields
        .iter()
        .map(|field| {
            stmt.query_row(rusqlite::params![key, field], |row| row.get(0))
                .optional()
        })
        .collect()
}

/// Returns whether a row was actually removed.
pub fn hash_delete(conn: &Connection, key: &str, field: TaskId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM records WHERE key = ?1 AND field = ?2",
        rusqlite::params![key, field],
    )?;
    Ok(n > 0)
}

pub fn hash_clear(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM records WHERE key = ?1", [key])?;
    Ok(())
}

/// Upsert `(member, score)` into the named sorted set.
pub fn zset_add(conn: &Connection, key: &str, member: TaskId, score: f64) -> Result<()> {
    conn.execute(
        "INSERT INTO due_sets (key, member, score) VALUES (?1, ?2, ?3)
         ON CONFLICT (key, member) DO UPDATE SET score = excluded.score",
        rusqlite::params![key, member, score],
    )?;
    Ok(())
}

/// Returns whether the member was present.
pub fn zset_remove(conn: &Connection, key: &str, member: TaskId) -> Result<bool> {
    let n = conn.execute(
        "DELETE FROM due_sets WHERE key = ?1 AND member = ?2",
        rusqlite::params![key, member],
    )?;
    Ok(n > 0)
}

/// Members with `min <= score <= max`, ascending by score, ties broken by
/// ascending member id.
pub fn zset_range_by_score(conn: &Connection, key: &str, min: f64, max: f64) -> Result<Vec<TaskId>> {
    let mut stmt = conn.prepare(
        "SELECT member FROM due_sets
         WHERE key = ?1 AND score >= ?2 AND score <= ?3
         ORDER BY score ASC, member ASC",
    )?;
    let rows = stmt.query_map(rusqlite::params![key, min, max], |row| row.get(0))?;
    rows.collect()
}

pub fn zset_clear(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM due_sets WHERE key = ?1", [key])?;
    Ok(())
}

/// Atomically increment the named counter, creating it at 1, and return the
/// new value. A single statement, race-free under concurrent callers.
pub fn incr(conn: &Connection, key: &str) -> Result<TaskId> {
    conn.query_row(
        "INSERT INTO counters (key, value) VALUES (?1, 1)
         ON CONFLICT (key) DO UPDATE SET value = value + 1
         RETURNING value",
        [key],
        |row| row.get(0),
    )
}

pub fn counter_clear(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM counters WHERE key = ?1", [key])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open failed");
        init_db(&conn).expect("init failed");
        conn
    }

    #[test]
    fn incr_starts_at_one_and_is_monotonic() {
        let conn = conn();
        assert_eq!(incr(&conn, "k:id").expect("incr failed"), 1);
        assert_eq!(incr(&conn, "k:id").expect("incr failed"), 2);
        assert_eq!(incr(&conn, "k:id").expect("incr failed"), 3);
        // Independent counters do not interfere.
        assert_eq!(incr(&conn, "other:id").expect("incr failed"), 1);
    }

    #[test]
    fn hash_roundtrip_and_idempotent_delete() {
        let conn = conn();
        hash_set(&conn, "k:tasks", 1, "a").expect("set failed");
        hash_set(&conn, "k:tasks", 1, "b").expect("overwrite failed");
        assert_eq!(hash_get(&conn, "k:tasks", 1).expect("get failed").as_deref(), Some("b"));
        assert_eq!(hash_get(&conn, "k:tasks", 2).expect("get failed"), None);

        assert!(hash_delete(&conn, "k:tasks", 1).expect("delete failed"));
        assert!(!hash_delete(&conn, "k:tasks", 1).expect("redelete failed"));
    }

    #[test]
    fn hash_get_many_preserves_order_and_duplicates() {
        let conn = conn();
        hash_set(&conn, "k:tasks", 1, "one").expect("set failed");
        hash_set(&conn, "k:tasks", 3, "three").expect("set failed");

        let got = hash_get_many(&conn, "k:tasks", &[3, 2, 1, 3]).expect("get_many failed");
        assert_eq!(
            got,
            vec![
                Some("three".to_string()),
                None,
                Some("one".to_string()),
                Some("three".to_string())
            ]
        );
    }

    #[test]
    fn zset_range_orders_by_score_then_member() {
        let conn = conn();
        zset_add(&conn, "k:ztasks", 5, 10.0).expect("add failed");
        zset_add(&conn, "k:ztasks", 2, 10.0).expect("add failed");
        zset_add(&conn, "k:ztasks", 9, 3.0).expect("add failed");
        zset_add(&conn, "k:ztasks", 1, 99.0).expect("add failed");

        let members = zset_range_by_score(&conn, "k:ztasks", 0.0, 50.0).expect("range failed");
        assert_eq!(members, vec![9, 2, 5]);

        // Bounds are inclusive on both ends.
        let exact = zset_range_by_score(&conn, "k:ztasks", 10.0, 10.0).expect("range failed");
        assert_eq!(exact, vec![2, 5]);
    }

    #[test]
    fn zset_add_is_an_upsert() {
        let conn = conn();
        zset_add(&conn, "k:ztasks", 1, 5.0).expect("add failed");
        zset_add(&conn, "k:ztasks", 1, 7.0).expect("rescore failed");
        assert!(zset_range_by_score(&conn, "k:ztasks", 0.0, 6.0)
            .expect("range failed")
            .is_empty());
        assert_eq!(
            zset_range_by_score(&conn, "k:ztasks", 6.0, 8.0).expect("range failed"),
            vec![1]
        );
    }
}
