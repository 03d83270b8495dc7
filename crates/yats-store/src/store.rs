use std::sync::Mutex;

use rusqlite::Connection;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};
use yats_core::keys::KeySpace;
use yats_core::types::{DueSet, Task, TaskId, TaskRecord, TaskState};

use crate::db;
use crate::error::{Result, StoreError};

/// Thread-safe store for task records, the three due-sets, and the id
/// counter of one keyspace.
///
/// Wraps a single SQLite connection in a `Mutex`; submitters may call in
/// from many threads concurrently. Composite operations ([`insert`],
/// [`transition`], [`delete`], [`reset`]) each commit as one transaction so
/// a record and its due-set entry can never disagree.
///
/// [`insert`]: TaskStore::insert
/// [`transition`]: TaskStore::transition
/// [`delete`]: TaskStore::delete
/// [`reset`]: TaskStore::reset
pub struct TaskStore {
    db: Mutex<Connection>,
    keys: KeySpace,
}

impl TaskStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection, keys: KeySpace) -> Result<Self> {
        db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            keys,
        })
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Issue the next task id from this keyspace's counter. Ids are never
    /// reused, even after deletion.
    pub fn next_id(&self) -> Result<TaskId> {
        let db = self.db.lock().unwrap();
        Ok(db::incr(&db, &self.keys.id_counter_key())?)
    }

    /// Atomically assign an id, write the record (state = scheduled), and
    /// index it in the active due-set. Either all three commit or none do.
    #[instrument(skip(self, payload))]
    pub fn insert(&self, task_type: &str, scheduled: f64, payload: Map<String, Value>) -> Result<TaskId> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let id = db::incr(&tx, &self.keys.id_counter_key())?;
        let task = Task {
            id,
            task_type: task_type.to_string(),
            scheduled,
            state: TaskState::Scheduled,
            err_msg: None,
            payload,
        };
        db::hash_set(&tx, &self.keys.task_record_key(), id, &serde_json::to_string(&task)?)?;
        db::zset_add(&tx, &self.keys.due_set_key(DueSet::Active), id, scheduled)?;

        tx.commit()?;
        debug!(id, scheduled, "task inserted");
        Ok(id)
    }

    /// Serialize and write the record under its id, overwriting any previous
    /// value. Does not touch the due-sets.
    pub fn put(&self, task: &Task) -> Result<()> {
        let json = serde_json::to_string(task)?;
        let db = self.db.lock().unwrap();
        db::hash_set(&db, &self.keys.task_record_key(), task.id, &json)?;
        Ok(())
    }

    /// Look up one record. `None` when absent; a stored value that fails to
    /// decode comes back as [`TaskRecord::Raw`] with a logged warning.
    pub fn get(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let db = self.db.lock().unwrap();
        let raw = db::hash_get(&db, &self.keys.task_record_key(), id)?;
        Ok(raw.map(|r| decode(id, r)))
    }

    /// Look up many records: one slot per input id, input order and
    /// duplicates preserved.
    pub fn get_many(&self, ids: &[TaskId]) -> Result<Vec<Option<TaskRecord>>> {
        let db = self.db.lock().unwrap();
        let raws = db::hash_get_many(&db, &self.keys.task_record_key(), ids)?;
        Ok(ids
            .iter()
            .zip(raws)
            .map(|(id, raw)| raw.map(|r| decode(*id, r)))
            .collect())
    }

    /// Remove the record and the id's entry from whichever due-set holds it
    /// (all three are cleared), in one transaction. Idempotent.
    #[instrument(skip(self))]
    pub fn delete(&self, id: TaskId) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        db::hash_delete(&tx, &self.keys.task_record_key(), id)?;
        for set in DueSet::ALL {
            db::zset_remove(&tx, &self.keys.due_set_key(set), id)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Apply `partial` to the stored record as a shallow
    /// overwrite-on-present-keys merge, write it back, and return the
    /// updated task. Fails with [`StoreError::NotFound`] when no record
    /// exists for `id`.
    #[instrument(skip(self, partial))]
    pub fn merge(&self, id: TaskId, partial: &Map<String, Value>) -> Result<Task> {
        let db = self.db.lock().unwrap();
        merge_in(&db, &self.keys, id, partial)
    }

    /// Add `(id, score)` to a due-set, replacing the score if the id is
    /// already present.
    pub fn due_add(&self, set: DueSet, id: TaskId, score: f64) -> Result<()> {
        let db = self.db.lock().unwrap();
        Ok(db::zset_add(&db, &self.keys.due_set_key(set), id, score)?)
    }

    /// Remove an id from a due-set; no-op when absent.
    pub fn due_remove(&self, set: DueSet, id: TaskId) -> Result<()> {
        let db = self.db.lock().unwrap();
        db::zset_remove(&db, &self.keys.due_set_key(set), id)?;
        Ok(())
    }

    /// Ids in `set` with score in `[min, max]` inclusive, ascending by score
    /// then id.
    pub fn due_range(&self, set: DueSet, min: f64, max: f64) -> Result<Vec<TaskId>> {
        let db = self.db.lock().unwrap();
        Ok(db::zset_range_by_score(&db, &self.keys.due_set_key(set), min, max)?)
    }

    /// Move an id between due-sets at the given score, in one transaction.
    pub fn due_move(&self, id: TaskId, score: f64, from: DueSet, to: DueSet) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        db::zset_remove(&tx, &self.keys.due_set_key(from), id)?;
        db::zset_add(&tx, &self.keys.due_set_key(to), id, score)?;
        tx.commit()?;
        Ok(())
    }

    /// Apply a state transition: merge the record with the new state (and
    /// `errMsg`, if any) and move the due-set entry from the active set to
    /// the target state's set at the task's original score — one transaction.
    #[instrument(skip(self, task), fields(id = task.id))]
    pub fn transition(&self, task: &Task, to: TaskState, err_msg: Option<&str>) -> Result<Task> {
        let mut partial = Map::new();
        partial.insert("state".to_string(), serde_json::to_value(to)?);
        if let Some(msg) = err_msg {
            partial.insert("errMsg".to_string(), Value::String(msg.to_string()));
        }

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let updated = merge_in(&tx, &self.keys, task.id, &partial)?;
        db::zset_remove(&tx, &self.keys.due_set_key(DueSet::Active), task.id)?;
        db::zset_add(&tx, &self.keys.due_set_key(to.due_set()), task.id, task.scheduled)?;
        tx.commit()?;

        debug!(id = task.id, state = %to, "task transitioned");
        Ok(updated)
    }

    /// Destroy every record, all three due-sets, and the id counter of this
    /// keyspace, in one transaction. Test/teardown helper; irreversible.
    #[instrument(skip(self))]
    pub fn reset(&self) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        db::hash_clear(&tx, &self.keys.task_record_key())?;
        for set in DueSet::ALL {
            db::zset_clear(&tx, &self.keys.due_set_key(set))?;
        }
        db::counter_clear(&tx, &self.keys.id_counter_key())?;
        tx.commit()?;
        warn!(keyspace = %self.keys.prefix(), "keyspace reset");
        Ok(())
    }
}

/// Decode a stored record, degrading to the raw text when it does not parse.
fn decode(id: TaskId, raw: String) -> TaskRecord {
    match serde_json::from_str::<Task>(&raw) {
        Ok(task) => TaskRecord::Task(task),
        Err(e) => {
            warn!(id, error = %e, "stored task does not decode, returning raw value");
            TaskRecord::Raw(raw)
        }
    }
}

/// Merge implementation shared by [`TaskStore::merge`] and
/// [`TaskStore::transition`]; works on a plain connection or a transaction.
fn merge_in(conn: &Connection, keys: &KeySpace, id: TaskId, partial: &Map<String, Value>) -> Result<Task> {
    let raw = db::hash_get(conn, &keys.task_record_key(), id)?.ok_or(StoreError::NotFound { id })?;
    let mut fields: Map<String, Value> =
        serde_json::from_str(&raw).map_err(|_| StoreError::Corrupt { id })?;

    for (key, value) in partial {
        // Identity is immutable once assigned.
        if key == "id" {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }

    let task: Task =
        serde_json::from_value(Value::Object(fields)).map_err(|_| StoreError::Corrupt { id })?;
    db::hash_set(conn, &keys.task_record_key(), id, &serde_json::to_string(&task)?)?;
    Ok(task)
}
