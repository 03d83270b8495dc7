use std::sync::Arc;

use tracing::{debug, instrument};
use yats_core::types::{DueSet, NewTask, TaskId, TaskRecord};
use yats_store::TaskStore;

use crate::error::{Result, SchedulerError};

/// Lookup criteria for [`Scheduler::query`]. Exactly one of `ids` or `times`
/// must be supplied.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub ids: Option<Vec<TaskId>>,
    pub times: Option<Vec<f64>>,
}

/// Public surface for submitting, querying, and deleting tasks.
///
/// Cheap to clone; all clones share one [`TaskStore`].
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<TaskStore>,
}

impl Scheduler {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }

    /// Submit one task and return its assigned id.
    ///
    /// The record is written with `state = scheduled` and indexed in the
    /// active due-set in the same transaction as the id assignment.
    #[instrument(skip(self, task), fields(task_type = %task.task_type))]
    pub fn submit(&self, task: NewTask) -> Result<TaskId> {
        let scheduled = task
            .scheduled
            .ok_or_else(|| SchedulerError::Validation("task has no scheduled time".to_string()))?;
        let id = self.store.insert(&task.task_type, scheduled, task.payload)?;
        debug!(id, scheduled, "task submitted");
        Ok(id)
    }

    /// Submit many tasks, best-effort: each submission is independent, so
    /// one failing neither blocks nor rolls back the others. The result has
    /// one slot per input task, input order preserved.
    pub fn submit_batch(&self, tasks: Vec<NewTask>) -> Vec<Result<TaskId>> {
        tasks.into_iter().map(|task| self.submit(task)).collect()
    }

    /// Direct record lookups: one slot per input id, `None` for missing ids,
    /// order and duplicates preserved.
    pub fn query_by_ids(&self, ids: &[TaskId]) -> Result<Vec<Option<TaskRecord>>> {
        Ok(self.store.get_many(ids)?)
    }

    /// Every task currently in the active due-set whose scheduled time lies
    /// in `[min(times), max(times)]` inclusive, resolved to full records.
    pub fn query_by_times(&self, times: &[f64]) -> Result<Vec<Option<TaskRecord>>> {
        if times.is_empty() {
            return Err(SchedulerError::Validation("times must not be empty".to_string()));
        }
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let ids = self.store.due_range(DueSet::Active, min, max)?;
        self.query_by_ids(&ids)
    }

    /// Criteria-based lookup. Supplying both `ids` and `times`, or neither,
    /// is a validation error.
    pub fn query(&self, criteria: &Query) -> Result<Vec<Option<TaskRecord>>> {
        match (&criteria.ids, &criteria.times) {
            (Some(_), Some(_)) => Err(SchedulerError::Validation(
                "only one of ids or times can be used".to_string(),
            )),
            (Some(ids), None) => self.query_by_ids(ids),
            (None, Some(times)) => self.query_by_times(times),
            (None, None) => Err(SchedulerError::Validation("empty criteria".to_string())),
        }
    }

    /// Remove a task's record and its due-set entry, wherever it currently
    /// lives. Unknown ids are a no-op.
    #[instrument(skip(self))]
    pub fn delete_by_id(&self, id: TaskId) -> Result<()> {
        Ok(self.store.delete(id)?)
    }

    pub fn delete_by_ids(&self, ids: &[TaskId]) -> Result<()> {
        for id in ids {
            self.store.delete(*id)?;
        }
        Ok(())
    }

    /// Destructively clear this keyspace: records, all three due-sets, and
    /// the id counter. Intended for test/teardown use only.
    pub fn reset(&self) -> Result<()> {
        Ok(self.store.reset()?)
    }
}
