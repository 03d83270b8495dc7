use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Counter-issued task identifier. The first id in a fresh keyspace is 1;
/// ids are never reused, even after deletion.
pub type TaskId = u64;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Submitted, waiting for its scheduled time.
    Scheduled,
    /// Picked up by the dispatch engine. Equivalent to `Scheduled` before
    /// dispatch — eligibility is active due-set membership, not this field.
    Active,
    /// Terminal success.
    Completed,
    /// Terminal failure; `err_msg` carries the reason.
    Error,
}

impl TaskState {
    /// The due-set that holds a task in this state.
    pub fn due_set(&self) -> DueSet {
        match self {
            TaskState::Scheduled | TaskState::Active => DueSet::Active,
            TaskState::Completed => DueSet::Inactive,
            TaskState::Error => DueSet::Error,
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Scheduled => "scheduled",
            TaskState::Active => "active",
            TaskState::Completed => "completed",
            TaskState::Error => "error",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(TaskState::Scheduled),
            "active" => Ok(TaskState::Active),
            "completed" => Ok(TaskState::Completed),
            "error" => Ok(TaskState::Error),
            other => Err(format!("unknown task state: {other}")),
        }
    }
}

/// One of the three score-ordered index sets. A task id lives in exactly one
/// of these at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueSet {
    /// Not yet run, or run-pending.
    Active,
    /// Terminal success.
    Inactive,
    /// Terminal failure.
    Error,
}

impl DueSet {
    pub const ALL: [DueSet; 3] = [DueSet::Active, DueSet::Inactive, DueSet::Error];

    /// Key-name suffix; the active set uses the bare key.
    pub fn suffix(&self) -> &'static str {
        match self {
            DueSet::Active => "",
            DueSet::Inactive => "inactive",
            DueSet::Error => "error",
        }
    }
}

/// A persisted task record — the single source of truth for task data.
/// Due-sets reference it by id only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Counter-issued identity, immutable once assigned.
    pub id: TaskId,
    /// Handler key: which registered handler runs this task.
    #[serde(rename = "type")]
    pub task_type: String,
    /// Target execution time, Unix seconds (integer or fractional).
    pub scheduled: f64,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Failure reason, set when `state` is [`TaskState::Error`].
    #[serde(rename = "errMsg", default, skip_serializing_if = "Option::is_none")]
    pub err_msg: Option<String>,
    /// Arbitrary caller-supplied fields, stored inline with the record.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Submission input: everything a [`Task`] carries except the parts the
/// scheduler assigns (id, state).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    #[serde(rename = "type")]
    pub task_type: String,
    /// Target execution time. Submission is rejected when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled: Option<f64>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NewTask {
    pub fn new(task_type: impl Into<String>, scheduled: f64) -> Self {
        Self {
            task_type: task_type.into(),
            scheduled: Some(scheduled),
            payload: Map::new(),
        }
    }

    /// Attach a payload field.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// A record slot returned by lookups: the decoded task, or the raw stored
/// text when the value does not parse as JSON (defensive decode — a corrupt
/// record is surfaced, never an error).
#[derive(Debug, Clone, PartialEq)]
pub enum TaskRecord {
    Task(Task),
    Raw(String),
}

impl TaskRecord {
    pub fn task(&self) -> Option<&Task> {
        match self {
            TaskRecord::Task(t) => Some(t),
            TaskRecord::Raw(_) => None,
        }
    }

    pub fn into_task(self) -> Option<Task> {
        match self {
            TaskRecord::Task(t) => Some(t),
            TaskRecord::Raw(_) => None,
        }
    }
}
