use crate::types::DueSet;

/// Derives storage keys from a configured keyspace prefix.
///
/// The prefix isolates one logical scheduler instance's keys from others
/// sharing the same backend; every entity key is derived deterministically
/// from it with a `:` separator.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key of the hash holding all task records, one field per id.
    pub fn task_record_key(&self) -> String {
        format!("{}:tasks", self.prefix)
    }

    /// Key of a due-set. The active set uses the bare name; the terminal
    /// sets carry their state suffix.
    pub fn due_set_key(&self, set: DueSet) -> String {
        match set.suffix() {
            "" => format!("{}:ztasks", self.prefix),
            suffix => format!("{}:ztasks:{suffix}", self.prefix),
        }
    }

    /// Key of this keyspace's monotonically increasing id counter.
    pub fn id_counter_key(&self) -> String {
        format!("{}:id", self.prefix)
    }
}
