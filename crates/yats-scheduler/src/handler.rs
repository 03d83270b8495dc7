use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use yats_core::types::Task;

/// Message recorded on a task when dispatch finds no handler for its type
/// and handler-presence checking is enabled.
pub const NO_HANDLER_MSG: &str = "no matching event handler found";

/// A caller-registered handler invoked for every due task of its type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Execute the task. An `Err` is captured on the task record as
    /// `state = error` with the error's message; it is never propagated to
    /// the scheduler's caller.
    async fn handle(&self, task: &Task) -> anyhow::Result<()>;
}

/// Maps task types to their handlers.
///
/// Registration happens before the dispatch engine starts; share the
/// finished registry as `Arc<HandlerRegistry>`. Keeping the registry
/// explicit makes "no handler registered" an ordinary, testable condition.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry with no registered handlers.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a task type.
    ///
    /// If a handler for the same type is already registered it is replaced.
    pub fn register(&mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        let task_type = task_type.into();
        info!(task_type = %task_type, "registering task handler");
        self.handlers.insert(task_type, handler);
    }

    pub fn has(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }

    pub fn get(&self, task_type: &str) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(task_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    #[async_trait]
    impl TaskHandler for Nop {
        async fn handle(&self, _task: &Task) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        assert!(!registry.has("t1"));

        registry.register("t1", Arc::new(Nop));
        assert!(registry.has("t1"));
        assert!(registry.get("t1").is_some());
        assert!(registry.get("t2").is_none());
    }
}
