use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use yats_core::config::SchedulerConfig;
use yats_core::types::{DueSet, TaskId, TaskRecord, TaskState};
use yats_store::TaskStore;

use crate::error::Result;
use crate::handler::{HandlerRegistry, NO_HANDLER_MSG};

/// Periodic poller: pulls due tasks from the active set, invokes the
/// matching handler, and records the outcome.
///
/// The engine never starts itself — the owner either drives [`run`] with a
/// shutdown channel or calls [`start`] for a spawned loop with a stop
/// handle. Cycles never overlap: a cycle (handler invocation included) runs
/// to completion before the next timer fire is serviced.
///
/// [`run`]: DispatchEngine::run
/// [`start`]: DispatchEngine::start
pub struct DispatchEngine {
    store: Arc<TaskStore>,
    registry: Arc<HandlerRegistry>,
    config: SchedulerConfig,
}

impl DispatchEngine {
    pub fn new(store: Arc<TaskStore>, registry: Arc<HandlerRegistry>, config: SchedulerConfig) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Main loop. Polls every `poll_interval_ms` until `shutdown` broadcasts
    /// `true`. A failed cycle is logged and the loop keeps its schedule — it
    /// is never fatal.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            keyspace = %self.store.keys().prefix(),
            interval_ms = self.config.poll_interval_ms,
            "dispatch engine started"
        );

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("dispatch cycle error: {e}");
                    }
                }
                res = shutdown.changed() => {
                    // A dropped sender means the owner is gone; stop either way.
                    if res.is_err() || *shutdown.borrow() {
                        info!("dispatch engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Spawn the loop on the current runtime and return a stop handle.
    pub fn start(self) -> EngineHandle {
        let (shutdown, rx) = watch::channel(false);
        let join = tokio::spawn(self.run(rx));
        EngineHandle { shutdown, join }
    }

    /// One scheduling cycle: query the active due-set for anything due up to
    /// now (tasks scheduled in the past stay eligible) and dispatch the
    /// earliest-due entries, oldest score first.
    async fn tick(&self) -> Result<()> {
        let now = Utc::now().timestamp() as f64;
        let due = self.store.due_range(DueSet::Active, 0.0, now)?;
        if due.is_empty() {
            return Ok(());
        }

        // One task per cycle unless the batch knob widens it.
        let batch = self.config.dispatch_batch.max(1);
        for id in due.into_iter().take(batch) {
            self.dispatch(id).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, id: TaskId) -> Result<()> {
        let task = match self.store.get(id)? {
            Some(TaskRecord::Task(task)) => task,
            Some(TaskRecord::Raw(_)) => {
                // Without a decodable record there is no type to dispatch on.
                // Leave it in place for the operator rather than failing it
                // blind.
                warn!(id, "due task record is corrupt, skipping");
                return Ok(());
            }
            None => {
                warn!(id, "due-set entry has no record, dropping it");
                self.store.due_remove(DueSet::Active, id)?;
                return Ok(());
            }
        };

        let Some(handler) = self.registry.get(&task.task_type) else {
            if self.config.require_handler {
                warn!(id, task_type = %task.task_type, "no handler registered, failing task");
                self.store.transition(&task, TaskState::Error, Some(NO_HANDLER_MSG))?;
            } else {
                // Silent-skip policy: the task stays in the active set and is
                // reconsidered next cycle.
                debug!(id, task_type = %task.task_type, "no handler registered, skipping");
            }
            return Ok(());
        };

        debug!(id, task_type = %task.task_type, "dispatching task");
        match handler.handle(&task).await {
            Ok(()) => {
                self.store.transition(&task, TaskState::Completed, None)?;
                info!(id, task_type = %task.task_type, "task completed");
            }
            Err(e) => {
                let msg = e.to_string();
                self.store.transition(&task, TaskState::Error, Some(&msg))?;
                warn!(id, task_type = %task.task_type, error = %msg, "task failed");
            }
        }
        Ok(())
    }
}

/// Owner handle for a started engine.
pub struct EngineHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl EngineHandle {
    /// Signal shutdown and wait for any in-flight cycle to finish.
    pub async fn stop(self) {
        // The receiver is gone only if the loop already exited on its own.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!("dispatch engine task panicked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use anyhow::anyhow;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use yats_core::keys::KeySpace;
    use yats_core::types::{NewTask, Task};

    use super::*;
    use crate::handler::TaskHandler;
    use crate::scheduler::Scheduler;

    struct Succeeds {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskHandler for Succeeds {
        async fn handle(&self, _task: &Task) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fails;

    #[async_trait]
    impl TaskHandler for Fails {
        async fn handle(&self, _task: &Task) -> anyhow::Result<()> {
            Err(anyhow!("boom"))
        }
    }

    fn fixture(registry: HandlerRegistry, config: SchedulerConfig) -> (Arc<TaskStore>, Scheduler, DispatchEngine) {
        let conn = Connection::open_in_memory().expect("open failed");
        let store = Arc::new(TaskStore::new(conn, KeySpace::new("test")).expect("store init failed"));
        let scheduler = Scheduler::new(store.clone());
        let engine = DispatchEngine::new(store.clone(), Arc::new(registry), config);
        (store, scheduler, engine)
    }

    fn now() -> f64 {
        Utc::now().timestamp() as f64
    }

    fn stored(store: &TaskStore, id: TaskId) -> Task {
        store
            .get(id)
            .expect("get failed")
            .and_then(TaskRecord::into_task)
            .expect("missing task")
    }

    #[tokio::test]
    async fn unhandled_task_is_silently_skipped_by_default() {
        let (store, scheduler, engine) = fixture(HandlerRegistry::new(), SchedulerConfig::default());
        let id = scheduler.submit(NewTask::new("t0", now() - 5.0)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        // Untouched: still scheduled, still in the active set.
        assert_eq!(stored(&store, id).state, TaskState::Scheduled);
        assert_eq!(store.due_range(DueSet::Active, 0.0, now()).expect("range failed"), vec![id]);
    }

    #[tokio::test]
    async fn unhandled_task_fails_when_handler_presence_is_required() {
        let config = SchedulerConfig {
            require_handler: true,
            ..Default::default()
        };
        let (store, scheduler, engine) = fixture(HandlerRegistry::new(), config);
        let id = scheduler.submit(NewTask::new("t0", now() - 5.0)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        let task = stored(&store, id);
        assert_eq!(task.state, TaskState::Error);
        assert_eq!(task.err_msg.as_deref(), Some(NO_HANDLER_MSG));
        assert!(store.due_range(DueSet::Active, 0.0, now()).expect("range failed").is_empty());
        assert_eq!(store.due_range(DueSet::Error, 0.0, now()).expect("range failed"), vec![id]);
    }

    #[tokio::test]
    async fn successful_handler_completes_the_task() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "t1",
            Arc::new(Succeeds {
                calls: AtomicUsize::new(0),
            }),
        );
        let (store, scheduler, engine) = fixture(registry, SchedulerConfig::default());
        let scheduled = now();
        let id = scheduler.submit(NewTask::new("t1", scheduled)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        let task = stored(&store, id);
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.err_msg.is_none());
        // Gone from the active range, still reachable by direct id lookup.
        assert!(scheduler.query_by_times(&[scheduled]).expect("query failed").is_empty());
        assert!(scheduler.query_by_ids(&[id]).expect("query failed")[0].is_some());
        assert_eq!(
            store.due_range(DueSet::Inactive, 0.0, now()).expect("range failed"),
            vec![id]
        );
    }

    #[tokio::test]
    async fn failing_handler_records_the_error() {
        let mut registry = HandlerRegistry::new();
        registry.register("t2", Arc::new(Fails));
        let (store, scheduler, engine) = fixture(registry, SchedulerConfig::default());
        let id = scheduler.submit(NewTask::new("t2", now() - 1.0)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        let task = stored(&store, id);
        assert_eq!(task.state, TaskState::Error);
        assert_eq!(task.err_msg.as_deref(), Some("boom"));
        assert!(store.due_range(DueSet::Active, 0.0, now()).expect("range failed").is_empty());
        assert_eq!(store.due_range(DueSet::Error, 0.0, now()).expect("range failed"), vec![id]);
    }

    #[tokio::test]
    async fn one_task_per_cycle_oldest_first() {
        let handler = Arc::new(Succeeds {
            calls: AtomicUsize::new(0),
        });
        let mut registry = HandlerRegistry::new();
        registry.register("t1", handler.clone());
        let (store, scheduler, engine) = fixture(registry, SchedulerConfig::default());

        let older = scheduler.submit(NewTask::new("t1", now() - 10.0)).expect("submit failed");
        let newer = scheduler.submit(NewTask::new("t1", now() - 1.0)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stored(&store, older).state, TaskState::Completed);
        assert_eq!(stored(&store, newer).state, TaskState::Scheduled);
    }

    #[tokio::test]
    async fn dispatch_batch_widens_a_cycle() {
        let handler = Arc::new(Succeeds {
            calls: AtomicUsize::new(0),
        });
        let mut registry = HandlerRegistry::new();
        registry.register("t1", handler.clone());
        let config = SchedulerConfig {
            dispatch_batch: 2,
            ..Default::default()
        };
        let (store, scheduler, engine) = fixture(registry, config);

        let a = scheduler.submit(NewTask::new("t1", now() - 10.0)).expect("submit failed");
        let b = scheduler.submit(NewTask::new("t1", now() - 1.0)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(stored(&store, a).state, TaskState::Completed);
        assert_eq!(stored(&store, b).state, TaskState::Completed);
    }

    #[tokio::test]
    async fn future_tasks_are_not_dispatched() {
        let handler = Arc::new(Succeeds {
            calls: AtomicUsize::new(0),
        });
        let mut registry = HandlerRegistry::new();
        registry.register("t1", handler.clone());
        let (store, scheduler, engine) = fixture(registry, SchedulerConfig::default());
        let id = scheduler.submit(NewTask::new("t1", now() + 3600.0)).expect("submit failed");

        engine.tick().await.expect("tick failed");

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stored(&store, id).state, TaskState::Scheduled);
    }

    #[tokio::test]
    async fn dangling_due_entry_is_dropped() {
        let (store, _scheduler, engine) = fixture(HandlerRegistry::new(), SchedulerConfig::default());
        store.due_add(DueSet::Active, 77, now() - 1.0).expect("add failed");

        engine.tick().await.expect("tick failed");

        assert!(store.due_range(DueSet::Active, 0.0, now()).expect("range failed").is_empty());
    }

    #[tokio::test]
    async fn started_engine_dispatches_and_stops_cleanly() {
        let mut registry = HandlerRegistry::new();
        registry.register(
            "t1",
            Arc::new(Succeeds {
                calls: AtomicUsize::new(0),
            }),
        );
        let config = SchedulerConfig {
            poll_interval_ms: 10,
            ..Default::default()
        };
        let (store, scheduler, engine) = fixture(registry, config);
        let id = scheduler.submit(NewTask::new("t1", now() - 1.0)).expect("submit failed");

        let handle = engine.start();

        // Bounded wait for the loop to pick the task up.
        let mut completed = false;
        for _ in 0..100 {
            if stored(&store, id).state == TaskState::Completed {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.stop().await;
        assert!(completed, "task was not dispatched before the wait expired");
    }
}
