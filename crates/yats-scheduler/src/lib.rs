//! `yats-scheduler` — delayed-task scheduling and dispatch.
//!
//! # Overview
//!
//! Callers submit tasks carrying a payload and a target Unix time through the
//! [`Scheduler`]; records and the time-ordered due-sets live in
//! `yats-store`. The [`DispatchEngine`] polls the active due-set on a fixed
//! interval, invokes the [`TaskHandler`] registered for each due task's
//! type, and transitions the task to its terminal state (completed or error)
//! based on the outcome.
//!
//! # Dispatch outcomes
//!
//! | Condition                               | Effect                                      |
//! |-----------------------------------------|---------------------------------------------|
//! | Handler succeeds                        | `state = completed`, moved to inactive set  |
//! | Handler fails                           | `state = error` + `errMsg`, moved to error set |
//! | No handler, `require_handler` off       | Silent skip — retried next cycle            |
//! | No handler, `require_handler` on        | `state = error` ("no matching event handler found") |
//!
//! Handler failures are never raised to callers; they are persisted on the
//! task for the producer to observe via query. The poll loop itself is
//! crash-resistant: a failed cycle is logged and the next one runs on
//! schedule.

pub mod engine;
pub mod error;
pub mod handler;
pub mod scheduler;

pub use engine::{DispatchEngine, EngineHandle};
pub use error::{Result, SchedulerError};
pub use handler::{HandlerRegistry, TaskHandler, NO_HANDLER_MSG};
pub use scheduler::{Query, Scheduler};
