//! `yats-core` — shared vocabulary for the yats delayed-task scheduler.
//!
//! Holds the types every other crate speaks: the [`Task`](types::Task) record
//! and its lifecycle states, the keyspace-prefixed key derivation used by the
//! storage layer, and the configuration surface (TOML file + `YATS_` env
//! overrides).

pub mod config;
pub mod error;
pub mod keys;
pub mod types;

pub use config::YatsConfig;
pub use error::{CoreError, Result};
pub use keys::KeySpace;
pub use types::{DueSet, NewTask, Task, TaskId, TaskRecord, TaskState};
