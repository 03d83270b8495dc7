//! `yats-store` — durable task storage over SQLite.
//!
//! One database realizes the three storage primitives the scheduler needs:
//! a hash-like record table (`records`), score-ordered due-sets (`due_sets`),
//! and atomic counters (`counters`). Keys are derived from the configured
//! keyspace, so several scheduler instances can share one database file.
//!
//! [`TaskStore`](store::TaskStore) is the only type the rest of the system
//! talks to. Its composite operations (insert, transition, delete, reset)
//! each commit as a single SQLite transaction, so a crash can never leave a
//! record and its due-set entry disagreeing.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::TaskStore;
