//! In-process doubles for scenario tests.
//!
//! [`MemoryStore`] mirrors the semantics of the Postgres store (per-day
//! success uniqueness, transactional-looking rollover, strict snapshot
//! uniqueness) without a database, and adds scripting hooks: injected
//! rollover failures and a gate that holds a rollover open mid-flight so
//! tests can probe the busy window. [`MemoryActivityLog`] records activity
//! entries for assertion instead of appending JSONL.
//!
//! Everything here is test support. Nothing in this crate belongs in a
//! production dependency graph.

mod activity;
mod store;

pub use activity::{LoggedAction, MemoryActivityLog};
pub use store::{CustomerSeed, MemoryStore, RolloverGate};
