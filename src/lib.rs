//! A persistent tree-mutation and value-validation engine for nested query
//! builders.
//!
//! A query is a [`tree::Tree`] of groups, rules, rule-groups and case groups.
//! Edits are [`dispatch::Command`]s applied by pure functions in [`engine`]:
//! each one takes a snapshot and a read-only [`schema::Schema`] and returns
//! the next snapshot, sharing every untouched node with the previous one.

pub use crate::diagnostics::QueryError;

pub mod cli;
pub mod diagnostics;
pub mod dispatch;
pub mod engine;
pub mod format;
pub mod ids;
pub mod schema;
pub mod tree;
pub mod value;
