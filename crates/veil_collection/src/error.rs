//! Error types for collection mutations.
//!
//! Only structural mutations fail. Lookup misses are `Option`s, and
//! resolution-time anomalies (stale mod ids, missing caches) degrade to
//! "no replacement" with a log line, so every variant here corresponds to
//! a mutation that was rejected with the previous state fully intact.

use std::fmt;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by structural collection mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The named collection does not exist (case-insensitive lookup).
    #[error("no collection named '{0}'")]
    UnknownCollection(String),

    /// A collection with this name already exists. Names are compared
    /// case-insensitively.
    #[error("a collection named '{0}' already exists")]
    NameExists(String),

    /// The name is reserved for an engine-owned collection.
    #[error("collection name '{0}' is reserved")]
    ReservedName(String),

    /// The name is empty or otherwise unusable.
    #[error("invalid collection name: {0}")]
    InvalidName(String),

    /// The collection is still referenced and cannot be removed.
    #[error("collection '{name}' is still in use as {usage}")]
    StructuralConflict { name: String, usage: CollectionUse },

    /// Adding the parent edge would make the inheritance graph cyclic.
    #[error("inheriting from '{parent}' would create a cycle for '{child}'")]
    CycleDetected { child: String, parent: String },
}

/// What keeps a collection referenced when removal is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionUse {
    /// The collection is the current default.
    Default,
    /// At least one context assignment targets the collection.
    Assignment,
    /// At least one other collection inherits from it.
    Parent,
}

impl fmt::Display for CollectionUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionUse::Default => f.write_str("the default collection"),
            CollectionUse::Assignment => f.write_str("an assignment target"),
            CollectionUse::Parent => f.write_str("a parent of another collection"),
        }
    }
}
