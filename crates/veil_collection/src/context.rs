//! Actor context identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity a resource request is made on behalf of.
///
/// Used as the key of the context-assignment table. Absent assignments
/// fall back to the default collection, so a request without a usable
/// context still resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContextId {
    /// The locally controlled player character, whatever its current name.
    Player,
    /// A character identified by name and home-world id.
    Character { name: String, world: u16 },
}

impl ContextId {
    pub fn character(name: impl Into<String>, world: u16) -> Self {
        ContextId::Character {
            name: name.into(),
            world,
        }
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Player => f.write_str("<player>"),
            ContextId::Character { name, world } => write!(f, "{} ({})", name, world),
        }
    }
}
