//! Virtual game-path handling.
//!
//! Game assets are addressed by symbolic forward-slash paths such as
//! `chara/hair/01.tex`. The base data store treats these paths
//! case-insensitively, and mods author them on every platform, so a
//! [`GamePath`] is normalized once at construction: backslashes become
//! forward slashes, ASCII uppercase becomes lowercase, and redundant
//! separators are rejected. After that, equality, hashing, and table
//! lookups are plain byte comparisons.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Errors produced when normalizing a raw path string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GamePathError {
    /// The input was empty or all whitespace.
    #[error("game path is empty")]
    Empty,

    /// Game paths are always relative to the data store root.
    #[error("game path must be relative: '{0}'")]
    Rooted(String),

    /// A path component was empty (`//`) or a dot component (`.`/`..`).
    #[error("game path contains invalid component: '{0}'")]
    InvalidComponent(String),
}

/// A normalized virtual asset path.
///
/// Construct via [`GamePath::parse`]; the inner string is guaranteed
/// lowercase, forward-slash separated, relative, and free of empty or dot
/// components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GamePath(String);

impl GamePath {
    /// Parse and normalize a raw path string.
    pub fn parse(raw: &str) -> Result<Self, GamePathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GamePathError::Empty);
        }

        let normalized = trimmed.replace('\\', "/").to_ascii_lowercase();
        if normalized.starts_with('/') {
            return Err(GamePathError::Rooted(raw.to_string()));
        }

        for component in normalized.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(GamePathError::InvalidComponent(raw.to_string()));
            }
        }

        Ok(Self(normalized))
    }

    /// The normalized path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// xxHash3 of the normalized path bytes.
    ///
    /// Stable across platforms and runs; usable as a compact key by
    /// interception layers that index by hash rather than by string.
    pub fn path_hash(&self) -> u64 {
        xxh3_64(self.0.as_bytes())
    }

    /// The extension after the final `.` of the final component, if any.
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext)
    }
}

impl fmt::Display for GamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GamePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for GamePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for GamePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        GamePath::parse(&raw).map_err(serde::de::Error::custom)
    }
}
