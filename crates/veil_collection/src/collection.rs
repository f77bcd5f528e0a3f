//! A named, inheritable set of mod configurations.
//!
//! A [`Collection`] is pure data: its name, its mod settings in insertion
//! order, and the names of the collections it inherits from. It doubles as
//! the persistence document — the persistence collaborator deserializes
//! one of these and hands it to the manager, and snapshots it back out
//! before serializing. All invariants (unique names, acyclic inheritance,
//! reserved collections) are enforced by the manager, which owns every
//! mutation entry point.

use crate::settings::ModSettings;
use serde::{Deserialize, Serialize};

/// Name of the reserved empty collection. It has no mods, cannot be
/// modified or removed, and is what the default resolves to until
/// configured otherwise.
pub const EMPTY_COLLECTION: &str = "Empty";

/// A named, ordered set of mod settings plus inheritance parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Display name; unique case-insensitively across the manager.
    pub name: String,

    /// Mod configurations in insertion order. Insertion order is the
    /// final conflict tie-break: at equal priority the later entry wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<ModSettings>,

    /// Names of parent collections, highest precedence first. Parents
    /// supply settings for mods this collection does not configure
    /// itself.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inherits: Vec<String>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: Vec::new(),
            inherits: Vec::new(),
        }
    }

    /// Settings for a mod configured directly in this collection.
    pub fn settings_for(&self, mod_id: &str) -> Option<&ModSettings> {
        self.settings.iter().find(|s| s.mod_id == mod_id)
    }

    /// Mutable settings entry for a mod, created with defaults when the
    /// mod first appears in this collection.
    pub(crate) fn settings_mut_or_default(&mut self, mod_id: &str) -> &mut ModSettings {
        let index = match self.settings.iter().position(|s| s.mod_id == mod_id) {
            Some(index) => index,
            None => {
                self.settings.push(ModSettings::new(mod_id));
                self.settings.len() - 1
            }
        };
        &mut self.settings[index]
    }

    /// Drop the settings entry for a mod. Returns whether one existed.
    pub(crate) fn remove_settings(&mut self, mod_id: &str) -> bool {
        let before = self.settings.len();
        self.settings.retain(|s| s.mod_id != mod_id);
        self.settings.len() != before
    }

    /// Whether this collection configures or inherits-from anything that
    /// mentions the given mod id.
    pub fn mentions_mod(&self, mod_id: &str) -> bool {
        self.settings_for(mod_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_created_with_defaults_on_first_touch() {
        let mut collection = Collection::new("Main");
        assert!(collection.settings_for("m").is_none());

        let settings = collection.settings_mut_or_default("m");
        assert!(!settings.enabled);
        assert_eq!(settings.priority, 0);
        assert_eq!(collection.settings.len(), 1);

        // Second touch reuses the entry.
        collection.settings_mut_or_default("m").enabled = true;
        assert_eq!(collection.settings.len(), 1);
        assert!(collection.settings_for("m").unwrap().enabled);
    }

    #[test]
    fn test_remove_settings() {
        let mut collection = Collection::new("Main");
        collection.settings_mut_or_default("m");

        assert!(collection.remove_settings("m"));
        assert!(!collection.remove_settings("m"));
        assert!(collection.settings_for("m").is_none());
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut collection = Collection::new("Main");
        collection.settings_mut_or_default("b");
        collection.settings_mut_or_default("a");

        let order: Vec<&str> = collection
            .settings
            .iter()
            .map(|s| s.mod_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_serde_document_round_trip() {
        let mut collection = Collection::new("Main");
        collection.settings_mut_or_default("m").enabled = true;
        collection.inherits.push("Base".to_string());

        let json = serde_json::to_string(&collection).unwrap();
        let back: Collection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, collection);
        assert!(json.contains("\"inherits\":[\"Base\"]"));
    }
}
