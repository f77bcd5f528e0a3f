//! Per-collection mod configuration.
//!
//! A [`ModSettings`] entry is the collection-scoped state for one mod:
//! whether it is enabled, its priority against other mods, and which
//! option is chosen in each of the mod's groups. Entries are created with
//! defaults the first time a mod is touched in a collection and are plain
//! serde documents for the persistence layer.

use serde::{Deserialize, Serialize};
use veil_mod::GroupKind;

/// Selection state for one option group.
///
/// Stored index-aligned with the mod's group list. A selection that no
/// longer fits the mod (index or bit beyond the current option count,
/// e.g. after a mod reload shrank a group) is ignored during flattening
/// rather than treated as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupSelection {
    /// Index of the chosen option, or `None` for no selection.
    Single(Option<u32>),
    /// Bitmask over option indices; bit `n` activates option `n`.
    Multi(u64),
}

impl GroupSelection {
    /// The default selection for a group of the given kind: the first
    /// option for single-select, nothing for multi-select.
    pub fn default_for(kind: GroupKind) -> Self {
        match kind {
            GroupKind::Single => GroupSelection::Single(Some(0)),
            GroupKind::Multi => GroupSelection::Multi(0),
        }
    }

    /// Indices of active options, clamped to `option_count`.
    pub fn active_indices(self, option_count: usize) -> Vec<usize> {
        match self {
            GroupSelection::Single(None) => Vec::new(),
            GroupSelection::Single(Some(index)) => {
                let index = index as usize;
                if index < option_count {
                    vec![index]
                } else {
                    Vec::new()
                }
            }
            GroupSelection::Multi(mask) => (0..option_count.min(u64::BITS as usize))
                .filter(|i| mask & (1 << i) != 0)
                .collect(),
        }
    }
}

/// Collection-scoped state for one mod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSettings {
    /// Id of the mod in the registry. The mod itself is never referenced
    /// directly; a missing id degrades to a stale, effectively-disabled
    /// entry at flatten time.
    pub mod_id: String,

    /// Whether the mod contributes anything in this collection.
    #[serde(default)]
    pub enabled: bool,

    /// Conflict weight against other mods; higher wins.
    #[serde(default)]
    pub priority: i32,

    /// One entry per option group, index-aligned with the mod's group
    /// list. Missing entries fall back to the group-kind default.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<GroupSelection>,
}

impl ModSettings {
    /// Default settings for a mod that was just added to a collection:
    /// disabled, priority 0, default selections.
    pub fn new(mod_id: impl Into<String>) -> Self {
        Self {
            mod_id: mod_id.into(),
            enabled: false,
            priority: 0,
            selections: Vec::new(),
        }
    }

    /// The effective selection for a group index of the given kind.
    pub fn selection_for(&self, group_index: usize, kind: GroupKind) -> GroupSelection {
        self.selections
            .get(group_index)
            .copied()
            .unwrap_or_else(|| GroupSelection::default_for(kind))
    }

    /// Store a selection, padding intermediate groups with `Single(None)`
    /// placeholders that `selection_for` never exposes for multi groups.
    pub fn set_selection(&mut self, group_index: usize, selection: GroupSelection) {
        if self.selections.len() <= group_index {
            self.selections
                .resize(group_index + 1, GroupSelection::Single(None));
        }
        self.selections[group_index] = selection;
    }

    /// Append a stable byte encoding of these settings for fingerprinting.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.mod_id.len() as u32).to_le_bytes());
        out.extend_from_slice(self.mod_id.as_bytes());
        out.push(self.enabled as u8);
        out.extend_from_slice(&self.priority.to_le_bytes());
        out.extend_from_slice(&(self.selections.len() as u32).to_le_bytes());
        for selection in &self.selections {
            match *selection {
                GroupSelection::Single(None) => {
                    out.push(0);
                    out.extend_from_slice(&0u64.to_le_bytes());
                }
                GroupSelection::Single(Some(index)) => {
                    out.push(1);
                    out.extend_from_slice(&u64::from(index).to_le_bytes());
                }
                GroupSelection::Multi(mask) => {
                    out.push(2);
                    out.extend_from_slice(&mask.to_le_bytes());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ModSettings::new("some-mod");
        assert!(!settings.enabled);
        assert_eq!(settings.priority, 0);
        assert_eq!(
            settings.selection_for(0, GroupKind::Single),
            GroupSelection::Single(Some(0))
        );
        assert_eq!(
            settings.selection_for(3, GroupKind::Multi),
            GroupSelection::Multi(0)
        );
    }

    #[test]
    fn test_single_active_indices_clamped() {
        assert_eq!(GroupSelection::Single(Some(1)).active_indices(3), vec![1]);
        assert!(GroupSelection::Single(Some(5)).active_indices(3).is_empty());
        assert!(GroupSelection::Single(None).active_indices(3).is_empty());
    }

    #[test]
    fn test_multi_active_indices() {
        assert_eq!(
            GroupSelection::Multi(0b101).active_indices(3),
            vec![0, 2]
        );
        // Bits past the option count are ignored.
        assert_eq!(GroupSelection::Multi(0b1110).active_indices(2), vec![1]);
        assert!(GroupSelection::Multi(0).active_indices(4).is_empty());
    }

    #[test]
    fn test_set_selection_pads_gaps() {
        let mut settings = ModSettings::new("m");
        settings.set_selection(2, GroupSelection::Multi(0b11));

        assert_eq!(settings.selections.len(), 3);
        assert_eq!(
            settings.selection_for(2, GroupKind::Multi),
            GroupSelection::Multi(0b11)
        );
        assert_eq!(
            settings.selection_for(0, GroupKind::Single),
            GroupSelection::Single(None)
        );
    }

    #[test]
    fn test_encode_distinguishes_settings() {
        let mut a = ModSettings::new("m");
        let mut b = ModSettings::new("m");
        b.enabled = true;

        let mut buf_a = Vec::new();
        let mut buf_b = Vec::new();
        a.encode(&mut buf_a);
        b.encode(&mut buf_b);
        assert_ne!(buf_a, buf_b);

        a.enabled = true;
        buf_a.clear();
        a.encode(&mut buf_a);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn test_serde_document_shape() {
        let mut settings = ModSettings::new("aurora-hair");
        settings.enabled = true;
        settings.priority = 3;
        settings.set_selection(0, GroupSelection::Single(Some(1)));
        settings.set_selection(1, GroupSelection::Multi(0b1));

        let json = serde_json::to_string(&settings).unwrap();
        let back: ModSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
        assert!(json.contains("\"modId\":\"aurora-hair\""));
    }
}
