//! Mod data model for the Veil resource-redirection engine.
//!
//! A [`Mod`] is an immutable-once-loaded description of one installable
//! package: base redirects and metadata edits that apply whenever the mod
//! is enabled, plus ordered [option groups](OptionGroup) whose active
//! options contribute more of both. Which options are active, and how a
//! mod ranks against others, is *not* stored here — that is per-collection
//! state owned by the `veil_collection` crate.
//!
//! Mods are described by manifest documents (JSON or TOML) and owned by a
//! process-wide [`ModRegistry`]. Collections refer to mods by their stable
//! string id only; they never hold references into the registry.

mod meta;
mod path;
mod registry;

pub use meta::{EquipSlot, GimmickFlag, MetaEdit, MetaFileId, MetaKey, ScaleParam};
pub use path::{GamePath, GamePathError};
pub use registry::ModRegistry;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors produced when reading a mod manifest document.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The JSON document could not be parsed into a [`Mod`].
    #[error("JSON manifest error: {0}")]
    Json(#[from] serde_json::Error),

    /// The TOML document could not be parsed into a [`Mod`].
    #[error("TOML manifest error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// How an option group's active set is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupKind {
    /// Exactly one option is active, or none.
    Single,
    /// Any subset of options is active.
    Multi,
}

/// A redirect table: virtual game path to concrete replacement file.
pub type RedirectTable = BTreeMap<GamePath, Utf8PathBuf>;

/// One installable mod package.
///
/// Immutable after load; reloading replaces the whole record in the
/// registry under the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mod {
    /// Stable identifier, unique within the registry.
    ///
    /// Conventionally the package's directory name; survives reloads.
    pub id: String,

    /// Human-readable display name.
    pub name: String,

    /// The mod's version string.
    ///
    /// Example: `1.0.0`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    /// Free-form description shown in UIs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Directory the package was loaded from.
    ///
    /// Filled in by the discovery layer, not by the manifest author.
    #[serde(default, skip_serializing_if = "Utf8PathBuf::as_str_is_empty")]
    pub source: Utf8PathBuf,

    /// Redirects that apply whenever the mod is enabled, before any
    /// option group is considered.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub redirects: RedirectTable,

    /// Metadata edits that apply whenever the mod is enabled.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_edits: Vec<MetaEdit>,

    /// Option groups in declaration order.
    ///
    /// Later groups overwrite earlier ones where their active options
    /// touch the same path or metadata field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<OptionGroup>,
}

// serde helper: `skip_serializing_if` needs a function path.
trait AsStrIsEmpty {
    fn as_str_is_empty(&self) -> bool;
}

impl AsStrIsEmpty for Utf8PathBuf {
    fn as_str_is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl Mod {
    /// Parse a mod from a JSON manifest document.
    pub fn from_json(document: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(document)?)
    }

    /// Parse a mod from a TOML manifest document.
    pub fn from_toml(document: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(document)?)
    }

    /// Look up an option group by name.
    pub fn group(&self, name: &str) -> Option<&OptionGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Total number of redirect entries across base content and options.
    pub fn redirect_count(&self) -> usize {
        self.redirects.len()
            + self
                .groups
                .iter()
                .flat_map(|g| &g.options)
                .map(|o| o.redirects.len())
                .sum::<usize>()
    }
}

/// An ordered, typed choice unit within a mod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionGroup {
    /// Group name, unique within the mod.
    pub name: String,

    /// Single-select (radio) or multi-select (checklist).
    pub kind: GroupKind,

    /// Options in declaration order. Selection state refers to options by
    /// this index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ModOption>,
}

/// One selectable option inside a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModOption {
    /// Option display name.
    pub name: String,

    /// Tie-break weight against *other* mods claiming the same path or
    /// metadata field. Has no effect inside this mod's own option choice.
    #[serde(default)]
    pub priority: i32,

    /// Redirects contributed while this option is active.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub redirects: RedirectTable,

    /// Metadata edits contributed while this option is active.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_edits: Vec<MetaEdit>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_example_mod() -> Mod {
        let mut base_redirects = RedirectTable::new();
        base_redirects.insert(
            GamePath::parse("chara/hair/01.tex").unwrap(),
            Utf8PathBuf::from("textures/hair_01.tex"),
        );

        let mut long_redirects = RedirectTable::new();
        long_redirects.insert(
            GamePath::parse("chara/hair/02.tex").unwrap(),
            Utf8PathBuf::from("textures/hair_02_long.tex"),
        );

        let mut glow_redirects = RedirectTable::new();
        glow_redirects.insert(
            GamePath::parse("chara/hair/glow.tex").unwrap(),
            Utf8PathBuf::from("textures/glow.tex"),
        );

        Mod {
            id: "aurora-hair".to_string(),
            name: "Aurora Hair".to_string(),
            version: "1.2.0".to_string(),
            description: Some("Replacement hair textures with optional variants".to_string()),
            source: Utf8PathBuf::new(),
            redirects: base_redirects,
            meta_edits: vec![MetaEdit::Equip {
                set: 21,
                slot: EquipSlot::Head,
                enabled: false,
            }],
            groups: vec![
                OptionGroup {
                    name: "Style".to_string(),
                    kind: GroupKind::Single,
                    options: vec![
                        ModOption {
                            name: "Short".to_string(),
                            priority: 0,
                            redirects: RedirectTable::new(),
                            meta_edits: Vec::new(),
                        },
                        ModOption {
                            name: "Long".to_string(),
                            priority: 0,
                            redirects: long_redirects,
                            meta_edits: Vec::new(),
                        },
                    ],
                },
                OptionGroup {
                    name: "Extras".to_string(),
                    kind: GroupKind::Multi,
                    options: vec![ModOption {
                        name: "Glow".to_string(),
                        priority: 5,
                        redirects: glow_redirects,
                        meta_edits: vec![MetaEdit::Scaling {
                            entry: 3,
                            param: ScaleParam::Height,
                            value: 1.25,
                        }],
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_json_manifest_parsing() {
        let parsed = Mod::from_json(include_str!("../test-data/mod.manifest.json")).unwrap();
        assert_eq!(parsed, create_example_mod());
    }

    #[test]
    fn test_toml_manifest_parsing() {
        let parsed = Mod::from_toml(include_str!("../test-data/mod.manifest.toml")).unwrap();
        assert_eq!(parsed, create_example_mod());
    }

    #[test]
    fn test_minimal_manifest_defaults() {
        let parsed = Mod::from_json(r#"{ "id": "tiny", "name": "Tiny" }"#).unwrap();
        assert_eq!(parsed.id, "tiny");
        assert!(parsed.version.is_empty());
        assert!(parsed.redirects.is_empty());
        assert!(parsed.meta_edits.is_empty());
        assert!(parsed.groups.is_empty());
    }

    #[test]
    fn test_invalid_manifest_is_rejected() {
        let result = Mod::from_json(r#"{ "name": "missing id" }"#);
        assert!(matches!(result, Err(ManifestError::Json(_))));
    }

    #[test]
    fn test_group_lookup() {
        let m = create_example_mod();
        assert!(m.group("Style").is_some());
        assert!(m.group("Missing").is_none());
    }

    #[test]
    fn test_redirect_count() {
        let m = create_example_mod();
        assert_eq!(m.redirect_count(), 3);
    }

    #[test]
    fn test_round_trip_preserves_manifest() {
        let original = create_example_mod();
        let json = serde_json::to_string(&original).unwrap();
        let back = Mod::from_json(&json).unwrap();
        assert_eq!(back, original);
    }
}
