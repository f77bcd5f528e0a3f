//! Typed metadata-edit model.
//!
//! Besides plain file redirects, mods can carry partial edits to the small
//! binary metadata tables the game derives item and character behavior
//! from. An edit targets exactly one field of one record in one table, so
//! two edits collide only when table, record, and field all match — edits
//! to different fields of the same record merge additively when collections
//! are flattened.
//!
//! Three derived-file classes exist:
//!
//! | Class | Virtual path | Record payload |
//! |---|---|---|
//! | [`Equip`](MetaFileId::Equip) | `chara/xls/itemdata/equip.edt` | `u16` flag word, one bit per equip slot |
//! | [`Gimmick`](MetaFileId::Gimmick) | `chara/xls/itemdata/gimmick.gdt` | `u8` flag byte (enabled, animated) |
//! | [`Scaling`](MetaFileId::Scaling) | `chara/xls/charamake/scaling.sdt` | four `f32` parameters |

use crate::path::GamePath;
use serde::{Deserialize, Serialize};

/// The derived metadata file classes the engine can synthesize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetaFileId {
    Equip,
    Gimmick,
    Scaling,
}

impl MetaFileId {
    /// Every derived file class, in a fixed order.
    pub const ALL: [MetaFileId; 3] = [MetaFileId::Equip, MetaFileId::Gimmick, MetaFileId::Scaling];

    /// The virtual path the game loads this table from.
    pub fn path_str(self) -> &'static str {
        match self {
            MetaFileId::Equip => "chara/xls/itemdata/equip.edt",
            MetaFileId::Gimmick => "chara/xls/itemdata/gimmick.gdt",
            MetaFileId::Scaling => "chara/xls/charamake/scaling.sdt",
        }
    }

    /// Identify a derived file class from a requested game path.
    pub fn from_path(path: &GamePath) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|file| path.as_str() == file.path_str())
    }
}

/// Equip slots covered by the equip table's flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EquipSlot {
    Head,
    Body,
    Hands,
    Legs,
    Feet,
}

impl EquipSlot {
    /// Bit of this slot within a record's flag word.
    pub fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Flags in the gimmick table's flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GimmickFlag {
    Enabled,
    Animated,
}

impl GimmickFlag {
    /// Bit of this flag within a record's flag byte.
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Scaling parameters stored per entry in the scaling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScaleParam {
    Height,
    Bust,
    Muscle,
    Tail,
}

impl ScaleParam {
    /// Index of this parameter within a record's `f32` block.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One partial modification to a derived metadata record.
///
/// The variant fixes the target file class; record id and field pick the
/// exact slot. Values are embedded so an edit is self-contained and
/// directly serializable in mod manifests.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MetaEdit {
    /// Set or clear one equip-slot bit of an equip table record.
    Equip {
        set: u32,
        slot: EquipSlot,
        enabled: bool,
    },
    /// Set or clear one flag bit of a gimmick table record.
    Gimmick {
        set: u32,
        flag: GimmickFlag,
        enabled: bool,
    },
    /// Overwrite one scaling parameter of a scaling table entry.
    Scaling {
        entry: u32,
        param: ScaleParam,
        value: f32,
    },
}

impl MetaEdit {
    /// The derived file class this edit belongs to.
    pub fn file(&self) -> MetaFileId {
        match self {
            MetaEdit::Equip { .. } => MetaFileId::Equip,
            MetaEdit::Gimmick { .. } => MetaFileId::Gimmick,
            MetaEdit::Scaling { .. } => MetaFileId::Scaling,
        }
    }

    /// The field identity this edit targets.
    ///
    /// Two edits conflict during flattening iff their keys are equal.
    pub fn key(&self) -> MetaKey {
        match *self {
            MetaEdit::Equip { set, slot, .. } => MetaKey::Equip { set, slot },
            MetaEdit::Gimmick { set, flag, .. } => MetaKey::Gimmick { set, flag },
            MetaEdit::Scaling { entry, param, .. } => MetaKey::Scaling { entry, param },
        }
    }

    /// Append a stable byte encoding of this edit for fingerprinting.
    ///
    /// Little-endian, discriminant-prefixed; floats encoded by bit pattern
    /// so identical edits always fingerprint identically.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            MetaEdit::Equip { set, slot, enabled } => {
                out.push(0);
                out.extend_from_slice(&set.to_le_bytes());
                out.push(slot as u8);
                out.push(enabled as u8);
            }
            MetaEdit::Gimmick { set, flag, enabled } => {
                out.push(1);
                out.extend_from_slice(&set.to_le_bytes());
                out.push(flag as u8);
                out.push(enabled as u8);
            }
            MetaEdit::Scaling {
                entry,
                param,
                value,
            } => {
                out.push(2);
                out.extend_from_slice(&entry.to_le_bytes());
                out.push(param as u8);
                out.extend_from_slice(&value.to_bits().to_le_bytes());
            }
        }
    }
}

/// Identity of the field a [`MetaEdit`] targets, without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetaKey {
    Equip { set: u32, slot: EquipSlot },
    Gimmick { set: u32, flag: GimmickFlag },
    Scaling { entry: u32, param: ScaleParam },
}

impl MetaKey {
    /// The derived file class this key belongs to.
    pub fn file(&self) -> MetaFileId {
        match self {
            MetaKey::Equip { .. } => MetaFileId::Equip,
            MetaKey::Gimmick { .. } => MetaFileId::Gimmick,
            MetaKey::Scaling { .. } => MetaFileId::Scaling,
        }
    }
}
