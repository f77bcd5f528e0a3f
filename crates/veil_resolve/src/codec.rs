//! Binary layouts for the derived metadata tables.
//!
//! All three tables share one frame: a little-endian `u32` record count
//! followed by `count` fixed-size records. Records are keyed by a `u32`
//! id and written sorted by id. Parsing is strict about truncation and
//! trailing bytes; record order in the input is not required.
//!
//! | Table | Record layout |
//! |---|---|
//! | Equip | `id: u32`, `flags: u16` |
//! | Gimmick | `id: u32`, `flags: u8` |
//! | Scaling | `id: u32`, `height/bust/muscle/tail: f32` each |

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{self, Cursor};
use thiserror::Error;
use veil_mod::{MetaEdit, MetaFileId};

/// Scaling records absent from the base table start at neutral scale.
const DEFAULT_SCALING: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Errors produced when decoding a base table blob.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The blob ended before the declared record count was read.
    #[error("truncated {file:?} table: {source}")]
    Truncated { file: MetaFileId, source: io::Error },

    /// The blob continued past the declared record count.
    #[error("{file:?} table has {extra} trailing byte(s)")]
    TrailingBytes { file: MetaFileId, extra: usize },
}

/// In-memory form of one derived table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MetaTable {
    Equip(BTreeMap<u32, u16>),
    Gimmick(BTreeMap<u32, u8>),
    Scaling(BTreeMap<u32, [f32; 4]>),
}

impl MetaTable {
    /// Decode a base blob into its table form.
    pub(crate) fn parse(file: MetaFileId, bytes: &[u8]) -> Result<Self, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let truncated = |source| CodecError::Truncated { file, source };

        let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let table = match file {
            MetaFileId::Equip => {
                let mut records = BTreeMap::new();
                for _ in 0..count {
                    let id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let flags = cursor.read_u16::<LittleEndian>().map_err(truncated)?;
                    records.insert(id, flags);
                }
                MetaTable::Equip(records)
            }
            MetaFileId::Gimmick => {
                let mut records = BTreeMap::new();
                for _ in 0..count {
                    let id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let flags = cursor.read_u8().map_err(truncated)?;
                    records.insert(id, flags);
                }
                MetaTable::Gimmick(records)
            }
            MetaFileId::Scaling => {
                let mut records = BTreeMap::new();
                for _ in 0..count {
                    let id = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let mut params = [0f32; 4];
                    for param in &mut params {
                        *param = cursor.read_f32::<LittleEndian>().map_err(truncated)?;
                    }
                    records.insert(id, params);
                }
                MetaTable::Scaling(records)
            }
        };

        let extra = bytes.len().saturating_sub(cursor.position() as usize);
        if extra > 0 {
            return Err(CodecError::TrailingBytes { file, extra });
        }
        Ok(table)
    }

    /// Apply one edit. A record the base table does not carry is created
    /// with default values first. Edits for a different file class are
    /// ignored — the caller hands us a pre-partitioned subset.
    pub(crate) fn apply(&mut self, edit: &MetaEdit) {
        match (self, edit) {
            (MetaTable::Equip(records), MetaEdit::Equip { set, slot, enabled }) => {
                let flags = records.entry(*set).or_insert(0);
                if *enabled {
                    *flags |= slot.bit();
                } else {
                    *flags &= !slot.bit();
                }
            }
            (MetaTable::Gimmick(records), MetaEdit::Gimmick { set, flag, enabled }) => {
                let flags = records.entry(*set).or_insert(0);
                if *enabled {
                    *flags |= flag.bit();
                } else {
                    *flags &= !flag.bit();
                }
            }
            (
                MetaTable::Scaling(records),
                MetaEdit::Scaling {
                    entry,
                    param,
                    value,
                },
            ) => {
                let params = records.entry(*entry).or_insert(DEFAULT_SCALING);
                params[param.index()] = *value;
            }
            (table, edit) => {
                tracing::debug!(
                    "Ignoring {:?} edit against {:?} table",
                    edit.file(),
                    table.file()
                );
            }
        }
    }

    /// Encode the table back into blob form, records sorted by id.
    pub(crate) fn encode(&self) -> Vec<u8> {
        match self {
            MetaTable::Equip(records) => {
                let mut out = Vec::with_capacity(4 + records.len() * 6);
                out.extend_from_slice(&(records.len() as u32).to_le_bytes());
                for (id, flags) in records {
                    out.extend_from_slice(&id.to_le_bytes());
                    out.extend_from_slice(&flags.to_le_bytes());
                }
                out
            }
            MetaTable::Gimmick(records) => {
                let mut out = Vec::with_capacity(4 + records.len() * 5);
                out.extend_from_slice(&(records.len() as u32).to_le_bytes());
                for (id, flags) in records {
                    out.extend_from_slice(&id.to_le_bytes());
                    out.push(*flags);
                }
                out
            }
            MetaTable::Scaling(records) => {
                let mut out = Vec::with_capacity(4 + records.len() * 20);
                out.extend_from_slice(&(records.len() as u32).to_le_bytes());
                for (id, params) in records {
                    out.extend_from_slice(&id.to_le_bytes());
                    for param in params {
                        out.extend_from_slice(&param.to_le_bytes());
                    }
                }
                out
            }
        }
    }

    fn file(&self) -> MetaFileId {
        match self {
            MetaTable::Equip(_) => MetaFileId::Equip,
            MetaTable::Gimmick(_) => MetaFileId::Gimmick,
            MetaTable::Scaling(_) => MetaFileId::Scaling,
        }
    }
}
