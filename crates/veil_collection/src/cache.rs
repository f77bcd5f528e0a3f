//! Collection flattening.
//!
//! A [`CollectionCache`] is the flattened, immutable view of a collection
//! and its ancestor chain: one path-redirect table and one merged
//! metadata-edit table, each entry carrying the provenance of its winner.
//! Caches are built off to the side and published by swapping an `Arc`,
//! so readers only ever observe a fully-built snapshot.
//!
//! # Flattening algorithm
//!
//! 1. Walk the collection and its ancestors in a deterministic preorder
//!    (the collection itself first, then parents in declared order, depth
//!    first). The first collection in that order to configure a mod id
//!    claims it — own settings always beat inherited ones, and the first
//!    parent beats later parents.
//! 2. Skip claimed mods that are disabled, and mods whose id is no longer
//!    in the registry (logged, treated as disabled).
//! 3. For each remaining mod, enumerate its base redirects and edits,
//!    then each option group's active options per the claimed settings.
//!    Within one mod, later groups and options overwrite earlier ones.
//! 4. Across mods, a contested path or metadata field goes to the
//!    candidate with the closest settings origin; then the higher mod
//!    priority; then the higher option priority; then the later insertion
//!    order. The decisive rule is recorded for diagnostics.
//! 5. Metadata edits are keyed per field, so edits to disjoint fields of
//!    the same record coexist in the merged table.
//! 6. The cache carries an xxHash3 fingerprint of its inputs (closure
//!    names, settings, per-mod content fingerprints); a rebuild whose
//!    fingerprint matches the published cache is skipped entirely.

use crate::settings::ModSettings;
use camino::Utf8PathBuf;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use veil_mod::{GamePath, MetaEdit, MetaFileId, MetaKey, ModRegistry, RedirectTable};
use xxhash_rust::xxh3::xxh3_64;

/// Why a winning entry beat its competitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Only one enabled mod claimed the entry.
    Unique,
    /// The winner's settings originate closer to the resolved collection
    /// (own settings outrank inherited ones).
    Origin,
    /// Higher mod priority.
    ModPriority,
    /// Equal mod priority, higher option priority.
    OptionPriority,
    /// All priorities equal; the later-inserted mod wins.
    ListOrder,
}

/// Provenance of a winning redirect or metadata edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Id of the winning mod.
    pub mod_id: String,
    /// Collection whose settings enabled the winning mod.
    pub origin: String,
    /// The winning settings' priority.
    pub priority: i32,
    /// Priority of the contributing option (0 for base content).
    pub option_priority: i32,
    /// The rule that decided the most recent contest for this entry.
    pub tie_break: TieBreak,
}

/// A resolved path redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    /// Concrete replacement file to serve.
    pub target: Utf8PathBuf,
    pub provenance: Provenance,
}

/// A resolved metadata edit.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedEdit {
    pub edit: MetaEdit,
    pub provenance: Provenance,
}

/// The merged edits of one derived file class, sorted by field key, with
/// a fingerprint over the sorted encoding. Precomputed at build time so
/// the resolver can hand the subset to the metadata manager without
/// touching the cache again.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaSubset {
    pub file: MetaFileId,
    pub edits: Vec<MetaEdit>,
    pub fingerprint: u64,
}

/// One mod's contribution to a contested path, for conflict enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub mod_id: String,
    /// Collection whose settings enabled the mod.
    pub origin: String,
    pub priority: i32,
    pub option_priority: i32,
    /// Position in the flattened mod enumeration (0-based).
    pub install_order: usize,
}

/// A path claimed by more than one enabled mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathConflict {
    pub path: GamePath,
    /// All mods that contributed a redirect for this path.
    pub contributing: Vec<Contribution>,
    /// Id of the mod whose redirect won.
    pub winner: String,
}

/// Immutable flattened view of a collection.
#[derive(Debug)]
pub struct CollectionCache {
    name: String,
    path_table: HashMap<GamePath, Redirect>,
    meta_table: HashMap<MetaKey, ResolvedEdit>,
    meta_subsets: HashMap<MetaFileId, Arc<MetaSubset>>,
    fingerprint: u64,
}

impl CollectionCache {
    /// Name of the collection this cache was flattened from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The winning redirect for a path, if any mod claims it.
    pub fn redirect(&self, path: &GamePath) -> Option<&Redirect> {
        self.path_table.get(path)
    }

    /// The full redirect table with provenance.
    pub fn path_table(&self) -> &HashMap<GamePath, Redirect> {
        &self.path_table
    }

    /// The merged metadata-edit table with provenance.
    pub fn meta_table(&self) -> &HashMap<MetaKey, ResolvedEdit> {
        &self.meta_table
    }

    /// The merged, sorted edit subset for one derived file class, or
    /// `None` if no enabled mod edits that class.
    pub fn meta_subset(&self, file: MetaFileId) -> Option<Arc<MetaSubset>> {
        self.meta_subsets.get(&file).map(Arc::clone)
    }

    /// Fingerprint of the inputs this cache was built from.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    pub fn is_empty(&self) -> bool {
        self.path_table.is_empty() && self.meta_table.is_empty()
    }
}

/// One collection's contribution to a flattening closure: its name and a
/// snapshot of its settings, in ancestor visit order (the collection
/// itself first).
#[derive(Debug, Clone)]
pub(crate) struct ClosureEntry {
    pub(crate) name: String,
    pub(crate) settings: Vec<ModSettings>,
}

/// Ordering key of a contribution during contests.
#[derive(Debug, Clone, Copy)]
struct RankKey {
    /// Position of the settings origin in the ancestor walk; lower wins.
    rank: usize,
    /// Mod priority; higher wins.
    priority: i32,
    /// Option priority; higher wins.
    option_priority: i32,
    /// Position in the flattened mod enumeration; higher wins. Also the
    /// mod's identity within one flattening (one entry per mod).
    order: usize,
}

impl RankKey {
    fn beats(self, other: RankKey) -> bool {
        if self.rank != other.rank {
            return self.rank < other.rank;
        }
        if self.priority != other.priority {
            return self.priority > other.priority;
        }
        if self.option_priority != other.option_priority {
            return self.option_priority > other.option_priority;
        }
        self.order > other.order
    }

    fn decisive_rule(self, other: RankKey) -> TieBreak {
        if self.rank != other.rank {
            TieBreak::Origin
        } else if self.priority != other.priority {
            TieBreak::ModPriority
        } else if self.option_priority != other.option_priority {
            TieBreak::OptionPriority
        } else {
            TieBreak::ListOrder
        }
    }
}

/// A candidate contribution during enumeration.
struct Candidate<'a> {
    mod_id: &'a str,
    origin: &'a str,
    key: RankKey,
}

enum Payload<'a> {
    Redirect(&'a GamePath, &'a Utf8PathBuf),
    Meta(&'a MetaEdit),
}

struct Winner<V> {
    key: RankKey,
    mod_id: String,
    origin: String,
    tie_break: TieBreak,
    value: V,
}

impl<V> Winner<V> {
    fn into_provenance(self) -> (Provenance, V) {
        (
            Provenance {
                mod_id: self.mod_id,
                origin: self.origin,
                priority: self.key.priority,
                option_priority: self.key.option_priority,
                tie_break: self.tie_break,
            },
            self.value,
        )
    }
}

/// Contest an entry into a winner table.
fn contest_insert<K, V>(
    table: &mut HashMap<K, Winner<V>>,
    entry_key: K,
    candidate: &Candidate<'_>,
    value: V,
) where
    K: Eq + std::hash::Hash,
{
    match table.entry(entry_key) {
        std::collections::hash_map::Entry::Vacant(slot) => {
            slot.insert(Winner {
                key: candidate.key,
                mod_id: candidate.mod_id.to_string(),
                origin: candidate.origin.to_string(),
                tie_break: TieBreak::Unique,
                value,
            });
        }
        std::collections::hash_map::Entry::Occupied(mut slot) => {
            let incumbent = slot.get_mut();
            if candidate.key.order == incumbent.key.order {
                // Same mod: a later group or option overwrites outright.
                // The contest history against other mods is kept.
                incumbent.key = candidate.key;
                incumbent.value = value;
            } else if candidate.key.beats(incumbent.key) {
                let rule = candidate.key.decisive_rule(incumbent.key);
                *incumbent = Winner {
                    key: candidate.key,
                    mod_id: candidate.mod_id.to_string(),
                    origin: candidate.origin.to_string(),
                    tie_break: rule,
                    value,
                };
            } else {
                incumbent.tie_break = incumbent.key.decisive_rule(candidate.key);
            }
        }
    }
}

/// Enumerate every contribution of every effectively-enabled mod in the
/// closure, in deterministic order.
fn for_each_contribution(
    closure: &[ClosureEntry],
    registry: &ModRegistry,
    f: &mut dyn FnMut(&Candidate<'_>, Payload<'_>),
) {
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut order = 0usize;

    for (rank, entry) in closure.iter().enumerate() {
        for settings in &entry.settings {
            if !claimed.insert(settings.mod_id.as_str()) {
                continue;
            }
            let order_index = order;
            order += 1;

            if !settings.enabled {
                continue;
            }

            let Some(record) = registry.get(&settings.mod_id) else {
                tracing::warn!(
                    "Collection '{}' references missing mod '{}'; treated as disabled",
                    entry.name,
                    settings.mod_id
                );
                continue;
            };

            let mut emit =
                |option_priority: i32, redirects: &RedirectTable, edits: &[MetaEdit]| {
                    let candidate = Candidate {
                        mod_id: &settings.mod_id,
                        origin: &entry.name,
                        key: RankKey {
                            rank,
                            priority: settings.priority,
                            option_priority,
                            order: order_index,
                        },
                    };
                    for (path, target) in redirects {
                        f(&candidate, Payload::Redirect(path, target));
                    }
                    for edit in edits {
                        f(&candidate, Payload::Meta(edit));
                    }
                };

            emit(0, &record.redirects, &record.meta_edits);
            for (group_index, group) in record.groups.iter().enumerate() {
                let selection = settings.selection_for(group_index, group.kind);
                for option_index in selection.active_indices(group.options.len()) {
                    let option = &group.options[option_index];
                    emit(option.priority, &option.redirects, &option.meta_edits);
                }
            }
        }
    }
}

/// Fingerprint of a closure's full input state: entry names, settings,
/// and the registry content fingerprint of every referenced mod.
pub(crate) fn closure_fingerprint(closure: &[ClosureEntry], registry: &ModRegistry) -> u64 {
    let mut buf = Vec::new();
    for entry in closure {
        buf.extend_from_slice(&(entry.name.len() as u32).to_le_bytes());
        buf.extend_from_slice(entry.name.as_bytes());
        for settings in &entry.settings {
            settings.encode(&mut buf);
            let content = registry.fingerprint_of(&settings.mod_id).unwrap_or(0);
            buf.extend_from_slice(&content.to_le_bytes());
        }
    }
    xxh3_64(&buf)
}

/// Flatten a closure into a fresh cache snapshot.
pub(crate) fn build_cache(
    name: &str,
    closure: &[ClosureEntry],
    registry: &ModRegistry,
) -> CollectionCache {
    let fingerprint = closure_fingerprint(closure, registry);

    let mut paths: HashMap<GamePath, Winner<Utf8PathBuf>> = HashMap::new();
    let mut metas: HashMap<MetaKey, Winner<MetaEdit>> = HashMap::new();

    for_each_contribution(closure, registry, &mut |candidate, payload| match payload {
        Payload::Redirect(path, target) => {
            contest_insert(&mut paths, path.clone(), candidate, target.clone());
        }
        Payload::Meta(edit) => {
            contest_insert(&mut metas, edit.key(), candidate, *edit);
        }
    });

    let path_table: HashMap<GamePath, Redirect> = paths
        .into_iter()
        .map(|(path, winner)| {
            let (provenance, target) = winner.into_provenance();
            (path, Redirect { target, provenance })
        })
        .collect();

    let meta_table: HashMap<MetaKey, ResolvedEdit> = metas
        .into_iter()
        .map(|(key, winner)| {
            let (provenance, edit) = winner.into_provenance();
            (key, ResolvedEdit { edit, provenance })
        })
        .collect();

    let meta_subsets = build_meta_subsets(&meta_table);

    tracing::debug!(
        "Flattened collection '{}': {} redirects, {} meta edits (fingerprint {:016x})",
        name,
        path_table.len(),
        meta_table.len(),
        fingerprint
    );

    CollectionCache {
        name: name.to_string(),
        path_table,
        meta_table,
        meta_subsets,
        fingerprint,
    }
}

/// Group merged edits per derived file class, sorted by field key, and
/// fingerprint each subset over its sorted encoding.
fn build_meta_subsets(
    meta_table: &HashMap<MetaKey, ResolvedEdit>,
) -> HashMap<MetaFileId, Arc<MetaSubset>> {
    let mut sorted: BTreeMap<MetaKey, MetaEdit> = BTreeMap::new();
    for (key, resolved) in meta_table {
        sorted.insert(*key, resolved.edit);
    }

    let mut subsets: HashMap<MetaFileId, Arc<MetaSubset>> = HashMap::new();
    for file in MetaFileId::ALL {
        let edits: Vec<MetaEdit> = sorted
            .iter()
            .filter(|(key, _)| key.file() == file)
            .map(|(_, edit)| *edit)
            .collect();
        if edits.is_empty() {
            continue;
        }

        let mut buf = Vec::with_capacity(edits.len() * 12);
        for edit in &edits {
            edit.encode(&mut buf);
        }
        subsets.insert(
            file,
            Arc::new(MetaSubset {
                file,
                edits,
                fingerprint: xxh3_64(&buf),
            }),
        );
    }
    subsets
}

/// Enumerate every path claimed by more than one enabled mod, with the
/// eventual winner. Deterministically sorted by path.
pub(crate) fn collect_conflicts(
    closure: &[ClosureEntry],
    registry: &ModRegistry,
) -> Vec<PathConflict> {
    let mut contributions: BTreeMap<GamePath, Vec<(RankKey, Contribution)>> = BTreeMap::new();

    for_each_contribution(closure, registry, &mut |candidate, payload| {
        let Payload::Redirect(path, _) = payload else {
            return;
        };
        let entry = contributions.entry(path.clone()).or_default();
        let contribution = Contribution {
            mod_id: candidate.mod_id.to_string(),
            origin: candidate.origin.to_string(),
            priority: candidate.key.priority,
            option_priority: candidate.key.option_priority,
            install_order: candidate.key.order,
        };
        // One slot per mod; a later option of the same mod replaces it.
        if let Some(slot) = entry
            .iter_mut()
            .find(|(key, _)| key.order == candidate.key.order)
        {
            *slot = (candidate.key, contribution);
        } else {
            entry.push((candidate.key, contribution));
        }
    });

    contributions
        .into_iter()
        .filter(|(_, entries)| entries.len() > 1)
        .map(|(path, entries)| {
            let mut winner_index = 0;
            for index in 1..entries.len() {
                if entries[index].0.beats(entries[winner_index].0) {
                    winner_index = index;
                }
            }
            let winner = entries[winner_index].1.mod_id.clone();
            PathConflict {
                path,
                contributing: entries.into_iter().map(|(_, c)| c).collect(),
                winner,
            }
        })
        .collect()
}
