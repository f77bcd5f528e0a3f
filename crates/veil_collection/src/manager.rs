//! The collection manager.
//!
//! Owns every collection, the reserved Empty collection, the default
//! pointer, and the context-assignment layers. Every mutation — settings,
//! membership, inheritance, assignments — funnels through this type, so
//! cache invalidation has exactly one trigger point and no setter can
//! forget it.
//!
//! # Locking
//!
//! The manager state (name table, default pointer, assignments) sits
//! behind one `RwLock`; each collection's data and its published cache
//! snapshot sit behind per-collection locks. Locks are always taken in
//! manager-then-collection order, and a collection's data lock is
//! released before any other collection's lock is touched, so the paths
//! cannot deadlock. Cache snapshots are immutable `Arc`s built off to the
//! side and published with a single swap: readers either see the previous
//! snapshot or the new one, never a half-built table. Poisoned locks are
//! recovered rather than propagated — no state here is left half-written
//! by a panicking thread, and the resolution path must not fail.

use crate::cache::{
    build_cache, closure_fingerprint, collect_conflicts, ClosureEntry, CollectionCache,
    PathConflict, Redirect,
};
use crate::collection::{Collection, EMPTY_COLLECTION};
use crate::context::ContextId;
use crate::error::{CollectionUse, Error, Result};
use crate::settings::GroupSelection;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use veil_mod::{GamePath, ModRegistry};

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

struct Slot {
    data: RwLock<Collection>,
    /// Published flattened snapshot; `None` until first resolution.
    cache: RwLock<Option<Arc<CollectionCache>>>,
    /// Set by the invalidation funnel; cleared when a rebuild (or a
    /// fingerprint match) confirms the published snapshot is current.
    dirty: AtomicBool,
}

impl Slot {
    fn new(data: Collection) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(data),
            cache: RwLock::new(None),
            dirty: AtomicBool::new(false),
        })
    }
}

struct Inner {
    /// Lowercased name -> slot.
    collections: HashMap<String, Arc<Slot>>,
    /// Display name of the default collection; starts at Empty.
    default_name: String,
    assignments: HashMap<ContextId, String>,
    /// Forced assignments with the highest precedence; never persisted.
    temporary: HashMap<ContextId, String>,
}

/// Registry of collections and the per-context resolution entry point.
pub struct CollectionManager {
    registry: Arc<ModRegistry>,
    inner: RwLock<Inner>,
}

impl CollectionManager {
    pub fn new(registry: Arc<ModRegistry>) -> Self {
        let mut collections = HashMap::new();
        collections.insert(
            EMPTY_COLLECTION.to_lowercase(),
            Slot::new(Collection::new(EMPTY_COLLECTION)),
        );
        Self {
            registry,
            inner: RwLock::new(Inner {
                collections,
                default_name: EMPTY_COLLECTION.to_string(),
                assignments: HashMap::new(),
                temporary: HashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<ModRegistry> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Structural mutations
    // ------------------------------------------------------------------

    /// Create an empty collection with the given name.
    pub fn create(&self, name: &str) -> Result<()> {
        let label = validate_name(name)?;
        let key = label.to_lowercase();

        let mut inner = write_lock(&self.inner);
        if inner.collections.contains_key(&key) {
            return Err(Error::NameExists(label));
        }
        inner
            .collections
            .insert(key.clone(), Slot::new(Collection::new(label.clone())));

        // Collections may already declare the new name as a parent (loaded
        // before it existed); their closures just changed.
        invalidate_dependents(&inner, &key);
        tracing::info!("Created collection '{}'", label);
        Ok(())
    }

    /// Copy a collection's settings and parents under a new name.
    pub fn duplicate(&self, source: &str, new_name: &str) -> Result<()> {
        let label = validate_name(new_name)?;
        let key = label.to_lowercase();

        let mut inner = write_lock(&self.inner);
        let source_slot = inner
            .collections
            .get(&source.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnknownCollection(source.to_string()))?;
        if inner.collections.contains_key(&key) {
            return Err(Error::NameExists(label));
        }

        let mut copy = read_lock(&source_slot.data).clone();
        copy.name = label.clone();
        inner.collections.insert(key.clone(), Slot::new(copy));
        invalidate_dependents(&inner, &key);
        tracing::info!("Duplicated collection '{}' as '{}'", source, label);
        Ok(())
    }

    /// Remove a collection.
    ///
    /// Rejected while the collection is the default, an assignment
    /// target, or a parent of another collection, leaving everything
    /// unchanged.
    pub fn remove(&self, name: &str) -> Result<()> {
        let key = name.to_lowercase();

        let mut inner = write_lock(&self.inner);
        let slot = inner
            .collections
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UnknownCollection(name.to_string()))?;
        let label = read_lock(&slot.data).name.clone();

        if key == EMPTY_COLLECTION.to_lowercase() {
            return Err(Error::ReservedName(label));
        }
        if inner.default_name.to_lowercase() == key {
            return Err(Error::StructuralConflict {
                name: label,
                usage: CollectionUse::Default,
            });
        }
        if inner
            .assignments
            .values()
            .chain(inner.temporary.values())
            .any(|target| target.to_lowercase() == key)
        {
            return Err(Error::StructuralConflict {
                name: label,
                usage: CollectionUse::Assignment,
            });
        }
        for other in inner.collections.values() {
            if Arc::ptr_eq(other, &slot) {
                continue;
            }
            let data = read_lock(&other.data);
            if data.inherits.iter().any(|p| p.to_lowercase() == key) {
                return Err(Error::StructuralConflict {
                    name: label,
                    usage: CollectionUse::Parent,
                });
            }
        }

        inner.collections.remove(&key);
        tracing::info!("Removed collection '{}'", label);
        Ok(())
    }

    /// Replace (or create) a collection from a deserialized document.
    ///
    /// Parent names that do not resolve yet are kept and skipped during
    /// flattening until a collection of that name appears.
    pub fn upsert(&self, collection: Collection) -> Result<()> {
        let label = validate_name(&collection.name)?;
        let key = label.to_lowercase();

        let mut inner = write_lock(&self.inner);
        for parent in &collection.inherits {
            let parent_key = parent.to_lowercase();
            if parent_key == key || reaches(&inner, &parent_key, &key) {
                return Err(Error::CycleDetected {
                    child: label,
                    parent: parent.clone(),
                });
            }
        }

        if let Some(slot) = inner.collections.get(&key).cloned() {
            let mut data = write_lock(&slot.data);
            *data = collection;
            data.name = label.clone();
        } else {
            let mut data = collection;
            data.name = label.clone();
            inner.collections.insert(key.clone(), Slot::new(data));
        }

        invalidate_collection(&inner, &key);
        tracing::debug!("Upserted collection '{}'", label);
        Ok(())
    }

    /// Point the default at an existing collection.
    pub fn set_default(&self, name: &str) -> Result<()> {
        let mut inner = write_lock(&self.inner);
        let label = display_name(&inner, name)?;
        inner.default_name = label.clone();
        tracing::info!("Default collection set to '{}'", label);
        Ok(())
    }

    /// Display name of the current default collection.
    pub fn default_collection(&self) -> String {
        read_lock(&self.inner).default_name.clone()
    }

    // ------------------------------------------------------------------
    // Inheritance
    // ------------------------------------------------------------------

    /// Append a parent to a collection's inheritance list.
    ///
    /// Rejected before any mutation if the edge would create a cycle.
    /// Returns `false` if the parent was already present.
    pub fn add_parent(&self, collection: &str, parent: &str) -> Result<bool> {
        let key = collection.to_lowercase();
        let parent_key = parent.to_lowercase();

        let inner = write_lock(&self.inner);
        let slot = require_mutable(&inner, &key, collection)?;
        let parent_display = display_name(&inner, parent)?;

        if parent_key == key || reaches(&inner, &parent_key, &key) {
            return Err(Error::CycleDetected {
                child: collection.to_string(),
                parent: parent_display,
            });
        }

        let changed = {
            let mut data = write_lock(&slot.data);
            if data.inherits.iter().any(|p| p.to_lowercase() == parent_key) {
                false
            } else {
                data.inherits.push(parent_display);
                true
            }
        };
        if changed {
            invalidate_collection(&inner, &key);
        }
        Ok(changed)
    }

    /// Remove a parent from a collection's inheritance list.
    pub fn remove_parent(&self, collection: &str, parent: &str) -> Result<bool> {
        let key = collection.to_lowercase();
        let parent_key = parent.to_lowercase();

        let inner = write_lock(&self.inner);
        let slot = require_mutable(&inner, &key, collection)?;

        let changed = {
            let mut data = write_lock(&slot.data);
            let before = data.inherits.len();
            data.inherits.retain(|p| p.to_lowercase() != parent_key);
            data.inherits.len() != before
        };
        if changed {
            invalidate_collection(&inner, &key);
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Settings mutations
    // ------------------------------------------------------------------

    /// Enable or disable a mod, creating default settings on first touch.
    pub fn set_mod_enabled(&self, collection: &str, mod_id: &str, enabled: bool) -> Result<bool> {
        self.mutate_settings(collection, |data| {
            let settings = data.settings_mut_or_default(mod_id);
            let changed = settings.enabled != enabled;
            settings.enabled = enabled;
            changed
        })
    }

    /// Set a mod's conflict priority, creating default settings on first
    /// touch.
    pub fn set_mod_priority(&self, collection: &str, mod_id: &str, priority: i32) -> Result<bool> {
        self.mutate_settings(collection, |data| {
            let settings = data.settings_mut_or_default(mod_id);
            let changed = settings.priority != priority;
            settings.priority = priority;
            changed
        })
    }

    /// Set the selection of one option group.
    pub fn set_selection(
        &self,
        collection: &str,
        mod_id: &str,
        group_index: usize,
        selection: GroupSelection,
    ) -> Result<bool> {
        self.mutate_settings(collection, |data| {
            let settings = data.settings_mut_or_default(mod_id);
            let changed = settings
                .selections
                .get(group_index)
                .copied()
                .map_or(true, |current| current != selection);
            settings.set_selection(group_index, selection);
            changed
        })
    }

    /// Drop a mod's settings entry from a collection.
    pub fn remove_mod_settings(&self, collection: &str, mod_id: &str) -> Result<bool> {
        self.mutate_settings(collection, |data| data.remove_settings(mod_id))
    }

    /// Settings mutations serialize per collection (the data write lock)
    /// without blocking mutations of other collections.
    fn mutate_settings(
        &self,
        collection: &str,
        mutate: impl FnOnce(&mut Collection) -> bool,
    ) -> Result<bool> {
        let key = collection.to_lowercase();
        let inner = read_lock(&self.inner);
        let slot = require_mutable(&inner, &key, collection)?;

        let changed = {
            let mut data = write_lock(&slot.data);
            mutate(&mut data)
        };
        if changed {
            invalidate_collection(&inner, &key);
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Mod registry propagation
    // ------------------------------------------------------------------

    /// Invalidate every collection whose flattening involves the given
    /// mod id. Call after the mod was reloaded in the registry.
    pub fn notify_mod_changed(&self, mod_id: &str) {
        let inner = read_lock(&self.inner);
        let direct: Vec<String> = inner
            .collections
            .iter()
            .filter(|(_, slot)| read_lock(&slot.data).mentions_mod(mod_id))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &direct {
            invalidate_collection(&inner, key);
        }
        tracing::debug!(
            "Mod '{}' changed; invalidated {} collection(s) and their dependents",
            mod_id,
            direct.len()
        );
    }

    /// Destroy every settings entry for a mod that left the registry for
    /// good, invalidating the affected collections.
    pub fn purge_mod(&self, mod_id: &str) {
        let inner = read_lock(&self.inner);
        let mut purged = 0usize;
        for (key, slot) in &inner.collections {
            let removed = {
                let mut data = write_lock(&slot.data);
                data.remove_settings(mod_id)
            };
            if removed {
                purged += 1;
                invalidate_collection(&inner, key);
            }
        }
        if purged > 0 {
            tracing::info!(
                "Purged settings for removed mod '{}' from {} collection(s)",
                mod_id,
                purged
            );
        }
    }

    // ------------------------------------------------------------------
    // Assignments
    // ------------------------------------------------------------------

    /// Assign a collection to a context, or clear the assignment.
    pub fn set_assignment(&self, context: ContextId, collection: Option<&str>) -> Result<()> {
        self.set_assignment_in(context, collection, false)
    }

    /// Force a collection for a context with the highest precedence.
    /// Temporary assignments are never persisted.
    pub fn set_temporary_assignment(
        &self,
        context: ContextId,
        collection: Option<&str>,
    ) -> Result<()> {
        self.set_assignment_in(context, collection, true)
    }

    fn set_assignment_in(
        &self,
        context: ContextId,
        collection: Option<&str>,
        temporary: bool,
    ) -> Result<()> {
        let mut inner = write_lock(&self.inner);
        let label = match collection {
            Some(name) => Some(display_name(&inner, name)?),
            None => None,
        };
        let table = if temporary {
            &mut inner.temporary
        } else {
            &mut inner.assignments
        };
        match label {
            Some(label) => {
                tracing::info!(
                    "Assigned collection '{}' to {}{}",
                    label,
                    context,
                    if temporary { " (temporary)" } else { "" }
                );
                table.insert(context, label);
            }
            None => {
                table.remove(&context);
                tracing::info!(
                    "Cleared {}assignment for {}",
                    if temporary { "temporary " } else { "" },
                    context
                );
            }
        }
        Ok(())
    }

    /// The persisted assignment for a context, if any.
    pub fn assignment(&self, context: &ContextId) -> Option<String> {
        read_lock(&self.inner).assignments.get(context).cloned()
    }

    /// All persisted assignments, deterministically ordered.
    pub fn assignments(&self) -> Vec<(ContextId, String)> {
        let inner = read_lock(&self.inner);
        let mut all: Vec<(ContextId, String)> = inner
            .assignments
            .iter()
            .map(|(context, name)| (context.clone(), name.clone()))
            .collect();
        all.sort_by_key(|(context, _)| context.to_string());
        all
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Name of the collection that applies to a context:
    /// temporary assignment, then persisted assignment, then the default.
    pub fn resolve_name_for(&self, context: Option<&ContextId>) -> String {
        let inner = read_lock(&self.inner);
        if let Some(context) = context {
            if let Some(name) = inner.temporary.get(context) {
                return name.clone();
            }
            if let Some(name) = inner.assignments.get(context) {
                return name.clone();
            }
        }
        inner.default_name.clone()
    }

    /// The flattened cache of the collection that applies to a context.
    ///
    /// Always succeeds: unassigned contexts fall back to the default,
    /// and an unconfigured default resolves as the empty collection.
    pub fn resolve_for(&self, context: Option<&ContextId>) -> Arc<CollectionCache> {
        let name = self.resolve_name_for(context);
        if let Some(cache) = self.cache_of(&name) {
            return cache;
        }
        // The resolved name vanished under us (e.g. a stale assignment in
        // a hand-edited document); degrade to no replacements.
        tracing::warn!("Resolved collection '{}' does not exist; using empty", name);
        self.cache_of(EMPTY_COLLECTION)
            .unwrap_or_else(|| Arc::new(build_cache(EMPTY_COLLECTION, &[], &self.registry)))
    }

    /// The flattened cache of a named collection, rebuilding lazily when
    /// stale. `None` if the collection does not exist.
    pub fn cache_of(&self, name: &str) -> Option<Arc<CollectionCache>> {
        let key = name.to_lowercase();
        let slot = read_lock(&self.inner).collections.get(&key).cloned()?;
        Some(self.ensure_cache(&key, &slot))
    }

    fn ensure_cache(&self, key: &str, slot: &Slot) -> Arc<CollectionCache> {
        if !slot.dirty.load(Ordering::Acquire) {
            if let Some(cache) = read_lock(&slot.cache).as_ref() {
                return Arc::clone(cache);
            }
        }

        let (label, closure) = self.closure_of(key);
        let fingerprint = closure_fingerprint(&closure, &self.registry);

        // An invalidation that did not change the effective inputs (e.g.
        // a setting toggled back) keeps the published snapshot.
        if let Some(current) = read_lock(&slot.cache).as_ref() {
            if current.fingerprint() == fingerprint {
                slot.dirty.store(false, Ordering::Release);
                tracing::debug!("Collection '{}' unchanged; reusing cache", label);
                return Arc::clone(current);
            }
        }

        tracing::info!("Rebuilding cache for collection '{}'", label);
        let built = Arc::new(build_cache(&label, &closure, &self.registry));
        let mut guard = write_lock(&slot.cache);
        *guard = Some(Arc::clone(&built));
        slot.dirty.store(false, Ordering::Release);
        built
    }

    /// Snapshot the ancestor closure of a collection: itself first, then
    /// parents depth-first in declared order, each collection once.
    fn closure_of(&self, root_key: &str) -> (String, Vec<ClosureEntry>) {
        let inner = read_lock(&self.inner);
        let mut closure = Vec::new();
        let mut visited = HashSet::new();
        visit_closure(&inner, root_key, &mut visited, &mut closure);
        let display = closure
            .first()
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| root_key.to_string());
        (display, closure)
    }

    // ------------------------------------------------------------------
    // Lookups and diagnostics
    // ------------------------------------------------------------------

    /// Snapshot of a collection's definition, `None` if absent.
    pub fn get(&self, name: &str) -> Option<Collection> {
        let inner = read_lock(&self.inner);
        let slot = inner.collections.get(&name.to_lowercase())?;
        let data = read_lock(&slot.data).clone();
        Some(data)
    }

    /// Display names of all collections, sorted.
    pub fn names(&self) -> Vec<String> {
        let inner = read_lock(&self.inner);
        let mut names: Vec<String> = inner
            .collections
            .values()
            .map(|slot| read_lock(&slot.data).name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// The winning provenance for a path in a collection.
    ///
    /// Never mutates or publishes a cache: if the published snapshot is
    /// stale or absent, a transient one is flattened and discarded.
    pub fn provenance(&self, collection: &str, path: &GamePath) -> Result<Option<Redirect>> {
        let key = collection.to_lowercase();
        let slot = read_lock(&self.inner)
            .collections
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::UnknownCollection(collection.to_string()))?;

        if !slot.dirty.load(Ordering::Acquire) {
            if let Some(cache) = read_lock(&slot.cache).as_ref() {
                return Ok(cache.redirect(path).cloned());
            }
        }

        let (display, closure) = self.closure_of(&key);
        let transient = build_cache(&display, &closure, &self.registry);
        Ok(transient.redirect(path).cloned())
    }

    /// Every path claimed by more than one enabled mod in a collection.
    pub fn conflicts(&self, collection: &str) -> Result<Vec<PathConflict>> {
        let key = collection.to_lowercase();
        if !read_lock(&self.inner).collections.contains_key(&key) {
            return Err(Error::UnknownCollection(collection.to_string()));
        }
        let (_, closure) = self.closure_of(&key);
        Ok(collect_conflicts(&closure, &self.registry))
    }
}

fn validate_name(name: &str) -> Result<String> {
    let display = name.trim();
    if display.is_empty() {
        return Err(Error::InvalidName("name is empty".to_string()));
    }
    let lower = display.to_lowercase();
    if lower == EMPTY_COLLECTION.to_lowercase() || lower == "default" {
        return Err(Error::ReservedName(display.to_string()));
    }
    Ok(display.to_string())
}

/// Slot lookup that rejects mutations of the reserved empty collection.
fn require_mutable(inner: &Inner, key: &str, requested: &str) -> Result<Arc<Slot>> {
    let slot = inner
        .collections
        .get(key)
        .cloned()
        .ok_or_else(|| Error::UnknownCollection(requested.to_string()))?;
    if key == EMPTY_COLLECTION.to_lowercase() {
        return Err(Error::ReservedName(EMPTY_COLLECTION.to_string()));
    }
    Ok(slot)
}

fn display_name(inner: &Inner, name: &str) -> Result<String> {
    let slot = inner
        .collections
        .get(&name.to_lowercase())
        .ok_or_else(|| Error::UnknownCollection(name.to_string()))?;
    let display = read_lock(&slot.data).name.clone();
    Ok(display)
}

/// Whether `to` is reachable from `from` by following parent edges.
/// Both arguments are lowercased keys.
fn reaches(inner: &Inner, from: &str, to: &str) -> bool {
    let mut visited = HashSet::new();
    let mut stack = vec![from.to_string()];
    while let Some(key) = stack.pop() {
        if key == to {
            return true;
        }
        if !visited.insert(key.clone()) {
            continue;
        }
        let Some(slot) = inner.collections.get(&key) else {
            continue;
        };
        let data = read_lock(&slot.data);
        stack.extend(data.inherits.iter().map(|p| p.to_lowercase()));
    }
    false
}

/// Mark a collection and every collection inheriting from it as stale.
fn invalidate_collection(inner: &Inner, target_key: &str) {
    for (key, slot) in &inner.collections {
        if key == target_key || reaches(inner, key, target_key) {
            slot.dirty.store(true, Ordering::Release);
        }
    }
}

/// Mark only the collections that inherit from the target as stale (used
/// when a collection newly appears under a name others already declare as
/// a parent).
fn invalidate_dependents(inner: &Inner, target_key: &str) {
    for (key, slot) in &inner.collections {
        if key != target_key && reaches(inner, key, target_key) {
            slot.dirty.store(true, Ordering::Release);
        }
    }
}

fn visit_closure(
    inner: &Inner,
    key: &str,
    visited: &mut HashSet<String>,
    out: &mut Vec<ClosureEntry>,
) {
    if !visited.insert(key.to_string()) {
        return;
    }
    let Some(slot) = inner.collections.get(key) else {
        tracing::warn!("Unknown parent collection '{}' skipped during flattening", key);
        return;
    };
    let (name, settings, parents) = {
        let data = read_lock(&slot.data);
        (
            data.name.clone(),
            data.settings.clone(),
            data.inherits.clone(),
        )
    };
    out.push(ClosureEntry { name, settings });
    for parent in parents {
        visit_closure(inner, &parent.to_lowercase(), visited, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use veil_mod::{Mod, RedirectTable};

    fn manager_with_mod(id: &str, path: &str, target: &str) -> CollectionManager {
        let registry = Arc::new(ModRegistry::new());
        let mut redirects = RedirectTable::new();
        redirects.insert(GamePath::parse(path).unwrap(), Utf8PathBuf::from(target));
        registry.insert(Mod {
            id: id.to_string(),
            name: id.to_string(),
            version: String::new(),
            description: None,
            source: Utf8PathBuf::new(),
            redirects,
            meta_edits: Vec::new(),
            groups: Vec::new(),
        });
        CollectionManager::new(registry)
    }

    #[test]
    fn test_reserved_empty_collection_exists() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        assert!(manager.get(EMPTY_COLLECTION).is_some());
        assert_eq!(manager.default_collection(), EMPTY_COLLECTION);
    }

    #[test]
    fn test_create_is_case_insensitive() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        manager.create("Main").unwrap();

        assert_eq!(
            manager.create("MAIN"),
            Err(Error::NameExists("MAIN".to_string()))
        );
        assert!(manager.get("mAiN").is_some());
    }

    #[test]
    fn test_reserved_names_rejected() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        assert!(matches!(manager.create("empty"), Err(Error::ReservedName(_))));
        assert!(matches!(
            manager.create("Default"),
            Err(Error::ReservedName(_))
        ));
        assert!(matches!(manager.create("   "), Err(Error::InvalidName(_))));
    }

    #[test]
    fn test_empty_collection_is_immutable() {
        let manager = manager_with_mod("m", "chara/hair/01.tex", "m.tex");
        assert!(matches!(
            manager.set_mod_enabled(EMPTY_COLLECTION, "m", true),
            Err(Error::ReservedName(_))
        ));
        assert!(matches!(
            manager.remove(EMPTY_COLLECTION),
            Err(Error::ReservedName(_))
        ));
    }

    #[test]
    fn test_remove_guards() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        manager.create("Main").unwrap();
        manager.create("Base").unwrap();

        manager.set_default("Main").unwrap();
        assert_eq!(
            manager.remove("Main"),
            Err(Error::StructuralConflict {
                name: "Main".to_string(),
                usage: CollectionUse::Default,
            })
        );

        manager
            .set_assignment(ContextId::Player, Some("Base"))
            .unwrap();
        assert_eq!(
            manager.remove("Base"),
            Err(Error::StructuralConflict {
                name: "Base".to_string(),
                usage: CollectionUse::Assignment,
            })
        );

        manager.set_assignment(ContextId::Player, None).unwrap();
        manager.add_parent("Main", "Base").unwrap();
        assert_eq!(
            manager.remove("Base"),
            Err(Error::StructuralConflict {
                name: "Base".to_string(),
                usage: CollectionUse::Parent,
            })
        );

        manager.remove_parent("Main", "Base").unwrap();
        manager.remove("Base").unwrap();
        assert!(manager.get("Base").is_none());
    }

    #[test]
    fn test_cycle_detection() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        manager.create("A").unwrap();
        manager.create("B").unwrap();
        manager.create("C").unwrap();
        manager.add_parent("A", "B").unwrap();
        manager.add_parent("B", "C").unwrap();

        // C -> A would close the loop A -> B -> C -> A.
        let result = manager.add_parent("C", "A");
        assert!(matches!(result, Err(Error::CycleDetected { .. })));
        assert!(manager.get("C").unwrap().inherits.is_empty());

        assert!(matches!(
            manager.add_parent("A", "A"),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_default_fallback_chain() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));

        // Never-configured default resolves as the empty collection.
        let cache = manager.resolve_for(None);
        assert_eq!(cache.name(), EMPTY_COLLECTION);
        assert!(cache.is_empty());

        let context = ContextId::character("Nobody", 1);
        assert_eq!(manager.resolve_name_for(Some(&context)), EMPTY_COLLECTION);
    }

    #[test]
    fn test_assignment_precedence() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        manager.create("Main").unwrap();
        manager.create("Forced").unwrap();
        manager.create("Fallback").unwrap();
        manager.set_default("Fallback").unwrap();

        let context = ContextId::character("Aurora Snow", 54);
        assert_eq!(manager.resolve_name_for(Some(&context)), "Fallback");

        manager
            .set_assignment(context.clone(), Some("Main"))
            .unwrap();
        assert_eq!(manager.resolve_name_for(Some(&context)), "Main");

        manager
            .set_temporary_assignment(context.clone(), Some("Forced"))
            .unwrap();
        assert_eq!(manager.resolve_name_for(Some(&context)), "Forced");

        manager
            .set_temporary_assignment(context.clone(), None)
            .unwrap();
        assert_eq!(manager.resolve_name_for(Some(&context)), "Main");
    }

    #[test]
    fn test_assignment_to_unknown_collection_rejected() {
        let manager = CollectionManager::new(Arc::new(ModRegistry::new()));
        let result = manager.set_assignment(ContextId::Player, Some("Nope"));
        assert_eq!(result, Err(Error::UnknownCollection("Nope".to_string())));
    }

    #[test]
    fn test_cache_rebuilds_after_mutation() {
        let manager = manager_with_mod("m", "chara/hair/01.tex", "m.tex");
        manager.create("Main").unwrap();
        manager.set_default("Main").unwrap();

        let path = GamePath::parse("chara/hair/01.tex").unwrap();
        assert!(manager.resolve_for(None).redirect(&path).is_none());

        manager.set_mod_enabled("Main", "m", true).unwrap();
        let cache = manager.resolve_for(None);
        assert_eq!(
            cache.redirect(&path).unwrap().target,
            Utf8PathBuf::from("m.tex")
        );

        manager.set_mod_enabled("Main", "m", false).unwrap();
        assert!(manager.resolve_for(None).redirect(&path).is_none());
    }

    #[test]
    fn test_unchanged_rebuild_reuses_snapshot() {
        let manager = manager_with_mod("m", "chara/hair/01.tex", "m.tex");
        manager.create("Main").unwrap();
        manager.set_default("Main").unwrap();
        manager.set_mod_enabled("Main", "m", true).unwrap();

        let first = manager.resolve_for(None);
        // Toggle off and back on: the effective inputs end up identical,
        // so the published snapshot is reused, not rebuilt.
        manager.set_mod_enabled("Main", "m", false).unwrap();
        manager.set_mod_enabled("Main", "m", true).unwrap();
        let second = manager.resolve_for(None);

        assert_eq!(first.fingerprint(), second.fingerprint());
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_provenance_does_not_publish_cache() {
        let manager = manager_with_mod("m", "chara/hair/01.tex", "m.tex");
        manager.create("Main").unwrap();
        manager.set_mod_enabled("Main", "m", true).unwrap();

        let path = GamePath::parse("chara/hair/01.tex").unwrap();
        let provenance = manager.provenance("Main", &path).unwrap().unwrap();
        assert_eq!(provenance.provenance.mod_id, "m");

        assert_eq!(
            manager.provenance("Gone", &path),
            Err(Error::UnknownCollection("Gone".to_string()))
        );
    }

    #[test]
    fn test_purge_mod_removes_settings() {
        let manager = manager_with_mod("m", "chara/hair/01.tex", "m.tex");
        manager.create("Main").unwrap();
        manager.set_default("Main").unwrap();
        manager.set_mod_enabled("Main", "m", true).unwrap();

        manager.registry().remove("m");
        manager.purge_mod("m");

        assert!(manager.get("Main").unwrap().settings.is_empty());
        assert!(manager.resolve_for(None).is_empty());
    }
}
