//! Registry arena of loaded mods.
//!
//! The registry owns every loaded [`Mod`] behind an `Arc` and hands out
//! shared references by stable id. Collections store ids only, so removing
//! or reloading a mod can never leave a dangling reference — a lookup
//! after removal simply returns `None` and the caller degrades the entry
//! to a stale reference.

use crate::Mod;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use xxhash_rust::xxh3::xxh3_64;

struct Entry {
    record: Arc<Mod>,
    /// xxHash3 of the mod's canonical JSON encoding, computed once at
    /// insert. Changes whenever a reload changes any content, which is
    /// what collection cache fingerprints key on.
    fingerprint: u64,
}

/// Process-wide arena of immutable mod records.
///
/// All methods take `&self`; interior locking makes the registry shareable
/// across the resolution and mutation paths. Lookups sit on the hot
/// resolution path and never block on writers longer than a map read.
pub struct ModRegistry {
    mods: RwLock<HashMap<String, Entry>>,
}

impl ModRegistry {
    pub fn new() -> Self {
        Self {
            mods: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a mod, replacing any previous record under the same id.
    ///
    /// Replacement under the same id is how reloads are modeled; the
    /// returned `Arc` is the registered record.
    pub fn insert(&self, record: Mod) -> Arc<Mod> {
        let fingerprint = content_fingerprint(&record);
        let id = record.id.clone();
        let record = Arc::new(record);

        let replaced = self
            .write()
            .insert(
                id.clone(),
                Entry {
                    record: Arc::clone(&record),
                    fingerprint,
                },
            )
            .is_some();

        if replaced {
            tracing::info!("Reloaded mod '{}' (fingerprint {:016x})", id, fingerprint);
        } else {
            tracing::info!("Registered mod '{}' (fingerprint {:016x})", id, fingerprint);
        }
        record
    }

    /// Remove a mod by id, returning the removed record if present.
    pub fn remove(&self, id: &str) -> Option<Arc<Mod>> {
        let removed = self.write().remove(id);
        match &removed {
            Some(_) => tracing::info!("Removed mod '{}'", id),
            None => tracing::debug!("Remove of unknown mod '{}' ignored", id),
        }
        removed.map(|entry| entry.record)
    }

    /// Look up a mod by id.
    pub fn get(&self, id: &str) -> Option<Arc<Mod>> {
        self.read().get(id).map(|entry| Arc::clone(&entry.record))
    }

    /// Content fingerprint of a registered mod.
    pub fn fingerprint_of(&self, id: &str) -> Option<u64> {
        self.read().get(id).map(|entry| entry.fingerprint)
    }

    /// Ids of all registered mods, sorted for deterministic enumeration.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A poisoned lock only means another thread panicked mid-read or
    // mid-insert of an independent entry; the map itself is never left
    // half-written, so recover rather than poisoning the resolution path.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.mods.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.mods.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ModRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// xxHash3 over the mod's canonical JSON encoding.
///
/// Field order is fixed by the struct definition and redirect tables are
/// ordered maps, so identical content always encodes identically.
fn content_fingerprint(record: &Mod) -> u64 {
    match serde_json::to_vec(record) {
        Ok(bytes) => xxh3_64(&bytes),
        Err(error) => {
            tracing::warn!("Failed to fingerprint mod '{}': {}", record.id, error);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GamePath, RedirectTable};
    use camino::Utf8PathBuf;

    fn sample_mod(id: &str) -> Mod {
        let mut redirects = RedirectTable::new();
        redirects.insert(
            GamePath::parse("chara/hair/01.tex").unwrap(),
            Utf8PathBuf::from("hair.tex"),
        );
        Mod {
            id: id.to_string(),
            name: id.to_string(),
            version: String::new(),
            description: None,
            source: Utf8PathBuf::new(),
            redirects,
            meta_edits: Vec::new(),
            groups: Vec::new(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let registry = ModRegistry::new();
        registry.insert(sample_mod("a"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().id, "a");
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn test_remove_returns_record() {
        let registry = ModRegistry::new();
        registry.insert(sample_mod("a"));

        let removed = registry.remove("a").unwrap();
        assert_eq!(removed.id, "a");
        assert!(registry.get("a").is_none());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn test_reload_replaces_and_changes_fingerprint() {
        let registry = ModRegistry::new();
        registry.insert(sample_mod("a"));
        let before = registry.fingerprint_of("a").unwrap();

        let mut changed = sample_mod("a");
        changed.redirects.insert(
            GamePath::parse("chara/hair/02.tex").unwrap(),
            Utf8PathBuf::from("other.tex"),
        );
        registry.insert(changed);

        let after = registry.fingerprint_of("a").unwrap();
        assert_eq!(registry.len(), 1);
        assert_ne!(before, after);
    }

    #[test]
    fn test_identical_content_same_fingerprint() {
        let registry = ModRegistry::new();
        registry.insert(sample_mod("a"));
        let first = registry.fingerprint_of("a").unwrap();

        registry.insert(sample_mod("a"));
        assert_eq!(registry.fingerprint_of("a").unwrap(), first);
    }

    #[test]
    fn test_ids_sorted() {
        let registry = ModRegistry::new();
        registry.insert(sample_mod("zeta"));
        registry.insert(sample_mod("alpha"));

        assert_eq!(registry.ids(), vec!["alpha", "zeta"]);
    }
}
