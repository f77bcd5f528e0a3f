//! The per-request resolution entry point.
//!
//! [`PathResolver::resolve`] is what the interception layer calls on
//! every resource load: given a requested path and the actor context the
//! load happens for, it returns a [`ReplacementDecision`]. The function
//! is side-effect-free from the caller's point of view, never blocks on
//! I/O, and never fails — every anomaly degrades to
//! [`Unchanged`](ReplacementDecision::Unchanged).

use crate::meta_manager::MetaRequest;
use camino::Utf8PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use veil_collection::{CollectionManager, ContextId};
use veil_mod::{GamePath, MetaFileId};

/// The outcome of one resolution.
#[derive(Debug, Clone)]
pub enum ReplacementDecision {
    /// Serve the base file untouched.
    Unchanged,
    /// Serve this replacement file instead.
    Redirect(Utf8PathBuf),
    /// Reconstruct a derived metadata blob via the metadata manager.
    Synthesize(MetaRequest),
}

impl ReplacementDecision {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, ReplacementDecision::Unchanged)
    }
}

/// The per-request decision function over the collection engine.
pub struct PathResolver {
    manager: Arc<CollectionManager>,
    /// Global replacement toggle; when off, every resolution is
    /// `Unchanged` without touching any cache.
    enabled: AtomicBool,
}

impl PathResolver {
    pub fn new(manager: Arc<CollectionManager>) -> Self {
        Self {
            manager,
            enabled: AtomicBool::new(true),
        }
    }

    pub fn manager(&self) -> &Arc<CollectionManager> {
        &self.manager
    }

    /// Flip the global replacement toggle. Returns `false` if the state
    /// was already as requested.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let previous = self.enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            tracing::info!(
                "Resource replacement {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        previous != enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Decide what to serve for a requested path.
    ///
    /// A direct redirect of a metadata-derived path wins over synthesis:
    /// a mod that replaces the whole table file takes the file as-is, and
    /// merged edits only apply when nothing redirects the table outright.
    pub fn resolve(&self, path: &GamePath, context: Option<&ContextId>) -> ReplacementDecision {
        if !self.enabled.load(Ordering::Relaxed) {
            return ReplacementDecision::Unchanged;
        }

        let cache = self.manager.resolve_for(context);

        if let Some(redirect) = cache.redirect(path) {
            tracing::trace!(
                "'{}' -> '{}' (mod '{}')",
                path,
                redirect.target,
                redirect.provenance.mod_id
            );
            return ReplacementDecision::Redirect(redirect.target.clone());
        }

        if let Some(file) = MetaFileId::from_path(path) {
            if let Some(subset) = cache.meta_subset(file) {
                tracing::trace!(
                    "'{}' -> synthesize {:?} ({} edit(s))",
                    path,
                    file,
                    subset.edits.len()
                );
                return ReplacementDecision::Synthesize(MetaRequest {
                    collection: cache.name().to_string(),
                    subset,
                });
            }
        }

        ReplacementDecision::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use veil_mod::{EquipSlot, MetaEdit, Mod, ModRegistry, RedirectTable};

    fn resolver_with_mod(record: Mod) -> PathResolver {
        let registry = Arc::new(ModRegistry::new());
        let id = record.id.clone();
        registry.insert(record);

        let manager = Arc::new(CollectionManager::new(registry));
        manager.create("Main").unwrap();
        manager.set_default("Main").unwrap();
        manager.set_mod_enabled("Main", &id, true).unwrap();
        PathResolver::new(manager)
    }

    fn redirect_mod(id: &str, path: &str, target: &str) -> Mod {
        let mut redirects = RedirectTable::new();
        redirects.insert(GamePath::parse(path).unwrap(), Utf8PathBuf::from(target));
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
    fn test_resolve_redirect() {
        let resolver = resolver_with_mod(redirect_mod("m", "chara/hair/01.tex", "m.tex"));
        let path = GamePath::parse("chara/hair/01.tex").unwrap();

        match resolver.resolve(&path, None) {
            ReplacementDecision::Redirect(target) => {
                assert_eq!(target, Utf8PathBuf::from("m.tex"));
            }
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_unclaimed_path_unchanged() {
        let resolver = resolver_with_mod(redirect_mod("m", "chara/hair/01.tex", "m.tex"));
        let path = GamePath::parse("chara/face/01.tex").unwrap();
        assert!(resolver.resolve(&path, None).is_unchanged());
    }

    #[test]
    fn test_resolve_synthesize_for_edited_table() {
        let mut record = redirect_mod("m", "chara/hair/01.tex", "m.tex");
        record.meta_edits = vec![MetaEdit::Equip {
            set: 3,
            slot: EquipSlot::Head,
            enabled: true,
        }];
        let resolver = resolver_with_mod(record);

        let table_path = GamePath::parse(MetaFileId::Equip.path_str()).unwrap();
        match resolver.resolve(&table_path, None) {
            ReplacementDecision::Synthesize(request) => {
                assert_eq!(request.collection, "Main");
                assert_eq!(request.subset.file, MetaFileId::Equip);
                assert_eq!(request.subset.edits.len(), 1);
            }
            other => panic!("expected synthesize, got {:?}", other),
        }
    }

    #[test]
    fn test_direct_redirect_of_table_beats_synthesis() {
        let mut record = redirect_mod("m", MetaFileId::Equip.path_str(), "equip.edt");
        record.meta_edits = vec![MetaEdit::Equip {
            set: 3,
            slot: EquipSlot::Head,
            enabled: true,
        }];
        let resolver = resolver_with_mod(record);

        let table_path = GamePath::parse(MetaFileId::Equip.path_str()).unwrap();
        assert!(matches!(
            resolver.resolve(&table_path, None),
            ReplacementDecision::Redirect(_)
        ));
    }

    #[test]
    fn test_disabled_resolver_returns_unchanged() {
        let resolver = resolver_with_mod(redirect_mod("m", "chara/hair/01.tex", "m.tex"));
        let path = GamePath::parse("chara/hair/01.tex").unwrap();

        assert!(resolver.set_enabled(false));
        assert!(!resolver.set_enabled(false));
        assert!(resolver.resolve(&path, None).is_unchanged());

        assert!(resolver.set_enabled(true));
        assert!(!resolver.resolve(&path, None).is_unchanged());
    }
}
