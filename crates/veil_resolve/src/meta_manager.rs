//! Derived metadata blob synthesis and caching.
//!
//! When a collection edits metadata, the engine cannot redirect the
//! derived file to any single replacement on disk — the served blob is
//! the *merge* of every enabled mod's partial edits applied over the
//! unmodified base table. The [`MetadataManager`] performs that
//! reconstruction and caches the result per collection and file class,
//! keyed by the edit subset's fingerprint.
//!
//! The cache is read-mostly: writers insert or reuse, never mutate a
//! published entry in place. Entries for a collection whose cache was
//! invalidated are not swept eagerly — the next request arrives with a
//! different fingerprint and simply replaces the stale entry.

use crate::codec::{CodecError, MetaTable};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use veil_collection::MetaSubset;
use veil_mod::MetaFileId;

/// Supplies the unmodified base blob of a derived file, as shipped in
/// the immutable base data store. Implemented by the game-data reader
/// collaborator; the engine itself never touches disk.
pub trait BaseMetaSource: Send + Sync {
    fn base_blob(&self, file: MetaFileId) -> Option<Vec<u8>>;
}

/// Errors produced during blob synthesis.
#[derive(Debug, Error)]
pub enum MetaError {
    /// The base data store has no blob for this file class.
    #[error("no base blob available for the {0:?} table")]
    MissingBase(MetaFileId),

    /// The base blob could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// A request to synthesize one derived file for one collection, as
/// returned inside a `Synthesize` decision.
#[derive(Debug, Clone)]
pub struct MetaRequest {
    /// Collection the merged edits came from; partitions the blob cache.
    pub collection: String,
    /// The merged, sorted edit subset with its fingerprint.
    pub subset: Arc<MetaSubset>,
}

struct CachedBlob {
    fingerprint: u64,
    bytes: Arc<[u8]>,
}

/// Builds and caches derived metadata blobs.
pub struct MetadataManager {
    source: Arc<dyn BaseMetaSource>,
    cache: RwLock<HashMap<(String, MetaFileId), CachedBlob>>,
}

impl MetadataManager {
    pub fn new(source: Arc<dyn BaseMetaSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Produce the derived blob for a request, reusing the cached result
    /// when the edit-subset fingerprint is unchanged.
    pub fn synthesize(&self, request: &MetaRequest) -> Result<Arc<[u8]>, MetaError> {
        let file = request.subset.file;
        let key = (request.collection.clone(), file);

        {
            let cache = self.read();
            if let Some(entry) = cache.get(&key) {
                if entry.fingerprint == request.subset.fingerprint {
                    tracing::trace!(
                        "Meta cache hit for '{}' {:?} ({:016x})",
                        request.collection,
                        file,
                        entry.fingerprint
                    );
                    return Ok(Arc::clone(&entry.bytes));
                }
            }
        }

        let base = self
            .source
            .base_blob(file)
            .ok_or(MetaError::MissingBase(file))?;
        let mut table = MetaTable::parse(file, &base)?;
        for edit in &request.subset.edits {
            table.apply(edit);
        }
        let bytes: Arc<[u8]> = table.encode().into();

        tracing::debug!(
            "Synthesized {:?} table for '{}': {} edit(s), {} byte(s)",
            file,
            request.collection,
            request.subset.edits.len(),
            bytes.len()
        );

        let mut cache = self.write();
        match cache.get(&key) {
            // Another thread synthesized the same subset first; reuse its
            // published entry instead of replacing it.
            Some(entry) if entry.fingerprint == request.subset.fingerprint => {
                Ok(Arc::clone(&entry.bytes))
            }
            _ => {
                cache.insert(
                    key,
                    CachedBlob {
                        fingerprint: request.subset.fingerprint,
                        bytes: Arc::clone(&bytes),
                    },
                );
                Ok(bytes)
            }
        }
    }

    /// Number of cached blobs, for diagnostics.
    pub fn cached_blobs(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<(String, MetaFileId), CachedBlob>> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<(String, MetaFileId), CachedBlob>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}
