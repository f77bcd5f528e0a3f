//! Path resolution and derived-metadata synthesis.
//!
//! This crate is the consumer-facing surface of the Veil engine: the
//! interception layer hands every resource load to [`PathResolver::resolve`]
//! and applies the returned [`ReplacementDecision`] to the native load
//! path. Plain redirects carry the replacement file reference; metadata
//! tables that multiple mods partially edit are reconstructed by the
//! [`MetadataManager`] from the unmodified base blob plus the collection's
//! merged edit set.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use veil_collection::CollectionManager;
//! use veil_mod::{GamePath, Mod, ModRegistry};
//! use veil_resolve::{PathResolver, ReplacementDecision};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ModRegistry::new());
//! registry.insert(Mod::from_json(r#"{
//!     "id": "aurora-hair",
//!     "name": "Aurora Hair",
//!     "redirects": { "chara/hair/01.tex": "textures/hair_01.tex" }
//! }"#)?);
//!
//! let manager = Arc::new(CollectionManager::new(Arc::clone(&registry)));
//! manager.create("Main")?;
//! manager.set_default("Main")?;
//! manager.set_mod_enabled("Main", "aurora-hair", true)?;
//!
//! let resolver = PathResolver::new(Arc::clone(&manager));
//! let path = GamePath::parse("chara/hair/01.tex")?;
//! match resolver.resolve(&path, None) {
//!     ReplacementDecision::Redirect(target) => println!("serve {}", target),
//!     ReplacementDecision::Synthesize(_) => println!("rebuild metadata"),
//!     ReplacementDecision::Unchanged => println!("serve the base file"),
//! }
//! # Ok(())
//! # }
//! ```

mod codec;
mod meta_manager;
mod resolver;

pub use codec::CodecError;
pub use meta_manager::{BaseMetaSource, MetaError, MetaRequest, MetadataManager};
pub use resolver::{PathResolver, ReplacementDecision};
