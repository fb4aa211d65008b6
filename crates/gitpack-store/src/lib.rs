//! Pack-backed object store for gitpack.
//!
//! Resolves git object hashes to their raw bytes straight from a
//! repository's `objects/pack/` directory, without shelling out to git.
//!
//! # Key Types
//!
//! - [`StoreRegistry`] -- bounded LRU of per-repository stores with
//!   deduplicated first-time initialization
//! - [`PackStore`] -- merged index of every `.idx` file in one repository,
//!   plus a write-once cache of resolved objects keyed by pack location
//! - [`StoreConfig`] -- tuning knobs, loadable from TOML
//!
//! # Resolution
//!
//! 1. The hash is looked up in the merged index; a miss is
//!    [`StoreError::NotFound`] without touching the filesystem.
//! 2. A cached location returns immediately.
//! 3. Otherwise the entry header is read, commits and tags are inflated,
//!    and OFS/REF deltas are reconstructed on top of their resolved base.
//!
//! Every suspending operation has a `_blocking` counterpart that drives the
//! same code over `std::fs`.

pub mod config;
pub mod error;
pub mod registry;
mod resolve;
pub mod store;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use registry::StoreRegistry;
pub use store::PackStore;
