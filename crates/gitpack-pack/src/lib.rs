//! Git pack file format for gitpack.
//!
//! Read-side building blocks for `objects/pack/`:
//!
//! - **Pack index** (`.idx`, versions 1 and 2): parsed into a hash → location map
//! - **Entry header**: type code, declared size and delta base reference
//! - **Inflate**: zlib payload decoding with a grow-and-retry window
//! - **I/O**: one capability trait with tokio and blocking implementations
//!
//! Delta resolution and caching live in `gitpack-store`; this crate never
//! follows a base reference.

pub mod entry;
pub mod error;
pub mod index;
pub mod inflate;
pub mod io;

pub use entry::{DeltaBase, EntryHeader, DEFAULT_LOOKAHEAD};
pub use error::{PackError, PackResult};
pub use index::{IndexMap, PackIndex, IDX_MAGIC};
pub use inflate::{inflate_at, inflate_window, initial_window, Attempt, DEFAULT_INFLATE_GROWTH};
pub use io::{ObjectIo, PackHandle, StdIo, TokioIo, INDEX_EXTENSION, PACK_EXTENSION};
