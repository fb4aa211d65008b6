//! Git delta primitives.
//!
//! Two pieces of the pack format that the object resolver treats as black
//! boxes:
//!
//! - [`decode_backward_offset`] reads the biased base-128 distance that an
//!   OFS_DELTA entry stores between itself and its base.
//! - [`apply_delta`] runs a git delta instruction stream (copy-from-base and
//!   insert-literal) against a base buffer to rebuild the derived object.
//!
//! Neither function touches the filesystem or knows about pack layout.

pub mod apply;
pub mod error;
pub mod offset;

pub use apply::apply_delta;
pub use error::{DeltaError, DeltaResult};
pub use offset::decode_backward_offset;
