//! Foundation types for gitpack.
//!
//! This crate provides the identifier and classification types shared by
//! the pack parser, the delta resolver and the store registry.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- 20-byte SHA-1 content hash, displayed as 40 hex characters
//! - [`ObjectKind`] -- the 3-bit type code carried in every pack entry header
//! - [`ObjectLocation`] -- byte offset of an object inside a numbered pack file

pub mod error;
pub mod object;

pub use error::TypeError;
pub use object::{ObjectId, ObjectKind, ObjectLocation, OBJECT_ID_LEN};
