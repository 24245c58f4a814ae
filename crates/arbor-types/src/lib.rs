//! Foundation types for Arbor.
//!
//! Every object in an Arbor repository is named by the pair of its checksum
//! and its type. This crate provides those identifiers; every other Arbor
//! crate depends on `arbor-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (BLAKE3 hash)
//! - [`ObjectType`] -- Closed set of object kinds stored in a repository
//! - [`ObjectName`] -- Checksum plus type, the unit of enumeration and traversal

pub mod error;
pub mod kind;
pub mod object;

pub use error::TypeError;
pub use kind::{ObjectName, ObjectType};
pub use object::ObjectId;
