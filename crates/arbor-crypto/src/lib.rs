//! Cryptographic primitives for Arbor.
//!
//! Provides domain-separated BLAKE3 hashing for every object type, over
//! in-memory buffers or streamed content.
//!
//! All hashing goes through the `blake3` crate.

pub mod hasher;

pub use hasher::ContentHasher;
