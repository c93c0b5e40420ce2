//! Compute layer: spatial index structures.
//!
//! Index internals live here, separate from the caches and from persistence.

pub mod spatial;
