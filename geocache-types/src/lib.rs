//! # geocache-types
//!
//! Value types shared by the geocache geometry cache and spatial indexes.
//!
//! - **Identity**: `NodeIdentity`, a stable surrogate key for a document-store
//!   node that can be hashed, compared and serialized independently of any live
//!   store handle.
//! - **Bounding shapes**: `Envelope` (axis-aligned bounding rectangle) and
//!   `Shape` (point or rectangle, as stored in a spatial index).
//!
//! All types are serializable with Serde and built on top of the `geo` crate's
//! geometric primitives.
//!
//! ## Examples
//!
//! ```rust
//! use geocache_types::bbox::{Envelope, Shape};
//! use geocache_types::identity::{NodeIdentity, NodeKind};
//!
//! let id = NodeIdentity::new("cities", 42, NodeKind::Element);
//! let shape = Shape::from_envelope(&Envelope::new(1.0, 1.0, 1.0, 1.0));
//! assert!(shape.is_point());
//! # let _ = id;
//! ```

pub mod bbox;
pub mod identity;
