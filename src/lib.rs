//! Geometry cache and named spatial indexes for geometries stored in document
//! databases.
//!
//! A `GeoCache` memoizes "node → parsed geometry" and "node → envelope" in two
//! bounded caches, and keeps any number of named R*-tree indexes that can be
//! filled incrementally or staged and bulk-built. The whole state can be
//! saved to and restored from a versioned binary snapshot.
//!
//! ```rust
//! use geocache::prelude::*;
//!
//! let cache = GeoCache::new(Config::default())?;
//! let indexes = cache.indexes();
//! indexes.prepare("default", NodeIdentity::element("db", 1), Shape::point(1.0, 1.0));
//! indexes.prepare("default", NodeIdentity::element("db", 2), Shape::point(5.0, 5.0));
//! indexes.prepare("default", NodeIdentity::element("db", 3), Shape::point(9.0, 9.0));
//! indexes.build("default");
//!
//! let hits = cache.search(None, &Envelope::new(0.0, 0.0, 6.0, 6.0));
//! assert_eq!(hits.len(), 2);
//! # Ok::<(), geocache::GeoCacheError>(())
//! ```

pub mod builder;
pub mod cache;
pub mod compute;
pub mod config;
pub mod error;
pub mod index;
pub mod node;
pub mod session;
pub mod storage;

pub use builder::GeoCacheBuilder;
pub use cache::{BoundedCache, CacheStats};
pub use compute::spatial::{BuildState, IndexedShape, SpatialIndex};
pub use config::{Config, DEFAULT_INDEX, MAX_CACHE_CAPACITY};
pub use error::{GeoCacheError, ParseError, Result};
pub use index::{IndexImage, SpatialIndexManager, SpatialIndexStats};
pub use node::{DocumentNode, GeometryParser, NodeResolver};
pub use session::GeoCache;

#[cfg(feature = "snapshot")]
pub use storage::{CacheSnapshot, SNAPSHOT_VERSION, SnapshotFile};

pub use geo::Geometry;
pub use geocache_types::bbox::{Envelope, Shape};
pub use geocache_types::identity::{NodeIdentity, NodeKind};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{GeoCache, GeoCacheBuilder, GeoCacheError, Result};

    pub use crate::{Config, DEFAULT_INDEX};

    pub use crate::{BoundedCache, SpatialIndexManager};

    pub use crate::{DocumentNode, GeometryParser, NodeResolver, ParseError};

    pub use crate::{Envelope, Geometry, NodeIdentity, NodeKind, Shape};
}
