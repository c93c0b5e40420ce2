//! Persistence for geocache state.
//!
//! - `CacheSnapshot`: versioned binary image of both caches and all indexes
//! - `SnapshotFile`: atomic on-disk storage of a snapshot image
//!
//! Both require the `snapshot` feature.

#[cfg(feature = "snapshot")]
pub mod snapshot;

#[cfg(feature = "snapshot")]
pub use snapshot::{CacheSnapshot, SNAPSHOT_VERSION, SnapshotFile};
