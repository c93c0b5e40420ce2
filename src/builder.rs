//! Session builder for flexible configuration
//!
//! This module provides a builder pattern for creating a `GeoCache` with a
//! custom configuration and, optionally, a snapshot file that is loaded on
//! startup and written by `GeoCache::checkpoint`.

use crate::config::Config;
use crate::error::Result;
use crate::session::GeoCache;
#[cfg(feature = "snapshot")]
use crate::storage::SnapshotFile;
#[cfg(feature = "snapshot")]
use std::path::PathBuf;

/// Builder for `GeoCache` sessions.
#[derive(Debug, Default)]
pub struct GeoCacheBuilder {
    #[cfg(feature = "snapshot")]
    snapshot_path: Option<PathBuf>,
    config: Config,
}

impl GeoCacheBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the snapshot path. An existing snapshot is restored on build.
    #[cfg(feature = "snapshot")]
    pub fn snapshot_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Set the session configuration.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn geometry_cache_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_geometry_cache_capacity(capacity);
        self
    }

    pub fn record_stats(mut self, record: bool) -> Self {
        self.config = self.config.with_record_stats(record);
        self
    }

    /// Build the session, restoring the configured snapshot if present.
    pub fn build(self) -> Result<GeoCache> {
        #[allow(unused_mut)]
        let mut cache = GeoCache::new(self.config)?;

        #[cfg(feature = "snapshot")]
        if let Some(path) = self.snapshot_path {
            let file = SnapshotFile::new(&path);
            if let Some(image) = file.load()? {
                cache.restore(&image)?;
            }
            cache.snapshot_file = Some(file);
        }

        Ok(cache)
    }
}
