//! Routing layer over named spatial indexes.
//!
//! `SpatialIndexManager` owns every `SpatialIndex` of a session, keyed by
//! name. Indexes are created implicitly by the first `insert` or `prepare`
//! for a name. The name map is a `DashMap`; a shard lock is only held long
//! enough to fetch the index handle, so work on different names never waits
//! on each other. Per-name atomicity comes from the index itself.
//!
//! Searches against a missing or empty index return an empty result.
//!
//! ```rust
//! use geocache::{Envelope, NodeIdentity, Shape, SpatialIndexManager};
//!
//! let manager = SpatialIndexManager::new();
//! manager.prepare("default", NodeIdentity::element("db", 1), Shape::point(1.0, 1.0));
//! manager.prepare("default", NodeIdentity::element("db", 2), Shape::point(5.0, 5.0));
//! manager.build("default");
//!
//! let hits = manager.search("default", &Envelope::new(0.0, 0.0, 6.0, 6.0));
//! assert_eq!(hits.len(), 2);
//! ```

use crate::compute::spatial::rtree::{BuildState, IndexedShape, SpatialIndex, is_finite_shape};
use dashmap::DashMap;
use geocache_types::bbox::{Envelope, Shape};
use geocache_types::identity::NodeIdentity;
use rustc_hash::FxHasher;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

type FxBuildHasher = BuildHasherDefault<FxHasher>;

/// Exported content of one index, used for snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexImage {
    pub name: String,
    pub state: BuildState,
    pub entries: Vec<IndexedShape>,
    pub staged: Vec<IndexedShape>,
}

/// Aggregate statistics over all indexes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpatialIndexStats {
    /// Number of named indexes
    pub index_count: usize,
    /// Entries in installed trees across all indexes
    pub total_entries: usize,
    /// Entries staged for a pending bulk build
    pub staged_entries: usize,
}

/// Owner of all named spatial indexes in a session.
#[derive(Default)]
pub struct SpatialIndexManager {
    indexes: DashMap<String, Arc<SpatialIndex>, FxBuildHasher>,
}

impl SpatialIndexManager {
    pub fn new() -> Self {
        Self {
            indexes: DashMap::with_hasher(FxBuildHasher::default()),
        }
    }

    fn get(&self, name: &str) -> Option<Arc<SpatialIndex>> {
        self.indexes.get(name).map(|index| Arc::clone(index.value()))
    }

    fn get_or_create(&self, name: &str) -> Arc<SpatialIndex> {
        if let Some(index) = self.get(name) {
            return index;
        }
        let index = self
            .indexes
            .entry(name.to_string())
            .or_insert_with(|| {
                log::debug!("creating spatial index '{}'", name);
                Arc::new(SpatialIndex::new(name))
            });
        Arc::clone(index.value())
    }

    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(name)
    }

    /// Number of queryable entries in `name`, 0 if the index does not exist.
    pub fn index_size(&self, name: &str) -> usize {
        self.get(name).map_or(0, |index| index.len())
    }

    /// Number of entries staged for the next build of `name`.
    pub fn staged_len(&self, name: &str) -> usize {
        self.get(name).map_or(0, |index| index.staged_len())
    }

    /// Build state of `name`; a missing index reports `Empty`.
    pub fn state(&self, name: &str) -> BuildState {
        self.get(name).map_or(BuildState::Empty, |index| index.state())
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.indexes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Add one entry to the live tree of `name`, creating the index if needed.
    ///
    /// A shape with non-finite coordinates is rejected before any index is
    /// created.
    pub fn insert(&self, name: &str, id: NodeIdentity, shape: Shape) -> bool {
        if !accepts(name, &id, &shape) {
            return false;
        }
        self.get_or_create(name).insert(id, shape)
    }

    /// [`SpatialIndexManager::insert`] for an envelope; zero-area envelopes
    /// are stored as points.
    pub fn insert_envelope(&self, name: &str, id: NodeIdentity, envelope: &Envelope) -> bool {
        self.insert(name, id, Shape::from_envelope(envelope))
    }

    /// Stage one entry for the next [`SpatialIndexManager::build`] of `name`.
    pub fn prepare(&self, name: &str, id: NodeIdentity, shape: Shape) -> bool {
        if !accepts(name, &id, &shape) {
            return false;
        }
        self.get_or_create(name).prepare(id, shape)
    }

    pub fn prepare_envelope(&self, name: &str, id: NodeIdentity, envelope: &Envelope) -> bool {
        self.prepare(name, id, Shape::from_envelope(envelope))
    }

    /// Bulk-load everything staged for `name` into a new live tree.
    ///
    /// Returns the number of entries in the new tree. Building an index that
    /// does not exist creates it empty and live.
    pub fn build(&self, name: &str) -> usize {
        self.get_or_create(name).build()
    }

    /// Identities whose bounding box intersects `query`.
    pub fn search(&self, name: &str, query: &Envelope) -> Vec<NodeIdentity> {
        self.get(name)
            .map(|index| index.search(query))
            .unwrap_or_default()
    }

    /// Every identity in the live tree of `name`.
    pub fn search_all(&self, name: &str) -> Vec<NodeIdentity> {
        self.get(name)
            .map(|index| index.search_all())
            .unwrap_or_default()
    }

    /// Remove all entries for `id` from `name`. Returns how many were removed.
    pub fn remove(&self, name: &str, id: &NodeIdentity) -> usize {
        self.get(name).map_or(0, |index| index.remove(id))
    }

    /// Delete the named index entirely.
    pub fn remove_index(&self, name: &str) -> bool {
        let removed = self.indexes.remove(name).is_some();
        if removed {
            log::debug!("removed spatial index '{}'", name);
        }
        removed
    }

    /// Drop every index.
    pub fn clear(&self) {
        self.indexes.clear();
    }

    pub fn stats(&self) -> SpatialIndexStats {
        let mut stats = SpatialIndexStats::default();
        for index in self.indexes.iter() {
            stats.index_count += 1;
            stats.total_entries += index.len();
            stats.staged_entries += index.staged_len();
        }
        stats
    }

    /// Export every index, sorted by name.
    pub fn export(&self) -> Vec<IndexImage> {
        let mut images: Vec<_> = self
            .indexes
            .iter()
            .map(|index| IndexImage {
                name: index.key().clone(),
                state: index.state(),
                entries: index.entries(),
                staged: index.staged_entries(),
            })
            .collect();
        images.sort_by(|a, b| a.name.cmp(&b.name));
        images
    }

    /// Replace all indexes with the given images.
    pub fn replace_all(&self, images: Vec<IndexImage>) {
        let rebuilt: Vec<_> = images
            .into_iter()
            .map(|image| {
                let index =
                    SpatialIndex::from_parts(&image.name, image.state, image.entries, image.staged);
                (image.name, Arc::new(index))
            })
            .collect();

        self.indexes.clear();
        for (name, index) in rebuilt {
            self.indexes.insert(name, index);
        }
    }
}

fn accepts(name: &str, id: &NodeIdentity, shape: &Shape) -> bool {
    if is_finite_shape(shape) {
        return true;
    }
    log::warn!("Rejecting non-finite shape for {} in index '{}'", id, name);
    false
}

impl std::fmt::Debug for SpatialIndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndexManager")
            .field("indexes", &self.index_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn id(seq: u64) -> NodeIdentity {
        NodeIdentity::element("db", seq)
    }

    fn seqs(results: Vec<NodeIdentity>) -> HashSet<u64> {
        results.into_iter().map(|id| id.sequence).collect()
    }

    #[test]
    fn test_prepare_build_search_remove() {
        let manager = SpatialIndexManager::new();
        manager.prepare("default", id(1), Shape::rect(1.0, 1.0, 1.0, 1.0));
        manager.prepare("default", id(2), Shape::rect(5.0, 5.0, 5.0, 5.0));
        manager.prepare("default", id(3), Shape::rect(9.0, 9.0, 9.0, 9.0));
        manager.build("default");

        assert_eq!(
            seqs(manager.search("default", &Envelope::new(0.0, 0.0, 6.0, 6.0))),
            HashSet::from([1, 2])
        );
        assert!(
            manager
                .search("default", &Envelope::new(10.0, 10.0, 20.0, 20.0))
                .is_empty()
        );
        assert_eq!(manager.index_size("default"), 3);

        assert!(manager.remove_index("default"));
        assert!(!manager.has_index("default"));
        assert!(
            manager
                .search("default", &Envelope::new(0.0, 0.0, 6.0, 6.0))
                .is_empty()
        );
    }

    #[test]
    fn test_missing_index_is_empty() {
        let manager = SpatialIndexManager::new();
        assert!(!manager.has_index("nope"));
        assert_eq!(manager.index_size("nope"), 0);
        assert_eq!(manager.state("nope"), BuildState::Empty);
        assert!(manager.search_all("nope").is_empty());
        assert_eq!(manager.remove("nope", &id(1)), 0);
        assert!(!manager.remove_index("nope"));
    }

    #[test]
    fn test_rejected_shape_creates_no_index() {
        let manager = SpatialIndexManager::new();
        assert!(!manager.insert("ghost", id(1), Shape::point(f64::NAN, 0.0)));
        assert!(!manager.prepare("ghost", id(2), Shape::rect(0.0, 0.0, f64::INFINITY, 1.0)));
        assert!(!manager.has_index("ghost"));
        assert!(manager.index_names().is_empty());
        assert!(manager.export().is_empty());
    }

    #[test]
    fn test_insert_creates_index() {
        let manager = SpatialIndexManager::new();
        manager.insert_envelope("roads", id(7), &Envelope::new(0.0, 0.0, 1.0, 1.0));
        assert!(manager.has_index("roads"));
        assert_eq!(manager.state("roads"), BuildState::Live);
        assert_eq!(manager.search_all("roads"), vec![id(7)]);
    }

    #[test]
    fn test_build_without_staged_entries() {
        let manager = SpatialIndexManager::new();
        assert_eq!(manager.build("fresh"), 0);
        assert!(manager.has_index("fresh"));
        assert_eq!(manager.state("fresh"), BuildState::Live);
    }

    #[test]
    fn test_names_are_independent() {
        let manager = SpatialIndexManager::new();
        manager.insert("a", id(1), Shape::point(0.0, 0.0));
        manager.prepare("b", id(2), Shape::point(0.0, 0.0));
        assert_eq!(manager.index_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(manager.state("a"), BuildState::Live);
        assert_eq!(manager.state("b"), BuildState::Staging);

        let stats = manager.stats();
        assert_eq!(stats.index_count, 2);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.staged_entries, 1);
    }

    #[test]
    fn test_export_and_replace() {
        let manager = SpatialIndexManager::new();
        manager.insert("a", id(1), Shape::point(1.0, 1.0));
        manager.prepare("b", id(2), Shape::rect(0.0, 0.0, 2.0, 2.0));
        let images = manager.export();

        let restored = SpatialIndexManager::new();
        restored.insert("stale", id(99), Shape::point(0.0, 0.0));
        restored.replace_all(images.clone());
        assert!(!restored.has_index("stale"));
        assert_eq!(restored.export(), images);
    }

    #[test]
    fn test_concurrent_insert_across_names() {
        let manager = Arc::new(SpatialIndexManager::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let manager = Arc::clone(&manager);
                thread::spawn(move || {
                    let name = if t % 2 == 0 { "even" } else { "odd" };
                    for i in 0..200u64 {
                        manager.insert(name, id(t * 1_000 + i), Shape::point(i as f64, 0.0));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(manager.index_size("even"), 800);
        assert_eq!(manager.index_size("odd"), 800);
    }
}
