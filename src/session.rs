//! Per-session geometry cache.
//!
//! `GeoCache` owns the two bounded caches and the spatial index manager for
//! one session. The lookup path is:
//!
//! 1. capture a `NodeIdentity` from the node,
//! 2. return the cached geometry on a hit,
//! 3. otherwise parse the node, cache the geometry and (when enabled) its
//!    envelope.
//!
//! Envelopes live in their own cache so bounding-box work stays cheap after
//! the geometry itself has been evicted.

use crate::cache::BoundedCache;
use crate::config::{Config, MAX_CACHE_CAPACITY};
use crate::error::{GeoCacheError, Result};
use crate::index::SpatialIndexManager;
use crate::node::{DocumentNode, GeometryParser, NodeResolver};
use geo::Geometry;
use geocache_types::bbox::{Envelope, Shape};
use geocache_types::identity::NodeIdentity;
use std::sync::Arc;

#[cfg(feature = "snapshot")]
use crate::storage::{CacheSnapshot, SnapshotFile};
#[cfg(feature = "snapshot")]
use bytes::Bytes;
#[cfg(feature = "snapshot")]
use std::path::Path;

/// Geometry and envelope caches plus named spatial indexes for one session.
///
/// All operations take `&self` and may be called from several query threads
/// at once.
pub struct GeoCache {
    config: Config,
    geometries: BoundedCache<NodeIdentity, Arc<Geometry<f64>>>,
    envelopes: BoundedCache<NodeIdentity, Envelope>,
    indexes: SpatialIndexManager,
    #[cfg(feature = "snapshot")]
    pub(crate) snapshot_file: Option<SnapshotFile>,
}

impl GeoCache {
    /// Create an empty session. Fails with `InvalidConfiguration` when the
    /// configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        config
            .validate()
            .map_err(GeoCacheError::InvalidConfiguration)?;

        let geometries = BoundedCache::new(config.geometry_cache_capacity, config.record_stats)?;
        let envelopes =
            BoundedCache::with_capacity(config.envelope_cache_capacity, config.record_stats)?;

        Ok(Self {
            config,
            geometries,
            envelopes,
            indexes: SpatialIndexManager::new(),
            #[cfg(feature = "snapshot")]
            snapshot_file: None,
        })
    }

    pub fn builder() -> crate::builder::GeoCacheBuilder {
        crate::builder::GeoCacheBuilder::new()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn geometry_cache(&self) -> &BoundedCache<NodeIdentity, Arc<Geometry<f64>>> {
        &self.geometries
    }

    pub fn envelope_cache(&self) -> &BoundedCache<NodeIdentity, Envelope> {
        &self.envelopes
    }

    pub fn indexes(&self) -> &SpatialIndexManager {
        &self.indexes
    }

    /// Geometry for `node`, parsing it on a cache miss.
    ///
    /// Parser failures are returned as `Parse` errors and nothing is cached.
    pub fn geometry<P: GeometryParser>(
        &self,
        node: &P::Node,
        parser: &P,
    ) -> Result<Arc<Geometry<f64>>> {
        let id = node.identity();
        if let Some(geometry) = self.geometries.get(&id) {
            return Ok(geometry);
        }

        let geometry = Arc::new(parser.parse(node)?);
        if self.config.index_envelopes
            && let Some(envelope) = Envelope::of_geometry(&geometry)
        {
            self.envelopes.put(id.clone(), envelope);
        }
        self.geometries.put(id, Arc::clone(&geometry));
        Ok(geometry)
    }

    /// Bounding envelope of `node`, consulting the envelope cache first.
    ///
    /// Returns `None` for empty geometries.
    pub fn envelope<P: GeometryParser>(
        &self,
        node: &P::Node,
        parser: &P,
    ) -> Result<Option<Envelope>> {
        let id = node.identity();
        if let Some(envelope) = self.envelopes.get(&id) {
            return Ok(Some(envelope));
        }

        let geometry = self.geometry(node, parser)?;
        let envelope = Envelope::of_geometry(&geometry);
        if let Some(envelope) = envelope {
            self.envelopes.put(id, envelope);
        }
        Ok(envelope)
    }

    /// Cached geometry for `id`, without parsing.
    pub fn cached_geometry(&self, id: &NodeIdentity) -> Option<Arc<Geometry<f64>>> {
        self.geometries.get(id)
    }

    /// Cached envelope for `id`, without parsing.
    pub fn cached_envelope(&self, id: &NodeIdentity) -> Option<Envelope> {
        self.envelopes.get(id)
    }

    /// Resolve `id` to a live node, or fail with `NotFound`.
    pub fn resolve<R: NodeResolver>(&self, id: &NodeIdentity, resolver: &R) -> Result<R::Node> {
        resolver
            .resolve(id)
            .ok_or_else(|| GeoCacheError::NotFound(id.clone()))
    }

    fn index_name<'a>(&'a self, name: Option<&'a str>) -> &'a str {
        name.unwrap_or(&self.config.default_index)
    }

    /// Insert the envelope of `node` into the index `name` (or the default
    /// index). Returns `false` when the geometry is empty.
    pub fn index_node<P: GeometryParser>(
        &self,
        name: Option<&str>,
        node: &P::Node,
        parser: &P,
    ) -> Result<bool> {
        let Some(envelope) = self.envelope(node, parser)? else {
            return Ok(false);
        };
        let name = self.index_name(name);
        Ok(self.indexes.insert(name, node.identity(), Shape::from_envelope(&envelope)))
    }

    /// Stage the envelope of `node` for the next bulk build of `name`.
    pub fn stage_node<P: GeometryParser>(
        &self,
        name: Option<&str>,
        node: &P::Node,
        parser: &P,
    ) -> Result<bool> {
        let Some(envelope) = self.envelope(node, parser)? else {
            return Ok(false);
        };
        let name = self.index_name(name);
        Ok(self
            .indexes
            .prepare(name, node.identity(), Shape::from_envelope(&envelope)))
    }

    /// Bulk-build the index `name` (or the default index).
    pub fn build_index(&self, name: Option<&str>) -> usize {
        self.indexes.build(self.index_name(name))
    }

    /// Identities in `name` whose bounding box intersects `query`.
    pub fn search(&self, name: Option<&str>, query: &Envelope) -> Vec<NodeIdentity> {
        self.indexes.search(self.index_name(name), query)
    }

    /// Throw away every cached geometry and restart the geometry cache with a
    /// new capacity.
    pub fn reset_geometry_cache(&self, capacity: usize) -> Result<()> {
        if capacity > MAX_CACHE_CAPACITY {
            return Err(GeoCacheError::InvalidConfiguration(format!(
                "Geometry cache capacity cannot exceed {}",
                MAX_CACHE_CAPACITY
            )));
        }
        self.geometries.resize(capacity)
    }
}

#[cfg(feature = "snapshot")]
impl GeoCache {
    /// Capture the current caches and indexes.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot {
            geometry_capacity: self
                .geometries
                .capacity()
                .unwrap_or(self.config.geometry_cache_capacity),
            geometries: self.geometries.entries(),
            envelope_capacity: self.envelopes.capacity(),
            envelopes: self.envelopes.entries(),
            indexes: self.indexes.export(),
        }
    }

    /// Serialize the full session state into a versioned binary image.
    pub fn save(&self) -> Result<Bytes> {
        let image = self.snapshot().encode()?;
        log::debug!("saved snapshot image of {} bytes", image.len());
        Ok(image)
    }

    /// Replace the session state with a previously saved image.
    ///
    /// The image is fully decoded before anything is replaced; on error the
    /// current state is left untouched. Restored identities are not checked
    /// against the attached store.
    pub fn restore(&self, image: &[u8]) -> Result<()> {
        let snapshot = CacheSnapshot::decode(image).inspect_err(|e| {
            log::warn!("snapshot restore rejected: {}", e);
        })?;
        self.apply(snapshot)
    }

    /// Install a decoded snapshot.
    pub fn apply(&self, snapshot: CacheSnapshot) -> Result<()> {
        if snapshot.geometry_capacity == 0 || snapshot.envelope_capacity == Some(0) {
            return Err(GeoCacheError::InvalidFormat(
                "snapshot declares a zero cache capacity".into(),
            ));
        }

        let geometries = snapshot.geometries.len();
        let indexes = snapshot.indexes.len();
        self.geometries
            .replace_with(Some(snapshot.geometry_capacity), snapshot.geometries)?;
        self.envelopes
            .replace_with(snapshot.envelope_capacity, snapshot.envelopes)?;
        self.indexes.replace_all(snapshot.indexes);

        log::debug!(
            "restored snapshot with {} geometries and {} indexes",
            geometries,
            indexes
        );
        Ok(())
    }

    /// Write a snapshot to `path`, replacing any previous file atomically.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        SnapshotFile::new(path).save(&self.save()?)
    }

    /// Restore from a snapshot file. Returns `false` if the file is missing
    /// or empty, leaving the state unchanged.
    pub fn restore_from<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        match SnapshotFile::new(path).load()? {
            Some(image) => self.restore(&image).map(|()| true),
            None => Ok(false),
        }
    }

    /// Write a snapshot to the file configured on the builder, if any.
    pub fn checkpoint(&self) -> Result<bool> {
        match &self.snapshot_file {
            Some(file) => file.save(&self.save()?).map(|()| true),
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for GeoCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeoCache")
            .field("geometries", &self.geometries)
            .field("envelopes", &self.envelopes)
            .field("indexes", &self.indexes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use geo::{LineString, Point, Polygon};
    use geocache_types::identity::NodeKind;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct Node {
        seq: u64,
    }

    impl DocumentNode for Node {
        fn store_name(&self) -> &str {
            "test"
        }

        fn sequence(&self) -> u64 {
            self.seq
        }
    }

    /// Parser that reads points from a table and counts calls.
    struct TableParser {
        shapes: HashMap<u64, Geometry<f64>>,
        calls: Cell<usize>,
    }

    impl TableParser {
        fn new() -> Self {
            let square = Polygon::new(
                LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]),
                vec![],
            );
            let mut shapes = HashMap::new();
            shapes.insert(1, Geometry::Point(Point::new(1.0, 1.0)));
            shapes.insert(2, Geometry::Point(Point::new(5.0, 5.0)));
            shapes.insert(3, Geometry::Polygon(square));
            shapes.insert(4, Geometry::LineString(LineString::new(vec![])));
            Self {
                shapes,
                calls: Cell::new(0),
            }
        }
    }

    impl GeometryParser for TableParser {
        type Node = Node;

        fn parse(&self, node: &Node) -> std::result::Result<Geometry<f64>, ParseError> {
            self.calls.set(self.calls.get() + 1);
            self.shapes
                .get(&node.seq)
                .cloned()
                .ok_or_else(|| ParseError::new(format!("no geometry for node {}", node.seq)))
        }
    }

    struct Resolver;

    impl NodeResolver for Resolver {
        type Node = Node;

        fn resolve(&self, id: &NodeIdentity) -> Option<Node> {
            (id.sequence < 10).then(|| Node { seq: id.sequence })
        }
    }

    fn session() -> GeoCache {
        GeoCache::new(Config::default().with_record_stats(true)).unwrap()
    }

    #[test]
    fn test_invalid_configuration() {
        let err = GeoCache::new(Config::default().with_geometry_cache_capacity(0)).unwrap_err();
        assert!(matches!(err, GeoCacheError::InvalidConfiguration(_)));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_capacity_that_cannot_be_snapshotted_is_rejected() {
        let oversized = MAX_CACHE_CAPACITY + 1;
        let err = GeoCache::new(Config::default().with_geometry_cache_capacity(oversized))
            .unwrap_err();
        assert!(matches!(err, GeoCacheError::InvalidConfiguration(_)));

        let err = GeoCache::new(Config::default().with_envelope_cache_capacity(Some(oversized)))
            .unwrap_err();
        assert!(matches!(err, GeoCacheError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_geometry_is_parsed_once() {
        let cache = session();
        let parser = TableParser::new();
        let node = Node { seq: 1 };

        let first = cache.geometry(&node, &parser).unwrap();
        let second = cache.geometry(&node, &parser).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(parser.calls.get(), 1);
        assert_eq!(cache.geometry_cache().hit_count(), 1);
        assert_eq!(cache.geometry_cache().miss_count(), 1);
        assert_eq!(
            cache.cached_envelope(&node.identity()),
            Some(Envelope::point(1.0, 1.0))
        );
    }

    #[test]
    fn test_parse_error_is_propagated_and_not_cached() {
        let cache = session();
        let parser = TableParser::new();
        let err = cache.geometry(&Node { seq: 42 }, &parser).unwrap_err();
        assert!(matches!(err, GeoCacheError::Parse(_)));
        assert!(cache.geometry_cache().is_empty());
    }

    #[test]
    fn test_envelope_survives_geometry_eviction() {
        let cache = GeoCache::new(Config::default().with_geometry_cache_capacity(1)).unwrap();
        let parser = TableParser::new();
        cache.geometry(&Node { seq: 3 }, &parser).unwrap();
        cache.geometry(&Node { seq: 1 }, &parser).unwrap();

        let id = NodeIdentity::element("test", 3);
        assert!(cache.cached_geometry(&id).is_none());
        assert_eq!(
            cache.envelope(&Node { seq: 3 }, &parser).unwrap(),
            Some(Envelope::new(0.0, 0.0, 4.0, 4.0))
        );
        assert_eq!(parser.calls.get(), 2);
    }

    #[test]
    fn test_envelopes_not_stored_when_disabled() {
        let cache = GeoCache::new(Config::default().with_index_envelopes(false)).unwrap();
        let parser = TableParser::new();
        cache.geometry(&Node { seq: 1 }, &parser).unwrap();
        assert!(cache.envelope_cache().is_empty());
    }

    #[test]
    fn test_resolve() {
        let cache = session();
        let found = cache
            .resolve(&NodeIdentity::element("test", 2), &Resolver)
            .unwrap();
        assert_eq!(found.seq, 2);

        let missing = NodeIdentity::new("test", 99, NodeKind::Other);
        match cache.resolve(&missing, &Resolver) {
            Err(GeoCacheError::NotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected NotFound, got {:?}", other.map(|n| n.seq)),
        }
    }

    #[test]
    fn test_index_and_search_default() {
        let cache = session();
        let parser = TableParser::new();
        for seq in 1..=3 {
            assert!(cache.stage_node(None, &Node { seq }, &parser).unwrap());
        }
        // Empty geometry has no envelope to index.
        assert!(!cache.stage_node(None, &Node { seq: 4 }, &parser).unwrap());
        assert_eq!(cache.build_index(None), 3);

        let mut hits: Vec<_> = cache
            .search(None, &Envelope::new(4.5, 4.5, 6.0, 6.0))
            .into_iter()
            .map(|id| id.sequence)
            .collect();
        hits.sort();
        assert_eq!(hits, vec![2]);
        assert!(cache.indexes().has_index("default"));
    }

    #[test]
    fn test_index_node_named() {
        let cache = session();
        let parser = TableParser::new();
        cache.index_node(Some("points"), &Node { seq: 1 }, &parser).unwrap();
        assert_eq!(cache.indexes().index_size("points"), 1);
        assert!(!cache.indexes().has_index("default"));
    }

    #[test]
    fn test_reset_geometry_cache() {
        let cache = session();
        let parser = TableParser::new();
        cache.geometry(&Node { seq: 1 }, &parser).unwrap();
        cache.reset_geometry_cache(10).unwrap();
        assert!(cache.geometry_cache().is_empty());
        assert_eq!(cache.geometry_cache().capacity(), Some(10));
        assert!(cache.reset_geometry_cache(0).is_err());
        #[cfg(target_pointer_width = "64")]
        assert!(cache.reset_geometry_cache(MAX_CACHE_CAPACITY + 1).is_err());
        assert_eq!(cache.geometry_cache().capacity(), Some(10));
    }

    #[cfg(feature = "snapshot")]
    #[test]
    fn test_failed_restore_keeps_state() {
        let cache = session();
        let parser = TableParser::new();
        cache.index_node(None, &Node { seq: 1 }, &parser).unwrap();

        let mut image = cache.save().unwrap().to_vec();
        image[0] = 0xFF;
        assert!(matches!(
            cache.restore(&image),
            Err(GeoCacheError::VersionMismatch { .. })
        ));
        assert_eq!(cache.indexes().index_size("default"), 1);
        assert_eq!(cache.geometry_cache().size(), 1);
    }

    #[cfg(feature = "snapshot")]
    #[test]
    fn test_checkpoint_without_file() {
        assert!(!session().checkpoint().unwrap());
    }
}
