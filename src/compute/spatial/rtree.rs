//! Named R*-tree index over node identities.
//!
//! A `SpatialIndex` maps `NodeIdentity` values to bounding shapes and supports
//! two ways of getting entries into a queryable tree:
//!
//! - **Incremental**: [`SpatialIndex::insert`] adds one entry to the installed
//!   tree. The index becomes `Live` on the first insert.
//! - **Bulk**: [`SpatialIndex::prepare`] stages entries and moves the index to
//!   `Staging`; [`SpatialIndex::build`] packs every staged entry into a fresh
//!   tree with `RTree::bulk_load` and installs it, replacing the previous tree.
//!
//! The installed tree sits behind an `Arc`. Searches clone the `Arc` under a
//! short read lock and walk the tree without holding it, so a concurrent
//! insert or build never exposes a half-updated tree. Inserts take the write
//! lock for their whole read-modify-replace step and use `Arc::make_mut`, which
//! mutates in place when no search holds the old tree and copies otherwise.
//!
//! Query rectangles are matched against entry envelopes with inclusive edges:
//! a point on the border of the query rectangle is a hit.

use geocache_types::bbox::{Envelope, Shape};
use geocache_types::identity::NodeIdentity;
use parking_lot::{Mutex, RwLock};
use rstar::{AABB, RTree, RTreeObject};
use std::sync::Arc;

/// Build state of a named index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildState {
    /// No tree has been installed and nothing is staged.
    #[default]
    Empty,
    /// The installed tree is queryable and nothing is pending.
    Live,
    /// Entries are staged for a pending bulk build.
    Staging,
}

impl BuildState {
    pub fn as_u8(self) -> u8 {
        match self {
            BuildState::Empty => 0,
            BuildState::Live => 1,
            BuildState::Staging => 2,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(BuildState::Empty),
            1 => Some(BuildState::Live),
            2 => Some(BuildState::Staging),
            _ => None,
        }
    }
}

/// Index entry: an identity and the shape used for bounding-box tests.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedShape {
    pub id: NodeIdentity,
    pub shape: Shape,
}

impl IndexedShape {
    /// Zero-area rectangles are stored as points, the same form a snapshot
    /// restores them in.
    pub fn new(id: NodeIdentity, shape: Shape) -> Self {
        Self {
            id,
            shape: Shape::from_envelope(&shape.envelope()),
        }
    }
}

impl RTreeObject for IndexedShape {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        match self.shape {
            Shape::Point(p) => AABB::from_point([p.x(), p.y()]),
            Shape::Rect(r) => AABB::from_corners([r.min().x, r.min().y], [r.max().x, r.max().y]),
        }
    }
}

pub(crate) fn query_aabb(query: &Envelope) -> Option<AABB<[f64; 2]>> {
    if !query.is_finite() {
        log::warn!("Rejecting bounding box query with non-finite coordinates");
        return None;
    }
    Some(AABB::from_corners(
        [query.min_x(), query.min_y()],
        [query.max_x(), query.max_y()],
    ))
}

pub(crate) fn is_finite_shape(shape: &Shape) -> bool {
    shape.envelope().is_finite()
}

struct InstalledTree {
    tree: Arc<RTree<IndexedShape>>,
    state: BuildState,
}

/// One named spatial index with an explicit build state.
///
/// Lock order is `staged` before `installed`; `insert` and `search` only ever
/// take `installed`.
pub struct SpatialIndex {
    name: String,
    installed: RwLock<InstalledTree>,
    staged: Mutex<Vec<IndexedShape>>,
}

impl SpatialIndex {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installed: RwLock::new(InstalledTree {
                tree: Arc::new(RTree::new()),
                state: BuildState::Empty,
            }),
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Rebuild an index from previously exported parts.
    pub fn from_parts(
        name: impl Into<String>,
        state: BuildState,
        entries: Vec<IndexedShape>,
        staged: Vec<IndexedShape>,
    ) -> Self {
        Self {
            name: name.into(),
            installed: RwLock::new(InstalledTree {
                tree: Arc::new(RTree::bulk_load(entries)),
                state,
            }),
            staged: Mutex::new(staged),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BuildState {
        self.installed.read().state
    }

    /// Number of entries in the installed (queryable) tree.
    pub fn len(&self) -> usize {
        self.installed.read().tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries waiting for the next [`SpatialIndex::build`].
    pub fn staged_len(&self) -> usize {
        self.staged.lock().len()
    }

    /// Add one entry to the installed tree.
    ///
    /// Returns `false` and leaves the index untouched when the shape has
    /// non-finite coordinates.
    pub fn insert(&self, id: NodeIdentity, shape: Shape) -> bool {
        if !is_finite_shape(&shape) {
            log::warn!("Rejecting non-finite shape for {} in index '{}'", id, self.name);
            return false;
        }

        let mut installed = self.installed.write();
        Arc::make_mut(&mut installed.tree).insert(IndexedShape::new(id, shape));
        if installed.state == BuildState::Empty {
            installed.state = BuildState::Live;
        }
        true
    }

    /// Stage one entry for the next bulk build.
    ///
    /// Staged entries are not visible to searches until [`SpatialIndex::build`]
    /// runs; the previously installed tree stays queryable meanwhile.
    pub fn prepare(&self, id: NodeIdentity, shape: Shape) -> bool {
        if !is_finite_shape(&shape) {
            log::warn!("Rejecting non-finite shape for {} in index '{}'", id, self.name);
            return false;
        }

        let mut staged = self.staged.lock();
        staged.push(IndexedShape::new(id, shape));
        if self.installed.read().state != BuildState::Staging {
            self.installed.write().state = BuildState::Staging;
        }
        true
    }

    /// Pack all staged entries into a new tree and install it.
    ///
    /// The previous tree is discarded, including entries added by `insert`.
    /// Building with nothing staged installs an empty tree. Returns the size
    /// of the new tree.
    pub fn build(&self) -> usize {
        let mut staged = self.staged.lock();
        let entries = std::mem::take(&mut *staged);
        let count = entries.len();
        let tree = RTree::bulk_load(entries);

        let mut installed = self.installed.write();
        installed.tree = Arc::new(tree);
        installed.state = BuildState::Live;
        drop(installed);
        drop(staged);

        log::debug!("bulk-built index '{}' with {} entries", self.name, count);
        count
    }

    /// Remove every entry for `id` from the installed tree. Returns how many
    /// entries were removed.
    pub fn remove(&self, id: &NodeIdentity) -> usize {
        let mut installed = self.installed.write();
        let to_remove: Vec<_> = installed
            .tree
            .iter()
            .filter(|entry| &entry.id == id)
            .cloned()
            .collect();
        if to_remove.is_empty() {
            return 0;
        }

        let tree = Arc::make_mut(&mut installed.tree);
        to_remove
            .iter()
            .filter(|entry| tree.remove(entry).is_some())
            .count()
    }

    /// Identities of every entry whose bounding box intersects `query`.
    pub fn search(&self, query: &Envelope) -> Vec<NodeIdentity> {
        let Some(aabb) = query_aabb(query) else {
            return Vec::new();
        };

        let tree = self.tree();
        tree.locate_in_envelope_intersecting(&aabb)
            .map(|entry| entry.id.clone())
            .collect()
    }

    /// Identities of every entry in the installed tree.
    pub fn search_all(&self) -> Vec<NodeIdentity> {
        self.tree().iter().map(|entry| entry.id.clone()).collect()
    }

    /// Copy of the installed entries.
    pub fn entries(&self) -> Vec<IndexedShape> {
        self.tree().iter().cloned().collect()
    }

    /// Copy of the staged entries, in staging order.
    pub fn staged_entries(&self) -> Vec<IndexedShape> {
        self.staged.lock().clone()
    }

    fn tree(&self) -> Arc<RTree<IndexedShape>> {
        Arc::clone(&self.installed.read().tree)
    }
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("len", &self.len())
            .field("staged", &self.staged_len())
            .finish()
    }
}
