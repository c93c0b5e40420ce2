//! Boundary to the document store and the geometry parser.
//!
//! The cache never holds on to live store handles. Callers hand in anything
//! that implements [`DocumentNode`]; the cache captures a [`NodeIdentity`]
//! from it and uses that identity as the only key it stores or compares.

use crate::error::ParseError;
use geo::Geometry;
use geocache_types::identity::{NodeIdentity, NodeKind};

/// A node of the backing document store, as seen at call time.
pub trait DocumentNode {
    /// Name of the store the node belongs to.
    fn store_name(&self) -> &str;

    /// Position-derived node identifier within the store.
    fn sequence(&self) -> u64;

    fn kind(&self) -> NodeKind {
        NodeKind::Element
    }

    /// Capture a stable identity for this node.
    fn identity(&self) -> NodeIdentity {
        NodeIdentity::new(self.store_name(), self.sequence(), self.kind())
    }
}

impl<T: DocumentNode + ?Sized> DocumentNode for &T {
    fn store_name(&self) -> &str {
        (**self).store_name()
    }

    fn sequence(&self) -> u64 {
        (**self).sequence()
    }

    fn kind(&self) -> NodeKind {
        (**self).kind()
    }
}

/// Turns a node (typically a GML element) into a geometry.
pub trait GeometryParser {
    type Node: DocumentNode;

    fn parse(&self, node: &Self::Node) -> Result<Geometry<f64>, ParseError>;
}

/// Maps identities back to live nodes of the currently attached store.
///
/// Returns `None` when the identity no longer denotes an existing node.
pub trait NodeResolver {
    type Node;

    fn resolve(&self, id: &NodeIdentity) -> Option<Self::Node>;
}
