use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Kind of document-store node an identity was captured from.
///
/// The kind is informational only and does not take part in identity
/// equality or hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeKind {
    #[default]
    Element,
    Attribute,
    Other,
}

impl NodeKind {
    /// Stable single-byte tag used by binary encodings.
    pub fn as_u8(self) -> u8 {
        match self {
            NodeKind::Element => 0,
            NodeKind::Attribute => 1,
            NodeKind::Other => 2,
        }
    }

    /// Inverse of [`NodeKind::as_u8`]. Returns `None` for unknown tags.
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NodeKind::Element),
            1 => Some(NodeKind::Attribute),
            2 => Some(NodeKind::Other),
            _ => None,
        }
    }
}

/// Stable surrogate key for a node in a document store.
///
/// An identity is a plain value: it records the name of the store the node
/// lives in and the node's sequence number at the time it was captured. Two
/// identities are equal iff their `(store_name, sequence)` pairs are equal.
///
/// Identities carry no guarantee that they still denote the same node after
/// the backing store has been mutated. Resolving an identity back to a live
/// node is the job of a resolver, which reports a miss when the node is gone.
///
/// # Examples
///
/// ```
/// use geocache_types::identity::{NodeIdentity, NodeKind};
///
/// let a = NodeIdentity::new("docs", 7, NodeKind::Element);
/// let b = NodeIdentity::new("docs", 7, NodeKind::Attribute);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Name of the store (database) the node belongs to
    pub store_name: String,
    /// Position-derived node identifier within the store
    pub sequence: u64,
    /// Node kind at capture time
    pub kind: NodeKind,
}

impl NodeIdentity {
    pub fn new(store_name: impl Into<String>, sequence: u64, kind: NodeKind) -> Self {
        Self {
            store_name: store_name.into(),
            sequence,
            kind,
        }
    }

    /// Shorthand for an element identity.
    pub fn element(store_name: impl Into<String>, sequence: u64) -> Self {
        Self::new(store_name, sequence, NodeKind::Element)
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }
}

impl PartialEq for NodeIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence && self.store_name == other.store_name
    }
}

impl Eq for NodeIdentity {}

impl Hash for NodeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.store_name.hash(state);
        self.sequence.hash(state);
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.store_name, self.sequence)
    }
}
