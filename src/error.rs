//! Error types for geocache.
//!
//! Cache misses and searches against missing or empty indexes are not errors;
//! they return `None` or an empty result. Only configuration problems,
//! resolver misses, parser failures and snapshot problems surface here.

use geocache_types::identity::NodeIdentity;
use thiserror::Error;

/// Failure reported by a geometry parser.
///
/// Parsers produce this; the cache only forwards it to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by caches, indexes and snapshots.
#[derive(Error, Debug)]
pub enum GeoCacheError {
    /// Rejected configuration, e.g. a zero cache capacity.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The identity no longer maps to a node in the attached store.
    #[error("Node not found: {0}")]
    NotFound(NodeIdentity),

    /// Propagated from the geometry parser.
    #[error("Geometry parse error: {0}")]
    Parse(#[from] ParseError),

    /// Snapshot was written by an unknown format version.
    #[error("Snapshot version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },

    /// Snapshot bytes are structurally invalid.
    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),

    /// Snapshot ended before a complete record was read.
    #[error("Unexpected end of snapshot data")]
    UnexpectedEof,

    /// Geometry (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "snapshot")]
impl From<bincode::Error> for GeoCacheError {
    fn from(err: bincode::Error) -> Self {
        GeoCacheError::Serialization(err.to_string())
    }
}

/// Result type for geocache operations.
pub type Result<T> = std::result::Result<T, GeoCacheError>;
