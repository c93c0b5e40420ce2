pub mod rtree;
pub use rtree::{BuildState, IndexedShape, SpatialIndex};
