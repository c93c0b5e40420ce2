#![allow(dead_code)]

use geocache::prelude::*;
use geo::{LineString, Point, Polygon};
use std::collections::HashMap;

/// Node handle of the in-memory test store.
#[derive(Debug, Clone)]
pub struct StoredNode {
    pub store: String,
    pub seq: u64,
}

impl DocumentNode for StoredNode {
    fn store_name(&self) -> &str {
        &self.store
    }

    fn sequence(&self) -> u64 {
        self.seq
    }
}

/// Minimal document store: sequence number -> geometry. Acts as parser and
/// resolver at once.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub name: String,
    pub geometries: HashMap<u64, Geometry<f64>>,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            geometries: HashMap::new(),
        }
    }

    pub fn add(&mut self, seq: u64, geometry: Geometry<f64>) -> StoredNode {
        self.geometries.insert(seq, geometry);
        self.node(seq)
    }

    pub fn add_point(&mut self, seq: u64, x: f64, y: f64) -> StoredNode {
        self.add(seq, Geometry::Point(Point::new(x, y)))
    }

    pub fn add_box(&mut self, seq: u64, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> StoredNode {
        let ring = LineString::from(vec![
            (min_x, min_y),
            (max_x, min_y),
            (max_x, max_y),
            (min_x, max_y),
            (min_x, min_y),
        ]);
        self.add(seq, Geometry::Polygon(Polygon::new(ring, vec![])))
    }

    pub fn node(&self, seq: u64) -> StoredNode {
        StoredNode {
            store: self.name.clone(),
            seq,
        }
    }
}

impl GeometryParser for MemoryStore {
    type Node = StoredNode;

    fn parse(&self, node: &StoredNode) -> std::result::Result<Geometry<f64>, ParseError> {
        self.geometries
            .get(&node.seq)
            .cloned()
            .ok_or_else(|| ParseError::new(format!("node {} holds no geometry", node.seq)))
    }
}

impl NodeResolver for MemoryStore {
    type Node = StoredNode;

    fn resolve(&self, id: &NodeIdentity) -> Option<StoredNode> {
        if id.store_name != self.name || !self.geometries.contains_key(&id.sequence) {
            return None;
        }
        Some(self.node(id.sequence))
    }
}

pub fn sorted(ids: Vec<NodeIdentity>) -> Vec<u64> {
    let mut seqs: Vec<_> = ids.into_iter().map(|id| id.sequence).collect();
    seqs.sort_unstable();
    seqs
}
