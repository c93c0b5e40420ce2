//! Snapshot-based persistence for geocache.
//!
//! A snapshot is a point-in-time binary image of the geometry cache, the
//! envelope cache and every spatial index. Images start with a `u32` format
//! version; all integers and floats are little-endian and strings are a `u32`
//! byte length followed by UTF-8 bytes.
//!
//! ```text
//! version: u32
//! geometry cache: capacity u32, count u32, [identity, len u32, bincode geometry]*
//! envelope cache: capacity u32 (0 = unbounded), count u32, [identity, envelope]*
//! indexes:        count u32,
//!                 [name, state u8, count u32, [identity, envelope]*,
//!                  staged u32, [identity, envelope]*]*
//! identity:       store name, sequence u64, kind u8
//! envelope:       min_x, min_y, max_x, max_y as f64
//! ```
//!
//! Cache entries are written from least to most recently used so a restore
//! reproduces recency order. Decoding validates the whole image before
//! anything is handed back, so a failed restore never applies partial state.

use crate::compute::spatial::rtree::{BuildState, IndexedShape};
use crate::error::{GeoCacheError, Result};
use crate::index::IndexImage;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use geo::Geometry;
use geocache_types::bbox::{Envelope, Shape};
use geocache_types::identity::{NodeIdentity, NodeKind};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Decoded content of a snapshot image.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub geometry_capacity: usize,
    /// Geometry cache entries, least recently used first
    pub geometries: Vec<(NodeIdentity, Arc<Geometry<f64>>)>,
    /// `None` for an unbounded envelope cache
    pub envelope_capacity: Option<usize>,
    /// Envelope cache entries, least recently used first
    pub envelopes: Vec<(NodeIdentity, Envelope)>,
    pub indexes: Vec<IndexImage>,
}

impl CacheSnapshot {
    /// Serialize into a versioned binary image.
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(4096);
        buf.put_u32_le(SNAPSHOT_VERSION);

        put_len(&mut buf, self.geometry_capacity)?;
        put_len(&mut buf, self.geometries.len())?;
        for (id, geometry) in &self.geometries {
            put_identity(&mut buf, id)?;
            let encoded = bincode::serialize(geometry.as_ref())?;
            put_len(&mut buf, encoded.len())?;
            buf.put_slice(&encoded);
        }

        put_len(&mut buf, self.envelope_capacity.unwrap_or(0))?;
        put_len(&mut buf, self.envelopes.len())?;
        for (id, envelope) in &self.envelopes {
            put_identity(&mut buf, id)?;
            put_envelope(&mut buf, envelope);
        }

        put_len(&mut buf, self.indexes.len())?;
        for image in &self.indexes {
            put_str(&mut buf, &image.name)?;
            buf.put_u8(image.state.as_u8());
            put_entries(&mut buf, &image.entries)?;
            put_entries(&mut buf, &image.staged)?;
        }

        Ok(buf.freeze())
    }

    /// Parse a binary image produced by [`CacheSnapshot::encode`].
    ///
    /// Fails with `VersionMismatch` for images of another format version and
    /// with `InvalidFormat`/`UnexpectedEof` for malformed data.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);

        let version = reader.u32()?;
        if version != SNAPSHOT_VERSION {
            return Err(GeoCacheError::VersionMismatch {
                found: version,
                expected: SNAPSHOT_VERSION,
            });
        }

        let geometry_capacity = reader.len()?;
        if geometry_capacity == 0 {
            return Err(GeoCacheError::InvalidFormat(
                "geometry cache capacity is zero".into(),
            ));
        }
        let count = reader.len()?;
        let mut geometries = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let id = reader.identity()?;
            let len = reader.len()?;
            let geometry: Geometry<f64> = bincode::deserialize(reader.bytes(len)?)?;
            geometries.push((id, Arc::new(geometry)));
        }

        let envelope_capacity = match reader.len()? {
            0 => None,
            capacity => Some(capacity),
        };
        let count = reader.len()?;
        let mut envelopes = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let id = reader.identity()?;
            envelopes.push((id, reader.envelope()?));
        }

        let count = reader.len()?;
        let mut indexes = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let name = reader.string()?;
            let tag = reader.u8()?;
            let state = BuildState::from_u8(tag).ok_or_else(|| {
                GeoCacheError::InvalidFormat(format!("unknown index state {}", tag))
            })?;
            let entries = reader.entries()?;
            let staged = reader.entries()?;
            indexes.push(IndexImage {
                name,
                state,
                entries,
                staged,
            });
        }

        if reader.remaining() != 0 {
            return Err(GeoCacheError::InvalidFormat(format!(
                "{} trailing bytes after snapshot",
                reader.remaining()
            )));
        }

        Ok(Self {
            geometry_capacity,
            geometries,
            envelope_capacity,
            envelopes,
            indexes,
        })
    }
}

fn put_len(buf: &mut BytesMut, value: usize) -> Result<()> {
    let value = u32::try_from(value).map_err(|_| {
        GeoCacheError::InvalidFormat(format!("{} does not fit in a u32 field", value))
    })?;
    buf.put_u32_le(value);
    Ok(())
}

fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    put_len(buf, value.len())?;
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn put_identity(buf: &mut BytesMut, id: &NodeIdentity) -> Result<()> {
    put_str(buf, &id.store_name)?;
    buf.put_u64_le(id.sequence);
    buf.put_u8(id.kind.as_u8());
    Ok(())
}

fn put_envelope(buf: &mut BytesMut, envelope: &Envelope) {
    buf.put_f64_le(envelope.min_x());
    buf.put_f64_le(envelope.min_y());
    buf.put_f64_le(envelope.max_x());
    buf.put_f64_le(envelope.max_y());
}

fn put_entries(buf: &mut BytesMut, entries: &[IndexedShape]) -> Result<()> {
    put_len(buf, entries.len())?;
    for entry in entries {
        put_identity(buf, &entry.id)?;
        put_envelope(buf, &entry.shape.envelope());
    }
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(GeoCacheError::UnexpectedEof);
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    fn u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    fn f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let buf: &'a [u8] = self.buf;
        let (head, tail) = buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.len()?;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|e| GeoCacheError::InvalidFormat(format!("invalid UTF-8 string: {}", e)))
    }

    fn identity(&mut self) -> Result<NodeIdentity> {
        let store_name = self.string()?;
        let sequence = self.u64()?;
        let tag = self.u8()?;
        let kind = NodeKind::from_u8(tag)
            .ok_or_else(|| GeoCacheError::InvalidFormat(format!("unknown node kind {}", tag)))?;
        Ok(NodeIdentity::new(store_name, sequence, kind))
    }

    fn envelope(&mut self) -> Result<Envelope> {
        let min_x = self.f64()?;
        let min_y = self.f64()?;
        let max_x = self.f64()?;
        let max_y = self.f64()?;
        Ok(Envelope::new(min_x, min_y, max_x, max_y))
    }

    fn entries(&mut self) -> Result<Vec<IndexedShape>> {
        let count = self.len()?;
        let mut entries = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            let id = self.identity()?;
            let shape = Shape::from_envelope(&self.envelope()?);
            entries.push(IndexedShape::new(id, shape));
        }
        Ok(entries)
    }
}

/// On-disk location of a snapshot image.
///
/// Saves go to a `.tmp` sibling that is synced and renamed over the target,
/// so readers only ever see a complete image.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the stored image. A missing or empty file yields `None`.
    pub fn load(&self) -> Result<Option<Vec<u8>>> {
        if !self.exists() {
            return Ok(None);
        }

        let mut file = File::open(&self.path)?;
        let mut image = Vec::new();
        file.read_to_end(&mut image)?;
        if image.is_empty() {
            return Ok(None);
        }
        Ok(Some(image))
    }

    /// Atomically replace the stored image.
    pub fn save(&self, image: &[u8]) -> Result<()> {
        let temp_path = self.temp_path();

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)?;

        let mut writer = BufWriter::new(file);
        writer.write_all(image)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&temp_path, &self.path)?;
        self.sync_parent_dir()?;

        log::debug!(
            "wrote snapshot of {} bytes to {}",
            image.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        if let Some(name) = temp.file_name() {
            let mut new_name = name.to_string_lossy().into_owned();
            new_name.push_str(".tmp");
            temp.set_file_name(new_name);
        }
        temp
    }

    fn sync_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            let dir = File::open(parent)?;
            dir.sync_all()?;
        }
        Ok(())
    }
}
