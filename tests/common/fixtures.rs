//! In-process pack and index fixtures
//!
//! Tests build real pack files instead of checking in binary blobs: each
//! entry is deflated with `flate2`, offsets are tracked as the image
//! grows, and the trailer is a genuine SHA-1 so the fixtures stay
//! byte-compatible with the formats under test.

use casket::{ObjectId, ObjectType};
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::Path;

const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// Compute the id of a canonical `(type, payload)` pair.
pub fn object_id_of(kind: ObjectType, data: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {}\0", kind.as_str(), data.len()).as_bytes());
    hasher.update(data);
    ObjectId::new(hasher.finalize().into())
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(1));
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Variable-length `(type, length)` entry header.
fn entry_header(type_code: u8, length: u64) -> Vec<u8> {
    let mut header = Vec::new();
    let mut size = length;
    let mut current = ((type_code & 0x07) << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        header.push(current | 0x80);
        current = (size & 0x7f) as u8;
        size >>= 7;
    }
    header.push(current);
    header
}

/// Ofs-delta base distance, most significant group first with the
/// `(value + 1)` continuation bias.
fn ofs_distance(mut distance: u64) -> Vec<u8> {
    let mut out = vec![(distance & 0x7f) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        out.push(0x80 | (distance & 0x7f) as u8);
        distance >>= 7;
    }
    out.reverse();
    out
}

/// Builds a pack image entry by entry, tracking offsets and index ids.
pub struct PackBuilder {
    bytes: Vec<u8>,
    offsets: Vec<u64>,
    ids: Vec<ObjectId>,
}

impl PackBuilder {
    pub fn new() -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"PACK");
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&0u32.to_be_bytes()); // patched in build()
        PackBuilder {
            bytes,
            offsets: Vec::new(),
            ids: Vec::new(),
        }
    }

    /// Append a non-delta entry; returns its builder position.
    pub fn plain(&mut self, kind: ObjectType, data: &[u8]) -> usize {
        self.offsets.push(self.bytes.len() as u64);
        self.ids.push(object_id_of(kind, data));
        self.bytes
            .extend_from_slice(&entry_header(kind.code(), data.len() as u64));
        self.bytes.extend_from_slice(&deflate(data));
        self.offsets.len() - 1
    }

    /// Append an ofs-delta against an earlier entry.
    ///
    /// The index needs the id of the *resolved* object, which the caller
    /// knows because it authored the delta.
    pub fn ofs_delta(&mut self, base: usize, delta: &[u8], resolved_id: ObjectId) -> usize {
        let offset = self.bytes.len() as u64;
        self.offsets.push(offset);
        self.ids.push(resolved_id);
        self.bytes
            .extend_from_slice(&entry_header(6, delta.len() as u64));
        self.bytes
            .extend_from_slice(&ofs_distance(offset - self.offsets[base]));
        self.bytes.extend_from_slice(&deflate(delta));
        self.offsets.len() - 1
    }

    /// Append a ref-delta against an object named by id.
    pub fn ref_delta(&mut self, base: &ObjectId, delta: &[u8], resolved_id: ObjectId) -> usize {
        self.offsets.push(self.bytes.len() as u64);
        self.ids.push(resolved_id);
        self.bytes
            .extend_from_slice(&entry_header(7, delta.len() as u64));
        self.bytes.extend_from_slice(base.as_raw_bytes());
        self.bytes.extend_from_slice(&deflate(delta));
        self.offsets.len() - 1
    }

    pub fn id_at(&self, position: usize) -> ObjectId {
        self.ids[position]
    }

    pub fn build(mut self) -> BuiltPack {
        let count = self.offsets.len() as u32;
        self.bytes[8..12].copy_from_slice(&count.to_be_bytes());

        let mut hasher = Sha1::new();
        hasher.update(&self.bytes);
        let trailer: [u8; 20] = hasher.finalize().into();
        self.bytes.extend_from_slice(&trailer);

        BuiltPack {
            pack: self.bytes,
            offsets: self.offsets,
            ids: self.ids,
        }
    }
}

/// A finished pack image plus the entry table the indexes are built from.
pub struct BuiltPack {
    pub pack: Vec<u8>,
    pub offsets: Vec<u64>,
    pub ids: Vec<ObjectId>,
}

impl BuiltPack {
    fn sorted_entries(&self) -> Vec<(ObjectId, u64)> {
        let mut entries: Vec<(ObjectId, u64)> = self
            .ids
            .iter()
            .copied()
            .zip(self.offsets.iter().copied())
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn fanout(entries: &[(ObjectId, u64)]) -> Vec<u8> {
        let mut counts = [0u32; 256];
        for (oid, _) in entries {
            counts[oid.first_byte() as usize] += 1;
        }
        let mut fanout = Vec::with_capacity(1024);
        let mut running = 0u32;
        for count in counts {
            running += count;
            fanout.extend_from_slice(&running.to_be_bytes());
        }
        fanout
    }

    /// Render a version 1 index for this pack.
    pub fn index_v1(&self) -> Vec<u8> {
        let entries = self.sorted_entries();
        let mut image = Self::fanout(&entries);
        for (oid, offset) in &entries {
            image.extend_from_slice(&(*offset as u32).to_be_bytes());
            image.extend_from_slice(oid.as_raw_bytes());
        }
        Self::finish_index(&self.pack, image)
    }

    /// Render a version 2 index for this pack.
    pub fn index_v2(&self) -> Vec<u8> {
        let entries = self.sorted_entries();
        let mut image = vec![0xff, b't', b'O', b'c'];
        image.extend_from_slice(&2u32.to_be_bytes());
        image.extend_from_slice(&Self::fanout(&entries));
        for (oid, _) in &entries {
            image.extend_from_slice(oid.as_raw_bytes());
        }
        for _ in &entries {
            image.extend_from_slice(&[0u8; 4]); // CRC contents are not read
        }
        let mut large = Vec::new();
        for (_, offset) in &entries {
            if *offset >= u64::from(LARGE_OFFSET_FLAG) {
                let redirect = (large.len() / 8) as u32;
                image.extend_from_slice(&(LARGE_OFFSET_FLAG | redirect).to_be_bytes());
                large.extend_from_slice(&offset.to_be_bytes());
            } else {
                image.extend_from_slice(&(*offset as u32).to_be_bytes());
            }
        }
        image.extend_from_slice(&large);
        Self::finish_index(&self.pack, image)
    }

    /// Append the packfile hash and the index's own hash.
    fn finish_index(pack: &[u8], mut image: Vec<u8>) -> Vec<u8> {
        let pack_hash = &pack[pack.len() - 20..];
        image.extend_from_slice(pack_hash);
        let mut hasher = Sha1::new();
        hasher.update(&image);
        let own_hash: [u8; 20] = hasher.finalize().into();
        image.extend_from_slice(&own_hash);
        image
    }

    /// Write the pack and chosen index into `objects/pack/` under `name`.
    pub fn install(&self, objects_dir: &Path, name: &str, v2_index: bool) {
        let pack_dir = objects_dir.join("pack");
        std::fs::create_dir_all(&pack_dir).unwrap();
        std::fs::write(pack_dir.join(format!("{name}.pack")), &self.pack).unwrap();
        let index = if v2_index {
            self.index_v2()
        } else {
            self.index_v1()
        };
        std::fs::write(pack_dir.join(format!("{name}.idx")), index).unwrap();
    }
}

/// Encode a delta that replays `base` and appends `suffix`.
pub fn append_delta(base: &[u8], suffix: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert!(!base.is_empty(), "fixture deltas copy a non-empty base");
    assert!(base.len() <= 0xffff, "fixture deltas copy with two bytes");
    assert!(suffix.len() <= 0x7f, "fixture deltas insert one literal run");

    let result: Vec<u8> = base.iter().chain(suffix.iter()).copied().collect();
    let mut delta = size_varint(base.len() as u64);
    delta.extend_from_slice(&size_varint(result.len() as u64));
    // copy the whole base: offset 0, explicit two-byte size
    delta.push(0xb0);
    delta.push((base.len() & 0xff) as u8);
    delta.push((base.len() >> 8) as u8);
    // insert the suffix
    delta.push(suffix.len() as u8);
    delta.extend_from_slice(suffix);
    (delta, result)
}

/// Delta size header varint, low seven bits first.
fn size_varint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}
