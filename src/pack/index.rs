//! Pack index: maps an object id to its offset inside a pack
//!
//! Indexes are strictly redundant (everything in them can be rebuilt from
//! the pack itself) but make random access cheap: a 256-entry fanout table
//! keyed by the first id byte narrows a binary search over the sorted id
//! table.
//!
//! ## Formats
//!
//! - *V1*: 256 cumulative fanout words, then `N` records of
//!   `(u32 offset, 20-byte id)` sorted by id, then two trailer hashes.
//! - *V2*: magic `\xfftOc`, u32 version, 256 fanout words, then three
//!   parallel tables (ids, CRC32s, u32 offsets), a side table of u64
//!   offsets for entries past 2^31-1 (offset MSB set redirects into it),
//!   then two trailer hashes.
//!
//! The whole file is held in memory; lookups allocate nothing.

use crate::codec;
use crate::errors::StoreError;
use crate::objects::object_id::{MutableObjectId, ObjectId};
use crate::objects::OBJECT_ID_RAW_LENGTH;
use anyhow::Context;
use bytes::Bytes;
use std::cmp::Ordering;
use std::path::Path;

const TOC_MAGIC: [u8; 4] = [0xff, b't', b'O', b'c'];
const FANOUT_LENGTH: usize = 256 * 4;
const TRAILER_LENGTH: usize = 40;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

/// One `(id, offset)` pair of a pack index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub oid: ObjectId,
    pub offset: u64,
}

/// An open pack index of either supported format.
#[derive(Debug)]
pub enum PackIndex {
    V1(PackIndexV1),
    V2(PackIndexV2),
}

impl PackIndex {
    /// Open an existing `.idx` file, detecting its format.
    ///
    /// The first eight bytes either carry the version TOC, or they are the
    /// first two fanout words of a version 1 index.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Unreadable pack index {}", path.display()))?;
        Self::parse(Bytes::from(data))
            .with_context(|| format!("Unreadable pack index {}", path.display()))
    }

    /// Parse an index image held in memory.
    pub fn parse(data: Bytes) -> anyhow::Result<Self> {
        if data.len() >= 8 && data[..4] == TOC_MAGIC {
            let version = codec::decode_u32(&data[4..]);
            match version {
                2 => Ok(PackIndex::V2(PackIndexV2::parse(data)?)),
                other => Err(StoreError::UnsupportedVersion(other).into()),
            }
        } else {
            Ok(PackIndex::V1(PackIndexV1::parse(data)?))
        }
    }

    /// Number of objects listed, `fanout[255]`.
    pub fn object_count(&self) -> u64 {
        u64::from(self.table().count())
    }

    /// Locate the pack offset of `id`.
    ///
    /// # Returns
    ///
    /// `None` when the id is not listed in this index. No heap allocation
    /// happens per call.
    pub fn find_offset(&self, id: &ObjectId) -> Option<u64> {
        let table = self.table();
        table.find_position(id).map(|position| match self {
            PackIndex::V1(index) => index.offset_at(position),
            PackIndex::V2(index) => index.offset_at(position),
        })
    }

    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.find_offset(id).is_some()
    }

    /// Iterate entries in strictly ascending id order.
    ///
    /// Each step yields a small copied [`IndexEntry`]; the cursor refills
    /// one internal [`MutableObjectId`] scratch instead of allocating.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            index: self,
            position: 0,
            scratch: MutableObjectId::new(),
        }
    }

    fn table(&self) -> &dyn IdTable {
        match self {
            PackIndex::V1(index) => index,
            PackIndex::V2(index) => index,
        }
    }
}

/// Shared fanout-then-binary-search lookup over a sorted id table.
trait IdTable {
    fn count(&self) -> u32;
    fn fanout_at(&self, bucket: usize) -> u32;
    fn oid_at(&self, position: u32) -> &[u8];

    fn bucket_range(&self, first_byte: u8) -> (u32, u32) {
        let hi = self.fanout_at(first_byte as usize);
        let lo = if first_byte == 0 {
            0
        } else {
            self.fanout_at(first_byte as usize - 1)
        };
        (lo, hi)
    }

    fn find_position(&self, id: &ObjectId) -> Option<u32> {
        let (mut lo, mut hi) = self.bucket_range(id.first_byte());
        let key: &[u8] = id.as_raw_bytes();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match key.cmp(self.oid_at(mid)) {
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => return Some(mid),
            }
        }
        None
    }
}

/// Validate a fanout table and return its final cumulative count.
fn validate_fanout(fanout: &[u8]) -> anyhow::Result<u32> {
    let mut previous = 0u32;
    for bucket in 0..256 {
        let value = codec::decode_u32(&fanout[bucket * 4..]);
        if value < previous {
            return Err(anyhow::anyhow!("Pack index fanout is not monotonic"));
        }
        previous = value;
    }
    Ok(previous)
}

/// Version 1 index: interleaved `(offset, id)` records.
#[derive(Debug)]
pub struct PackIndexV1 {
    data: Bytes,
    count: u32,
}

impl PackIndexV1 {
    const RECORD_LENGTH: usize = 4 + OBJECT_ID_RAW_LENGTH;

    fn parse(data: Bytes) -> anyhow::Result<Self> {
        if data.len() < FANOUT_LENGTH + TRAILER_LENGTH {
            return Err(anyhow::anyhow!("Pack index is too small"));
        }
        let count = validate_fanout(&data[..FANOUT_LENGTH])?;

        let expected = FANOUT_LENGTH as u64
            + u64::from(count) * Self::RECORD_LENGTH as u64
            + TRAILER_LENGTH as u64;
        if data.len() as u64 != expected {
            return Err(anyhow::anyhow!(
                "Pack index length {} disagrees with {count} entries",
                data.len()
            ));
        }

        Ok(PackIndexV1 { data, count })
    }

    fn record_start(&self, position: u32) -> usize {
        FANOUT_LENGTH + position as usize * Self::RECORD_LENGTH
    }

    fn offset_at(&self, position: u32) -> u64 {
        u64::from(codec::decode_u32(&self.data[self.record_start(position)..]))
    }
}

impl IdTable for PackIndexV1 {
    fn count(&self) -> u32 {
        self.count
    }

    fn fanout_at(&self, bucket: usize) -> u32 {
        codec::decode_u32(&self.data[bucket * 4..])
    }

    fn oid_at(&self, position: u32) -> &[u8] {
        let start = self.record_start(position) + 4;
        &self.data[start..start + OBJECT_ID_RAW_LENGTH]
    }
}

/// Version 2 index: parallel id/CRC/offset tables plus a 64-bit side
/// table for offsets past 2^31-1.
#[derive(Debug)]
pub struct PackIndexV2 {
    data: Bytes,
    count: u32,
    oid_start: usize,
    offset_start: usize,
    large_start: usize,
}

impl PackIndexV2 {
    fn parse(data: Bytes) -> anyhow::Result<Self> {
        let header = 8 + FANOUT_LENGTH;
        if data.len() < header + TRAILER_LENGTH {
            return Err(anyhow::anyhow!("Pack index is too small"));
        }
        let count = validate_fanout(&data[8..header])?;

        let oid_start = header;
        let crc_start = oid_start as u64 + u64::from(count) * OBJECT_ID_RAW_LENGTH as u64;
        let offset_start = crc_start + u64::from(count) * 4;
        let large_start = offset_start + u64::from(count) * 4;
        let trailer_start = data.len() as u64 - TRAILER_LENGTH as u64;
        if large_start > trailer_start {
            return Err(anyhow::anyhow!(
                "Pack index length {} disagrees with {count} entries",
                data.len()
            ));
        }

        let large_length = trailer_start - large_start;
        if large_length % 8 != 0 {
            return Err(anyhow::anyhow!(
                "Pack index 64-bit offset table has a partial entry"
            ));
        }
        let large_count = large_length / 8;

        let index = PackIndexV2 {
            data,
            count,
            oid_start,
            offset_start: offset_start as usize,
            large_start: large_start as usize,
        };

        // every redirection must land inside the side table
        for position in 0..count {
            let raw = index.raw_offset_at(position);
            if raw & LARGE_OFFSET_FLAG != 0 && u64::from(raw & !LARGE_OFFSET_FLAG) >= large_count {
                return Err(anyhow::anyhow!(
                    "Pack index 64-bit offset redirection out of bounds"
                ));
            }
        }

        Ok(index)
    }

    fn raw_offset_at(&self, position: u32) -> u32 {
        codec::decode_u32(&self.data[self.offset_start + position as usize * 4..])
    }

    fn offset_at(&self, position: u32) -> u64 {
        let raw = self.raw_offset_at(position);
        if raw & LARGE_OFFSET_FLAG != 0 {
            let redirect = (raw & !LARGE_OFFSET_FLAG) as usize;
            codec::decode_u64(&self.data[self.large_start + redirect * 8..])
        } else {
            u64::from(raw)
        }
    }
}

impl IdTable for PackIndexV2 {
    fn count(&self) -> u32 {
        self.count
    }

    fn fanout_at(&self, bucket: usize) -> u32 {
        codec::decode_u32(&self.data[8 + bucket * 4..])
    }

    fn oid_at(&self, position: u32) -> &[u8] {
        let start = self.oid_start + position as usize * OBJECT_ID_RAW_LENGTH;
        &self.data[start..start + OBJECT_ID_RAW_LENGTH]
    }
}

/// Cursor over index entries in ascending id order.
pub struct Entries<'idx> {
    index: &'idx PackIndex,
    position: u32,
    scratch: MutableObjectId,
}

impl Iterator for Entries<'_> {
    type Item = IndexEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.index.table();
        if self.position >= table.count() {
            return None;
        }

        self.scratch.refill_from(table.oid_at(self.position), 0);
        let offset = match self.index {
            PackIndex::V1(index) => index.offset_at(self.position),
            PackIndex::V2(index) => index.offset_at(self.position),
        };
        self.position += 1;

        Some(IndexEntry {
            oid: self.scratch.snapshot(),
            offset,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.table().count() - self.position) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Entries<'_> {}
