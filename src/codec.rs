//! Network-order integer decoding
//!
//! The pack formats store every fixed-width integer big-endian. Stream
//! reads go through `byteorder`; the slice variants serve the in-memory
//! index tables where a reader has already been paid for.

use anyhow::Context;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// Read a big-endian `u32` from a stream.
pub fn read_u32<R: Read>(reader: &mut R) -> anyhow::Result<u32> {
    reader
        .read_u32::<BigEndian>()
        .context("Unable to read 32-bit word")
}

/// Read a big-endian `u64` from a stream.
pub fn read_u64<R: Read>(reader: &mut R) -> anyhow::Result<u64> {
    reader
        .read_u64::<BigEndian>()
        .context("Unable to read 64-bit word")
}

/// Fill `buf` completely or fail.
pub fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> anyhow::Result<()> {
    reader
        .read_exact(buf)
        .with_context(|| format!("Unexpected end-of-file, wanted {} bytes", buf.len()))
}

/// Decode a big-endian `u32` from the first four bytes of `data`.
pub fn decode_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

/// Decode a big-endian `u64` from the first eight bytes of `data`.
pub fn decode_u64(data: &[u8]) -> u64 {
    u64::from_be_bytes([
        data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
    ])
}
