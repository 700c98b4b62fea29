//! Byte-slice utilities for bounds-oriented parsing.
//!
//! Zero-cost helpers that read primitives out of `&[u8]` at fixed offsets and return `Option<T>`.
//! Callers map `None` to their own error (usually [`DeserializationError::Truncated`] through
//! [`ByteCursor`](super::ByteCursor), which knows the absolute offset of the slice).
//!
//! - Numeric reads are **little-endian** unless the name says otherwise (WPS data is LE, except
//!   for the trailing byte groups of a GUID).
//! - Offsets are `usize` and are interpreted relative to the slice you pass in.
//!
//! [`DeserializationError::Truncated`]: crate::err::DeserializationError::Truncated

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Borrow `len` bytes at `offset`.
///
/// Returns `None` if the range is out of bounds (or overflows).
pub(crate) fn slice(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    let end = offset.checked_add(len)?;
    buf.get(offset..end)
}

/// Read `N` raw bytes at `offset`.
pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    slice(buf, offset, N)?.try_into().ok()
}

/// Read a single byte at `offset`.
pub(crate) fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
    buf.get(offset).copied()
}

/// Read a `u16` (little-endian) at `offset`.
pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    Some(LittleEndian::read_u16(slice(buf, offset, 2)?))
}

/// Read a `u16` (big-endian) at `offset`.
pub(crate) fn read_u16_be(buf: &[u8], offset: usize) -> Option<u16> {
    Some(BigEndian::read_u16(slice(buf, offset, 2)?))
}

/// Read a `u32` (little-endian) at `offset`.
pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    Some(LittleEndian::read_u32(slice(buf, offset, 4)?))
}

/// Read a `u64` (little-endian) at `offset`.
pub(crate) fn read_u64_le(buf: &[u8], offset: usize) -> Option<u64> {
    Some(LittleEndian::read_u64(slice(buf, offset, 8)?))
}

/// Read a 48-bit big-endian unsigned integer at `offset` (the last group of a GUID).
pub(crate) fn read_u48_be(buf: &[u8], offset: usize) -> Option<u64> {
    Some(BigEndian::read_uint(slice(buf, offset, 6)?, 6))
}
