use crate::err::{DeserializationError, DeserializationResult};
use crate::utils::bytes;
use crate::utils::utf16::{Utf16LeDecodeError, decode_utf16le_bytes_z};

/// A borrowed window into the outermost input.
///
/// Carries no read position of its own, only the absolute offset of its first byte so that
/// errors raised by the nested decoder working on it point into the original input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SubView<'a> {
    pub(crate) bytes: &'a [u8],
    pub(crate) base: u64,
}

impl<'a> SubView<'a> {
    pub(crate) fn new(bytes: &'a [u8], base: u64) -> Self {
        Self { bytes, base }
    }

    pub(crate) fn cursor(self) -> ByteCursor<'a> {
        ByteCursor::with_base(self.bytes, self.base)
    }
}

/// A lightweight cursor over an immutable byte slice.
///
/// This is the slice/offset equivalent of `Cursor<&[u8]>`: one decoder instance owns one
/// cursor, nested decoders get a [`SubView`] and build their own.
///
/// All reads are little-endian (unless suffixed `_be`) and advance the cursor on success.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self::with_base(buf, 0)
    }

    #[inline]
    pub(crate) fn with_base(buf: &'a [u8], base: u64) -> Self {
        Self { buf, pos: 0, base }
    }

    #[inline]
    pub(crate) fn buf(&self) -> &'a [u8] {
        self.buf
    }

    /// Position relative to the start of this cursor's buffer.
    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Absolute position within the outermost input.
    #[inline]
    pub(crate) fn position(&self) -> u64 {
        self.base + self.pos as u64
    }

    #[inline]
    pub(crate) fn absolute(&self, pos: usize) -> u64 {
        self.base + pos as u64
    }

    #[inline]
    pub(crate) fn remaining_len(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[inline]
    pub(crate) fn remaining(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or_default()
    }

    #[inline]
    fn truncated(&self, what: &'static str, at: usize, need: usize) -> DeserializationError {
        DeserializationError::Truncated {
            what,
            offset: self.absolute(at),
            need,
            have: self.buf.len().saturating_sub(at),
        }
    }

    #[inline]
    pub(crate) fn set_pos(&mut self, pos: usize, what: &'static str) -> DeserializationResult<()> {
        // Allow pos == len (EOF), reject pos > len.
        if pos > self.buf.len() {
            return Err(self.truncated(what, self.pos, pos - self.pos.min(pos)));
        }
        self.pos = pos;
        Ok(())
    }

    #[inline]
    pub(crate) fn advance(&mut self, n: usize, what: &'static str) -> DeserializationResult<()> {
        let new_pos = self
            .pos
            .checked_add(n)
            .ok_or_else(|| self.truncated(what, self.pos, n))?;
        if new_pos > self.buf.len() {
            return Err(self.truncated(what, self.pos, n));
        }
        self.pos = new_pos;
        Ok(())
    }

    /// A window of `len` bytes starting at relative position `start`.
    pub(crate) fn sub_view(
        &self,
        start: usize,
        len: usize,
        what: &'static str,
    ) -> DeserializationResult<SubView<'a>> {
        let bytes = bytes::slice(self.buf, start, len).ok_or_else(|| self.truncated(what, start, len))?;
        Ok(SubView::new(bytes, self.absolute(start)))
    }

    /// Everything from relative position `start` to the end of the buffer.
    pub(crate) fn tail_view(&self, start: usize, what: &'static str) -> DeserializationResult<SubView<'a>> {
        let len = self.buf.len().checked_sub(start).ok_or_else(|| self.truncated(what, start, 0))?;
        self.sub_view(start, len, what)
    }

    #[inline]
    pub(crate) fn take_bytes(
        &mut self,
        len: usize,
        what: &'static str,
    ) -> DeserializationResult<&'a [u8]> {
        let out = bytes::slice(self.buf, self.pos, len).ok_or_else(|| self.truncated(what, self.pos, len))?;
        self.pos += len;
        Ok(out)
    }

    #[inline]
    pub(crate) fn array<const N: usize>(
        &mut self,
        what: &'static str,
    ) -> DeserializationResult<[u8; N]> {
        let v = bytes::read_array::<N>(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, N))?;
        self.pos += N;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u8_named(&mut self, what: &'static str) -> DeserializationResult<u8> {
        let b = bytes::read_u8(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, 1))?;
        self.pos += 1;
        Ok(b)
    }

    #[inline]
    pub(crate) fn u16_named(&mut self, what: &'static str) -> DeserializationResult<u16> {
        let v = bytes::read_u16_le(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, 2))?;
        self.pos += 2;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u16_be_named(&mut self, what: &'static str) -> DeserializationResult<u16> {
        let v = bytes::read_u16_be(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, 2))?;
        self.pos += 2;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u32_named(&mut self, what: &'static str) -> DeserializationResult<u32> {
        let v = bytes::read_u32_le(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, 4))?;
        self.pos += 4;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u48_be_named(&mut self, what: &'static str) -> DeserializationResult<u64> {
        let v = bytes::read_u48_be(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, 6))?;
        self.pos += 6;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u64_named(&mut self, what: &'static str) -> DeserializationResult<u64> {
        let v = bytes::read_u64_le(self.buf, self.pos).ok_or_else(|| self.truncated(what, self.pos, 8))?;
        self.pos += 8;
        Ok(v)
    }

    /// Read `size_bytes` bytes of UTF-16LE text, stopping at the first NUL.
    pub(crate) fn utf16_by_size(
        &mut self,
        size_bytes: usize,
        what: &'static str,
    ) -> DeserializationResult<String> {
        let start = self.position();
        let raw = self.take_bytes(size_bytes, what)?;
        decode_utf16le_bytes_z(raw).map_err(|e| match e {
            Utf16LeDecodeError::OddLength | Utf16LeDecodeError::InvalidData => {
                DeserializationError::InvalidUtf16 {
                    what,
                    offset: start,
                }
            }
        })
    }

    /// Skip up to `align - 1` padding bytes so that the position relative to `from` is aligned.
    ///
    /// Padding at the very end of the buffer is frequently missing, so only what is there is
    /// skipped.
    pub(crate) fn skip_padding(&mut self, from: usize, align: usize) {
        let consumed = self.pos.saturating_sub(from);
        let pad = (align - consumed % align) % align;
        self.pos += pad.min(self.remaining_len());
    }
}
