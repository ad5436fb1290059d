use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CursorError {
    #[error("read of {len} bytes at {offset:#x} runs past end of buffer ({available} bytes)")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
}

/// Bounds checked slice of `len` bytes at `offset`
pub fn slice_at(buf: &[u8], offset: usize, len: usize) -> Result<&[u8], CursorError> {
    match offset.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(&buf[offset..end]),
        _ => Err(CursorError::OutOfBounds {
            offset,
            len,
            available: buf.len(),
        }),
    }
}

/// First position of `needle` in `haystack` at or after `from`
pub fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Little endian reader over a borrowed buffer.
///
/// Every read is validated against the buffer before any byte is touched, a
/// short buffer is an error and never a panic.
pub struct BinaryCursor<'a> {
    inner: &'a [u8],
    pos: usize,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        BinaryCursor { inner: buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        BinaryCursor { inner: buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.inner.len().saturating_sub(self.pos)
    }

    pub fn starts_with(&self, needle: &[u8]) -> bool {
        self.inner
            .get(self.pos..)
            .map_or(false, |rest| rest.starts_with(needle))
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CursorError> {
        self.take(len).map(|_| ())
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        let data = slice_at(self.inner, self.pos, len)?;
        self.pos += len;
        Ok(data)
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        self.take(2).map(LittleEndian::read_u16)
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        self.take(4).map(LittleEndian::read_u32)
    }
}

/// Little endian writer that grows a `Vec<u8>`, with bounds checked patching
/// for values that are only known once later content has been laid out.
#[derive(Default)]
pub struct BinaryWriter {
    inner: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        BinaryWriter { inner: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        BinaryWriter {
            inner: Vec::with_capacity(cap),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn put_bytes(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    pub fn put_u16(&mut self, value: u16) {
        let mut b = [0u8; 2];
        LittleEndian::write_u16(&mut b, value);
        self.inner.extend_from_slice(&b);
    }

    pub fn put_u32(&mut self, value: u32) {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, value);
        self.inner.extend_from_slice(&b);
    }

    /// Zero fill up to `len`, a no-op if already at or past it
    pub fn pad_to(&mut self, len: usize) {
        if self.inner.len() < len {
            self.inner.resize(len, 0);
        }
    }

    pub fn patch_bytes(&mut self, at: usize, data: &[u8]) -> Result<(), CursorError> {
        let available = self.inner.len();
        match at.checked_add(data.len()) {
            Some(end) if end <= available => {
                self.inner[at..end].copy_from_slice(data);
                Ok(())
            }
            _ => Err(CursorError::OutOfBounds {
                offset: at,
                len: data.len(),
                available,
            }),
        }
    }

    pub fn patch_u32(&mut self, at: usize, value: u32) -> Result<(), CursorError> {
        let mut b = [0u8; 4];
        LittleEndian::write_u32(&mut b, value);
        self.patch_bytes(at, &b)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.inner
    }
}


#[cfg(test)]
mod test_binary_writer {
    use super::*;

    #[test]
    fn put_and_patch() {
        let mut w = BinaryWriter::new();
        w.put_u32(0);
        w.put_u16(0xBEEF);
        w.patch_u32(0, 0xDEADBEEF).unwrap();

        assert_eq!(w.into_inner(), vec![0xEF, 0xBE, 0xAD, 0xDE, 0xEF, 0xBE]);
    }

    #[test]
    fn patch_out_of_bounds() {
        let mut w = BinaryWriter::new();
        w.put_u16(1);

        assert!(w.patch_u32(0, 1).is_err());
    }

    #[test]
    fn pad_never_truncates() {
        let mut w = BinaryWriter::new();
        w.put_bytes(&[1, 2, 3]);
        w.pad_to(2);
        assert_eq!(w.len(), 3);
        w.pad_to(5);
        assert_eq!(w.into_inner(), vec![1, 2, 3, 0, 0]);
    }
}
