use std::io::{self, Write};

use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use log::debug;
use thiserror::Error;

use crate::buf::slice_at;

// Some producers understate compressed_size by a few bytes
pub const RETRY_SLACK: usize = 64;

// Initial output capacity is capped at this multiple of the compressed input
const MAX_INITIAL_RATIO: usize = 8;

/// A compressed stream located through one of the container tables
pub trait StreamEntry {
    fn relative_offset(&self) -> u32;
    fn compressed_size(&self) -> u32;
    fn uncompressed_size(&self) -> u32;

    fn absolute(&self, base: usize) -> usize {
        self.relative_offset() as usize + base
    }
}

/// Failure to recover a single page or fragment, never fatal to the run
#[derive(Error, Debug)]
pub enum EntryError {
    #[error("stream at {offset:#x} needs {len} bytes but the file ends at {available:#x}")]
    Truncated {
        offset: usize,
        len: usize,
        available: usize,
    },
    #[error("inflate of stream at {offset:#x} failed: {source}")]
    Decompression {
        offset: usize,
        #[source]
        source: io::Error,
    },
}

pub struct Compressed {
    pub data: Vec<u8>,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

// Inflate a whole zlib stream, anything short of the end-of-stream marker is
// an error. Bytes after the end of the stream are ignored.
fn inflate(data: &[u8], expected: usize) -> io::Result<Vec<u8>> {
    let initial = expected.min(data.len().saturating_mul(MAX_INITIAL_RATIO));
    let mut out = Vec::with_capacity(initial.max(64));
    let mut inflater = Decompress::new(true);

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.len().max(4096));
        }

        let (before_in, before_out) = (inflater.total_in(), inflater.total_out());
        let input = data.get(before_in as usize..).unwrap_or(&[]);
        let status = inflater
            .decompress_vec(input, &mut out, FlushDecompress::None)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if matches!(status, Status::StreamEnd) {
            return Ok(out);
        }
        if inflater.total_in() == before_in && inflater.total_out() == before_out {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "deflate stream ended before its final block",
            ));
        }
    }
}

/// Decompress one stream out of the loaded container.
///
/// On a failed inflate it retries once with [`RETRY_SLACK`] extra bytes,
/// clamped to the end of the buffer.
pub fn decompress<E: StreamEntry>(buf: &[u8], base: usize, entry: &E) -> Result<Vec<u8>, EntryError> {
    let offset = entry.absolute(base);
    let len = entry.compressed_size() as usize;
    let expected = entry.uncompressed_size() as usize;

    let data = slice_at(buf, offset, len).map_err(|_| EntryError::Truncated {
        offset,
        len,
        available: buf.len(),
    })?;

    match inflate(data, expected) {
        Ok(out) => Ok(out),
        Err(first) => {
            let slack_end = offset.saturating_add(len + RETRY_SLACK).min(buf.len());
            debug!(
                "inflate at {:#x} failed ({}), retrying with {} bytes",
                offset,
                first,
                slack_end - offset
            );
            inflate(&buf[offset..slack_end], expected)
                .map_err(|source| EntryError::Decompression { offset, source })
        }
    }
}

pub fn compress(raw: &[u8], level: Compression) -> io::Result<Compressed> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(raw.len() / 2 + 64), level);
    encoder.write_all(raw)?;
    let data = encoder.finish()?;

    Ok(Compressed {
        uncompressed_size: raw.len() as u32,
        compressed_size: data.len() as u32,
        data,
    })
}
