use log::warn;

use crate::buf::{find, BinaryCursor, BinaryWriter, CursorError};
use crate::rpt::compress::StreamEntry;
use crate::rpt::{FormatError, BINARY_TABLE_MARKER, END_MARKER};

pub const BINARY_ENTRY_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryObjectEntry {
    pub index: u32,
    pub offset: u32,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl BinaryObjectEntry {
    pub fn absolute_offset(&self, base: usize) -> usize {
        self.offset as usize + base
    }

    fn read(cur: &mut BinaryCursor, index: u32) -> Result<Self, CursorError> {
        let offset = cur.read_u32()?;
        cur.skip(4)?;
        let uncompressed_size = cur.read_u32()?;
        let compressed_size = cur.read_u32()?;

        Ok(BinaryObjectEntry {
            index,
            offset,
            uncompressed_size,
            compressed_size,
        })
    }

    fn write(&self, w: &mut BinaryWriter) {
        w.put_u32(self.offset);
        w.put_u32(0);
        w.put_u32(self.uncompressed_size);
        w.put_u32(self.compressed_size);
    }
}

impl StreamEntry for BinaryObjectEntry {
    fn relative_offset(&self) -> u32 {
        self.offset
    }

    fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    fn uncompressed_size(&self) -> u32 {
        self.uncompressed_size
    }
}

/// Read up to `count` fragment records, trying `hint` for the marker first
pub fn parse(buf: &[u8], hint: usize, count: u32) -> Result<Vec<BinaryObjectEntry>, FormatError> {
    let at_hint = buf
        .get(hint..)
        .map_or(false, |rest| rest.starts_with(BINARY_TABLE_MARKER));
    let pos = if at_hint {
        hint
    } else {
        find(buf, BINARY_TABLE_MARKER, 0).ok_or(FormatError::MissingBinaryTable)?
    };
    let mut cur = BinaryCursor::at(buf, pos + BINARY_TABLE_MARKER.len());

    let mut entries = Vec::with_capacity((count as usize).min(cur.remaining() / BINARY_ENTRY_SIZE));
    for index in 1..=count {
        if cur.remaining() < BINARY_ENTRY_SIZE {
            warn!(
                "binary table holds {} of {} fragments, file is truncated",
                entries.len(),
                count
            );
            break;
        }
        entries.push(BinaryObjectEntry::read(&mut cur, index)?);
    }
    Ok(entries)
}

pub fn serialize(entries: &[BinaryObjectEntry]) -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(
        BINARY_TABLE_MARKER.len() + entries.len() * BINARY_ENTRY_SIZE + END_MARKER.len(),
    );
    w.put_bytes(BINARY_TABLE_MARKER);
    for e in entries {
        e.write(&mut w);
    }
    w.put_bytes(END_MARKER);
    w.into_inner()
}

#[cfg(test)]
mod test_binary_table {
    use super::*;

    fn entries() -> Vec<BinaryObjectEntry> {
        vec![
            BinaryObjectEntry {
                index: 1,
                offset: 0x180,
                uncompressed_size: 5000,
                compressed_size: 4800,
            },
            BinaryObjectEntry {
                index: 2,
                offset: 0x1600,
                uncompressed_size: 5003,
                compressed_size: 4790,
            },
        ]
    }

    #[test]
    fn parse_serialized() {
        let mut buf = vec![0u8; 0x20];
        buf.extend(serialize(&entries()));

        assert_eq!(parse(&buf, 0x20, 2).unwrap(), entries());
        assert_eq!(parse(&buf, 0, 2).unwrap(), entries());
    }

    #[test]
    fn missing_marker() {
        assert!(matches!(
            parse(&[0u8; 64], 0, 2),
            Err(FormatError::MissingBinaryTable)
        ));
    }

    #[test]
    fn short_table() {
        let table = serialize(&entries());
        let parsed = parse(&table[..BINARY_TABLE_MARKER.len() + BINARY_ENTRY_SIZE + 3], 0, 2).unwrap();

        assert_eq!(parsed, entries()[..1].to_vec());
    }
}
