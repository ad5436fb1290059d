use log::{debug, warn};

use crate::buf::{find, BinaryCursor, BinaryWriter, CursorError};
use crate::rpt::compress::StreamEntry;
use crate::rpt::{FormatError, END_MARKER, PAGE_TABLE_MARKER};

pub const PAGE_ENTRY_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub page_number: u32,
    pub offset: u32,
    pub line_width: u16,
    pub lines_per_page: u16,
    pub uncompressed_size: u32,
    pub compressed_size: u32,
}

impl PageTableEntry {
    pub fn absolute_offset(&self, base: usize) -> usize {
        self.offset as usize + base
    }

    fn read(cur: &mut BinaryCursor, page_number: u32) -> Result<Self, CursorError> {
        let offset = cur.read_u32()?;
        cur.skip(4)?;
        let line_width = cur.read_u16()?;
        let lines_per_page = cur.read_u16()?;
        let uncompressed_size = cur.read_u32()?;
        let compressed_size = cur.read_u32()?;
        cur.skip(4)?;

        Ok(PageTableEntry {
            page_number,
            offset,
            line_width,
            lines_per_page,
            uncompressed_size,
            compressed_size,
        })
    }

    fn write(&self, w: &mut BinaryWriter) {
        w.put_u32(self.offset);
        w.put_u32(0);
        w.put_u16(self.line_width);
        w.put_u16(self.lines_per_page);
        w.put_u32(self.uncompressed_size);
        w.put_u32(self.compressed_size);
        w.put_u32(0);
    }
}

impl StreamEntry for PageTableEntry {
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

// BPAGETBLHDR ends with PAGETBLHDR, never take that as the page table
fn is_page_marker_at(buf: &[u8], pos: usize) -> bool {
    buf.get(pos..).map_or(false, |rest| rest.starts_with(PAGE_TABLE_MARKER))
        && (pos == 0 || buf[pos - 1] != b'B')
}

/// Position of the PAGETBLHDR marker, trying `hint` first then scanning
pub fn locate(buf: &[u8], hint: usize) -> Option<usize> {
    if is_page_marker_at(buf, hint) {
        return Some(hint);
    }

    debug!("PAGETBLHDR not at {:#x}, scanning", hint);
    let mut from = 0;
    while let Some(pos) = find(buf, PAGE_TABLE_MARKER, from) {
        if is_page_marker_at(buf, pos) {
            return Some(pos);
        }
        from = pos + 1;
    }
    None
}

/// Read up to `page_count` records, a partial trailing record is dropped
pub fn parse(buf: &[u8], hint: usize, page_count: u32) -> Result<Vec<PageTableEntry>, FormatError> {
    let pos = locate(buf, hint).ok_or(FormatError::MissingPageTable)?;
    let mut cur = BinaryCursor::at(buf, pos + PAGE_TABLE_MARKER.len());

    let mut entries = Vec::with_capacity((page_count as usize).min(cur.remaining() / PAGE_ENTRY_SIZE));
    for page_number in 1..=page_count {
        if cur.remaining() < PAGE_ENTRY_SIZE {
            warn!(
                "page table holds {} of {} pages, file is truncated",
                entries.len(),
                page_count
            );
            break;
        }
        entries.push(PageTableEntry::read(&mut cur, page_number)?);
    }
    Ok(entries)
}

pub fn serialize(entries: &[PageTableEntry]) -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(
        PAGE_TABLE_MARKER.len() + entries.len() * PAGE_ENTRY_SIZE + END_MARKER.len(),
    );
    w.put_bytes(PAGE_TABLE_MARKER);
    for e in entries {
        e.write(&mut w);
    }
    w.put_bytes(END_MARKER);
    w.into_inner()
}

#[cfg(test)]
mod test_page_table {
    use super::*;
    use crate::rpt::BINARY_TABLE_MARKER;

    fn entries() -> Vec<PageTableEntry> {
        (1..=3)
            .map(|n| PageTableEntry {
                page_number: n,
                offset: 0x110 + n * 0x40,
                line_width: 132,
                lines_per_page: 60 + n as u16,
                uncompressed_size: 4000 + n,
                compressed_size: 0x40,
            })
            .collect()
    }

    #[test]
    fn parse_at_hint() {
        let mut buf = vec![0u8; 0x80];
        buf.extend(serialize(&entries()));

        assert_eq!(parse(&buf, 0x80, 3).unwrap(), entries());
    }

    #[test]
    fn parse_by_scan() {
        let mut buf = vec![0u8; 0x80];
        buf.extend(serialize(&entries()));

        assert_eq!(parse(&buf, 0x10, 3).unwrap(), entries());
        assert_eq!(parse(&buf, 0x10000, 3).unwrap(), entries());
    }

    #[test]
    fn binary_marker_not_mistaken() {
        let mut buf = BINARY_TABLE_MARKER.to_vec();
        buf.extend_from_slice(&[0xFF; 64]);
        let at = buf.len();
        buf.extend(serialize(&entries()));

        assert_eq!(locate(&buf, 1), Some(at));
        assert_eq!(parse(&buf, 1, 3).unwrap(), entries());
    }

    #[test]
    fn missing_marker() {
        assert!(matches!(
            parse(&[0u8; 128], 0, 3),
            Err(FormatError::MissingPageTable)
        ));
    }

    #[test]
    fn truncated_table_stops_early() {
        let table = serialize(&entries());
        let cut = PAGE_TABLE_MARKER.len() + 2 * PAGE_ENTRY_SIZE + 10;

        let parsed = parse(&table[..cut], 0, 3).unwrap();
        assert_eq!(parsed, entries()[..2].to_vec());
    }

    #[test]
    fn absolute_offset() {
        assert_eq!(entries()[0].absolute_offset(0xF0), 0x150 + 0xF0);
    }
}
