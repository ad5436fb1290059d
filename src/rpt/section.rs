use log::debug;

use crate::buf::{find, BinaryCursor, BinaryWriter};
use crate::rpt::header::ContainerHeader;
use crate::rpt::{END_MARKER, SECTION_MARKER};

pub const SECTION_ENTRY_SIZE: usize = 12;

// Targeted scan looks for the marker in this window around the hint
const SCAN_SLACK: usize = 16;
const SCAN_WINDOW: usize = 4 * 1024;

// Upper bound on triplets when the header claims zero sections
const SCAN_CAP: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionEntry {
    pub section_id: u32,
    pub start_page: u32,
    pub page_count: u32,
}

impl SectionEntry {
    pub fn new(section_id: u32, start_page: u32, page_count: u32) -> Self {
        SectionEntry {
            section_id,
            start_page,
            page_count,
        }
    }

    /// Last page covered, inclusive
    pub fn last_page(&self) -> u32 {
        self.start_page
            .saturating_add(self.page_count.saturating_sub(1))
    }
}

enum Triplet {
    Entry(SectionEntry),
    // start_page or page_count of zero, junk that happens to follow the marker
    Junk,
    End,
}

fn read_triplet(cur: &mut BinaryCursor) -> Triplet {
    if cur.starts_with(END_MARKER) || cur.remaining() < SECTION_ENTRY_SIZE {
        return Triplet::End;
    }

    // Remaining was checked above, these can't fail
    let (section_id, start_page, page_count) =
        match (cur.read_u32(), cur.read_u32(), cur.read_u32()) {
            (Ok(id), Ok(start), Ok(count)) => (id, start, count),
            _ => return Triplet::End,
        };

    match (section_id, start_page, page_count) {
        (0, 0, 0) => Triplet::End,
        (_, 0, _) | (_, _, 0) => Triplet::Junk,
        _ => Triplet::Entry(SectionEntry::new(section_id, start_page, page_count)),
    }
}

fn read_triplets(buf: &[u8], start: usize, limit: usize) -> Vec<SectionEntry> {
    let mut cur = BinaryCursor::at(buf, start);
    let mut sections = Vec::new();

    while sections.len() < limit {
        match read_triplet(&mut cur) {
            Triplet::Entry(entry) => sections.push(entry),
            Triplet::Junk => debug!("skipping junk section triplet at {:#x}", cur.position()),
            Triplet::End => break,
        }
    }
    sections
}

/// Look for the section table near where the header says it should be.
///
/// `hint` is the absolute compressed-data-end offset. `None` if the marker is
/// not in the window.
pub fn targeted_scan(buf: &[u8], hint: usize, expected: u32) -> Option<Vec<SectionEntry>> {
    let window_start = hint.saturating_sub(SCAN_SLACK).min(buf.len());
    let window_end = window_start.saturating_add(SCAN_WINDOW).min(buf.len());

    let pos = find(&buf[window_start..window_end], SECTION_MARKER, 0)? + window_start;
    let limit = if expected == 0 {
        SCAN_CAP
    } else {
        expected as usize
    };

    Some(read_triplets(buf, pos + SECTION_MARKER.len(), limit))
}

/// Search the whole buffer for the section table, for files whose header hint
/// is off.
pub fn full_scan(buf: &[u8]) -> Option<Vec<SectionEntry>> {
    let pos = find(buf, SECTION_MARKER, 0)?;
    Some(read_triplets(buf, pos + SECTION_MARKER.len(), usize::MAX))
}

/// Sections of the container, empty when no usable table exists
pub fn parse(buf: &[u8], header: &ContainerHeader) -> Vec<SectionEntry> {
    match targeted_scan(buf, header.compressed_data_end(), header.section_count()) {
        Some(sections) if !sections.is_empty() => sections,
        _ => {
            debug!("targeted SECTIONHDR scan failed, scanning whole file");
            full_scan(buf).unwrap_or_default()
        }
    }
}

pub fn serialize(sections: &[SectionEntry]) -> Vec<u8> {
    let mut w = BinaryWriter::with_capacity(
        SECTION_MARKER.len() + sections.len() * SECTION_ENTRY_SIZE + END_MARKER.len(),
    );
    w.put_bytes(SECTION_MARKER);
    for s in sections {
        w.put_u32(s.section_id);
        w.put_u32(s.start_page);
        w.put_u32(s.page_count);
    }
    w.put_bytes(END_MARKER);
    w.into_inner()
}

#[cfg(test)]
mod test_section_table {
    use super::*;

    fn sections() -> Vec<SectionEntry> {
        vec![
            SectionEntry::new(14259, 1, 30),
            SectionEntry::new(14260, 31, 10),
            SectionEntry::new(14261, 41, 40),
        ]
    }

    // Padding, then the table at `at`
    fn placed(at: usize, table: &[u8]) -> Vec<u8> {
        let mut buf = vec![0xCC; at];
        buf.extend_from_slice(table);
        buf.extend_from_slice(&[0xCC; 32]);
        buf
    }

    #[test]
    fn targeted_exact_hint() {
        let buf = placed(0x300, &serialize(&sections()));
        assert_eq!(targeted_scan(&buf, 0x300, 3), Some(sections()));
    }

    #[test]
    fn targeted_hint_slightly_off() {
        let buf = placed(0x300, &serialize(&sections()));
        assert_eq!(targeted_scan(&buf, 0x30C, 3), Some(sections()));
        assert_eq!(targeted_scan(&buf, 0x200, 3), Some(sections()));
    }

    #[test]
    fn targeted_miss() {
        let buf = placed(0x3000, &serialize(&sections()));
        assert_eq!(targeted_scan(&buf, 0x100, 3), None);
        assert_eq!(targeted_scan(&buf, 0x100000, 3), None);
    }

    #[test]
    fn targeted_respects_expected_count() {
        let buf = placed(0x40, &serialize(&sections()));
        assert_eq!(targeted_scan(&buf, 0x40, 2).unwrap().len(), 2);
        assert_eq!(targeted_scan(&buf, 0x40, 0).unwrap().len(), 3);
    }

    #[test]
    fn full_scan_fallback() {
        let buf = placed(0x3000, &serialize(&sections()));
        assert_eq!(full_scan(&buf), Some(sections()));
        assert_eq!(full_scan(&[0xCC; 64]), None);
    }

    #[test]
    fn junk_skipped_and_zero_terminates() {
        let mut table = SECTION_MARKER.to_vec();
        for (id, start, count) in [(7, 1, 2), (99, 0, 5), (8, 3, 0), (9, 3, 4), (0, 0, 0), (10, 7, 1)] {
            table.extend_from_slice(&u32::to_le_bytes(id));
            table.extend_from_slice(&u32::to_le_bytes(start));
            table.extend_from_slice(&u32::to_le_bytes(count));
        }

        assert_eq!(
            full_scan(&table),
            Some(vec![SectionEntry::new(7, 1, 2), SectionEntry::new(9, 3, 4)])
        );
    }

    #[test]
    fn stops_at_buffer_end_without_end_marker() {
        let mut table = serialize(&sections());
        table.truncate(table.len() - END_MARKER.len() - 4);

        assert_eq!(full_scan(&table).unwrap().len(), 2);
    }

    #[test]
    fn empty_table() {
        let buf = serialize(&[]);
        assert_eq!(full_scan(&buf), Some(vec![]));
    }

    #[test]
    fn last_page() {
        assert_eq!(SectionEntry::new(1, 41, 40).last_page(), 80);
        assert_eq!(SectionEntry::new(1, 5, 1).last_page(), 5);
    }
}
