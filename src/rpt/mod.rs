//! RPT report container format
//!
//! This is the archival container written by the legacy report platform. It
//! holds the text pages of one report instance, each page compressed on its
//! own so that any page can be fetched without touching the others, and can
//! optionally carry one embedded binary document (PDF or AFP) split into
//! fragments that are interleaved with the page streams.
//!
//! <div class="example-wrap" style="display:inline-block">
//! <pre class="compile_fail" style="white-space:normal;font:inherit;">
//!
//! **Warning**: This layout is reverse engineered from files in the wild,
//! there is no published reference. Fields marked reserved are carried over
//! from a template when rebuilding but are never interpreted.
//!
//! </pre>
//! </div>
//!
//! # Top Level
//!
//! Unless other wise noted everything is stored in Little Endian format.
//!
//! | Offset | Name            | Description |
//! | -----: | --------------- | ----------- |
//! | 0x000  | File header     | `RPTFILEHDR\t<domain>:<species>\t<timestamp>` then `0x1A`, zero padded |
//! | 0x0F0  | Instance header | `RPTINSTHDR`, base address for every relative offset in the file |
//! | 0x1D0  | Table directory | 3 rows of 16 bytes, see below |
//! | 0x200  | Compressed body | zlib stream per page, interleaved with binary fragments |
//! | var    | SECTIONHDR      | Section table, starts where the compressed body ends |
//! | var    | PAGETBLHDR      | Page table |
//! | var    | BPAGETBLHDR     | Binary fragment table, only present with an embedded document |
//!
//! ## Table Directory
//!
//! | Type | Name     | Description |
//! | ---: | -------- | ----------- |
//! | u32  | type     | Table type code |
//! | u32  | count    | Number of rows in the table |
//! | u32  | offset   | Offset of the table relative to the instance header |
//! | u32  | reserved | Unused |
//!
//! Row 0 is the page table (`0x0102`), row 1 is the section table (`0x0101`)
//! whose offset doubles as the end of the compressed body, row 2 is the binary
//! fragment table (`0x0103`) and is all zero for a text only container.
//!
//! ## SECTIONHDR
//!
//! The marker `SECTIONHDR` followed by 12 byte triplets and `ENDDATA\0`.
//!
//! | Type | Name       | Description |
//! | ---: | ---------- | ----------- |
//! | u32  | section_id | Section identifier, permission relevant |
//! | u32  | start_page | First page of the section (1 based) |
//! | u32  | page_count | Number of pages in the section |
//!
//! Sections are neither required to cover every page nor to be disjoint.
//!
//! ## PAGETBLHDR
//!
//! The marker `PAGETBLHDR` followed by one 24 byte record per page and
//! `ENDDATA\0`. Records are in page order, page 1 first.
//!
//! | Type | Name              | Description |
//! | ---: | ----------------- | ----------- |
//! | u32  | offset            | Stream offset relative to the instance header |
//! | u32  | reserved          | |
//! | u16  | line_width        | Longest line on the page |
//! | u16  | lines_per_page    | Number of lines on the page |
//! | u32  | uncompressed_size | Size of the page text |
//! | u32  | compressed_size   | Size of the zlib stream |
//! | u32  | reserved          | |
//!
//! ## BPAGETBLHDR
//!
//! The marker `BPAGETBLHDR` followed by one 16 byte record per fragment and
//! `ENDDATA\0`. Fragments concatenate in table order into the document.
//!
//! | Type | Name              | Description |
//! | ---: | ----------------- | ----------- |
//! | u32  | offset            | Stream offset relative to the instance header |
//! | u32  | reserved          | |
//! | u32  | uncompressed_size | Size of the fragment |
//! | u32  | compressed_size   | Size of the zlib stream |
//!
//! ## Object Header
//!
//! When a document is embedded, page 1 is usually a metadata page starting
//! with `StorQM PLUS Object Header Page:` followed by `Key: Value` lines, see
//! [`object_header`].
use thiserror::Error;

use crate::buf::CursorError;

pub mod assemble;
pub mod binary_table;
pub mod compress;
pub mod header;
pub mod object_header;
pub mod page_table;
pub mod section;

pub const SIGNATURE: &[u8; 10] = b"RPTFILEHDR";
pub const INSTANCE_SIGNATURE: &[u8; 10] = b"RPTINSTHDR";

// Header line must terminate within this many bytes
pub const HEADER_SCAN_LIMIT: usize = 192;
pub const HEADER_SENTINEL: u8 = 0x1A;

pub const INSTANCE_HEADER_BASE: usize = 0xF0;
pub const TABLE_DIRECTORY_OFFSET: usize = 0x1D0;
pub const BODY_START: usize = 0x200;

pub const SECTION_MARKER: &[u8] = b"SECTIONHDR";
pub const PAGE_TABLE_MARKER: &[u8] = b"PAGETBLHDR";
pub const BINARY_TABLE_MARKER: &[u8] = b"BPAGETBLHDR";
pub const END_MARKER: &[u8] = b"ENDDATA\0";

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("missing RPTFILEHDR signature")]
    MissingSignature,
    #[error("no PAGETBLHDR found, pages cannot be located")]
    MissingPageTable,
    #[error("no BPAGETBLHDR found, binary fragments cannot be located")]
    MissingBinaryTable,
    #[error("container truncated: {0}")]
    Truncated(#[from] CursorError),
}
