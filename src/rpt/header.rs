use thiserror::Error;

use crate::buf::{BinaryCursor, BinaryWriter, CursorError};
use crate::rpt::{
    FormatError, BODY_START, HEADER_SCAN_LIMIT, HEADER_SENTINEL, INSTANCE_HEADER_BASE,
    INSTANCE_SIGNATURE, SIGNATURE, TABLE_DIRECTORY_OFFSET,
};

pub const SECTION_TABLE_TYPE: u32 = 0x0101;
pub const PAGE_TABLE_TYPE: u32 = 0x0102;
pub const BINARY_TABLE_TYPE: u32 = 0x0103;

pub const DIRECTORY_ROW_SIZE: usize = 16;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("header line is {len} bytes, it must stay under {limit}")]
    LineTooLong { len: usize, limit: usize },
    #[error(transparent)]
    Cursor(#[from] CursorError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRow {
    pub typ: u32,
    pub count: u32,
    pub offset: u32,
    pub reserved: u32,
}

impl DirectoryRow {
    fn read(cur: &mut BinaryCursor) -> Result<Self, CursorError> {
        Ok(DirectoryRow {
            typ: cur.read_u32()?,
            count: cur.read_u32()?,
            offset: cur.read_u32()?,
            reserved: cur.read_u32()?,
        })
    }

    fn write(&self, w: &mut BinaryWriter) {
        w.put_u32(self.typ);
        w.put_u32(self.count);
        w.put_u32(self.offset);
        w.put_u32(self.reserved);
    }

    pub fn is_empty(&self) -> bool {
        *self == DirectoryRow::default()
    }
}

/// Parsed file header and table directory
///
/// Table offsets are stored as found on disk, relative to `instance_base`,
/// use [`ContainerHeader::absolute`] before indexing into the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub domain_id: u32,
    pub species_id: u32,
    pub timestamp: String,
    pub instance_base: usize,
    pub page_table: DirectoryRow,
    pub section_table: DirectoryRow,
    pub binary_table: DirectoryRow,
}

impl ContainerHeader {
    pub fn page_count(&self) -> u32 {
        self.page_table.count
    }

    pub fn section_count(&self) -> u32 {
        self.section_table.count
    }

    pub fn binary_object_count(&self) -> u32 {
        self.binary_table.count
    }

    pub fn has_binary(&self) -> bool {
        self.binary_table.count > 0
    }

    pub fn absolute(&self, relative: u32) -> usize {
        relative as usize + self.instance_base
    }

    pub fn relative(&self, absolute: usize) -> u32 {
        absolute.saturating_sub(self.instance_base) as u32
    }

    pub fn page_table_offset(&self) -> usize {
        self.absolute(self.page_table.offset)
    }

    /// Where the compressed body ends, which is also where SECTIONHDR begins
    pub fn compressed_data_end(&self) -> usize {
        self.absolute(self.section_table.offset)
    }

    pub fn binary_table_offset(&self) -> Option<usize> {
        if self.binary_table.is_empty() {
            None
        } else {
            Some(self.absolute(self.binary_table.offset))
        }
    }

    fn header_line(&self) -> Vec<u8> {
        let mut line = Vec::with_capacity(64);
        line.extend_from_slice(SIGNATURE);
        line.push(b'\t');
        line.extend_from_slice(format!("{:04}:{}", self.domain_id, self.species_id).as_bytes());
        line.push(b'\t');
        // Single byte text, anything outside latin-1 can't be represented
        line.extend(
            self.timestamp
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?')),
        );
        line
    }
}

// Digits of a field, "0001" is 1, no digits at all is 0
fn numeric_field(field: &str) -> u32 {
    let digits: String = field.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

pub fn parse(buf: &[u8]) -> Result<ContainerHeader, FormatError> {
    if !buf.starts_with(SIGNATURE) {
        return Err(FormatError::MissingSignature);
    }

    let scan = &buf[..buf.len().min(HEADER_SCAN_LIMIT)];
    let line_end = scan
        .iter()
        .position(|&b| b == HEADER_SENTINEL || b == 0)
        .unwrap_or(scan.len());
    let line: String = scan[..line_end].iter().map(|&b| b as char).collect();

    let mut fields = line.split('\t').skip(1);
    let (domain_id, species_id) = match fields.next() {
        Some(ids) => match ids.split_once(':') {
            Some((domain, species)) => (numeric_field(domain), numeric_field(species)),
            None => (numeric_field(ids), 0),
        },
        None => (0, 0),
    };
    let timestamp = fields.next().map(|t| t.trim().to_string()).unwrap_or_default();

    let mut cur = BinaryCursor::at(buf, TABLE_DIRECTORY_OFFSET);
    let page_table = DirectoryRow::read(&mut cur)?;
    let section_table = DirectoryRow::read(&mut cur)?;
    let binary_table = DirectoryRow::read(&mut cur)?;

    Ok(ContainerHeader {
        domain_id,
        species_id,
        timestamp,
        instance_base: INSTANCE_HEADER_BASE,
        page_table,
        section_table,
        binary_table,
    })
}

/// Emit the `BODY_START` bytes that precede the compressed body.
///
/// All three directory rows must already hold their final offsets. The
/// instance header area is copied from `template` when it carries one.
pub fn serialize(header: &ContainerHeader, template: Option<&[u8]>) -> Result<Vec<u8>, HeaderError> {
    let line = header.header_line();
    if line.len() >= HEADER_SCAN_LIMIT {
        return Err(HeaderError::LineTooLong {
            len: line.len(),
            limit: HEADER_SCAN_LIMIT,
        });
    }

    let mut w = BinaryWriter::with_capacity(BODY_START);
    w.put_bytes(&line);
    w.put_bytes(&[HEADER_SENTINEL]);
    w.pad_to(header.instance_base);

    match template {
        Some(t) if t.starts_with(SIGNATURE) && t.len() >= TABLE_DIRECTORY_OFFSET => {
            w.put_bytes(&t[header.instance_base..TABLE_DIRECTORY_OFFSET]);
        }
        _ => w.put_bytes(INSTANCE_SIGNATURE),
    }
    w.pad_to(TABLE_DIRECTORY_OFFSET);

    header.page_table.write(&mut w);
    header.section_table.write(&mut w);
    header.binary_table.write(&mut w);
    w.pad_to(BODY_START);

    Ok(w.into_inner())
}
