use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

use flate2::Compression;
use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::extract::{write_atomic, OBJECT_HEADER_FILE};
use crate::rpt::assemble::safe_file_name;
use crate::rpt::binary_table::{self, BinaryObjectEntry, BINARY_ENTRY_SIZE};
use crate::rpt::compress::{compress, Compressed};
use crate::rpt::header::{
    self, ContainerHeader, DirectoryRow, HeaderError, BINARY_TABLE_TYPE, PAGE_TABLE_TYPE,
    SECTION_TABLE_TYPE,
};
use crate::rpt::object_header::{self, ObjectMetadata};
use crate::rpt::page_table::{self, PageTableEntry, PAGE_ENTRY_SIZE};
use crate::rpt::section::{self, SectionEntry, SECTION_ENTRY_SIZE};
use crate::rpt::{
    BINARY_TABLE_MARKER, BODY_START, END_MARKER, INSTANCE_HEADER_BASE, PAGE_TABLE_MARKER,
    SECTION_MARKER,
};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("object header page given but no document to embed")]
    HeaderWithoutDocument,
    #[error("container would be {0} bytes, offsets are limited to 32 bits")]
    TooLarge(usize),
    #[error(transparent)]
    IO(#[from] io::Error),
}

/// How an embedded document is cut into fragments.
///
/// Every container seen in the wild has exactly one fragment per page, but
/// nothing in the format depends on it.
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FragmentPolicy {
    #[default]
    PerPage,
    Count(u32),
}

impl FragmentPolicy {
    fn fragments(&self, page_count: usize) -> usize {
        match self {
            FragmentPolicy::PerPage => page_count.max(1),
            FragmentPolicy::Count(n) => (*n as usize).max(1),
        }
    }
}

/// Where page 1 comes from when a document is embedded
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ObjectHeaderSource {
    #[default]
    None,
    Text(Vec<u8>),
    Generate(ObjectMetadata),
}

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub level: Compression,
    pub fragments: FragmentPolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        BuildOptions {
            level: Compression::default(),
            fragments: FragmentPolicy::PerPage,
        }
    }
}

/// Everything needed to write a container, filled in by the caller
#[derive(Debug, Clone, Default)]
pub struct BuildSpec {
    pub species_id: u32,
    pub domain_id: u32,
    pub timestamp: Option<String>,
    pub pages: Vec<Vec<u8>>,
    pub sections: Vec<SectionEntry>,
    pub binary: Option<Vec<u8>>,
    pub object_header: ObjectHeaderSource,
    pub template: Option<Vec<u8>>,
}

// `<name>_binary.pdf` and friends, written when no Object Header names the document
fn is_unnamed_document(file_name: &str) -> bool {
    let path = Path::new(file_name);
    let stem_ok = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map_or(false, |s| s.ends_with("_binary"));
    let ext_ok = path
        .extension()
        .and_then(|x| x.to_str())
        .map_or(false, |x| ["pdf", "afp", "bin"].iter().any(|e| x.eq_ignore_ascii_case(e)));
    stem_ok && ext_ok
}

fn page_number_of(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("page_")?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

impl BuildSpec {
    pub fn new(species_id: u32, domain_id: u32) -> Self {
        BuildSpec {
            species_id,
            domain_id,
            ..Default::default()
        }
    }

    pub fn add_page(&mut self, text: Vec<u8>) {
        self.pages.push(text);
    }

    pub fn add_section(&mut self, section: SectionEntry) {
        self.sections.push(section);
    }

    pub fn set_binary(&mut self, data: Vec<u8>, object_header: ObjectHeaderSource) {
        self.binary = Some(data);
        self.object_header = object_header;
    }

    /// Pick up the output of an earlier extraction.
    ///
    /// `page_NNNNN.txt` files are taken in page number order and
    /// `object_header.txt` becomes page 1. The document is the file the Object
    /// Header names, or without one a single `<name>_binary.<ext>` file.
    pub fn from_extracted(dir: &Path) -> Result<Self, BuildError> {
        let mut numbered = Vec::new();
        let mut unnamed = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(n) = page_number_of(name) {
                numbered.push((n, entry.path()));
            } else if is_unnamed_document(name) {
                unnamed.push(entry.path());
            }
        }
        numbered.sort_by_key(|(n, _)| *n);

        let mut spec = BuildSpec::default();
        for (n, path) in numbered {
            debug!("page {} from {}", n, path.display());
            spec.add_page(fs::read(&path)?);
        }

        let header_path = dir.join(OBJECT_HEADER_FILE);
        let named = if header_path.is_file() {
            let text = fs::read(&header_path)?;
            let named = object_header::detect(&text)
                .and_then(|h| h.filename().and_then(safe_file_name).map(|f| dir.join(f)))
                .filter(|p| p.is_file());
            spec.object_header = ObjectHeaderSource::Text(text);
            named
        } else {
            None
        };

        let document = match (named, unnamed.len()) {
            (Some(path), _) => Some(path),
            (None, 1) => unnamed.pop(),
            (None, 0) => None,
            (None, n) => {
                warn!("{} candidate documents in {}, embedding none", n, dir.display());
                None
            }
        };
        if let Some(path) = document {
            debug!("embedding {}", path.display());
            spec.binary = Some(fs::read(&path)?);
        }
        Ok(spec)
    }

    // Object Header first, if there is one
    fn page_texts(&self) -> Vec<Cow<'_, [u8]>> {
        let mut texts = Vec::with_capacity(self.pages.len() + 1);
        match &self.object_header {
            ObjectHeaderSource::None => (),
            ObjectHeaderSource::Text(text) => texts.push(Cow::Borrowed(text.as_slice())),
            ObjectHeaderSource::Generate(meta) => {
                texts.push(Cow::Owned(object_header::generate(meta)))
            }
        }
        texts.extend(self.pages.iter().map(|p| Cow::Borrowed(p.as_slice())));
        texts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMetrics {
    pub line_width: u16,
    pub lines: u16,
}

pub fn analyze(text: &[u8]) -> PageMetrics {
    let body = text.strip_suffix(b"\n").unwrap_or(text);
    if body.is_empty() && text.is_empty() {
        return PageMetrics {
            line_width: 0,
            lines: 0,
        };
    }

    let mut line_width = 0;
    let mut lines = 0usize;
    for line in body.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        line_width = line_width.max(line.len());
        lines += 1;
    }

    PageMetrics {
        line_width: u16::try_from(line_width).unwrap_or(u16::MAX),
        lines: u16::try_from(lines).unwrap_or(u16::MAX),
    }
}

/// Split into `count` near equal chunks, the last one takes the remainder
pub fn split_chunks(data: &[u8], count: usize) -> Vec<&[u8]> {
    let count = count.max(1);
    let size = data.len() / count;

    let mut chunks = Vec::with_capacity(count);
    for i in 0..count {
        let start = i * size;
        let end = if i + 1 == count { data.len() } else { start + size };
        chunks.push(&data[start..end]);
    }
    chunks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyItem {
    Page(usize),
    Fragment(usize),
}

// Pages and fragments alternate, whatever is left of the longer list trails
fn body_order(pages: usize, fragments: usize) -> Vec<BodyItem> {
    let mut order = Vec::with_capacity(pages + fragments);
    for i in 0..pages.max(fragments) {
        if i < pages {
            order.push(BodyItem::Page(i));
        }
        if i < fragments {
            order.push(BodyItem::Fragment(i));
        }
    }
    order
}

/// Fully computed container layout, every offset known, nothing written yet
pub struct LayoutPlan {
    pub header: ContainerHeader,
    pub order: Vec<BodyItem>,
    pub pages: Vec<PageTableEntry>,
    pub fragments: Vec<BinaryObjectEntry>,
    pub sections: Vec<SectionEntry>,
    pub body_end: usize,
    pub page_table_offset: usize,
    pub binary_table_offset: Option<usize>,
    pub total_size: usize,
    page_streams: Vec<Compressed>,
    fragment_streams: Vec<Compressed>,
    template: Option<Vec<u8>>,
}

fn to_u32(value: usize) -> Result<u32, BuildError> {
    u32::try_from(value).map_err(|_| BuildError::TooLarge(value))
}

fn now_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]/[month]/[day] [hour]:[minute]:[second].[subsecond digits:3]"
        ))
        .unwrap_or_default()
}

// Reserved directory words carried over from the template
fn template_rows(template: Option<&[u8]>) -> [u32; 3] {
    match template.map(header::parse) {
        Some(Ok(t)) => [
            t.page_table.reserved,
            t.section_table.reserved,
            t.binary_table.reserved,
        ],
        _ => [0; 3],
    }
}

/// Analyze, compress and lay out the container described by `spec`
pub fn plan(spec: &BuildSpec, options: &BuildOptions) -> Result<LayoutPlan, BuildError> {
    let base = INSTANCE_HEADER_BASE;

    // An Object Header is only recognised when a document is embedded
    if spec.binary.is_none() && spec.object_header != ObjectHeaderSource::None {
        return Err(BuildError::HeaderWithoutDocument);
    }

    // Analyze
    let texts = spec.page_texts();
    let metrics: Vec<PageMetrics> = texts.iter().map(|t| analyze(t)).collect();
    let chunks = match &spec.binary {
        Some(data) => split_chunks(data, options.fragments.fragments(texts.len())),
        None => Vec::new(),
    };

    // Compress
    let page_streams = texts
        .iter()
        .map(|t| compress(t, options.level))
        .collect::<io::Result<Vec<_>>>()?;
    let fragment_streams = chunks
        .iter()
        .map(|c| compress(c, options.level))
        .collect::<io::Result<Vec<_>>>()?;

    // Lay out
    let order = body_order(page_streams.len(), fragment_streams.len());
    let mut pages = Vec::with_capacity(page_streams.len());
    let mut fragments = Vec::with_capacity(fragment_streams.len());

    let mut pos = BODY_START;
    for item in &order {
        let offset = to_u32(pos - base)?;
        match *item {
            BodyItem::Page(i) => {
                let stream = &page_streams[i];
                pages.push(PageTableEntry {
                    page_number: to_u32(i + 1)?,
                    offset,
                    line_width: metrics[i].line_width,
                    lines_per_page: metrics[i].lines,
                    uncompressed_size: stream.uncompressed_size,
                    compressed_size: stream.compressed_size,
                });
                pos += stream.data.len();
            }
            BodyItem::Fragment(i) => {
                let stream = &fragment_streams[i];
                fragments.push(BinaryObjectEntry {
                    index: to_u32(i + 1)?,
                    offset,
                    uncompressed_size: stream.uncompressed_size,
                    compressed_size: stream.compressed_size,
                });
                pos += stream.data.len();
            }
        }
    }

    let body_end = pos;
    let page_table_offset =
        body_end + SECTION_MARKER.len() + spec.sections.len() * SECTION_ENTRY_SIZE + END_MARKER.len();
    let page_table_end = page_table_offset + PAGE_TABLE_MARKER.len() + pages.len() * PAGE_ENTRY_SIZE + END_MARKER.len();
    let (binary_table_offset, total_size) = if fragments.is_empty() {
        (None, page_table_end)
    } else {
        let end = page_table_end + BINARY_TABLE_MARKER.len() + fragments.len() * BINARY_ENTRY_SIZE + END_MARKER.len();
        (Some(page_table_end), end)
    };
    to_u32(total_size)?;

    let reserved = template_rows(spec.template.as_deref());
    let header = ContainerHeader {
        domain_id: spec.domain_id,
        species_id: spec.species_id,
        timestamp: spec.timestamp.clone().unwrap_or_else(now_timestamp),
        instance_base: base,
        page_table: DirectoryRow {
            typ: PAGE_TABLE_TYPE,
            count: to_u32(pages.len())?,
            offset: to_u32(page_table_offset - base)?,
            reserved: reserved[0],
        },
        section_table: DirectoryRow {
            typ: SECTION_TABLE_TYPE,
            count: to_u32(spec.sections.len())?,
            offset: to_u32(body_end - base)?,
            reserved: reserved[1],
        },
        binary_table: match binary_table_offset {
            None => DirectoryRow::default(),
            Some(at) => DirectoryRow {
                typ: BINARY_TABLE_TYPE,
                count: to_u32(fragments.len())?,
                offset: to_u32(at - base)?,
                reserved: reserved[2],
            },
        },
    };

    Ok(LayoutPlan {
        header,
        order,
        pages,
        fragments,
        sections: spec.sections.clone(),
        body_end,
        page_table_offset,
        binary_table_offset,
        total_size,
        page_streams,
        fragment_streams,
        template: spec.template.clone(),
    })
}

impl LayoutPlan {
    /// Emit the container, header first now that all offsets are settled
    pub fn serialize(&self) -> Result<Vec<u8>, BuildError> {
        let mut out = Vec::with_capacity(self.total_size);
        out.extend(header::serialize(&self.header, self.template.as_deref())?);

        for item in &self.order {
            match *item {
                BodyItem::Page(i) => out.extend_from_slice(&self.page_streams[i].data),
                BodyItem::Fragment(i) => out.extend_from_slice(&self.fragment_streams[i].data),
            }
        }
        debug_assert_eq!(out.len(), self.body_end);

        out.extend(section::serialize(&self.sections));
        debug_assert_eq!(out.len(), self.page_table_offset);
        out.extend(page_table::serialize(&self.pages));
        if self.binary_table_offset.is_some() {
            out.extend(binary_table::serialize(&self.fragments));
        }
        debug_assert_eq!(out.len(), self.total_size);

        Ok(out)
    }
}

pub fn build(spec: &BuildSpec, options: &BuildOptions) -> Result<Vec<u8>, BuildError> {
    plan(spec, options)?.serialize()
}

pub fn build_file(spec: &BuildSpec, options: &BuildOptions, path: &Path) -> Result<usize, BuildError> {
    let data = build(spec, options)?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "output path has no file name"))?;

    fs::create_dir_all(dir)?;
    write_atomic(dir, &name, &data)?;
    info!("wrote {} ({} bytes)", path.display(), data.len());
    Ok(data.len())
}
