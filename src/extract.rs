use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::rpt::assemble::{assemble, AssembledDocument};
use crate::rpt::binary_table::{self, BinaryObjectEntry};
use crate::rpt::compress::{decompress, EntryError};
use crate::rpt::header::{self, ContainerHeader};
use crate::rpt::object_header::{self, ObjectHeader};
use crate::rpt::page_table::{self, PageTableEntry};
use crate::rpt::section::{self, SectionEntry};
use crate::rpt::FormatError;
use crate::select::{select, Selection, SelectionError};

pub const OBJECT_HEADER_FILE: &str = "object_header.txt";

pub fn page_file_name(page_number: u32) -> String {
    format!("page_{:05}.txt", page_number)
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("binary only extraction requested but the container embeds no binary document")]
    NoBinaryObjects,
    #[error("cannot create output directory {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    IO(#[from] io::Error),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum BinaryMode {
    #[default]
    Both,
    BinaryOnly,
    NoBinary,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub selection: Selection,
    pub binary: BinaryMode,
    pub output_root: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub output_dir: PathBuf,
    pub pages_written: usize,
    pub pages_failed: usize,
    pub fragments_failed: usize,
    pub object_header: bool,
    pub document: Option<String>,
    pub skipped_sections: Vec<u32>,
}

/// Fragments that could not be recovered, the document is unusable without them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteDocument {
    pub failed: Vec<u32>,
}

/// Parsed view over a fully loaded container
pub struct Container<'a> {
    buf: &'a [u8],
    pub header: ContainerHeader,
    pub sections: Vec<SectionEntry>,
    pub pages: Vec<PageTableEntry>,
    pub fragments: Vec<BinaryObjectEntry>,
}

impl<'a> Container<'a> {
    pub fn parse(buf: &'a [u8]) -> Result<Self, FormatError> {
        let header = header::parse(buf)?;
        debug!(
            "header: domain {} species {} pages {} sections {} fragments {}",
            header.domain_id,
            header.species_id,
            header.page_count(),
            header.section_count(),
            header.binary_object_count()
        );

        let sections = section::parse(buf, &header);
        if sections.is_empty() {
            debug!("no section table, section selection unavailable");
        }

        let pages = page_table::parse(buf, header.page_table_offset(), header.page_count())?;

        let fragments = match header.binary_table_offset() {
            None => Vec::new(),
            Some(hint) => match binary_table::parse(buf, hint, header.binary_object_count()) {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!("{}, ignoring embedded document", e);
                    Vec::new()
                }
            },
        };

        Ok(Container {
            buf,
            header,
            sections,
            pages,
            fragments,
        })
    }

    pub fn page(&self, entry: &PageTableEntry) -> Result<Vec<u8>, EntryError> {
        decompress(self.buf, self.header.instance_base, entry)
    }

    pub fn fragment(&self, entry: &BinaryObjectEntry) -> Result<Vec<u8>, EntryError> {
        decompress(self.buf, self.header.instance_base, entry)
    }

    /// Page 1 text and its parsed fields, when page 1 is an Object Header.
    ///
    /// Only containers with an embedded document are checked.
    pub fn object_header_page(&self) -> Option<(Vec<u8>, ObjectHeader)> {
        if !self.header.has_binary() {
            return None;
        }
        let first = self.pages.first()?;
        match self.page(first) {
            Ok(text) => object_header::detect(&text).map(|h| (text, h)),
            Err(e) => {
                warn!("cannot read page 1 for object header: {}", e);
                None
            }
        }
    }

    /// Decompress every fragment and join them, `Ok(None)` for text only
    pub fn document(
        &self,
        header: Option<&ObjectHeader>,
        fallback_base_name: &str,
    ) -> Result<Option<AssembledDocument>, IncompleteDocument> {
        if self.fragments.is_empty() {
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(self.fragments.len());
        let mut failed = Vec::new();
        for entry in &self.fragments {
            match self.fragment(entry) {
                Ok(data) => parts.push((entry.index, data)),
                Err(e) => {
                    warn!("fragment {}: {}", entry.index, e);
                    failed.push(entry.index);
                }
            }
        }

        if failed.is_empty() {
            Ok(Some(assemble(parts, header, fallback_base_name)))
        } else {
            Err(IncompleteDocument { failed })
        }
    }
}

/// Write `data` to `dir/name` through a temp file so a reader never sees a
/// partial file
pub fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(dir.join(name)).map_err(|e| e.error)?;
    Ok(())
}

fn write_item(dir: &Path, name: &str, data: &[u8]) -> bool {
    match write_atomic(dir, name, data) {
        Ok(()) => true,
        Err(e) => {
            warn!("cannot write {}: {}", dir.join(name).display(), e);
            false
        }
    }
}

/// Extract one loaded container into `options.output_root/<name>/...`
pub fn extract(buf: &[u8], name: &str, options: &ExtractOptions) -> Result<ExtractStats, ExtractError> {
    let container = Container::parse(buf)?;
    let want_text = options.binary != BinaryMode::BinaryOnly;
    let want_binary = options.binary != BinaryMode::NoBinary;

    if options.binary == BinaryMode::BinaryOnly && container.fragments.is_empty() {
        return Err(ExtractError::NoBinaryObjects);
    }

    let object_header = container.object_header_page();

    // Resolve the selection before anything touches the disk
    let selected = if want_text {
        Some(select(&container.pages, &container.sections, &options.selection)?)
    } else {
        None
    };

    let mut out_dir = options.output_root.join(name);
    if let Some(sub) = options.selection.dir_name() {
        out_dir.push(sub);
    }
    fs::create_dir_all(&out_dir).map_err(|source| ExtractError::Output {
        path: out_dir.clone(),
        source,
    })?;

    let mut stats = ExtractStats {
        output_dir: out_dir.clone(),
        ..Default::default()
    };

    if let Some(selected) = selected {
        stats.skipped_sections = selected.skipped;

        if let Some((text, _)) = &object_header {
            stats.object_header = write_item(&out_dir, OBJECT_HEADER_FILE, text);
        }

        for entry in &selected.pages {
            if entry.page_number == 1 && object_header.is_some() {
                continue;
            }
            match container.page(entry) {
                Ok(text) => {
                    if write_item(&out_dir, &page_file_name(entry.page_number), &text) {
                        stats.pages_written += 1;
                    } else {
                        stats.pages_failed += 1;
                    }
                }
                Err(e) => {
                    warn!("{} page {}: {}", name, entry.page_number, e);
                    stats.pages_failed += 1;
                }
            }
        }
    }

    if want_binary {
        let header = object_header.as_ref().map(|(_, h)| h);
        match container.document(header, name) {
            Ok(Some(doc)) => {
                info!(
                    "{}: {} document {} ({} bytes)",
                    name,
                    doc.format,
                    doc.filename,
                    doc.data.len()
                );
                if write_item(&out_dir, &doc.filename, &doc.data) {
                    stats.document = Some(doc.filename);
                }
            }
            Ok(None) => (),
            Err(incomplete) => {
                warn!(
                    "{}: {} fragments failed, document not written",
                    name,
                    incomplete.failed.len()
                );
                stats.fragments_failed = incomplete.failed.len();
            }
        }
    }

    info!(
        "{}: {} pages written, {} failed",
        name, stats.pages_written, stats.pages_failed
    );
    Ok(stats)
}

pub fn container_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string())
}

pub fn extract_file(path: &Path, options: &ExtractOptions) -> Result<ExtractStats, ExtractError> {
    let buf = fs::read(path)?;
    extract(&buf, &container_name(path), options)
}

#[cfg(test)]
mod test_extract {
    use super::*;
    use crate::build::{build, BuildOptions, BuildSpec, ObjectHeaderSource};
    use crate::rpt::object_header::ObjectMetadata;

    fn page(n: u32) -> Vec<u8> {
        format!("REPORT PAGE {}\r\nACCOUNT 000{}  BALANCE {}.00\r\n", n, n, n * 7).into_bytes()
    }

    fn text_only(pages: u32, sections: Vec<SectionEntry>) -> Vec<u8> {
        let mut spec = BuildSpec::new(1346, 1);
        for n in 1..=pages {
            spec.add_page(page(n));
        }
        for s in sections {
            spec.add_section(s);
        }
        build(&spec, &BuildOptions::default()).unwrap()
    }

    fn pdf_bytes() -> Vec<u8> {
        let mut data = b"%PDF-1.4\n".to_vec();
        for i in 0..500u32 {
            data.extend_from_slice(&i.to_le_bytes());
        }
        data.extend_from_slice(b"%%EOF\n");
        data
    }

    // 2 pages: Object Header + one text page, PDF in 2 fragments
    fn with_pdf() -> Vec<u8> {
        let mut spec = BuildSpec::new(16, 1);
        spec.add_page(page(2));
        spec.set_binary(
            pdf_bytes(),
            ObjectHeaderSource::Generate(ObjectMetadata::new(
                "HKCIF001_016_20280309.PDF",
                "2028/03/09 10:11:12",
            )),
        );
        build(&spec, &BuildOptions::default()).unwrap()
    }

    fn files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn options(root: &Path, selection: Selection, binary: BinaryMode) -> ExtractOptions {
        ExtractOptions {
            selection,
            binary,
            output_root: root.to_path_buf(),
        }
    }

    #[test]
    fn container_random_access() {
        let buf = text_only(20, vec![]);
        let container = Container::parse(&buf).unwrap();

        assert_eq!(container.pages.len(), 20);
        assert_eq!(container.page(&container.pages[13]).unwrap(), page(14));
        assert!(container.object_header_page().is_none());
    }

    #[test]
    fn section_selection_scenario() {
        let sections = vec![
            SectionEntry::new(14259, 1, 30),
            SectionEntry::new(14260, 31, 10),
            SectionEntry::new(14261, 41, 40),
            SectionEntry::new(14262, 81, 35),
            SectionEntry::new(14263, 116, 35),
        ];
        let buf = text_only(150, sections);
        let out = tempfile::tempdir().unwrap();

        let stats = extract(
            &buf,
            "HKCIF001",
            &options(
                out.path(),
                Selection::Sections(vec![14259, 14261, 14263]),
                BinaryMode::Both,
            ),
        )
        .unwrap();

        let dir = out.path().join("HKCIF001").join("sections_14259_14261_14263");
        assert_eq!(stats.output_dir, dir);
        assert_eq!(stats.pages_written, 105);
        assert_eq!(files(&dir).len(), 105);
        assert_eq!(fs::read(dir.join("page_00116.txt")).unwrap(), page(116));
        assert!(!dir.join("page_00031.txt").exists());
    }

    #[test]
    fn object_header_and_document() {
        let buf = with_pdf();
        let out = tempfile::tempdir().unwrap();

        let container = Container::parse(&buf).unwrap();
        assert_eq!(container.pages.len(), 2);
        assert_eq!(container.fragments.len(), 2);
        let fragment_total: u32 = container.fragments.iter().map(|f| f.uncompressed_size).sum();

        let stats = extract(&buf, "HKCIF001", &options(out.path(), Selection::All, BinaryMode::Both)).unwrap();
        let dir = out.path().join("HKCIF001");

        assert_eq!(
            files(&dir),
            vec!["HKCIF001_016_20280309.PDF", "object_header.txt", "page_00002.txt"]
        );
        assert!(stats.object_header);
        assert_eq!(stats.pages_written, 1);
        let doc = fs::read(dir.join("HKCIF001_016_20280309.PDF")).unwrap();
        assert_eq!(doc.len(), fragment_total as usize);
        assert_eq!(doc, pdf_bytes());
    }

    #[test]
    fn binary_only_on_text_container() {
        let buf = text_only(3, vec![]);
        let out = tempfile::tempdir().unwrap();

        let err = extract(&buf, "TEXT", &options(out.path(), Selection::All, BinaryMode::BinaryOnly)).unwrap_err();

        assert!(matches!(err, ExtractError::NoBinaryObjects));
        assert!(files(out.path()).is_empty());
    }

    #[test]
    fn binary_only_skips_text() {
        let buf = with_pdf();
        let out = tempfile::tempdir().unwrap();

        extract(&buf, "DOC", &options(out.path(), Selection::All, BinaryMode::BinaryOnly)).unwrap();
        assert_eq!(files(&out.path().join("DOC")), vec!["HKCIF001_016_20280309.PDF"]);
    }

    #[test]
    fn no_binary_skips_document() {
        let buf = with_pdf();
        let out = tempfile::tempdir().unwrap();

        let stats = extract(&buf, "DOC", &options(out.path(), Selection::All, BinaryMode::NoBinary)).unwrap();
        assert_eq!(stats.document, None);
        assert_eq!(
            files(&out.path().join("DOC")),
            vec!["object_header.txt", "page_00002.txt"]
        );
    }

    #[test]
    fn unknown_sections_touch_nothing() {
        let buf = text_only(5, vec![SectionEntry::new(1, 1, 5)]);
        let out = tempfile::tempdir().unwrap();

        let err = extract(&buf, "R", &options(out.path(), Selection::Sections(vec![7]), BinaryMode::Both)).unwrap_err();
        assert!(matches!(err, ExtractError::Selection(_)));
        assert!(files(out.path()).is_empty());
    }

    #[test]
    fn corrupt_page_is_skipped() {
        let mut buf = text_only(4, vec![]);
        let container = Container::parse(&buf).unwrap();
        let victim = container.pages[1].absolute_offset(container.header.instance_base);
        drop(container);
        // Break the zlib header of page 2
        buf[victim] = 0xFF;
        buf[victim + 1] = 0xFF;

        let out = tempfile::tempdir().unwrap();
        let stats = extract(&buf, "R", &options(out.path(), Selection::Range { start: 1, end: 4 }, BinaryMode::Both)).unwrap();

        assert_eq!(stats.pages_written, 3);
        assert_eq!(stats.pages_failed, 1);
        assert_eq!(
            files(&out.path().join("R").join("pages_1-4")),
            vec!["page_00001.txt", "page_00003.txt", "page_00004.txt"]
        );
    }

    #[test]
    fn corrupt_fragment_drops_document() {
        let mut buf = with_pdf();
        let container = Container::parse(&buf).unwrap();
        let victim = container.fragments[1].absolute_offset(container.header.instance_base);
        drop(container);
        buf[victim] = 0xFF;
        buf[victim + 1] = 0xFF;

        let out = tempfile::tempdir().unwrap();
        let stats = extract(&buf, "DOC", &options(out.path(), Selection::All, BinaryMode::Both)).unwrap();

        assert_eq!(stats.fragments_failed, 1);
        assert_eq!(stats.document, None);
        assert_eq!(
            files(&out.path().join("DOC")),
            vec!["object_header.txt", "page_00002.txt"]
        );
    }

    #[test]
    fn document_name_cannot_leave_output_dir() {
        let work = tempfile::tempdir().unwrap();
        let escaped = work.path().join("escaped.pdf");
        let mut spec = BuildSpec::new(16, 1);
        spec.add_page(page(2));
        spec.set_binary(
            pdf_bytes(),
            ObjectHeaderSource::Generate(ObjectMetadata::new(
                &escaped.to_string_lossy(),
                "2028/03/09 10:11:12",
            )),
        );
        let buf = build(&spec, &BuildOptions::default()).unwrap();

        let out = work.path().join("out");
        let stats = extract(&buf, "DOC", &options(&out, Selection::All, BinaryMode::Both)).unwrap();

        assert_eq!(stats.document.as_deref(), Some("escaped.pdf"));
        assert!(!escaped.exists());
        assert_eq!(fs::read(out.join("DOC").join("escaped.pdf")).unwrap(), pdf_bytes());
    }

    #[test]
    fn header_text_on_text_only_container_is_a_page() {
        let mut spec = BuildSpec::new(1, 1);
        spec.add_page(b"StorQM PLUS Object Header Page:\nObject File Name: X.PDF\n".to_vec());
        spec.add_page(page(2));
        let buf = build(&spec, &BuildOptions::default()).unwrap();
        let out = tempfile::tempdir().unwrap();

        let container = Container::parse(&buf).unwrap();
        assert!(container.object_header_page().is_none());

        let stats = extract(&buf, "T", &options(out.path(), Selection::All, BinaryMode::Both)).unwrap();
        assert!(!stats.object_header);
        assert_eq!(stats.pages_written, 2);
        assert_eq!(files(&out.path().join("T")), vec!["page_00001.txt", "page_00002.txt"]);
    }

    #[test]
    fn not_a_container() {
        let out = tempfile::tempdir().unwrap();
        let err = extract(b"hello", "X", &options(out.path(), Selection::All, BinaryMode::Both)).unwrap_err();

        assert!(matches!(err, ExtractError::Format(FormatError::MissingSignature)));
    }

    #[test]
    fn extract_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SAMPLE.RPT");
        fs::write(&path, text_only(2, vec![])).unwrap();

        let out = dir.path().join("out");
        let stats = extract_file(&path, &options(&out, Selection::All, BinaryMode::Both)).unwrap();

        assert_eq!(stats.output_dir, out.join("SAMPLE"));
        assert_eq!(files(&stats.output_dir), vec!["page_00001.txt", "page_00002.txt"]);
    }
}
