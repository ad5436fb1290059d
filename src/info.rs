use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::extract::{Container, ExtractError};
use crate::rpt::header::ContainerHeader;
use crate::rpt::section::SectionEntry;

/// Summary of a container, read only
#[derive(Debug, Clone)]
pub struct Info {
    pub path: PathBuf,
    pub size: usize,
    pub checksum: String,
    pub header: ContainerHeader,
    pub sections: Vec<SectionEntry>,
    pub pages: usize,
    pub compressed_total: u64,
    pub uncompressed_total: u64,
    pub max_line_width: u16,
    pub fragments: usize,
    pub fragment_compressed_total: u64,
    pub fragment_uncompressed_total: u64,
    pub object_header: Vec<(String, String)>,
}

pub fn inspect(path: &Path) -> Result<Info, ExtractError> {
    let buf = fs::read(path)?;
    let container = Container::parse(&buf)?;

    let object_header: Vec<(String, String)> = container
        .object_header_page()
        .map(|(_, h)| h.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        .unwrap_or_default();

    Ok(Info {
        path: path.to_path_buf(),
        size: buf.len(),
        checksum: blake3::hash(&buf).to_hex().to_string(),
        pages: container.pages.len(),
        compressed_total: container.pages.iter().map(|p| p.compressed_size as u64).sum(),
        uncompressed_total: container.pages.iter().map(|p| p.uncompressed_size as u64).sum(),
        max_line_width: container.pages.iter().map(|p| p.line_width).max().unwrap_or(0),
        fragments: container.fragments.len(),
        fragment_compressed_total: container.fragments.iter().map(|f| f.compressed_size as u64).sum(),
        fragment_uncompressed_total: container.fragments.iter().map(|f| f.uncompressed_size as u64).sum(),
        object_header,
        header: container.header,
        sections: container.sections,
    })
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path.display())?;
        writeln!(f, "\tsize:      {} bytes", self.size)?;
        writeln!(f, "\tblake3:    {}", self.checksum)?;
        writeln!(f, "\tdomain:    {:04}", self.header.domain_id)?;
        writeln!(f, "\tspecies:   {}", self.header.species_id)?;
        writeln!(f, "\ttimestamp: {}", self.header.timestamp)?;
        writeln!(
            f,
            "\tpages:     {} ({} -> {} bytes, widest line {})",
            self.pages, self.compressed_total, self.uncompressed_total, self.max_line_width
        )?;
        if self.fragments > 0 {
            writeln!(
                f,
                "\tbinary:    {} fragments ({} -> {} bytes)",
                self.fragments, self.fragment_compressed_total, self.fragment_uncompressed_total
            )?;
        }

        writeln!(f, "\tsections:  {}", self.sections.len())?;
        for s in &self.sections {
            writeln!(
                f,
                "\t\t{}: pages {}-{}",
                s.section_id,
                s.start_page,
                s.last_page()
            )?;
        }

        if !self.object_header.is_empty() {
            writeln!(f, "\tobject header:")?;
            for (k, v) in &self.object_header {
                writeln!(f, "\t\t{}: {}", k, v)?;
            }
        }
        Ok(())
    }
}
