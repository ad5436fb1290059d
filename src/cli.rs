use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use thiserror::Error;

use crate::extract::BinaryMode;
use crate::rpt::section::SectionEntry;
use crate::select::Selection;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CliError {
    #[error("--{0} and --{1} cannot be used together")]
    ArgumentConflict(&'static str, &'static str),
    #[error("invalid page range {0:?}, expected START-END")]
    PageRange(String),
    #[error("invalid section {0:?}, expected ID:START:COUNT")]
    Section(String),
}

#[derive(Parser)]
#[command(name = "rptkit")]
#[command(about = "Extract and build RPT report containers")]
#[command(author, version, long_about = None)]
pub struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract pages and the embedded document from a container or a folder of them
    Extract(ExtractArgs),

    /// Show header, tables and totals of a container
    Info {
        input: PathBuf,
    },

    /// Build a container from a directory of page files
    Build(BuildArgs),
}

#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    /// Container file or folder of containers
    pub input: PathBuf,

    /// Output root, overrides the config file
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Descend into subfolders
    #[arg(short, long)]
    pub recursive: bool,

    /// Every page, the default
    #[arg(long)]
    pub all: bool,

    /// Inclusive page range, e.g. 10-20
    #[arg(long, value_name = "START-END")]
    pub pages: Option<String>,

    /// Only pages of these sections, in the order given
    #[arg(long, value_name = "ID", num_args = 1..)]
    pub section_id: Vec<u32>,

    /// Only the embedded document
    #[arg(long)]
    pub binary_only: bool,

    /// Only the text pages
    #[arg(long)]
    pub no_binary: bool,
}

impl ExtractArgs {
    pub fn selection(&self) -> Result<Selection, CliError> {
        let sections = !self.section_id.is_empty();
        match (self.all, self.pages.is_some(), sections) {
            (true, true, _) => Err(CliError::ArgumentConflict("all", "pages")),
            (true, _, true) => Err(CliError::ArgumentConflict("all", "section-id")),
            (_, true, true) => Err(CliError::ArgumentConflict("pages", "section-id")),
            (_, true, _) => {
                let (start, end) = parse_page_range(self.pages.as_deref().unwrap_or_default())?;
                Ok(Selection::Range { start, end })
            }
            (_, _, true) => Ok(Selection::Sections(self.section_id.clone())),
            _ => Ok(Selection::All),
        }
    }

    pub fn binary_mode(&self) -> Result<BinaryMode, CliError> {
        match (self.binary_only, self.no_binary) {
            (true, true) => Err(CliError::ArgumentConflict("binary-only", "no-binary")),
            (true, false) => Ok(BinaryMode::BinaryOnly),
            (false, true) => Ok(BinaryMode::NoBinary),
            (false, false) => Ok(BinaryMode::Both),
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// Directory of page_NNNNN.txt files, usually an earlier extraction
    pub pages_dir: PathBuf,

    /// Container to write
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    #[arg(long)]
    pub species: Option<u32>,

    #[arg(long)]
    pub domain: Option<u32>,

    /// Header timestamp, defaults to now
    #[arg(long)]
    pub timestamp: Option<String>,

    /// Document to embed, replaces any found in the pages directory
    #[arg(long, value_name = "FILE")]
    pub binary: Option<PathBuf>,

    /// Embed the document without an Object Header page
    #[arg(long)]
    pub no_object_header: bool,

    /// Section entry, repeatable
    #[arg(long, value_name = "ID:START:COUNT")]
    pub section: Vec<String>,

    /// Copy the section table of an existing container
    #[arg(long, value_name = "RPT")]
    pub sections_from: Option<PathBuf>,

    /// Existing container whose header supplies the unknown fields and defaults
    #[arg(long, value_name = "RPT")]
    pub template: Option<PathBuf>,
}

impl BuildArgs {
    pub fn validate(&self) -> Result<(), CliError> {
        if !self.section.is_empty() && self.sections_from.is_some() {
            return Err(CliError::ArgumentConflict("section", "sections-from"));
        }
        if self.no_object_header && self.binary.is_none() {
            return Err(CliError::ArgumentConflict("no-object-header", "binary"));
        }
        Ok(())
    }

    pub fn sections(&self) -> Result<Vec<SectionEntry>, CliError> {
        self.section.iter().map(|s| parse_section(s)).collect()
    }
}

pub fn parse_page_range(text: &str) -> Result<(u32, u32), CliError> {
    let bad = || CliError::PageRange(text.to_string());
    let (start, end) = text.split_once('-').ok_or_else(bad)?;
    let start: u32 = start.trim().parse().map_err(|_| bad())?;
    let end: u32 = end.trim().parse().map_err(|_| bad())?;

    if start == 0 || start > end {
        return Err(bad());
    }
    Ok((start, end))
}

pub fn parse_section(text: &str) -> Result<SectionEntry, CliError> {
    let bad = || CliError::Section(text.to_string());
    let parts = text
        .split(':')
        .map(|p| p.trim().parse::<u32>().map_err(|_| bad()))
        .collect::<Result<Vec<_>, _>>()?;

    match parts[..] {
        [id, start, count] if start > 0 && count > 0 => Ok(SectionEntry::new(id, start, count)),
        _ => Err(bad()),
    }
}
