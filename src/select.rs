use log::warn;
use thiserror::Error;

use crate::rpt::page_table::PageTableEntry;
use crate::rpt::section::SectionEntry;

// Cap on ids listed when a section selection finds nothing
const AVAILABLE_SAMPLE: usize = 20;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectionError {
    #[error("none of the section ids {requested:?} exist, available: {available:?}")]
    NoMatch {
        requested: Vec<u32>,
        available: Vec<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    All,
    Range {
        start: u32,
        end: u32,
    },
    Sections(Vec<u32>),
}

impl Selection {
    /// Output subdirectory for this selection, `None` for the whole container
    pub fn dir_name(&self) -> Option<String> {
        match self {
            Selection::All => None,
            Selection::Range { start, end } => Some(format!("pages_{}-{}", start, end)),
            Selection::Sections(ids) if ids.len() == 1 => Some(format!("section_{}", ids[0])),
            Selection::Sections(ids) => Some(format!(
                "sections_{}",
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("_")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub pages: Vec<PageTableEntry>,
    /// Requested section ids not present in the container
    pub skipped: Vec<u32>,
}

pub fn select_range(pages: &[PageTableEntry], start: u32, end: u32) -> Vec<PageTableEntry> {
    let start = start.max(1);
    let end = end.min(pages.len() as u32);

    pages
        .iter()
        .filter(|p| p.page_number >= start && p.page_number <= end)
        .copied()
        .collect()
}

/// Pages of each requested section, in request order rather than page order
pub fn select_sections(
    pages: &[PageTableEntry],
    sections: &[SectionEntry],
    ids: &[u32],
) -> Result<Selected, SelectionError> {
    let mut selected = Vec::new();
    let mut skipped = Vec::new();
    let mut found = 0;

    for id in ids {
        match sections.iter().find(|s| s.section_id == *id) {
            Some(section) => {
                found += 1;
                selected.extend(select_range(pages, section.start_page, section.last_page()));
            }
            None => {
                warn!("section {} not in container, skipping", id);
                skipped.push(*id);
            }
        }
    }

    if found == 0 {
        return Err(SelectionError::NoMatch {
            requested: ids.to_vec(),
            available: sections
                .iter()
                .take(AVAILABLE_SAMPLE)
                .map(|s| s.section_id)
                .collect(),
        });
    }

    Ok(Selected {
        pages: selected,
        skipped,
    })
}

pub fn select(
    pages: &[PageTableEntry],
    sections: &[SectionEntry],
    selection: &Selection,
) -> Result<Selected, SelectionError> {
    match selection {
        Selection::All => Ok(Selected {
            pages: pages.to_vec(),
            skipped: Vec::new(),
        }),
        Selection::Range { start, end } => Ok(Selected {
            pages: select_range(pages, *start, *end),
            skipped: Vec::new(),
        }),
        Selection::Sections(ids) => select_sections(pages, sections, ids),
    }
}
