use std::fmt;
use std::path::Path;

use crate::rpt::object_header::ObjectHeader;

pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

// MO:DCA structured field introducer
pub const AFP_INTRODUCER: u8 = 0x5A;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Afp,
    Unknown,
}

impl DocumentFormat {
    pub fn label(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Afp => "AFP",
            DocumentFormat::Unknown => "unknown",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Pdf => ".pdf",
            DocumentFormat::Afp => ".afp",
            DocumentFormat::Unknown => ".bin",
        }
    }

    fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("pdf") {
            Some(DocumentFormat::Pdf)
        } else if ext.eq_ignore_ascii_case("afp") {
            Some(DocumentFormat::Afp)
        } else {
            None
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledDocument {
    pub data: Vec<u8>,
    pub filename: String,
    pub format: DocumentFormat,
}

/// Magic bytes first, the Object Header filename only as a fallback
pub fn classify(data: &[u8], header: Option<&ObjectHeader>) -> DocumentFormat {
    if data.starts_with(PDF_MAGIC) {
        return DocumentFormat::Pdf;
    }
    if data.first() == Some(&AFP_INTRODUCER) {
        return DocumentFormat::Afp;
    }
    header
        .and_then(|h| h.filename())
        .and_then(DocumentFormat::from_filename)
        .unwrap_or(DocumentFormat::Unknown)
}

/// Last component of a name read from a container, `None` when nothing
/// usable is left. Directories and `..` never survive.
pub fn safe_file_name(name: &str) -> Option<&str> {
    let name = name.trim().rsplit(['/', '\\']).next()?;
    match Path::new(name).file_name()?.to_str()? {
        "" | "." | ".." => None,
        name => Some(name),
    }
}

/// Join fragments into the embedded document.
///
/// Fragment indices come out of the container's own table and must run
/// 1..=N without gaps once sorted, anything else is a bug in the caller.
pub fn assemble(
    mut fragments: Vec<(u32, Vec<u8>)>,
    header: Option<&ObjectHeader>,
    fallback_base_name: &str,
) -> AssembledDocument {
    fragments.sort_by_key(|(index, _)| *index);
    for (expected, (index, _)) in (1..).zip(fragments.iter()) {
        assert_eq!(*index, expected, "binary fragments must be contiguous from 1");
    }

    let mut data = Vec::with_capacity(fragments.iter().map(|(_, f)| f.len()).sum());
    for (_, fragment) in fragments {
        data.extend_from_slice(&fragment);
    }

    let format = classify(&data, header);
    let filename = match header.and_then(|h| h.filename()).and_then(safe_file_name) {
        Some(name) => name.to_string(),
        None => format!("{}_binary{}", fallback_base_name, format.extension()),
    };

    AssembledDocument {
        data,
        filename,
        format,
    }
}
