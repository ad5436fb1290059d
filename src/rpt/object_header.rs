//! Object Header page
//!
//! Containers that embed a binary document usually carry a metadata page as
//! page 1. It is plain single byte text:
//!
//! ```text
//! StorQM PLUS Object Header Page:
//! Object File Name: HKCIF001_016_20280309.PDF
//! Object File Timestamp: 2028/03/09 10:11:12
//! ```
use std::fs;
use std::io;
use std::path::Path;

use time::macros::format_description;
use time::OffsetDateTime;

pub const OBJECT_HEADER_PREFIX: &str = "StorQM PLUS Object Header Page:";
pub const FILENAME_KEY: &str = "Object File Name";
pub const TIMESTAMP_KEY: &str = "Object File Timestamp";

/// Key/value pairs of an Object Header page, in page order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectHeader {
    fields: Vec<(String, String)>,
}

impl ObjectHeader {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(FILENAME_KEY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // First occurrence wins
    fn insert(&mut self, key: &str, value: &str) {
        if self.get(key).is_none() {
            self.fields.push((key.to_string(), value.to_string()));
        }
    }
}

/// Metadata used to write an Object Header for a document being embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub filename: String,
    pub timestamp: String,
    pub extra: Vec<(String, String)>,
}

impl ObjectMetadata {
    pub fn new(filename: &str, timestamp: &str) -> Self {
        ObjectMetadata {
            filename: filename.to_string(),
            timestamp: timestamp.to_string(),
            extra: Vec::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.extra.push((key.to_string(), value.to_string()));
        self
    }

    /// Name and modification time of the document on disk
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let modified = OffsetDateTime::from(fs::metadata(path)?.modified()?);
        let timestamp = modified
            .format(format_description!(
                "[year]/[month]/[day] [hour]:[minute]:[second]"
            ))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        Ok(ObjectMetadata::new(&filename, &timestamp))
    }
}

fn latin1_decode(data: &[u8]) -> String {
    data.iter().map(|&b| b as char).collect()
}

fn latin1_encode(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// Parse page 1 as an Object Header, `None` if it isn't one
pub fn detect(page: &[u8]) -> Option<ObjectHeader> {
    let text = latin1_decode(page);
    if !text.contains(OBJECT_HEADER_PREFIX) {
        return None;
    }

    let mut header = ObjectHeader::default();
    for line in text.lines() {
        if line.contains(OBJECT_HEADER_PREFIX) {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let (key, value) = (key.trim(), value.trim());
            if !key.is_empty() && !value.is_empty() {
                header.insert(key, value);
            }
        }
    }
    Some(header)
}

pub fn generate(meta: &ObjectMetadata) -> Vec<u8> {
    let mut text = String::new();
    text.push_str(OBJECT_HEADER_PREFIX);
    text.push('\n');

    let fixed = [
        (FILENAME_KEY, meta.filename.as_str()),
        (TIMESTAMP_KEY, meta.timestamp.as_str()),
    ];
    let extra = meta.extra.iter().map(|(k, v)| (k.as_str(), v.as_str()));
    for (key, value) in fixed.into_iter().chain(extra) {
        text.push_str(key);
        text.push_str(": ");
        text.push_str(value);
        text.push('\n');
    }

    latin1_encode(&text)
}
