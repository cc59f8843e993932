//! The finished multi-page document and the metadata written into it.

use crate::error::Result;
use crate::objects::{Dictionary, Object};
use crate::parser::{ParseResult, PdfReader};
use crate::writer::format_pdf_date;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Which creation date goes into the Info dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreationDate {
    /// No `CreationDate` or `ModDate` entries.
    Omitted,
    /// The moment the document is assembled.
    #[default]
    AtAssembly,
    Fixed(DateTime<Utc>),
}

impl CreationDate {
    fn resolve(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            CreationDate::Omitted => None,
            CreationDate::AtAssembly => Some(now),
            CreationDate::Fixed(date) => Some(date),
        }
    }
}

/// Contents of the output document's Info dictionary.
#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub producer: Option<String>,
    pub creation_date: CreationDate,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: None,
            producer: Some(format!("image2pdf {}", crate::VERSION)),
            creation_date: CreationDate::AtAssembly,
        }
    }
}

impl DocumentMetadata {
    /// Metadata with no entries at all; the Info dictionary is left empty.
    pub fn empty() -> Self {
        Self {
            title: None,
            producer: None,
            creation_date: CreationDate::Omitted,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_creation_date(mut self, date: DateTime<Utc>) -> Self {
        self.creation_date = CreationDate::Fixed(date);
        self
    }

    /// Info dictionary for a document assembled now.
    pub(crate) fn to_info_dictionary(&self) -> Dictionary {
        self.info_dictionary_at(Utc::now())
    }

    pub(crate) fn info_dictionary_at(&self, now: DateTime<Utc>) -> Dictionary {
        let mut info = Dictionary::new();
        if let Some(ref title) = self.title {
            info.set("Title", Object::String(encode_text_string(title)));
        }
        if let Some(ref producer) = self.producer {
            info.set("Producer", Object::String(encode_text_string(producer)));
        }
        if let Some(date) = self.creation_date.resolve(now) {
            let date = format_pdf_date(date);
            info.set("CreationDate", Object::from(date.as_str()));
            info.set("ModDate", Object::from(date));
        }
        info
    }
}

/// Bytes of a PDF text string: ASCII as is, anything else as UTF-16BE with
/// a byte order mark.
pub fn encode_text_string(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    bytes
}

/// Inverse of [`encode_text_string`]. Strings without a UTF-16 byte order
/// mark are read as UTF-8, lossily.
pub fn decode_text_string(bytes: &[u8]) -> String {
    match bytes.strip_prefix(&[0xFE, 0xFF]) {
        Some(utf16) => {
            let units: Vec<u16> = utf16
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair.get(1).copied().unwrap_or(0)]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        None => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// A complete multi-page PDF produced from one set of uploads.
#[derive(Debug, Clone)]
pub struct OutputDocument {
    bytes: Vec<u8>,
    page_count: usize,
}

impl OutputDocument {
    pub(crate) fn new(bytes: Vec<u8>, page_count: usize) -> Self {
        Self { bytes, page_count }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Open the document for inspection.
    pub fn reader(&self) -> ParseResult<PdfReader<'_>> {
        PdfReader::new(&self.bytes)
    }

    /// Write the document to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}
