//! End-to-end conversion of an ordered set of uploads into one document.
//!
//! Every upload goes through validation, decoding, normalization and page
//! encoding in upload order. The first failure aborts the whole request and
//! the fragments produced so far are dropped; assembly runs only once every
//! page has been encoded.

use crate::assemble::DocumentAssembler;
use crate::color::{normalize_with_background, Background};
use crate::decode::{decode, validate_extension, Upload};
use crate::document::{DocumentMetadata, OutputDocument};
use crate::error::ConvertError;
use crate::page::{encode_page, PageFragment};
use std::fmt;
use tracing::{debug, error, info, warn};

/// Progress of a request through the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Received,
    Validated,
    Decoded,
    Normalized,
    Encoded,
    Assembled,
    /// Written to storage; reached outside this crate
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Decoded => "decoded",
            Stage::Normalized => "normalized",
            Stage::Encoded => "encoded",
            Stage::Assembled => "assembled",
            Stage::Persisted => "persisted",
        };
        f.write_str(name)
    }
}

/// Options for a [`Converter`].
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Color that transparent pixels are composited over
    pub background: Background,
    /// Info dictionary of the output document
    pub metadata: DocumentMetadata,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background(mut self, background: Background) -> Self {
        self.background = background;
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.title = Some(title.into());
        self
    }
}

/// Runs the conversion pipeline. Holds only configuration, so one instance
/// can serve any number of requests.
#[derive(Debug, Clone, Default)]
pub struct Converter {
    options: ConvertOptions,
}

impl Converter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Convert `uploads`, in order, into one document with a page per upload.
    pub fn convert(&self, uploads: &[Upload]) -> Result<OutputDocument, ConvertError> {
        self.run(uploads).inspect_err(log_failure)
    }

    fn run(&self, uploads: &[Upload]) -> Result<OutputDocument, ConvertError> {
        debug!(files = uploads.len(), stage = %Stage::Received, "conversion started");
        if uploads.is_empty() {
            return Err(ConvertError::NoFilesProvided);
        }

        let mut fragments = Vec::with_capacity(uploads.len());
        for (index, upload) in uploads.iter().enumerate() {
            let fragment = self.convert_one(upload)?;
            info!(
                index,
                filename = %upload.filename,
                width = fragment.width(),
                height = fragment.height(),
                "converted image"
            );
            fragments.push(fragment);
        }

        let assembler = DocumentAssembler::with_metadata(self.options.metadata.clone());
        let document = assembler.assemble(&fragments)?;
        debug!(
            pages = document.page_count(),
            bytes = document.len(),
            stage = %Stage::Assembled,
            "conversion finished"
        );
        Ok(document)
    }

    fn convert_one(&self, upload: &Upload) -> Result<PageFragment, ConvertError> {
        let filename = upload.filename.as_str();

        validate_extension(filename)?;
        debug!(filename, stage = %Stage::Validated, "stage complete");

        let decoded = decode(&upload.data, filename)?;
        debug!(filename, stage = %Stage::Decoded, "stage complete");

        let normalized = normalize_with_background(decoded, self.options.background);
        debug!(filename, stage = %Stage::Normalized, "stage complete");

        let fragment = encode_page(&normalized)?;
        debug!(filename, stage = %Stage::Encoded, "stage complete");

        Ok(fragment)
    }
}

fn log_failure(err: &ConvertError) {
    let filename = err.filename().unwrap_or("-");
    let stage = err.stage();
    if err.is_client_error() {
        warn!(filename, %stage, "conversion rejected: {err}");
    } else {
        error!(filename, %stage, "conversion failed: {err}");
    }
}

/// Convert with default options.
pub fn convert(uploads: &[Upload]) -> Result<OutputDocument, ConvertError> {
    Converter::default().convert(uploads)
}
