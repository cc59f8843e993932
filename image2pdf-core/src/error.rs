use crate::pipeline::Stage;
use thiserror::Error;

/// Low-level errors raised while building, writing or reading PDF data.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;

/// Errors of the image-to-PDF conversion pipeline.
///
/// Input problems (`NoFilesProvided`, `InvalidFormat`, `DecodeFailure`) are
/// the caller's fault and carry a message that is safe to show to users.
/// `EncodeFailure` and `AssembleFailure` are internal faults.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("No files uploaded.")]
    NoFilesProvided,

    #[error("File '{filename}' is not a valid image format.")]
    InvalidFormat { filename: String },

    #[error("Failed to open image {filename}. Please check the file format.")]
    DecodeFailure { filename: String, reason: String },

    #[error("Failed to encode page for {filename}: {source}")]
    EncodeFailure {
        filename: String,
        #[source]
        source: PdfError,
    },

    #[error("Failed to assemble page fragment {index}: {source}")]
    AssembleFailure {
        index: usize,
        #[source]
        source: PdfError,
    },
}

impl ConvertError {
    /// True when the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ConvertError::NoFilesProvided
                | ConvertError::InvalidFormat { .. }
                | ConvertError::DecodeFailure { .. }
        )
    }

    /// Name of the offending upload, if the error concerns a single file.
    pub fn filename(&self) -> Option<&str> {
        match self {
            ConvertError::InvalidFormat { filename }
            | ConvertError::DecodeFailure { filename, .. }
            | ConvertError::EncodeFailure { filename, .. } => Some(filename),
            ConvertError::NoFilesProvided | ConvertError::AssembleFailure { .. } => None,
        }
    }

    /// The pipeline stage that failed to complete.
    pub fn stage(&self) -> Stage {
        match self {
            ConvertError::NoFilesProvided | ConvertError::InvalidFormat { .. } => Stage::Validated,
            ConvertError::DecodeFailure { .. } => Stage::Decoded,
            ConvertError::EncodeFailure { .. } => Stage::Encoded,
            ConvertError::AssembleFailure { .. } => Stage::Assembled,
        }
    }
}
