//! PDF Parser Module
//!
//! A compact reader for documents with a classic cross-reference table, which
//! is what [`crate::writer::PdfWriter`] produces. It is used to re-open page
//! fragments during assembly and to inspect finished documents.

pub mod lexer;
pub mod objects;
pub mod reader;

use crate::error::PdfError;

pub use self::reader::{PageImage, ParsedPage, PdfReader};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid PDF header")]
    InvalidHeader,

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Object {0} {1} R not found")]
    MissingObject(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref table")]
    InvalidXRef,

    #[error("Unsupported cross-reference format: {0}")]
    UnsupportedXRef(String),

    #[error("Circular reference detected")]
    CircularReference,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),
}

impl From<ParseError> for PdfError {
    fn from(err: ParseError) -> Self {
        PdfError::ParseError(err.to_string())
    }
}
