//! # image2pdf
//!
//! Combine PNG and JPEG images into a single multi-page PDF, in pure Rust
//! with no external PDF dependencies.
//!
//! ## Features
//!
//! - **All-or-nothing**: one invalid upload fails the whole conversion
//! - **One page per image**: each page is exactly the image's pixel size, in points
//! - **Any color mode in**: greyscale, palette, 16-bit and alpha images are
//!   converted to 8-bit RGB, transparency composited over a background color
//! - **Readable output**: a small parser reads documents back for inspection
//!   and page extraction
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image2pdf::{ConvertOptions, Converter, Upload};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let uploads = vec![
//!     Upload::from_path("scan-1.png")?,
//!     Upload::from_path("scan-2.jpg")?,
//! ];
//!
//! let converter = Converter::new(ConvertOptions::new().with_title("Scans"));
//! let document = converter.convert(&uploads)?;
//! println!("{} pages", document.page_count());
//! document.save("output.pdf")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! Each upload is validated by extension, decoded ([`decode`]), normalized to
//! RGB ([`color`]) and encoded as a standalone one-page PDF ([`page`]). The
//! fragments are then joined in upload order by the [`assemble`] module.

pub mod assemble;
pub mod color;
pub mod compression;
pub mod decode;
pub mod document;
pub mod error;
pub mod objects;
pub mod page;
pub mod parser;
pub mod pipeline;
pub mod writer;

pub use assemble::{extract_page, DocumentAssembler};
pub use color::{normalize, normalize_with_background, Background, NormalizedImage};
pub use decode::{validate_extension, DecodedImage, ImageKind, Upload, ALLOWED_EXTENSIONS};
pub use document::{decode_text_string, CreationDate, DocumentMetadata, OutputDocument};
pub use error::{ConvertError, PdfError, Result};
pub use page::{encode_page, PageFragment};
pub use parser::{PdfReader, ParsedPage};
pub use pipeline::{convert, ConvertOptions, Converter, Stage};

/// Current version of image2pdf
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(writer::PDF_VERSION, "1.7");
    }
}
