//! Upload validation and raster decoding.
//!
//! The declared filename decides whether an upload is accepted at all; the
//! bytes decide how it is decoded. A PNG named `photo.jpg` is accepted and
//! decodes as PNG, while a valid PNG named `photo.gif` is rejected unread.

use crate::error::ConvertError;
use image::{ColorType, DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// Accepted filename extensions, compared case-insensitively.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One uploaded file: the name the client gave it and its raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub filename: String,
    pub data: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, using its file name as the declared filename.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { filename, data })
    }
}

/// Image kind implied by the declared extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

/// Check the declared filename against [`ALLOWED_EXTENSIONS`].
pub fn validate_extension(filename: &str) -> Result<ImageKind, ConvertError> {
    let lower = filename.to_ascii_lowercase();
    let extension = lower.rsplit_once('.').map(|(_, ext)| ext);
    match extension {
        Some("png") => Ok(ImageKind::Png),
        Some("jpg") | Some("jpeg") => Ok(ImageKind::Jpeg),
        _ => Err(ConvertError::InvalidFormat {
            filename: filename.to_string(),
        }),
    }
}

/// A decoded raster image, in whatever color mode the file used.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    filename: String,
    format: Option<ImageFormat>,
    image: DynamicImage,
}

impl DecodedImage {
    /// Wrap an already decoded image.
    pub fn new(filename: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            filename: filename.into(),
            format: None,
            image,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Format sniffed from the file contents.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn color_type(&self) -> ColorType {
        self.image.color()
    }

    pub fn channel_count(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// Raw interleaved samples in native endianness.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub(crate) fn into_parts(self) -> (String, DynamicImage) {
        (self.filename, self.image)
    }
}

/// Validate `declared_filename` and decode `bytes` into pixels.
pub fn decode(bytes: &[u8], declared_filename: &str) -> Result<DecodedImage, ConvertError> {
    validate_extension(declared_filename)?;

    let decode_failure = |reason: String| ConvertError::DecodeFailure {
        filename: declared_filename.to_string(),
        reason,
    };

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_failure(e.to_string()))?;
    let format = reader.format();
    let image = reader.decode().map_err(|e| decode_failure(e.to_string()))?;

    if image.width() == 0 || image.height() == 0 {
        return Err(decode_failure("image has no pixels".to_string()));
    }

    debug!(
        filename = declared_filename,
        ?format,
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded image"
    );

    Ok(DecodedImage {
        filename: declared_filename.to_string(),
        format,
        image,
    })
}
