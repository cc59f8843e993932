//! Single-page PDF fragments, one per normalized image.

use crate::color::NormalizedImage;
use crate::document::DocumentMetadata;
use crate::error::{ConvertError, Result};
use crate::objects::{Dictionary, Object, ObjectId, Stream};
use crate::writer::PdfWriter;
use std::fmt::Write as _;
use tracing::debug;

/// Resource name of the page's only image.
pub const IMAGE_RESOURCE_NAME: &str = "Im0";

const CATALOG_ID: ObjectId = ObjectId::new(1, 0);
const PAGES_ID: ObjectId = ObjectId::new(2, 0);
const PAGE_ID: ObjectId = ObjectId::new(3, 0);
const CONTENT_ID: ObjectId = ObjectId::new(4, 0);
const IMAGE_ID: ObjectId = ObjectId::new(5, 0);
const INFO_ID: ObjectId = ObjectId::new(6, 0);

/// A complete one-page PDF holding one image at one point per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFragment {
    filename: String,
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl PageFragment {
    pub(crate) fn new(filename: impl Into<String>, width: u32, height: u32, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            width,
            height,
            bytes,
        }
    }

    /// Name of the upload the page was made from.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Page width in points.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Page height in points.
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Render `image` as a standalone single-page PDF.
pub fn encode_page(image: &NormalizedImage) -> std::result::Result<PageFragment, ConvertError> {
    let bytes = write_fragment(image).map_err(|source| ConvertError::EncodeFailure {
        filename: image.filename().to_string(),
        source,
    })?;

    debug!(
        filename = image.filename(),
        width = image.width(),
        height = image.height(),
        bytes = bytes.len(),
        "encoded page"
    );
    Ok(PageFragment::new(
        image.filename(),
        image.width(),
        image.height(),
        bytes,
    ))
}

fn write_fragment(image: &NormalizedImage) -> Result<Vec<u8>> {
    let (width, height) = (image.width(), image.height());

    let mut writer = PdfWriter::new_with_writer(Vec::new());
    writer.write_header()?;

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::name("Catalog"));
    catalog.set("Pages", PAGES_ID);
    writer.write_object(CATALOG_ID, &catalog.into())?;

    let mut pages = Dictionary::new();
    pages.set("Type", Object::name("Pages"));
    pages.set("Kids", vec![Object::from(PAGE_ID)]);
    pages.set("Count", 1);
    writer.write_object(PAGES_ID, &pages.into())?;

    let mut xobjects = Dictionary::new();
    xobjects.set(IMAGE_RESOURCE_NAME, IMAGE_ID);
    let mut resources = Dictionary::new();
    resources.set("XObject", xobjects);

    let mut page = Dictionary::new();
    page.set("Type", Object::name("Page"));
    page.set("Parent", PAGES_ID);
    page.set(
        "MediaBox",
        vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::from(width),
            Object::from(height),
        ],
    );
    page.set("Resources", resources);
    page.set("Contents", CONTENT_ID);
    writer.write_object(PAGE_ID, &page.into())?;

    let mut content = Stream::new(content_stream(width, height).into_bytes());
    content.compress_flate()?;
    writer.write_object(CONTENT_ID, &content.into())?;

    writer.write_object(IMAGE_ID, &image_xobject(image)?.into())?;

    // Fragments carry no producer or date so identical images give identical bytes
    let info = DocumentMetadata::empty().to_info_dictionary();
    writer.write_object(INFO_ID, &info.into())?;

    writer.finish(CATALOG_ID, Some(INFO_ID))
}

/// Scale the unit-square image to cover the whole page.
fn content_stream(width: u32, height: u32) -> String {
    let mut ops = String::new();
    let _ = writeln!(ops, "q");
    let _ = writeln!(ops, "{width} 0 0 {height} 0 0 cm");
    let _ = writeln!(ops, "/{IMAGE_RESOURCE_NAME} Do");
    let _ = writeln!(ops, "Q");
    ops
}

fn image_xobject(image: &NormalizedImage) -> Result<Stream> {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::name("XObject"));
    dict.set("Subtype", Object::name("Image"));
    dict.set("Width", image.width());
    dict.set("Height", image.height());
    dict.set("ColorSpace", Object::name("DeviceRGB"));
    dict.set("BitsPerComponent", 8);

    let mut stream = Stream::with_dictionary(dict, image.pixels().to_vec());
    stream.compress_flate()?;
    Ok(stream)
}
