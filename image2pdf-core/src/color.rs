//! Conversion of decoded images to 8-bit RGB.

use crate::decode::DecodedImage;
use image::{DynamicImage, Rgb, RgbImage, Rgba};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Color that transparent pixels are composited over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Background {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Background {
    pub const WHITE: Background = Background::rgb(255, 255, 255);
    pub const BLACK: Background = Background::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl Default for Background {
    fn default() -> Self {
        Self::WHITE
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid background color '{0}': expected white, black, or a hex triplet like #ffcc00")]
pub struct ParseBackgroundError(String);

impl FromStr for Background {
    type Err = ParseBackgroundError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "white" => return Ok(Self::WHITE),
            "black" => return Ok(Self::BLACK),
            _ => {}
        }

        let hex = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ParseBackgroundError(s.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ParseBackgroundError(s.to_string()))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// An image guaranteed to be 8-bit RGB, `width * height * 3` bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    filename: String,
    image: RgbImage,
}

impl NormalizedImage {
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Interleaved RGB samples, row by row from the top.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Convert to RGB, compositing any alpha over white.
pub fn normalize(image: DecodedImage) -> NormalizedImage {
    normalize_with_background(image, Background::WHITE)
}

/// Convert to RGB, compositing any alpha over `background`.
pub fn normalize_with_background(image: DecodedImage, background: Background) -> NormalizedImage {
    let (filename, image) = image.into_parts();
    let source = image.color();

    let rgb = match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other if other.color().has_alpha() => composite(other, background),
        other => other.into_rgb8(),
    };

    debug!(filename = %filename, ?source, %background, "normalized to RGB8");
    NormalizedImage {
        filename,
        image: rgb,
    }
}

fn composite(image: DynamicImage, background: Background) -> RgbImage {
    let rgba = image.into_rgba8();
    let bg = [background.r, background.g, background.b];

    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as u32;
        let blend = |channel: u8, bg: u8| {
            ((channel as u32 * alpha + bg as u32 * (255 - alpha) + 127) / 255) as u8
        };
        Rgb([blend(r, bg[0]), blend(g, bg[1]), blend(b, bg[2])])
    })
}
