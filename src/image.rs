//! Image decoding, sampling and drawing.
//!
//! This module provides:
//!
//! - The [`Image`] type, an owned RGBA image that can be decoded from JPEG or PNG data.
//! - [`Resolution`], the size of an image or network input.
//! - [`RotatedRect`], used to describe which part of an image a neural network looks at.
//! - A few [`draw`] functions to render text and filled rectangles.

pub mod draw;
mod rect;

#[cfg(test)]
mod tests;

use std::{fmt, io::Cursor, ops::Index, path::Path};

use anyhow::Context;
use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgba, RgbaImage};

pub use rect::RotatedRect;

/// The encoded image formats that can be decoded into an [`Image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("jpg" | "jpeg" | "JPG" | "JPEG") => Ok(Self::Jpeg),
            Some("png" | "PNG") => Ok(Self::Png),
            _ => anyhow::bail!(
                "invalid image path '{}' (must have one of the supported extensions)",
                path.display()
            ),
        }
    }

    fn to_image_crate(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// An 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    pub(crate) buf: RgbaImage,
}

impl Image {
    /// Loads an image from the filesystem.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn load<A: AsRef<Path>>(path: A) -> anyhow::Result<Self> {
        Self::load_impl(path.as_ref())
    }

    fn load_impl(path: &Path) -> anyhow::Result<Self> {
        let format = ImageFormat::from_path(path)?;
        let data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Self::decode(&data, format)
    }

    /// Decodes an image of the given `format` from a byte slice.
    ///
    /// Returns an error if `data` is malformed, truncated, or not actually encoded as `format`.
    pub fn decode(data: &[u8], format: ImageFormat) -> anyhow::Result<Self> {
        let buf = image::load_from_memory_with_format(data, format.to_image_crate())?.to_rgba8();
        Ok(Self { buf })
    }

    /// Decodes a JPEG or PNG image, detecting the format from the data itself.
    pub fn decode_any(data: &[u8]) -> anyhow::Result<Self> {
        let buf = image::load_from_memory(data)?.to_rgba8();
        Ok(Self { buf })
    }

    /// Encodes the image as `format`.
    ///
    /// JPEG does not support transparency, so the alpha channel is dropped when encoding JPEGs.
    pub fn encode(&self, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut cursor = Cursor::new(&mut out);
        match format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(self.buf.clone()).to_rgb8();
                DynamicImage::ImageRgb8(rgb).write_to(&mut cursor, ImageOutputFormat::Jpeg(90))?;
            }
            ImageFormat::Png => {
                DynamicImage::ImageRgba8(self.buf.clone())
                    .write_to(&mut cursor, ImageOutputFormat::Png)?;
            }
        }
        Ok(out)
    }

    /// Saves an image to the file system.
    ///
    /// The path must have a supported file extension (`jpeg`, `jpg` or `png`).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.save_impl(path.as_ref())
    }

    fn save_impl(&self, path: &Path) -> anyhow::Result<()> {
        let data = self.encode(ImageFormat::from_path(path)?)?;
        std::fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
    }

    /// Creates an empty image of a specified size.
    ///
    /// The image will start out black and fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buf: ImageBuffer::new(width, height),
        }
    }

    /// Creates an image of a specified size, computing each pixel's color with `f(x, y)`.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> Color) -> Self {
        Self {
            buf: ImageBuffer::from_fn(width, height, |x, y| Rgba(f(x, y).0)),
        }
    }

    /// Returns the width of this image, in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    /// Returns the height of this image, in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    /// Returns the size of this image.
    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Gets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Sets the image color at the given pixel coordinates.
    ///
    /// # Panics
    ///
    /// This will panic if `(x, y)` is outside the bounds of this image.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        self.buf[(x, y)] = Rgba(color.0);
    }

    /// Samples the color closest to the continuous image coordinate `(x, y)`.
    ///
    /// Pixel `(0, 0)` covers the area from `(0.0, 0.0)` to `(1.0, 1.0)`. Coordinates outside of
    /// the image yield [`Color::NULL`].
    pub fn sample(&self, x: f32, y: f32) -> Color {
        if !(x >= 0.0 && y >= 0.0) {
            return Color::NULL;
        }
        let (x, y) = (x.floor(), y.floor());
        if x >= self.width() as f32 || y >= self.height() as f32 {
            return Color::NULL;
        }
        self.get(x as u32, y as u32)
    }

    /// Clears the image, setting every pixel value to `color`.
    pub fn clear(&mut self, color: Color) {
        self.buf.pixels_mut().for_each(|pix| pix.0 = color.0);
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} Image", self.width(), self.height())
    }
}

/// Resolution (`width x height`) of an image or neural network input.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    width: u32,
    height: u32,
}

impl Resolution {
    /// Creates a new [`Resolution`] of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns the width of this [`Resolution`].
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of this [`Resolution`].
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// An 8-bit RGBA color.
///
/// Colors are always in the sRGB color space and use non-premultiplied alpha.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Fully transparent black (all components are 0).
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self([0, 0, 0, 255]);
    pub const WHITE: Self = Self([255, 255, 255, 255]);
    pub const RED: Self = Self([255, 0, 0, 255]);
    pub const GREEN: Self = Self([0, 255, 0, 255]);
    pub const BLUE: Self = Self([0, 0, 255, 255]);

    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{:02x}{:02x}{:02x}{:02x}",
            self.r(),
            self.g(),
            self.b(),
            self.a(),
        )
    }
}

impl Index<usize> for Color {
    type Output = u8;

    #[inline]
    fn index(&self, index: usize) -> &u8 {
        &self.0[index]
    }
}

// Lets `Color` be used directly with `embedded-graphics` styles in `draw`.
impl PixelColor for Color {
    type Raw = RawU32;
}
