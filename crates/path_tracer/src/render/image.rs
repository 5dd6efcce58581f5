//! Linear RGBA float images
//!
//! Images exchanged with the shading program and kept as accumulation
//! history. Pixels are stored row-major, bottom row first, matching the
//! bottom-left origin of the viewport's normalised screen coordinates.

use std::path::Path;

use super::{RenderError, RenderResult};

/// RGBA pixel in linear float space
pub type Pixel = [f32; 4];

/// Owned linear RGBA float image
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<Pixel>,
}

impl Image {
    /// Create a black, fully transparent image
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, [0.0; 4])
    }

    /// Create an image with every pixel set to `color`
    pub fn filled(width: u32, height: u32, color: Pixel) -> Self {
        Self {
            width,
            height,
            pixels: vec![color; width as usize * height as usize],
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the image has no pixels
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// All pixels, row-major from the bottom row
    pub fn pixels(&self) -> &[Pixel] {
        &self.pixels
    }

    /// All pixels, mutable
    pub fn pixels_mut(&mut self) -> &mut [Pixel] {
        &mut self.pixels
    }

    /// Pixel at (x, y), `None` when out of bounds
    pub fn pixel(&self, x: u32, y: u32) -> Option<Pixel> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Overwrite the pixel at (x, y); out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: Pixel) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = color;
        }
    }

    /// Set every pixel to `color`
    pub fn fill(&mut self, color: Pixel) {
        self.pixels.fill(color);
    }

    /// Reallocate to a new size, discarding the contents
    pub fn reallocate(&mut self, width: u32, height: u32) {
        *self = Self::new(width, height);
    }

    /// Copy `source` into this image, resampling when sizes differ
    ///
    /// Every destination pixel is written. Sizes that differ use
    /// nearest-neighbour sampling; an empty source clears to black.
    pub fn blit_from(&mut self, source: &Image) {
        if source.dimensions() == self.dimensions() {
            self.pixels.copy_from_slice(&source.pixels);
            return;
        }
        if source.is_empty() {
            self.fill([0.0; 4]);
            return;
        }

        let (sw, sh) = (u64::from(source.width), u64::from(source.height));
        let (dw, dh) = (u64::from(self.width), u64::from(self.height));
        for y in 0..self.height {
            let sy = (u64::from(y) * sh / dh) as usize;
            for x in 0..self.width {
                let sx = (u64::from(x) * sw / dw) as usize;
                let value = source.pixels[sy * source.width as usize + sx];
                let i = y as usize * self.width as usize + x as usize;
                self.pixels[i] = value;
            }
        }
    }

    /// Require both images to have the same dimensions
    pub fn ensure_same_size(&self, other: &Image) -> RenderResult<()> {
        if self.dimensions() == other.dimensions() {
            Ok(())
        } else {
            Err(RenderError::SizeMismatch {
                expected: self.dimensions(),
                actual: other.dimensions(),
            })
        }
    }

    /// Convert to 8-bit RGBA, top row first, clamping to `[0, 1]`
    pub fn to_rgba8(&self) -> ::image::RgbaImage {
        ::image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            let source_y = self.height - 1 - y;
            let p = self.pixels[source_y as usize * self.width as usize + x as usize];
            ::image::Rgba(p.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
        })
    }

    /// Write the image as an 8-bit PNG
    pub fn save_png(&self, path: impl AsRef<Path>) -> RenderResult<()> {
        let path = path.as_ref();
        self.to_rgba8()
            .save_with_format(path, ::image::ImageFormat::Png)
            .map_err(|e| RenderError::Output(format!("{}: {e}", path.display())))?;
        log::info!("Wrote {}x{} image to {}", self.width, self.height, path.display());
        Ok(())
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.width as usize + x as usize)
    }
}
