//! Caller-owned float image buffers passed to the denoiser.
//!
//! Pixels are interleaved, rows are tightly packed, and each pixel has `channels` floats. The
//! denoiser only reads and writes the first three channels; a fourth (alpha) is skipped.

use crate::Error;
use std::fmt;

/// Semantic role of an image in a filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageRole {
    Color,
    Albedo,
    Normal,
    Output,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageRole::Color => "color",
            ImageRole::Albedo => "albedo",
            ImageRole::Normal => "normal",
            ImageRole::Output => "output",
        })
    }
}

fn pixel_len(width: usize, height: usize, channels: usize) -> Option<usize> {
    width.checked_mul(height)?.checked_mul(channels)
}

fn check_len(len: usize, width: usize, height: usize, channels: usize) -> Result<(), Error> {
    let required = pixel_len(width, height, channels).unwrap_or(usize::MAX);
    if len < required {
        return Err(Error::BufferTooSmall { len, required });
    }
    Ok(())
}

/// Read-only view of a float image (color, albedo or normal input).
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    data: &'a [f32],
    width: usize,
    height: usize,
    channels: usize,
}

impl<'a> ImageView<'a> {
    /// Wraps `data` as a `width` x `height` image with `channels` floats per pixel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferTooSmall`] if `data` holds fewer than `width * height * channels`
    /// floats. The channel count itself is checked when denoising.
    pub fn new(data: &'a [f32], width: usize, height: usize, channels: usize) -> Result<Self, Error> {
        check_len(data.len(), width, height, channels)?;
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &'a [f32] {
        self.data
    }
}

/// Writable view of a float image (denoise output).
#[derive(Debug)]
pub struct ImageViewMut<'a> {
    data: &'a mut [f32],
    width: usize,
    height: usize,
    channels: usize,
}

impl<'a> ImageViewMut<'a> {
    /// Wraps `data` as a writable `width` x `height` image with `channels` floats per pixel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferTooSmall`] if `data` is too short.
    pub fn new(data: &'a mut [f32], width: usize, height: usize, channels: usize) -> Result<Self, Error> {
        check_len(data.len(), width, height, channels)?;
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &*self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut *self.data
    }

    /// Reborrows as a read-only view.
    pub fn as_view(&self) -> ImageView<'_> {
        ImageView {
            data: &*self.data,
            width: self.width,
            height: self.height,
            channels: self.channels,
        }
    }
}

/// Owned float image.
#[derive(Clone, Debug, PartialEq)]
pub struct Image {
    data: Vec<f32>,
    width: usize,
    height: usize,
    channels: usize,
}

impl Image {
    /// Creates a zero-filled image.
    ///
    /// # Panics
    ///
    /// Panics if `width * height * channels` overflows `usize`.
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        let len = pixel_len(width, height, channels)
            .unwrap_or_else(|| panic!("image size {}x{}x{} overflows usize", width, height, channels));
        Self {
            data: vec![0.0; len],
            width,
            height,
            channels,
        }
    }

    /// Takes ownership of interleaved pixel data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferTooSmall`] if `data` is too short. Extra trailing floats are kept
    /// but ignored.
    pub fn from_vec(data: Vec<f32>, width: usize, height: usize, channels: usize) -> Result<Self, Error> {
        check_len(data.len(), width, height, channels)?;
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Converts interleaved native-endian half-float (`f16`) pixel bytes to f32.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferTooSmall`] if `bytes` holds fewer than
    /// `width * height * channels` halves.
    pub fn from_f16_bytes(bytes: &[u8], width: usize, height: usize, channels: usize) -> Result<Self, Error> {
        // Byte buffers need not be 2-aligned, so no in-place cast.
        let bits: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_ne_bytes([c[0], c[1]]))
            .collect();
        check_len(bits.len(), width, height, channels)?;
        let data = bits[..width * height * channels]
            .iter()
            .map(|&b| half::f16::from_bits(b).to_f32())
            .collect();
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    /// Converts to native-endian half-float pixel bytes.
    pub fn to_f16_bytes(&self) -> Vec<u8> {
        let bits: Vec<u16> = self
            .as_slice()
            .iter()
            .map(|&v| half::f16::from_f32(v).to_bits())
            .collect();
        bytemuck::cast_slice(&bits).to_vec()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Pixel data, `width * height * channels` floats.
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.width * self.height * self.channels]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        let n = self.width * self.height * self.channels;
        &mut self.data[..n]
    }

    /// Raw bytes of the pixel data (native-endian f32).
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Channels of the pixel at (`x`, `y`). Panics when out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        assert!(x < self.width && y < self.height, "pixel ({}, {}) out of bounds", x, y);
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Borrows the pixel data, trimmed to `width * height * channels` floats.
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            data: self.as_slice(),
            width: self.width,
            height: self.height,
            channels: self.channels,
        }
    }

    pub fn view_mut(&mut self) -> ImageViewMut<'_> {
        let (width, height, channels) = (self.width, self.height, self.channels);
        ImageViewMut {
            data: self.as_mut_slice(),
            width,
            height,
            channels,
        }
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}
