//! Camera frames.
//!
//! A `Frame` is produced by a capture source and consumed by the detection
//! engine within the same control cycle. Frames are never retained across
//! cycles.

use anyhow::{anyhow, Result};

/// Pixel layouts a capture source may deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit single channel.
    Gray8,
    /// Packed 8-bit RGB.
    Rgb24,
    /// Y plane followed by interleaved UV at quarter resolution. Width and
    /// height must be even.
    Nv12,
}

impl PixelFormat {
    /// Expected buffer length for a frame of the given size.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let plane = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Gray8 => Some(plane),
            PixelFormat::Rgb24 => plane.checked_mul(3),
            PixelFormat::Nv12 => plane.checked_add(plane / 2),
        }
    }
}

/// One captured frame.
#[derive(Clone, Debug)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture sequence number assigned by the source.
    pub sequence: u64,
}

impl Frame {
    /// Wrap a pixel buffer, checking its length against the declared layout.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        if format == PixelFormat::Nv12 && (width % 2 != 0 || height % 2 != 0) {
            return Err(anyhow!(
                "NV12 frame {}x{} must have even dimensions",
                width,
                height
            ));
        }
        let expected = format
            .frame_len(width, height)
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "{:?} frame {}x{} expects {} bytes, received {}",
                format,
                width,
                height,
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            format,
            sequence: 0,
        })
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
