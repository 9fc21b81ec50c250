//! Camera frame source.
//!
//! `CameraSource` captures frames from a local camera device. Paths starting
//! with `stub://` select a synthetic source that needs no hardware.

use anyhow::Result;

#[cfg(feature = "ingest-v4l2")]
use super::v4l2::DeviceV4l2Source;
use crate::control::FrameSource;
use crate::frame::{Frame, PixelFormat};

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://<name>`.
    pub device: String,
    /// Target frame rate requested from the device.
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceV4l2Source),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::Device(DeviceV4l2Source::new(config)),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                anyhow::bail!(
                    "camera {} requires the ingest-v4l2 feature",
                    config.device
                )
            }
        }
    }

    /// Open the camera.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    /// Check if the source is healthy.
    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<Frame> {
        CameraSource::next_frame(self)
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    /// Produces single-channel frames, matching the monochrome sensor the
    /// robot ships with.
    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let width = self.config.width as usize;
        let pixel_count = width * self.config.height as usize;
        let pixels = (0..pixel_count)
            .map(|i| ((i % width + i / width + self.frame_count as usize) % 256) as u8)
            .collect();
        Ok(Frame::new(
            pixels,
            self.config.width,
            self.config.height,
            PixelFormat::Gray8,
        )?
        .with_sequence(self.frame_count))
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn stub_camera_produces_sequenced_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!(first.dimensions(), (64, 48));
        assert_eq!(first.format, PixelFormat::Gray8);
        assert_eq!(first.sequence, 1);
        assert_eq!(second.sequence, 2);
        assert_ne!(first.pixels(), second.pixels());
        assert_eq!(source.stats().frames_captured, 2);
        assert!(source.is_healthy());

        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_camera_requires_feature() {
        let config = CameraConfig::default();
        assert!(CameraSource::new(config).is_err());
    }
}
