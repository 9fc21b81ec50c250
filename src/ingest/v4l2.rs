//! V4L2 capture for real camera devices.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::camera::{CameraConfig, CameraStats};
use crate::frame::{Frame, PixelFormat};

pub(crate) struct DeviceV4l2Source {
    config: CameraConfig,
    state: Option<DeviceV4l2State>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    active_format: PixelFormat,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl DeviceV4l2Source {
    pub(crate) fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            active_format: PixelFormat::Rgb24,
            config,
            state: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    pub(crate) fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        // Devices that refuse RGB keep their native layout; the engine converts.
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.active_format = pixel_format_for(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "unsupported v4l2 pixel format {} on {}",
                String::from_utf8_lossy(&format.fourcc.repr),
                self.config.device
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.active_format
        );
        Ok(())
    }

    pub(crate) fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;

        let expected = self
            .active_format
            .frame_len(self.active_width, self.active_height)
            .ok_or_else(|| anyhow!("v4l2 frame dimensions overflow"))?;
        let used = (meta.bytesused as usize).min(buf.len());
        if used < expected {
            return Err(anyhow!("short v4l2 frame: {} of {} bytes", used, expected));
        }
        let pixels = buf[..expected].to_vec();

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Ok(Frame::new(
            pixels,
            self.active_width,
            self.active_height,
            self.active_format,
        )?
        .with_sequence(self.frame_count))
    }

    pub(crate) fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    pub(crate) fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

fn pixel_format_for(fourcc: &[u8; 4]) -> Option<PixelFormat> {
    match fourcc {
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"GREY" => Some(PixelFormat::Gray8),
        b"NV12" => Some(PixelFormat::Nv12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_supported_fourccs() {
        assert_eq!(pixel_format_for(b"RGB3"), Some(PixelFormat::Rgb24));
        assert_eq!(pixel_format_for(b"GREY"), Some(PixelFormat::Gray8));
        assert_eq!(pixel_format_for(b"NV12"), Some(PixelFormat::Nv12));
        assert_eq!(pixel_format_for(b"MJPG"), None);
    }
}
