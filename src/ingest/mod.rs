//! Frame ingestion sources.
//!
//! This module provides the camera sources the control loop pulls from:
//! - USB/CSI cameras through V4L2 (feature: ingest-v4l2)
//! - Synthetic `stub://` source (testing, dry runs)
//!
//! Sources hand out one `Frame` per call and keep nothing after the handoff.
//! Colorspace conversion and resizing for inference happen in the detection
//! engine, not here.

mod camera;
pub(crate) mod normalize;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use camera::{CameraConfig, CameraSource, CameraStats};
