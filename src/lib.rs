//! Litter Picker controller
//!
//! This crate turns camera frames into pick actions on a mobile robot. A
//! detection model looks for litter in each frame; when something is found the
//! controller drives the actuator microcontroller over a serial link through
//! approach, stop, pick and release.
//!
//! # Architecture
//!
//! - `ingest`: camera sources (synthetic `stub://`, V4L2 devices) and pixel normalization
//! - `detect`: `DetectionEngine` over a pluggable `DetectorBackend`, label maps
//! - `transport`: the `SerialTransport` byte/line channel and its implementations
//! - `actuator`: the single-byte command protocol spoken to the microcontroller
//! - `control`: the detection-to-actuation state machine
//! - `config`: daemon configuration (file + environment)
//!
//! Data flows one way per cycle: frame → detections → commands. The only
//! value flowing back is the ultrasonic distance reading.

pub mod actuator;
pub mod config;
pub mod control;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod transport;

pub use actuator::{ActuatorProtocol, Command, DistanceReading};
pub use control::{
    ControlLoop, ControlState, CycleReport, FixedDwell, FrameSource, LogOverlay, LoopStats,
    MechanicalCompletion, Overlay, DEFAULT_DWELL, PROXIMITY_THRESHOLD_CM,
};
pub use detect::{
    BoundingBox, DetectError, Detection, DetectionEngine, DetectorBackend, InputSpec, LabelMap,
    StubBackend, DETECTION_THRESHOLD,
};
pub use frame::{Frame, PixelFormat};
pub use ingest::{CameraConfig, CameraSource};
#[cfg(feature = "serial")]
pub use transport::{SerialConfig, SerialPortTransport};
pub use transport::{LinkError, Reply, ScriptedLink, SerialTransport};
