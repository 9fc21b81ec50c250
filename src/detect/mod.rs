mod backend;
mod backends;
mod engine;
mod labels;
mod result;

pub use backend::{DetectorBackend, InputSpec, InputType};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use engine::{DetectError, DetectionEngine, DETECTION_THRESHOLD};
pub use labels::LabelMap;
pub use result::{BoundingBox, Detection};
