use anyhow::{Context, Result};
use thiserror::Error;

use super::backend::DetectorBackend;
use super::labels::LabelMap;
use super::result::{BoundingBox, Detection};
use crate::frame::Frame;
use crate::ingest::normalize::{normalize_to_rgb, resize_rgb};

/// Detections at or below this score are discarded.
pub const DETECTION_THRESHOLD: f32 = 0.5;

/// Number of output tensors an SSD-style model must produce.
const EXPECTED_OUTPUTS: usize = 4;

/// Errors that indicate a broken model deployment rather than a bad frame.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("inference backend failure: {0}")]
    InferenceBackendFailure(String),
}

/// Turns frames into detections using a `DetectorBackend`.
///
/// Each call is independent: the engine keeps no history between frames, and
/// the returned list belongs to the caller.
pub struct DetectionEngine {
    backend: Box<dyn DetectorBackend>,
    labels: Option<LabelMap>,
}

impl DetectionEngine {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
            labels: None,
        }
    }

    /// Attach a label map used to name detected classes.
    pub fn with_labels(mut self, labels: LabelMap) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.backend.warm_up()
    }

    /// Run detection on one frame.
    ///
    /// The frame is converted to RGB and resized to the model input; boxes
    /// come back in the frame's own pixel coordinates.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let spec = self.backend.input_spec();
        let rgb = normalize_to_rgb(frame).context("normalize frame to RGB")?;
        let input = resize_rgb(&rgb, frame.width, frame.height, spec.width, spec.height)
            .context("resize frame to model input")?;

        let outputs = self
            .backend
            .infer(&input)
            .with_context(|| format!("{} inference failed", self.backend.name()))?;
        let detections = assemble_detections(
            &outputs,
            spec.dimensions(),
            frame.dimensions(),
            self.labels.as_ref(),
        )?;

        for detection in &detections {
            log::debug!(
                "{} score = {:.2}",
                detection.display_name(),
                detection.score
            );
        }
        Ok(detections)
    }
}

/// Assemble detections from raw SSD outputs.
///
/// Box, class and score for detection `i` all come from index `i` of their
/// respective outputs. Boxes are placed in inference space first and then
/// rescaled to the original frame.
pub(crate) fn assemble_detections(
    outputs: &[Vec<f32>],
    inference: (u32, u32),
    original: (u32, u32),
    labels: Option<&LabelMap>,
) -> Result<Vec<Detection>, DetectError> {
    let [boxes, classes, scores, count] = outputs else {
        return Err(DetectError::InferenceBackendFailure(format!(
            "expected {} output tensors (boxes, classes, scores, count), got {}",
            EXPECTED_OUTPUTS,
            outputs.len()
        )));
    };

    let count = match count.first() {
        Some(&c) if c.is_finite() && c >= 0.0 => c as usize,
        other => {
            return Err(DetectError::InferenceBackendFailure(format!(
                "invalid detection count {:?}",
                other
            )))
        }
    };
    if boxes.len() / 4 < count || classes.len() < count || scores.len() < count {
        return Err(DetectError::InferenceBackendFailure(format!(
            "count {} exceeds outputs (boxes={}, classes={}, scores={})",
            count,
            boxes.len() / 4,
            classes.len(),
            scores.len()
        )));
    }

    let detections = boxes
        .chunks_exact(4)
        .zip(classes)
        .zip(scores)
        .take(count)
        .filter(|(_, score)| **score > DETECTION_THRESHOLD)
        .map(|((tlbr, &class), &score)| {
            let class_id = class as i32;
            let bbox = BoundingBox::from_normalized_tlbr(
                [tlbr[0], tlbr[1], tlbr[2], tlbr[3]],
                inference.0,
                inference.1,
            )
            .rescale(inference, original);
            Detection {
                bbox,
                class_id,
                label: labels.and_then(|l| l.get(class_id)).map(str::to_string),
                score,
            }
        })
        .collect();
    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use crate::detect::backend::{InputSpec, InputType};
    use crate::frame::PixelFormat;

    #[test]
    fn index_alignment_is_preserved() -> Result<()> {
        // Each index carries its own marker in class and score.
        let markers = [(11.0, 0.91), (22.0, 0.92), (33.0, 0.93), (44.0, 0.94)];
        let outputs = vec![
            (0..4)
                .flat_map(|i| {
                    let f = i as f32 * 0.1;
                    [f, f, f + 0.05, f + 0.05]
                })
                .collect(),
            markers.iter().map(|m| m.0).collect(),
            markers.iter().map(|m| m.1).collect(),
            vec![4.0],
        ];

        let detections = assemble_detections(&outputs, (100, 100), (100, 100), None)?;
        assert_eq!(detections.len(), 4);
        for (i, detection) in detections.iter().enumerate() {
            assert_eq!(detection.class_id, markers[i].0 as i32);
            assert_eq!(detection.score, markers[i].1);
            assert!((detection.bbox.x_min - i as f32 * 10.0).abs() < 1e-3);
        }
        Ok(())
    }

    #[test]
    fn threshold_is_strict() -> Result<()> {
        let outputs = StubBackend::ssd_outputs(&[
            ([0.0, 0.0, 0.5, 0.5], 1.0, 0.5),
            ([0.0, 0.0, 0.5, 0.5], 2.0, 0.500_1),
            ([0.0, 0.0, 0.5, 0.5], 3.0, 0.2),
        ]);
        let detections = assemble_detections(&outputs, (10, 10), (10, 10), None)?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 2);
        Ok(())
    }

    #[test]
    fn count_limits_assembled_detections() -> Result<()> {
        let mut outputs = StubBackend::ssd_outputs(&[
            ([0.0, 0.0, 0.5, 0.5], 1.0, 0.9),
            ([0.0, 0.0, 0.5, 0.5], 2.0, 0.9),
        ]);
        outputs[3] = vec![1.0];
        let detections = assemble_detections(&outputs, (10, 10), (10, 10), None)?;
        assert_eq!(detections.len(), 1);
        Ok(())
    }

    #[test]
    fn missing_outputs_are_backend_failures() {
        let outputs = vec![vec![0.0; 4], vec![1.0], vec![0.9]];
        let err = assemble_detections(&outputs, (10, 10), (10, 10), None).unwrap_err();
        assert!(matches!(err, DetectError::InferenceBackendFailure(_)));
    }

    #[test]
    fn extra_outputs_are_backend_failures() {
        let mut outputs = StubBackend::ssd_outputs(&[([0.0, 0.0, 0.5, 0.5], 1.0, 0.9)]);
        outputs.push(vec![0.0]);
        let err = assemble_detections(&outputs, (10, 10), (10, 10), None).unwrap_err();
        assert!(matches!(err, DetectError::InferenceBackendFailure(_)));
    }

    #[test]
    fn huge_count_is_backend_failure() {
        let mut outputs = StubBackend::ssd_outputs(&[([0.0, 0.0, 0.5, 0.5], 1.0, 0.9)]);
        outputs[3] = vec![1e30];
        let err = assemble_detections(&outputs, (10, 10), (10, 10), None).unwrap_err();
        assert!(matches!(err, DetectError::InferenceBackendFailure(_)));
    }

    #[test]
    fn oversized_count_is_backend_failure() {
        let mut outputs = StubBackend::ssd_outputs(&[([0.0, 0.0, 0.5, 0.5], 1.0, 0.9)]);
        outputs[3] = vec![3.0];
        assert!(assemble_detections(&outputs, (10, 10), (10, 10), None).is_err());
    }

    #[test]
    fn rescales_to_original_frame_and_names_classes() -> Result<()> {
        let backend = StubBackend::new(InputSpec::new(320, 240, InputType::U8)).repeat_outputs(
            StubBackend::ssd_outputs(&[([0.5, 0.25, 1.0, 0.75], 0.0, 0.9)]),
        );
        let mut engine =
            DetectionEngine::new(backend).with_labels(LabelMap::parse("0 bottle")?);
        let frame = Frame::new(vec![0u8; 640 * 480], 640, 480, PixelFormat::Gray8)?;

        let detections = engine.detect(&frame)?;
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].label.as_deref(), Some("bottle"));
        assert_eq!(
            detections[0].bbox,
            BoundingBox::new(160.0, 240.0, 480.0, 480.0)
        );
        Ok(())
    }

    #[test]
    fn backend_failure_surfaces_as_detect_error() -> Result<()> {
        let backend =
            StubBackend::new(InputSpec::new(4, 4, InputType::U8)).repeat_outputs(vec![vec![]]);
        let mut engine = DetectionEngine::new(backend);
        let frame = Frame::new(vec![0u8; 16], 4, 4, PixelFormat::Gray8)?;

        let err = engine.detect(&frame).unwrap_err();
        assert!(err.downcast_ref::<DetectError>().is_some());
        Ok(())
    }
}
