use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectorBackend, InputSpec};

/// Scripted backend for tests and dry runs.
///
/// Returns queued outputs in order, then the repeat outputs (if any), then an
/// empty detection set.
pub struct StubBackend {
    spec: InputSpec,
    script: VecDeque<Vec<Vec<f32>>>,
    repeat: Option<Vec<Vec<f32>>>,
    calls: u64,
}

impl StubBackend {
    pub fn new(spec: InputSpec) -> Self {
        Self {
            spec,
            script: VecDeque::new(),
            repeat: None,
            calls: 0,
        }
    }

    /// Queue outputs for the next unanswered `infer` call.
    pub fn push_outputs(&mut self, outputs: Vec<Vec<f32>>) {
        self.script.push_back(outputs);
    }

    pub fn with_outputs(mut self, outputs: Vec<Vec<f32>>) -> Self {
        self.push_outputs(outputs);
        self
    }

    /// Outputs returned once the script is exhausted.
    pub fn repeat_outputs(mut self, outputs: Vec<Vec<f32>>) -> Self {
        self.repeat = Some(outputs);
        self
    }

    /// Build the four SSD output tensors from `(tlbr, class, score)` triples.
    pub fn ssd_outputs(detections: &[([f32; 4], f32, f32)]) -> Vec<Vec<f32>> {
        vec![
            detections.iter().flat_map(|d| d.0).collect(),
            detections.iter().map(|d| d.1).collect(),
            detections.iter().map(|d| d.2).collect(),
            vec![detections.len() as f32],
        ]
    }

    /// Number of `infer` calls served so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn infer(&mut self, rgb: &[u8]) -> Result<Vec<Vec<f32>>> {
        let expected = self.spec.width as usize * self.spec.height as usize * 3;
        if rgb.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected,
                rgb.len()
            ));
        }
        self.calls += 1;
        let outputs = self
            .script
            .pop_front()
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| Self::ssd_outputs(&[]));
        Ok(outputs)
    }
}
