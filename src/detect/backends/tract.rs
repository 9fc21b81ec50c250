#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, InputSpec, InputType};

/// Tract-based backend for SSD-style ONNX detectors.
///
/// The model takes one NHWC image `[1, H, W, 3]` and returns boxes, classes,
/// scores and count. Only the model file is read from disk.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    spec: InputSpec,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, spec: InputSpec) -> Result<Self> {
        let model_path = model_path.as_ref();
        let datum = match spec.dtype {
            InputType::U8 => u8::datum_type(),
            InputType::F32 => f32::datum_type(),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    datum,
                    tvec!(1, spec.height as usize, spec.width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} {:?})",
            model_path.display(),
            spec.width,
            spec.height,
            spec.dtype
        );
        Ok(Self { model, spec })
    }

    fn build_input(&self, rgb: &[u8]) -> Result<Tensor> {
        let (width, height) = (self.spec.width as usize, self.spec.height as usize);
        let expected_len = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("model input dimensions overflow"))?;
        if rgb.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                rgb.len()
            ));
        }

        let shape = (1, height, width, 3);
        let tensor = match self.spec.dtype {
            InputType::U8 => tract_ndarray::Array4::from_shape_vec(shape, rgb.to_vec())
                .context("shape u8 input")?
                .into_tensor(),
            InputType::F32 => tract_ndarray::Array4::from_shape_fn(shape, |(_, y, x, c)| {
                (rgb[(y * width + x) * 3 + c] as f32 - 127.5) / 127.5
            })
            .into_tensor(),
        };
        Ok(tensor)
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_spec(&self) -> InputSpec {
        self.spec
    }

    fn infer(&mut self, rgb: &[u8]) -> Result<Vec<Vec<f32>>> {
        let input = self.build_input(rgb)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;

        outputs
            .iter()
            .enumerate()
            .map(|(index, output)| {
                let values = output
                    .cast_to::<f32>()
                    .with_context(|| format!("output {} is not numeric", index))?;
                let view = values
                    .to_array_view::<f32>()
                    .with_context(|| format!("read output {}", index))?;
                Ok(view.iter().copied().collect())
            })
            .collect()
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; self.spec.width as usize * self.spec.height as usize * 3];
        self.infer(&blank).map(|_| ())
    }
}
