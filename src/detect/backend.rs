use anyhow::Result;

/// Element type a model expects for its image input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputType {
    /// Raw 0..=255 bytes.
    U8,
    /// Floats normalized as `(p - 127.5) / 127.5`.
    F32,
}

/// Declared image input of a model: `[1, height, width, 3]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InputSpec {
    pub width: u32,
    pub height: u32,
    pub dtype: InputType,
}

impl InputSpec {
    pub fn new(width: u32, height: u32, dtype: InputType) -> Self {
        Self {
            width,
            height,
            dtype,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Inference backend trait.
///
/// A backend runs one forward pass of an SSD-style detector and returns its
/// output tensors flattened to `f32`, in model order. The detection engine
/// expects four outputs, index-aligned per detection:
///
/// 0. boxes, `4 * N` values of normalized `[top, left, bottom, right]`
/// 1. class ids, `N` values
/// 2. scores, `N` values
/// 3. detection count, one value
///
/// Backends do not interpret the outputs; assembling detections is the
/// engine's job.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Input the model was built for.
    fn input_spec(&self) -> InputSpec;

    /// Run one forward pass on packed RGB24 pixels of `input_spec()` size.
    fn infer(&mut self, rgb: &[u8]) -> Result<Vec<Vec<f32>>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
