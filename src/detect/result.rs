/// Axis-aligned box in pixel coordinates of some image space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Box from normalized `[top, left, bottom, right]` model output, placed
    /// in an image of `width` x `height` pixels.
    pub fn from_normalized_tlbr(tlbr: [f32; 4], width: u32, height: u32) -> Self {
        let [top, left, bottom, right] = tlbr;
        let (w, h) = (width as f32, height as f32);
        Self::new(left * w, top * h, right * w, bottom * h)
    }

    /// Map this box from one image space into another by scaling each axis.
    pub fn rescale(self, from: (u32, u32), to: (u32, u32)) -> Self {
        let sx = to.0 as f32 / from.0 as f32;
        let sy = to.1 as f32 / from.1 as f32;
        Self::new(
            self.x_min * sx,
            self.y_min * sy,
            self.x_max * sx,
            self.y_max * sy,
        )
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    /// Box in the original frame's pixel coordinates.
    pub bbox: BoundingBox,
    pub class_id: i32,
    pub label: Option<String>,
    /// Confidence in [0, 1].
    pub score: f32,
}

impl Detection {
    /// Human-readable name: the label when known, the class id otherwise.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => format!("class {}", self.class_id),
        }
    }
}
