/// An axis-aligned face bounding box in native-frame pixel units.
///
/// Coordinates stay in the resolution the frame was captured at; mapping to
/// a differently-sized display surface happens via `scaled` at render time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Linearly scale each axis independently. Used to map native-frame
    /// coordinates onto a display surface of a different resolution.
    pub fn scaled(&self, sx: f64, sy: f64) -> BoundingBox {
        BoundingBox {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }

    /// Clamp the box to `[0, width] x [0, height]`, shrinking it where it
    /// overhangs a frame edge.
    pub fn clamped(&self, frame_width: f64, frame_height: f64) -> BoundingBox {
        let x = self.x.max(0.0).min(frame_width);
        let y = self.y.max(0.0).min(frame_height);
        let width = (self.x + self.width).min(frame_width) - x;
        let height = (self.y + self.height).min(frame_height) - y;
        BoundingBox {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = (self.x + self.width).min(other.x + other.width);
        let iy2 = (self.y + self.height).min(other.y + other.height);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter == 0.0 {
            return 0.0;
        }

        inter / (self.area() + other.area() - inter)
    }
}
