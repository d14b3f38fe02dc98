use std::time::Instant;

use ndarray::ArrayView3;

/// A single frame sampled from the live camera: contiguous RGB bytes in
/// row-major order, plus the capture timestamp.
///
/// Samples are ephemeral. The loop takes the most recent one per tick and
/// never retains it across cycles.
#[derive(Clone, Debug)]
pub struct FrameSample {
    data: Vec<u8>,
    width: u32,
    height: u32,
    captured_at: Instant,
}

impl FrameSample {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * 3,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            captured_at: Instant::now(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape((self.height as usize, self.width as usize, 3), &self.data)
            .expect("FrameSample data length must match dimensions")
    }
}
