use super::types::{ConfidenceMask, InferenceError, SegmentationEngine};
use crate::frame::Frame;
use image::{imageops, GrayImage};

/// 3x3 elliptical structuring element (a cross)
const ELLIPSE_3X3: &[(i32, i32)] = &[(0, -1), (-1, 0), (0, 0), (1, 0), (0, 1)];

/// 5x5 elliptical structuring element
#[rustfmt::skip]
const ELLIPSE_5X5: &[(i32, i32)] = &[
    (0, -2),
    (-2, -1), (-1, -1), (0, -1), (1, -1), (2, -1),
    (-2, 0), (-1, 0), (0, 0), (1, 0), (2, 0),
    (-2, 1), (-1, 1), (0, 1), (1, 1), (2, 1),
    (0, 2),
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Morph {
    Erode,
    Dilate,
}

/// Cleans a soft segmentation mask into a solid silhouette with a soft edge.
///
/// Threshold, trim the outer fringe, close small holes (hair strands), then
/// blur so the silhouette edge is feathered.
#[derive(Clone, Copy, Debug)]
pub struct MaskRefiner {
    threshold: f32,
    blur_sigma: f32,
}

/// Confidence at or above which a pixel counts as person.
pub const REFINE_THRESHOLD: f32 = 0.5;

/// Gaussian sigma of the final edge blur, in pixels.
pub const REFINE_BLUR_SIGMA: f32 = 3.0;

impl Default for MaskRefiner {
    fn default() -> Self {
        Self::new(REFINE_THRESHOLD, REFINE_BLUR_SIGMA)
    }
}

impl MaskRefiner {
    pub fn new(threshold: f32, blur_sigma: f32) -> Self {
        Self {
            threshold,
            blur_sigma,
        }
    }

    pub fn refine(&self, mask: &ConfidenceMask) -> ConfidenceMask {
        let _span = tracing::debug_span!("refine_mask").entered();
        let (width, height) = mask.dimensions();

        let solid: Vec<bool> = mask.values().iter().map(|&v| v > self.threshold).collect();
        let solid = morph(&solid, width, height, ELLIPSE_3X3, Morph::Erode);
        let solid = morph(&solid, width, height, ELLIPSE_5X5, Morph::Dilate);
        let solid = morph(&solid, width, height, ELLIPSE_5X5, Morph::Erode);

        let gray = GrayImage::from_fn(width, height, |x, y| {
            let on = solid[y as usize * width as usize + x as usize];
            image::Luma([if on { 255 } else { 0 }])
        });
        let blurred = if self.blur_sigma > 0.0 {
            imageops::blur(&gray, self.blur_sigma)
        } else {
            gray
        };

        let values = blurred.pixels().map(|p| p[0] as f32 / 255.0).collect();
        ConfidenceMask::from_plane(values, width, height)
    }
}

/// Binary erosion/dilation; pixels outside the image never affect the result.
fn morph(src: &[bool], width: u32, height: u32, kernel: &[(i32, i32)], op: Morph) -> Vec<bool> {
    let (w, h) = (width as i32, height as i32);
    let mut out = Vec::with_capacity(src.len());
    for y in 0..h {
        for x in 0..w {
            let mut neighbours = kernel.iter().filter_map(|&(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                (nx >= 0 && nx < w && ny >= 0 && ny < h).then(|| src[(ny * w + nx) as usize])
            });
            let value = match op {
                Morph::Erode => neighbours.all(|on| on),
                Morph::Dilate => neighbours.any(|on| on),
            };
            out.push(value);
        }
    }
    out
}

/// Runs a [`MaskRefiner`] over every mask another engine produces.
pub struct RefinedEngine {
    inner: Box<dyn SegmentationEngine>,
    refiner: MaskRefiner,
}

impl RefinedEngine {
    pub fn new(inner: Box<dyn SegmentationEngine>, refiner: MaskRefiner) -> Self {
        Self { inner, refiner }
    }
}

impl SegmentationEngine for RefinedEngine {
    fn infer(&mut self, frame: &Frame) -> Result<ConfidenceMask, InferenceError> {
        let mask = self.inner.infer(frame)?;
        Ok(self.refiner.refine(&mask))
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
