use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference failed: {0}")]
    Runtime(String),
    #[error("unexpected model output shape {shape:?}")]
    OutputShape { shape: Vec<usize> },
    #[error("mask has {actual} values, expected {expected} for {width}x{height}")]
    MaskSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Foreground probability per pixel, values in [0.0, 1.0].
/// Dimensions match the frame it was inferred from.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfidenceMask {
    values: Vec<f32>,
    width: u32,
    height: u32,
}

impl ConfidenceMask {
    pub fn new(values: Vec<f32>, width: u32, height: u32) -> Result<Self, InferenceError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(InferenceError::MaskSize {
                width,
                height,
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            values,
            width,
            height,
        })
    }

    /// Construct from a plane already known to be `width * height` long.
    pub(crate) fn from_plane(values: Vec<f32>, width: u32, height: u32) -> Self {
        debug_assert_eq!(values.len(), width as usize * height as usize);
        Self {
            values,
            width,
            height,
        }
    }

    #[cfg(test)]
    pub fn uniform(width: u32, height: u32, value: f32) -> Self {
        Self {
            values: vec![value; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[cfg(test)]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }
}

/// Trait for segmentation backends
/// Allows swapping the ONNX selfie segmenter for other models or fakes
pub trait SegmentationEngine {
    /// Produce a confidence mask with the frame's dimensions.
    ///
    /// Fails rather than returning a previous mask; the caller owns the
    /// fallback policy.
    fn infer(&mut self, frame: &Frame) -> Result<ConfidenceMask, InferenceError>;

    fn name(&self) -> &str;
}
