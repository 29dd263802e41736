use super::types::InferenceError;
use clap::ValueEnum;
use image::{imageops, ImageBuffer, Luma, RgbImage};
use ndarray::{Array4, ArrayViewD};

/// Memory layout of the model's image tensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum TensorLayout {
    /// [1, height, width, channels] (MediaPipe exports)
    #[default]
    Nhwc,
    /// [1, channels, height, width]
    Nchw,
}

/// Preprocessor for converting RGB frames to model input tensors and model
/// output back to frame-sized confidence values
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32, layout: TensorLayout) -> Self {
        Self {
            target_width,
            target_height,
            layout,
        }
    }

    /// Preprocess an RGB image into a normalized tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Convert to float and normalize to [0, 1]
    /// 3. Arrange in the model's layout
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized;
        let source = if image.dimensions() != (self.target_width, self.target_height) {
            // Triangle keeps the resize well inside the frame budget
            resized = imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Triangle,
            );
            &resized
        } else {
            image
        };

        let (width, height) = (self.target_width as usize, self.target_height as usize);
        let raw = source.as_raw();

        match self.layout {
            TensorLayout::Nhwc => Array4::from_shape_fn((1, height, width, 3), |(_, y, x, c)| {
                raw[(y * width + x) * 3 + c] as f32 / 255.0
            }),
            TensorLayout::Nchw => Array4::from_shape_fn((1, 3, height, width), |(_, c, y, x)| {
                raw[(y * width + x) * 3 + c] as f32 / 255.0
            }),
        }
    }

    /// Pull the person-confidence plane out of the model output.
    ///
    /// With more than one confidence channel, index 1 is the person channel;
    /// with a single channel it is index 0. Returns (values, width, height).
    pub fn extract_confidence(
        &self,
        output: ArrayViewD<'_, f32>,
    ) -> Result<(Vec<f32>, u32, u32), InferenceError> {
        let shape = output.shape().to_vec();
        let shape_error = || InferenceError::OutputShape {
            shape: shape.clone(),
        };

        match (shape.as_slice(), self.layout) {
            (&[1, h, w], _) => Ok((output.iter().copied().collect(), w as u32, h as u32)),
            (&[1, h, w, c], TensorLayout::Nhwc) if c >= 1 => {
                let channel = if c > 1 { 1 } else { 0 };
                let values = output
                    .as_slice()
                    .map(|data| data.iter().skip(channel).step_by(c).copied().collect())
                    .unwrap_or_else(|| {
                        let mut values = Vec::with_capacity(h * w);
                        for y in 0..h {
                            for x in 0..w {
                                values.push(output[[0, y, x, channel]]);
                            }
                        }
                        values
                    });
                Ok((values, w as u32, h as u32))
            }
            (&[1, c, h, w], TensorLayout::Nchw) if c >= 1 => {
                let channel = if c > 1 { 1 } else { 0 };
                let mut values = Vec::with_capacity(h * w);
                for y in 0..h {
                    for x in 0..w {
                        values.push(output[[0, channel, y, x]]);
                    }
                }
                Ok((values, w as u32, h as u32))
            }
            _ => Err(shape_error()),
        }
    }

    /// Resize confidence values from model resolution to frame resolution
    /// and clamp them into [0, 1]
    pub fn postprocess_confidence(
        values: Vec<f32>,
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Vec<f32>, InferenceError> {
        let _span = tracing::debug_span!("postprocess").entered();

        let expected = source_width as usize * source_height as usize;
        let actual = values.len();
        let plane: ImageBuffer<Luma<f32>, Vec<f32>> =
            ImageBuffer::from_raw(source_width, source_height, values).ok_or(
                InferenceError::MaskSize {
                    width: source_width,
                    height: source_height,
                    expected,
                    actual,
                },
            )?;

        let plane = if (source_width, source_height) != (target_width, target_height) {
            imageops::resize(
                &plane,
                target_width,
                target_height,
                imageops::FilterType::Triangle,
            )
        } else {
            plane
        };

        Ok(plane
            .into_raw()
            .into_iter()
            .map(|v| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) })
            .collect())
    }
}
