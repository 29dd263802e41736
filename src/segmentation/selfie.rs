use super::preprocess::{Preprocessor, TensorLayout};
use super::types::{ConfidenceMask, InferenceError, SegmentationEngine};
use crate::frame::Frame;
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;

/// Selfie segmentation model (MediaPipe selfie segmenter exported to ONNX).
///
/// Stateless across frames: each call sees only the frame it is given.
pub struct SelfieSegmenter {
    session: Session,
    preprocessor: Preprocessor,
}

impl SelfieSegmenter {
    /// Create a new segmenter from an ONNX file
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `input_size` - Square input resolution the model was exported with
    /// * `layout` - Input tensor layout
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32, layout: TensorLayout) -> Result<Self> {
        let path = model_path.as_ref();

        tracing::info!("Loading selfie segmentation model from {}", path.display());

        #[cfg_attr(feature = "cuda", allow(unused_mut))]
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?
            .with_intra_threads(2)
            .map_err(ort::Error::<()>::from)?;

        #[cfg(feature = "cuda")]
        let mut builder = builder.with_execution_providers([
            ort::ep::CUDA::default().build(),
            ort::ep::CPU::default().build(),
        ]).map_err(ort::Error::<()>::from)?;

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!(
            "Segmentation model loaded ({}x{} {:?})",
            input_size,
            input_size,
            layout
        );

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(input_size, input_size, layout),
        })
    }
}

impl SegmentationEngine for SelfieSegmenter {
    fn infer(&mut self, frame: &Frame) -> Result<ConfidenceMask, InferenceError> {
        let _span = tracing::debug_span!("selfie_segment").entered();

        let input_tensor = self.preprocessor.preprocess(frame.image());
        let input = Tensor::from_array(input_tensor)
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(ort::inputs![input])
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        drop(_infer_span);

        let confidence = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        let (values, mask_width, mask_height) =
            self.preprocessor.extract_confidence(confidence)?;

        let (frame_width, frame_height) = frame.dimensions();
        let values = Preprocessor::postprocess_confidence(
            values,
            mask_width,
            mask_height,
            frame_width,
            frame_height,
        )?;

        ConfidenceMask::new(values, frame_width, frame_height)
    }

    fn name(&self) -> &str {
        "selfie-segmenter"
    }
}
