mod preprocess;
mod refine;
mod selfie;
pub mod types;

pub use preprocess::TensorLayout;
pub use refine::{MaskRefiner, RefinedEngine, REFINE_BLUR_SIGMA, REFINE_THRESHOLD};
pub use selfie::SelfieSegmenter;
pub use types::{ConfidenceMask, InferenceError, SegmentationEngine};

use anyhow::Result;
use std::path::Path;

/// Load the segmentation engine described by the configuration.
///
/// Returns `Ok(None)` when the model file is missing, so the overlay runs
/// without background removal.
pub fn create_engine(
    model_path: &Path,
    input_size: u32,
    layout: TensorLayout,
    refine: bool,
) -> Result<Option<Box<dyn SegmentationEngine>>> {
    if !model_path.exists() {
        tracing::warn!(
            "Model file {} not found, background removal disabled",
            model_path.display()
        );
        return Ok(None);
    }

    let model: Box<dyn SegmentationEngine> =
        Box::new(SelfieSegmenter::new(model_path, input_size, layout)?);

    if refine {
        tracing::info!("Mask refinement enabled");
        let refiner = MaskRefiner::new(REFINE_THRESHOLD, REFINE_BLUR_SIGMA);
        Ok(Some(Box::new(RefinedEngine::new(model, refiner))))
    } else {
        Ok(Some(model))
    }
}
