mod cache;
mod circular;

pub use cache::MaskCache;
pub use circular::{CircularMask, FeatherCurve, MaskGenerator};
