//! Premultiplied-alpha compositing of a frame against its confidence and
//! circular masks.

use crate::frame::{CompositedFrame, Frame};
use crate::mask::CircularMask;
use crate::segmentation::ConfidenceMask;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompositeError {
    #[error("{what} is {actual:?} but the frame is {expected:?}")]
    DimensionMismatch {
        what: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Combine a frame with its masks into premultiplied RGBA.
///
/// Alpha is `circular * confidence`; a missing confidence mask counts as 1.0
/// everywhere (background removal skipped). Alpha is clamped once, then every
/// color channel is scaled by it, so no channel ever exceeds its alpha.
pub fn compose(
    frame: &Frame,
    confidence: Option<&ConfidenceMask>,
    circular: &CircularMask,
) -> Result<CompositedFrame, CompositeError> {
    let _span = tracing::debug_span!("compose").entered();

    let expected = frame.dimensions();
    if circular.dimensions() != expected {
        return Err(CompositeError::DimensionMismatch {
            what: "circular mask",
            expected,
            actual: circular.dimensions(),
        });
    }
    if let Some(confidence) = confidence {
        if confidence.dimensions() != expected {
            return Err(CompositeError::DimensionMismatch {
                what: "confidence mask",
                expected,
                actual: confidence.dimensions(),
            });
        }
    }

    let (width, height) = (expected.0 as usize, expected.1 as usize);
    let mut out = vec![0u8; width * height * 4];
    if width == 0 {
        return Ok(CompositedFrame::from_raw(out, expected.0, expected.1));
    }

    let rgb = frame.image().as_raw();
    let rows = out
        .chunks_exact_mut(width * 4)
        .zip(rgb.chunks_exact(width * 3))
        .zip(circular.values().chunks_exact(width))
        .enumerate();

    for (y, ((out_row, rgb_row), circular_row)) in rows {
        let confidence_row = confidence.map(|c| &c.values()[y * width..(y + 1) * width]);
        compose_row(out_row, rgb_row, circular_row, confidence_row);
    }

    Ok(CompositedFrame::from_raw(out, expected.0, expected.1))
}

fn compose_row(out: &mut [u8], rgb: &[u8], circular: &[f32], confidence: Option<&[f32]>) {
    for (x, (dst, src)) in out.chunks_exact_mut(4).zip(rgb.chunks_exact(3)).enumerate() {
        let coverage = match confidence {
            Some(confidence) => circular[x] * confidence[x],
            None => circular[x],
        };
        let alpha = if coverage.is_nan() {
            0.0
        } else {
            coverage.clamp(0.0, 1.0)
        };

        dst[0] = premultiply(src[0], alpha);
        dst[1] = premultiply(src[1], alpha);
        dst[2] = premultiply(src[2], alpha);
        dst[3] = premultiply(255, alpha);
    }
}

#[inline]
fn premultiply(channel: u8, alpha: f32) -> u8 {
    (channel as f32 * alpha + 0.5) as u8
}
