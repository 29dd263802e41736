use clap::ValueEnum;

/// Static circular alpha mask: 1.0 inside the inner radius, 0.0 beyond the
/// outer radius, feathered in between. Row-major, one value per pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct CircularMask {
    values: Vec<f32>,
    width: u32,
    height: u32,
}

impl CircularMask {
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

/// Falloff applied across the feather band.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum)]
pub enum FeatherCurve {
    #[default]
    Linear,
    Smoothstep,
}

impl FeatherCurve {
    /// Map `t` in [0, 1] (0 at the inner edge, 1 at the outer edge) to alpha.
    fn alpha(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FeatherCurve::Linear => 1.0 - t,
            FeatherCurve::Smoothstep => 1.0 - t * t * (3.0 - 2.0 * t),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MaskGenerator {
    curve: FeatherCurve,
}

impl MaskGenerator {
    pub fn new(curve: FeatherCurve) -> Self {
        Self { curve }
    }

    pub fn curve(&self) -> FeatherCurve {
        self.curve
    }

    /// Generate a centered circular mask.
    ///
    /// `inner_fraction` and `feather_fraction` are relative to
    /// `min(width, height) / 2`; the outer radius is their sum. Distances are
    /// measured from pixel centers, so a 100x100 surface is centered at (50, 50).
    ///
    /// Pure: identical arguments always give bit-identical output.
    pub fn generate(
        &self,
        width: u32,
        height: u32,
        inner_fraction: f32,
        feather_fraction: f32,
    ) -> CircularMask {
        let _span = tracing::debug_span!("generate_mask", width, height).entered();

        let half = width.min(height) as f32 / 2.0;
        let inner = inner_fraction.max(0.0) * half;
        let feather = feather_fraction.max(0.0) * half;
        let outer = inner + feather;
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;

        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            let dy = y as f32 + 0.5 - cy;
            for x in 0..width {
                let dx = x as f32 + 0.5 - cx;
                let d = (dx * dx + dy * dy).sqrt();
                let alpha = if d <= inner {
                    1.0
                } else if d >= outer {
                    0.0
                } else {
                    self.curve.alpha((d - inner) / feather)
                };
                values.push(alpha);
            }
        }

        tracing::debug!(
            "Generated {}x{} circular mask (inner={:.1}px, outer={:.1}px, {:?})",
            width,
            height,
            inner,
            outer,
            self.curve
        );

        CircularMask {
            values,
            width,
            height,
        }
    }
}
