use super::circular::{CircularMask, FeatherCurve, MaskGenerator};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct MaskKey {
    width: u32,
    height: u32,
    inner_bits: u32,
    feather_bits: u32,
    curve: FeatherCurve,
}

/// Holds the circular mask for the current surface size.
///
/// The mask is regenerated whenever the requested key changes and is shared
/// read-only with the compositor.
pub struct MaskCache {
    generator: MaskGenerator,
    inner_fraction: f32,
    feather_fraction: f32,
    entry: Option<(MaskKey, Arc<CircularMask>)>,
    generations: u64,
}

impl MaskCache {
    pub fn new(generator: MaskGenerator, inner_fraction: f32, feather_fraction: f32) -> Self {
        Self {
            generator,
            inner_fraction,
            feather_fraction,
            entry: None,
            generations: 0,
        }
    }

    /// Mask for a `width` x `height` surface, generating it on a size change.
    pub fn get(&mut self, width: u32, height: u32) -> Arc<CircularMask> {
        let key = MaskKey {
            width,
            height,
            inner_bits: self.inner_fraction.to_bits(),
            feather_bits: self.feather_fraction.to_bits(),
            curve: self.generator.curve(),
        };

        if let Some((cached_key, mask)) = &self.entry {
            if *cached_key == key {
                return Arc::clone(mask);
            }
            tracing::info!(
                "Surface resized {}x{} -> {}x{}, regenerating circular mask",
                cached_key.width,
                cached_key.height,
                width,
                height
            );
        }

        let mask = Arc::new(self.generator.generate(
            width,
            height,
            self.inner_fraction,
            self.feather_fraction,
        ));
        self.generations += 1;
        self.entry = Some((key, Arc::clone(&mask)));
        mask
    }

    /// Drop the cached mask so the next `get` regenerates it.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Number of masks generated so far.
    pub fn generations(&self) -> u64 {
        self.generations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MaskCache {
        MaskCache::new(MaskGenerator::default(), 0.9, 0.1)
    }

    #[test]
    fn test_same_size_reuses_mask() {
        let mut cache = cache();
        let a = cache.get(32, 32);
        let b = cache.get(32, 32);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.generations(), 1);
    }

    #[test]
    fn test_resize_regenerates() {
        let mut cache = cache();
        let a = cache.get(32, 32);
        let b = cache.get(48, 40);
        assert_eq!(a.dimensions(), (32, 32));
        assert_eq!(b.dimensions(), (48, 40));
        assert_eq!(cache.generations(), 2);
    }

    #[test]
    fn test_invalidate_forces_regeneration() {
        let mut cache = cache();
        let a = cache.get(16, 16);
        cache.invalidate();
        let b = cache.get(16, 16);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(*a, *b);
        assert_eq!(cache.generations(), 2);
    }
}
