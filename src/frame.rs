use image::RgbImage;
use std::time::Instant;

/// A mirrored camera frame: interleaved RGB, row-major.
///
/// Immutable once produced by a capture source.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: Instant) -> Self {
        Self { image, captured_at }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Replace the pixels while keeping the capture timestamp.
    pub fn with_image(self, image: RgbImage) -> Self {
        Self {
            image,
            captured_at: self.captured_at,
        }
    }
}

/// Premultiplied RGBA output of the compositor.
///
/// Every color channel is <= the alpha of its pixel.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositedFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl CompositedFrame {
    pub(crate) fn from_raw(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * 4,
            "data length must equal width * height * 4"
        );
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[cfg(test)]
    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    #[cfg(test)]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Pack pixels as premultiplied `0xAARRGGBB` words for a softbuffer surface.
    pub fn to_argb_words(&self) -> Vec<u32> {
        self.data
            .chunks_exact(4)
            .map(|p| {
                (p[3] as u32) << 24 | (p[0] as u32) << 16 | (p[1] as u32) << 8 | p[2] as u32
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accessors() {
        let image = RgbImage::from_pixel(4, 2, image::Rgb([1, 2, 3]));
        let frame = Frame::new(image, Instant::now());
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(frame.image().get_pixel(3, 1).0, [1, 2, 3]);
    }

    #[test]
    fn test_with_image_keeps_timestamp() {
        let at = Instant::now();
        let frame = Frame::new(RgbImage::new(2, 2), at);
        let resized = frame.with_image(RgbImage::new(8, 8));
        assert_eq!(resized.captured_at(), at);
        assert_eq!(resized.dimensions(), (8, 8));
    }

    #[test]
    fn test_argb_packing() {
        let composited = CompositedFrame::from_raw(vec![0x10, 0x20, 0x30, 0x40], 1, 1);
        assert_eq!(composited.to_argb_words(), vec![0x4010_2030]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * 4")]
    fn test_mismatched_length_panics_in_debug() {
        CompositedFrame::from_raw(vec![0; 7], 1, 2);
    }
}
