use image::{imageops, RgbImage};

/// Flip left-right so the overlay behaves like a mirror.
pub fn mirror(image: &mut RgbImage) {
    imageops::flip_horizontal_in_place(image);
}

/// Center-crop `image` to the aspect ratio of `width` x `height`, then resize
/// to exactly that size.
pub fn fit_to(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let _span = tracing::debug_span!("fit_frame").entered();

    let (src_w, src_h) = image.dimensions();
    if (src_w, src_h) == (width, height) {
        return image.clone();
    }

    // crop width/height that matches the target aspect ratio
    let (crop_w, crop_h) = if src_w as u64 * height as u64 > src_h as u64 * width as u64 {
        (((src_h as u64 * width as u64) / height as u64) as u32, src_h)
    } else {
        (src_w, ((src_w as u64 * height as u64) / width as u64) as u32)
    };
    let crop_w = crop_w.max(1);
    let crop_h = crop_h.max(1);
    let x = (src_w - crop_w) / 2;
    let y = (src_h - crop_h) / 2;

    let cropped = imageops::crop_imm(image, x, y, crop_w, crop_h);
    if (crop_w, crop_h) == (width, height) {
        return cropped.to_image();
    }
    imageops::resize(
        &cropped.to_image(),
        width,
        height,
        imageops::FilterType::Triangle,
    )
}
