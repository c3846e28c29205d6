use image::{DynamicImage, GrayImage};

/// Crops narrower than this are upscaled before recognition.
const TARGET_WIDTH: u32 = 900;
const MAX_SCALE: u32 = 3;

/// Flattens alpha onto white, converts to luma, upscales small crops and
/// stretches contrast to the full range.
pub(super) fn prepare_for_ocr(region: &DynamicImage) -> GrayImage {
    let rgba = region.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = r as f32 * alpha + 255.0 * (1.0 - alpha);
        let g = g as f32 * alpha + 255.0 * (1.0 - alpha);
        let b = b as f32 * alpha + 255.0 * (1.0 - alpha);
        let value = (0.299 * r + 0.587 * g + 0.114 * b).round() as u8;
        luma.put_pixel(x, y, image::Luma([value]));
    }

    let scale = ocr_scale(width);
    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };
    contrast_stretch(&resized)
}

pub(super) fn ocr_scale(width: u32) -> u32 {
    let mut scale = MAX_SCALE;
    while width.saturating_mul(scale) > TARGET_WIDTH && scale > 1 {
        scale -= 1;
    }
    scale.max(1)
}

fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let mut min = 255u8;
    let mut max = 0u8;
    for pixel in image.pixels() {
        min = min.min(pixel[0]);
        max = max.max(pixel[0]);
    }

    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = (pixel[0].saturating_sub(min) as f32 * scale).round() as u8;
    }
    output
}
