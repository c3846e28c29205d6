use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GenericImage, GenericImageView, ImageFormat, RgbaImage};
use std::io::Cursor;

use crate::region::Rectangle;

/// A decoded page plus the mime it arrived as, so the output keeps the format.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub mime: String,
}

pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    let detected = kind.mime_type();
    detected.starts_with("image/").then_some(detected)
}

pub fn image_format_from_mime(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/jpg" => Some(ImageFormat::Jpeg),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage> {
    let mime = sniff_mime(bytes).ok_or_else(|| anyhow!("input is not a recognized image"))?;
    let format = image_format_from_mime(mime)
        .ok_or_else(|| anyhow!("unsupported input image mime '{}'", mime))?;
    let image = image::load_from_memory_with_format(bytes, format)
        .with_context(|| format!("failed to decode {} image", mime))?;
    Ok(DecodedImage {
        image,
        mime: mime.to_string(),
    })
}

pub fn encode_image(image: &DynamicImage, mime: &str) -> Result<Vec<u8>> {
    let format = image_format_from_mime(mime)
        .ok_or_else(|| anyhow!("unsupported output image mime '{}'", mime))?;
    let mut bytes = Vec::new();
    let mut cursor = Cursor::new(&mut bytes);
    // JPEG has no alpha channel.
    if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(image.to_rgb8())
            .write_to(&mut cursor, format)
            .with_context(|| "failed to encode output image")?;
    } else {
        image
            .write_to(&mut cursor, format)
            .with_context(|| "failed to encode output image")?;
    }
    Ok(bytes)
}

/// Output bytes for a processed page.
///
/// A page without bubbles is written back byte for byte. Otherwise only the
/// bubble areas of `composited` are copied onto the decoded original, so the
/// rest keeps its color type and bit depth. Lossy formats such as JPEG are
/// still re-encoded once anything was painted.
pub fn encode_page(
    input: &[u8],
    decoded: &DecodedImage,
    composited: &RgbaImage,
    bubbles: &[Rectangle],
) -> Result<Vec<u8>> {
    if bubbles.is_empty() {
        return Ok(input.to_vec());
    }
    let mut page = decoded.image.clone();
    let (width, height) = page.dimensions();
    for area in bubbles.iter().filter_map(|rect| rect.clamp_to(width, height)) {
        for y in area.y1()..area.y2() {
            for x in area.x1()..area.x2() {
                page.put_pixel(x, y, *composited.get_pixel(x, y));
            }
        }
    }
    encode_image(&page, &decoded.mime)
}
