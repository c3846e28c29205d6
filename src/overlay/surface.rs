use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::warn;
use usvg::{Options, Tree, fontdb};

use super::font::{FontMetrics, loaded_text_family};
use crate::region::Rectangle;

/// One line of text to draw. `y` is the top of the line box.
#[derive(Debug, Clone, Copy)]
pub struct TextRun<'a> {
    pub text: &'a str,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: Rgba<u8>,
}

/// Image the pipeline reads bubbles from and composites translations onto.
pub trait Surface {
    fn dimensions(&self) -> (u32, u32);

    fn snapshot(&self) -> DynamicImage;

    /// Pixels under `rect`, clamped to the image. `None` if nothing remains.
    fn crop(&self, rect: &Rectangle) -> Option<DynamicImage>;

    fn fill_rect(&mut self, rect: &Rectangle, color: Rgba<u8>);

    /// Draws `run`, touching only pixels inside `clip`.
    fn draw_text(&mut self, run: &TextRun<'_>, clip: &Rectangle) -> Result<()>;
}

/// [`Surface`] over an in-memory RGBA buffer. Text goes through resvg with the
/// overlay font loaded into its font database.
pub struct RasterSurface {
    image: RgbaImage,
    font: Option<FontMetrics>,
    family: String,
    fontdb: Arc<fontdb::Database>,
}

impl RasterSurface {
    pub fn new(image: RgbaImage, font: Option<FontMetrics>) -> Self {
        let mut db = fontdb::Database::new();
        let family = match font.as_ref() {
            Some(metrics) => {
                db.load_font_data(metrics.data().to_vec());
                metrics
                    .family()
                    .map(str::to_string)
                    .or_else(|| loaded_text_family(&db))
            }
            None => {
                db.load_system_fonts();
                loaded_text_family(&db)
            }
        };
        let family = match family {
            Some(family) => {
                db.set_sans_serif_family(family.clone());
                family
            }
            None => {
                warn!("no usable font loaded; overlay text will not be drawn");
                "sans-serif".to_string()
            }
        };
        Self {
            image,
            font,
            family,
            fontdb: Arc::new(db),
        }
    }

    pub fn from_dynamic(image: &DynamicImage, font: Option<FontMetrics>) -> Self {
        Self::new(image.to_rgba8(), font)
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    fn ascent(&self, font_size: f32) -> f32 {
        match self.font.as_ref() {
            Some(metrics) => metrics.ascent_px(font_size),
            None => font_size * 0.8,
        }
    }

    fn blend_pixmap(&mut self, pixmap: &Pixmap, x0: u32, y0: u32) {
        let width = pixmap.width();
        for (idx, px) in pixmap.data().chunks_exact(4).enumerate() {
            let alpha = px[3];
            if alpha == 0 {
                continue;
            }
            let x = x0 + idx as u32 % width;
            let y = y0 + idx as u32 / width;
            if x >= self.image.width() || y >= self.image.height() {
                continue;
            }
            let inv = 255 - alpha as u16;
            let dst = self.image.get_pixel_mut(x, y);
            for channel in 0..3 {
                let value = px[channel] as u16 + (dst[channel] as u16 * inv + 127) / 255;
                dst[channel] = value.min(255) as u8;
            }
            let value = alpha as u16 + (dst[3] as u16 * inv + 127) / 255;
            dst[3] = value.min(255) as u8;
        }
    }
}

impl Surface for RasterSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn snapshot(&self) -> DynamicImage {
        DynamicImage::ImageRgba8(self.image.clone())
    }

    fn crop(&self, rect: &Rectangle) -> Option<DynamicImage> {
        let (width, height) = self.image.dimensions();
        let area = rect.clamp_to(width, height)?;
        let view = image::imageops::crop_imm(
            &self.image,
            area.x1(),
            area.y1(),
            area.width(),
            area.height(),
        );
        Some(DynamicImage::ImageRgba8(view.to_image()))
    }

    fn fill_rect(&mut self, rect: &Rectangle, color: Rgba<u8>) {
        let (width, height) = self.image.dimensions();
        let Some(area) = rect.clamp_to(width, height) else {
            return;
        };
        for y in area.y1()..area.y2() {
            for x in area.x1()..area.x2() {
                self.image.put_pixel(x, y, color);
            }
        }
    }

    fn draw_text(&mut self, run: &TextRun<'_>, clip: &Rectangle) -> Result<()> {
        let (width, height) = self.image.dimensions();
        let Some(clip) = clip.clamp_to(width, height) else {
            return Ok(());
        };
        let text = run.text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let top = run.y - clip.y1() as f32;
        if top >= clip.height() as f32 || top + run.font_size <= 0.0 {
            return Ok(());
        }
        let baseline = run.y + self.ascent(run.font_size);
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}"><text x="{x}" y="{y}" font-size="{size}" font-family="{family}" fill="{fill}" fill-opacity="{opacity}">{text}</text></svg>"#,
            w = clip.width(),
            h = clip.height(),
            x = run.x - clip.x1() as f32,
            y = baseline - clip.y1() as f32,
            size = run.font_size,
            family = escape_xml(&self.family),
            fill = hex_color(run.color),
            opacity = run.color[3] as f32 / 255.0,
            text = escape_xml(text)
        );
        let options = Options {
            fontdb: self.fontdb.clone(),
            font_family: self.family.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).with_context(|| "failed to parse text SVG")?;
        let mut pixmap = Pixmap::new(clip.width(), clip.height())
            .ok_or_else(|| anyhow!("empty text clip {}x{}", clip.width(), clip.height()))?;
        resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
        // A line that sits fully inside the clip must leave some ink.
        let inside = top >= 0.0 && top + run.font_size <= clip.height() as f32;
        if inside && pixmap.data().chunks_exact(4).all(|px| px[3] == 0) {
            return Err(anyhow!(
                "no glyphs rendered for {:?} with font family '{}'",
                text,
                self.family
            ));
        }
        self.blend_pixmap(&pixmap, clip.x1(), clip.y1());
        Ok(())
    }
}

pub(crate) fn hex_color(color: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

pub(crate) fn parse_hex_color(value: &str) -> Option<Rgba<u8>> {
    let hex = value.trim().strip_prefix('#')?;
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    match hex.len() {
        6 => Some(Rgba([channel(0..2)?, channel(2..4)?, channel(4..6)?, 255])),
        8 => Some(Rgba([
            channel(0..2)?,
            channel(2..4)?,
            channel(4..6)?,
            channel(6..8)?,
        ])),
        _ => None,
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
