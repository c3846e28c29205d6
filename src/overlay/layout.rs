use serde::Serialize;
use tracing::{debug, warn};

use crate::error::OverlayResult;
use crate::region::Rectangle;

pub const MIN_FONT: f32 = 10.0;
pub const SCALE: f32 = 1.5;
/// Horizontal slack a line must leave inside the bubble.
pub const PADDING: f32 = 10.0;
/// Size used when the measurer cannot evaluate the text.
pub const FALLBACK_FONT_SIZE: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

/// Pixel extent of a run of text at a font size, as the drawing backend would
/// lay it out.
pub trait TextMeasurer: Send + Sync {
    fn measure(&self, text: &str, font_size: f32) -> OverlayResult<TextExtent>;
}

/// Font-free width estimate by character class, in ems.
#[derive(Debug, Clone, Copy, Default)]
pub struct EstimatedMeasurer;

impl TextMeasurer for EstimatedMeasurer {
    fn measure(&self, text: &str, font_size: f32) -> OverlayResult<TextExtent> {
        Ok(TextExtent {
            width: estimate_text_width_units(text) * font_size,
            height: font_size * 1.2,
        })
    }
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineBox {
    pub text: String,
    pub width: f32,
    pub height: f32,
    /// Left edge of the line.
    pub x: f32,
    /// Top edge of the line box; the baseline sits one ascent below.
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutPlan {
    pub rect: Rectangle,
    pub font_size: f32,
    pub lines: Vec<LineBox>,
    pub origin_x: f32,
    pub origin_y: f32,
    pub block_width: f32,
    pub block_height: f32,
}

impl LayoutPlan {
    fn empty(rect: Rectangle) -> Self {
        Self {
            rect,
            font_size: MIN_FONT,
            lines: Vec::new(),
            origin_x: rect.x1() as f32 + rect.width() as f32 / 2.0,
            origin_y: rect.y1() as f32 + rect.height() as f32 / 2.0,
            block_width: 0.0,
            block_height: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// True when the text block is taller or wider than the bubble.
    pub fn overflows(&self) -> bool {
        self.block_height > self.rect.height() as f32
            || self.lines.iter().any(|line| line.width > self.rect.width() as f32)
    }
}

/// Single-pass size estimate from character count and bubble area.
pub fn estimate_font_size(rect: &Rectangle, text: &str) -> f32 {
    let width = rect.width() as f32;
    let height = rect.height() as f32;
    let length = text.chars().count().max(1) as f32;
    (height / 2.0).min(width / length * SCALE).max(MIN_FONT)
}

/// Lays out `text` inside `rect`. A measurement failure falls back to
/// [`FALLBACK_FONT_SIZE`] with the character-class estimate.
pub fn layout_bubble(rect: &Rectangle, text: &str, measurer: &dyn TextMeasurer) -> LayoutPlan {
    let text = text.trim();
    if text.is_empty() {
        return LayoutPlan::empty(*rect);
    }
    let font_size = estimate_font_size(rect, text);
    match layout_at_size(rect, text, font_size, measurer) {
        Ok(plan) => plan,
        Err(err) => {
            warn!(
                "{}; falling back to {}px estimated layout",
                err, FALLBACK_FONT_SIZE
            );
            layout_at_size(rect, text, FALLBACK_FONT_SIZE, &EstimatedMeasurer).unwrap_or_else(
                |err| {
                    warn!("{}; leaving bubble blank", err);
                    LayoutPlan::empty(*rect)
                },
            )
        }
    }
}

pub fn layout_at_size(
    rect: &Rectangle,
    text: &str,
    font_size: f32,
    measurer: &dyn TextMeasurer,
) -> OverlayResult<LayoutPlan> {
    let bubble_w = rect.width() as f32;
    let bubble_h = rect.height() as f32;
    let wrapped = wrap_words(text, font_size, bubble_w - PADDING, measurer)?;
    if wrapped.is_empty() {
        return Ok(LayoutPlan::empty(*rect));
    }

    let mut measured = Vec::with_capacity(wrapped.len());
    let mut block_height = 0.0;
    let mut block_width: f32 = 0.0;
    for line in wrapped {
        let extent = measurer.measure(&line, font_size)?;
        block_height += extent.height;
        block_width = block_width.max(extent.width);
        measured.push((line, extent));
    }

    let origin_y = rect.y1() as f32 + (bubble_h - block_height) / 2.0;
    let origin_x = rect.x1() as f32 + (bubble_w - block_width) / 2.0;
    let mut cursor_y = origin_y;
    let mut lines = Vec::with_capacity(measured.len());
    for (text, extent) in measured {
        lines.push(LineBox {
            x: rect.x1() as f32 + (bubble_w - extent.width) / 2.0,
            y: cursor_y,
            width: extent.width,
            height: extent.height,
            text,
        });
        cursor_y += extent.height;
    }
    debug!(
        "laid out {} line(s) at {:.1}px in {}x{} bubble",
        lines.len(),
        font_size,
        rect.width(),
        rect.height()
    );

    Ok(LayoutPlan {
        rect: *rect,
        font_size,
        lines,
        origin_x,
        origin_y,
        block_width,
        block_height,
    })
}

/// Greedy word wrap. A line keeps growing while it stays strictly narrower
/// than `max_width`; a word that does not fit alone still gets its own line.
pub fn wrap_words(
    text: &str,
    font_size: f32,
    max_width: f32,
    measurer: &dyn TextMeasurer,
) -> OverlayResult<Vec<String>> {
    let mut result = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
            continue;
        }
        let candidate = format!("{} {}", current, word);
        if measurer.measure(&candidate, font_size)?.width < max_width {
            current = candidate;
        } else {
            result.push(std::mem::replace(&mut current, word.to_string()));
        }
    }

    if !current.is_empty() {
        result.push(current);
    }
    Ok(result)
}
