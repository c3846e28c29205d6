use serde::{Deserialize, Serialize};

use crate::error::{OverlayError, OverlayResult};

/// Axis-aligned bubble bounds in source-image pixels.
///
/// The area is half-open: it covers `x1 <= x < x2` and `y1 <= y < y2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Rectangle {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
}

impl Rectangle {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> OverlayResult<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(OverlayError::InvalidRegion { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn x1(&self) -> u32 {
        self.x1
    }

    pub fn y1(&self) -> u32 {
        self.y1
    }

    pub fn x2(&self) -> u32 {
        self.x2
    }

    pub fn y2(&self) -> u32 {
        self.y2
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.x1 < other.x2 && other.x1 < self.x2 && self.y1 < other.y2 && other.y1 < self.y2
    }

    /// Restricts the rectangle to a `width` x `height` image. `None` when nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Rectangle> {
        let x2 = self.x2.min(width);
        let y2 = self.y2.min(height);
        Rectangle::new(self.x1, self.y1, x2, y2).ok()
    }
}

/// Raw box as emitted by a detector, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Detection {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence: None,
        }
    }
}

/// A detected region and the text it carries through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bubble {
    rect: Rectangle,
    raw_text: Option<String>,
    translated_text: Option<String>,
}

impl Bubble {
    pub fn from_detection(x1: u32, y1: u32, x2: u32, y2: u32) -> OverlayResult<Self> {
        Ok(Self::new(Rectangle::new(x1, y1, x2, y2)?))
    }

    pub fn new(rect: Rectangle) -> Self {
        Self {
            rect,
            raw_text: None,
            translated_text: None,
        }
    }

    pub fn with_raw_text(mut self, text: impl Into<String>) -> Self {
        self.raw_text = Some(text.into());
        self
    }

    pub fn with_translation(mut self, text: impl Into<String>) -> Self {
        self.translated_text = Some(text.into());
        self
    }

    pub fn rect(&self) -> &Rectangle {
        &self.rect
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.raw_text.as_deref()
    }

    pub fn translated_text(&self) -> Option<&str> {
        self.translated_text.as_deref()
    }
}

impl TryFrom<Detection> for Bubble {
    type Error = OverlayError;

    fn try_from(value: Detection) -> OverlayResult<Self> {
        Bubble::from_detection(value.x1, value.y1, value.x2, value.y2)
    }
}

/// Index pairs of rectangles that share at least one pixel.
pub fn find_overlaps(rects: &[Rectangle]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (i, a) in rects.iter().enumerate() {
        for (j, b) in rects.iter().enumerate().skip(i + 1) {
            if a.intersects(b) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}
