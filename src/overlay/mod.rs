mod font;
mod layout;
mod render;
mod surface;

use image::Rgba;

pub use font::{
    FontMetrics, ResolvedOverlayFont, load_font_metrics, overlay_fallback_fonts,
    resolve_overlay_font,
};
pub use layout::{
    EstimatedMeasurer, FALLBACK_FONT_SIZE, LayoutPlan, LineBox, MIN_FONT, PADDING, SCALE,
    TextExtent, TextMeasurer, estimate_font_size, layout_at_size, layout_bubble, wrap_words,
};
pub use render::{RenderOutcome, render_plans};
pub use surface::{RasterSurface, Surface, TextRun};

pub(crate) use surface::parse_hex_color;

/// Mask and ink colors for the compositor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub fill_color: Rgba<u8>,
    pub text_color: Rgba<u8>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            fill_color: Rgba([255, 255, 255, 255]),
            text_color: Rgba([0, 0, 0, 255]),
        }
    }
}
