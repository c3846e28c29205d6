use tracing::{debug, warn};

use super::OverlayStyle;
use super::layout::LayoutPlan;
use super::surface::{Surface, TextRun};
use crate::region::{Rectangle, find_overlaps};

pub struct RenderOutcome {
    /// Per plan, whether every line was drawn.
    pub drawn: Vec<bool>,
}

/// Masks each plan's bubble and draws its lines, in the order given.
pub fn render_plans<S: Surface + ?Sized>(
    surface: &mut S,
    plans: &[LayoutPlan],
    style: &OverlayStyle,
) -> RenderOutcome {
    let rects: Vec<Rectangle> = plans.iter().map(|plan| plan.rect).collect();
    for (a, b) in find_overlaps(&rects) {
        warn!(
            "bubbles {} and {} overlap; bubble {} is painted over bubble {}",
            a, b, b, a
        );
    }

    let mut drawn = Vec::with_capacity(plans.len());
    for (idx, plan) in plans.iter().enumerate() {
        surface.fill_rect(&plan.rect, style.fill_color);
        if plan.overflows() {
            debug!("bubble {} text overflows its rectangle and is clipped", idx);
        }
        let mut ok = true;
        for line in &plan.lines {
            let run = TextRun {
                text: &line.text,
                x: line.x,
                y: line.y,
                font_size: plan.font_size,
                color: style.text_color,
            };
            if let Err(err) = surface.draw_text(&run, &plan.rect) {
                warn!("failed to draw line {:?} in bubble {}: {:#}", line.text, idx, err);
                ok = false;
            }
        }
        drawn.push(ok);
    }
    RenderOutcome { drawn }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::layout::{EstimatedMeasurer, layout_bubble};
    use crate::overlay::surface::RasterSurface;
    use anyhow::{Result, anyhow};
    use image::{DynamicImage, Rgba, RgbaImage};

    #[derive(Debug, PartialEq)]
    enum Op {
        Fill(Rectangle),
        Text(String, f32),
    }

    struct RecordingSurface {
        ops: Vec<Op>,
        fail_on: Option<&'static str>,
    }

    impl Surface for RecordingSurface {
        fn dimensions(&self) -> (u32, u32) {
            (200, 200)
        }

        fn snapshot(&self) -> DynamicImage {
            DynamicImage::new_rgba8(200, 200)
        }

        fn crop(&self, _rect: &Rectangle) -> Option<DynamicImage> {
            None
        }

        fn fill_rect(&mut self, rect: &Rectangle, _color: Rgba<u8>) {
            self.ops.push(Op::Fill(*rect));
        }

        fn draw_text(&mut self, run: &TextRun<'_>, _clip: &Rectangle) -> Result<()> {
            if self.fail_on == Some(run.text) {
                return Err(anyhow!("glyph cache exploded"));
            }
            self.ops.push(Op::Text(run.text.to_string(), run.font_size));
            Ok(())
        }
    }

    fn rect(x1: u32, y1: u32, x2: u32, y2: u32) -> Rectangle {
        Rectangle::new(x1, y1, x2, y2).expect("rect")
    }

    #[test]
    fn masks_before_drawing_each_bubble() {
        let plans = vec![
            layout_bubble(&rect(0, 0, 100, 40), "Hi there", &EstimatedMeasurer),
            layout_bubble(&rect(100, 100, 180, 150), "", &EstimatedMeasurer),
        ];
        let mut surface = RecordingSurface {
            ops: Vec::new(),
            fail_on: None,
        };
        let outcome = render_plans(&mut surface, &plans, &OverlayStyle::default());
        assert_eq!(outcome.drawn, vec![true, true]);
        assert_eq!(
            surface.ops,
            vec![
                Op::Fill(rect(0, 0, 100, 40)),
                Op::Text("Hi there".to_string(), plans[0].font_size),
                Op::Fill(rect(100, 100, 180, 150)),
            ]
        );
    }

    #[test]
    fn draw_failure_is_reported_per_bubble() {
        let plans = vec![
            layout_bubble(&rect(0, 0, 100, 40), "broken", &EstimatedMeasurer),
            layout_bubble(&rect(0, 50, 100, 90), "fine", &EstimatedMeasurer),
        ];
        let mut surface = RecordingSurface {
            ops: Vec::new(),
            fail_on: Some("broken"),
        };
        let outcome = render_plans(&mut surface, &plans, &OverlayStyle::default());
        assert_eq!(outcome.drawn, vec![false, true]);
        assert!(surface.ops.contains(&Op::Text("fine".to_string(), plans[1].font_size)));
    }

    #[test]
    fn pixels_outside_bubbles_are_untouched() {
        let source = RgbaImage::from_fn(160, 120, |x, y| {
            Rgba([(x % 251) as u8, (y % 241) as u8, 90, 255])
        });
        let bubbles = [rect(10, 10, 110, 60), rect(20, 70, 60, 110)];
        let plans: Vec<LayoutPlan> = bubbles
            .iter()
            .zip(["Hello world, how are you today", "Supercalifragilistic"])
            .map(|(bubble, text)| layout_bubble(bubble, text, &EstimatedMeasurer))
            .collect();
        let mut surface = RasterSurface::new(source.clone(), None);
        render_plans(&mut surface, &plans, &OverlayStyle::default());

        let output = surface.into_image();
        for (x, y, pixel) in output.enumerate_pixels() {
            if bubbles.iter().any(|bubble| bubble.contains(x, y)) {
                continue;
            }
            assert_eq!(pixel, source.get_pixel(x, y), "pixel ({x}, {y}) changed");
        }
        // mask corner is never covered by centered text
        assert_eq!(*output.get_pixel(10, 10), Rgba([255, 255, 255, 255]));
    }
}
