use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use image::{DynamicImage, Rgba, RgbaImage};
use manga_translator_rust::overlay::TextRun;
use manga_translator_rust::pipeline::CollaboratorFuture;
use manga_translator_rust::{
    Collaborators, Detection, Detector, EstimatedMeasurer, OverlayStyle, Pipeline, PipelineConfig,
    RasterSurface, Rectangle, Surface, TextRecognizer, Translator, translate_image,
};

const PAGE: Rgba<u8> = Rgba([90, 60, 30, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

struct FixedDetector(Vec<Detection>);

impl Detector for FixedDetector {
    fn detect(&self, _image: DynamicImage) -> CollaboratorFuture<'_, Vec<Detection>> {
        let detections = self.0.clone();
        Box::pin(async move { Ok(detections) })
    }
}

/// Reads a bubble's text from a table keyed by crop width.
struct TableRecognizer(Vec<(u32, &'static str)>);

impl TextRecognizer for TableRecognizer {
    fn recognize(&self, region: DynamicImage) -> CollaboratorFuture<'_, String> {
        let text = self
            .0
            .iter()
            .find(|(width, _)| *width == region.width())
            .map(|(_, text)| text.to_string())
            .unwrap_or_default();
        Box::pin(async move { Ok(text) })
    }
}

struct UppercaseTranslator {
    fail_on: Option<&'static str>,
}

impl Translator for UppercaseTranslator {
    fn translate(&self, text: String) -> CollaboratorFuture<'_, String> {
        Box::pin(async move {
            if self.fail_on == Some(text.as_str()) {
                return Err(anyhow!("upstream returned 500"));
            }
            Ok(text.to_uppercase())
        })
    }
}

/// Forwards to a raster surface and remembers which bubble each line went to.
struct RecordingSurface {
    inner: RasterSurface,
    lines: Mutex<Vec<(Rectangle, String)>>,
}

impl Surface for RecordingSurface {
    fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    fn snapshot(&self) -> DynamicImage {
        self.inner.snapshot()
    }

    fn crop(&self, rect: &Rectangle) -> Option<DynamicImage> {
        self.inner.crop(rect)
    }

    fn fill_rect(&mut self, rect: &Rectangle, color: Rgba<u8>) {
        self.inner.fill_rect(rect, color)
    }

    fn draw_text(&mut self, run: &TextRun<'_>, clip: &Rectangle) -> Result<()> {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((*clip, run.text.to_string()));
        }
        self.inner.draw_text(run, clip)
    }
}

fn pipeline(
    detections: Vec<Detection>,
    texts: Vec<(u32, &'static str)>,
    fail_on: Option<&'static str>,
) -> Pipeline {
    Pipeline::new(
        Collaborators {
            detector: Arc::new(FixedDetector(detections)),
            recognizer: Arc::new(TableRecognizer(texts)),
            translator: Arc::new(UppercaseTranslator { fail_on }),
        },
        Arc::new(EstimatedMeasurer),
        PipelineConfig {
            concurrency: 3,
            timeout: None,
            style: OverlayStyle::default(),
        },
    )
}

fn dark_pixels(image: &RgbaImage, area: &Rectangle) -> usize {
    image
        .enumerate_pixels()
        .filter(|(x, y, px)| area.contains(*x, *y) && px[0] < 128 && px[1] < 128 && px[2] < 128)
        .count()
}

fn page(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, PAGE))
}

#[tokio::test]
async fn no_detections_leaves_the_page_untouched() {
    let input = page(160, 90);
    let pipeline = pipeline(Vec::new(), Vec::new(), None);
    let (output_image, output) = translate_image(&pipeline, &input, None)
        .await
        .expect("translate");
    assert_eq!(output.detected, 0);
    assert!(output.bubbles.is_empty());
    assert_eq!(output_image, input.to_rgba8());
}

#[tokio::test]
async fn failed_translation_blanks_only_that_bubble() {
    let detections = vec![
        Detection::new(0, 0, 100, 60),
        Detection::new(110, 0, 230, 60),
        Detection::new(0, 70, 140, 130),
    ];
    let texts = vec![(100, "hi"), (120, "bye"), (140, "see you")];
    let pipeline = pipeline(detections, texts, Some("bye"));
    let mut surface = RecordingSurface {
        inner: RasterSurface::from_dynamic(&page(240, 140), None),
        lines: Mutex::new(Vec::new()),
    };

    let output = pipeline.run(&mut surface).await.expect("run");
    assert_eq!(output.bubbles.len(), 3);
    assert_eq!(output.bubbles[0].bubble.translated_text(), Some("HI"));
    assert_eq!(output.bubbles[1].bubble.translated_text(), None);
    assert_eq!(output.bubbles[2].bubble.translated_text(), Some("SEE YOU"));
    let reason = output.bubbles[1].degraded.as_deref().unwrap_or_default();
    assert!(reason.starts_with("translator failed"), "{}", reason);
    assert!(output.bubbles[1].plan.is_empty());

    let lines = surface.lines.lock().expect("lock").clone();
    let failed = output.bubbles[1].bubble.rect();
    assert!(lines.iter().all(|(clip, _)| clip != failed));
    assert!(lines.iter().any(|(_, text)| text == "HI"));
    assert!(lines.iter().any(|(_, text)| text == "SEE YOU"));

    let image = surface.inner.image();
    for y in failed.y1()..failed.y2() {
        for x in failed.x1()..failed.x2() {
            assert_eq!(image.get_pixel(x, y), &WHITE);
        }
    }
    for drawn in [&output.bubbles[0], &output.bubbles[2]] {
        assert!(drawn.drawn);
        assert!(dark_pixels(image, drawn.bubble.rect()) > 0, "no ink in {:?}", drawn.bubble.rect());
    }
    // Gap between the top two bubbles.
    assert_eq!(image.get_pixel(105, 30), &PAGE);
    assert_eq!(image.get_pixel(239, 139), &PAGE);
}

#[tokio::test]
async fn example_bubble_is_laid_out_and_reported() {
    let pipeline = pipeline(
        vec![Detection::new(20, 10, 220, 110)],
        vec![(200, "Hello world,\nhow are you today")],
        None,
    );
    let (image, output) = translate_image(&pipeline, &page(260, 130), None)
        .await
        .expect("translate");

    let outcome = &output.bubbles[0];
    assert_eq!(outcome.bubble.raw_text(), Some("Hello world,\nhow are you today"));
    assert_eq!(
        outcome.bubble.translated_text(),
        Some("HELLO WORLD, HOW ARE YOU TODAY")
    );
    assert!(outcome.drawn);
    assert!(!outcome.plan.is_empty());
    assert!(outcome.plan.font_size >= manga_translator_rust::overlay::MIN_FONT);
    let words: Vec<String> = outcome
        .plan
        .lines
        .iter()
        .flat_map(|line| line.text.split_whitespace().map(str::to_string))
        .collect();
    assert_eq!(words.join(" "), "HELLO WORLD, HOW ARE YOU TODAY");

    assert_eq!(image.get_pixel(19, 60), &PAGE);
    assert_eq!(image.get_pixel(220, 60), &PAGE);
    assert_eq!(image.get_pixel(120, 9), &PAGE);
    assert_eq!(image.get_pixel(120, 110), &PAGE);
    assert_eq!(image.get_pixel(20, 10), &WHITE);
    assert!(dark_pixels(&image, outcome.bubble.rect()) > 0);

    let report = serde_json::to_value(&output).expect("report");
    assert_eq!(report["detected"], 1);
    assert_eq!(report["bubbles"][0]["drawn"], true);
    assert!(report["bubbles"][0].get("degraded").is_none());
}
