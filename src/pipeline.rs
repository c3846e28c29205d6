use futures_util::stream::{self, StreamExt};
use image::DynamicImage;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{OverlayError, OverlayResult, Stage};
use crate::overlay::{LayoutPlan, OverlayStyle, Surface, TextMeasurer, layout_bubble, render_plans};
use crate::region::{Bubble, Detection};

pub type CollaboratorFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Finds candidate speech bubbles in a page.
pub trait Detector: Send + Sync {
    fn detect(&self, image: DynamicImage) -> CollaboratorFuture<'_, Vec<Detection>>;
}

/// Reads the source text out of one cropped bubble.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, region: DynamicImage) -> CollaboratorFuture<'_, String>;
}

/// Translates one cleaned, single-line string.
pub trait Translator: Send + Sync {
    fn translate(&self, text: String) -> CollaboratorFuture<'_, String>;
}

/// Loaded collaborator backends. Built once by the caller and handed to a
/// [`Pipeline`]; dropping the pipeline releases them.
#[derive(Clone)]
pub struct Collaborators {
    pub detector: Arc<dyn Detector>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub translator: Arc<dyn Translator>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bubbles recognized and translated at the same time.
    pub concurrency: usize,
    /// Limit for every single collaborator call.
    pub timeout: Option<Duration>,
    pub style: OverlayStyle,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get().max(1),
            timeout: Some(Duration::from_secs(60)),
            style: OverlayStyle::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BubbleOutcome {
    /// Position in the detector's output.
    pub index: usize,
    pub bubble: Bubble,
    pub plan: LayoutPlan,
    pub drawn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub detected: usize,
    pub skipped: Vec<SkippedRegion>,
    pub bubbles: Vec<BubbleOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRegion {
    pub index: usize,
    pub detection: Detection,
    pub reason: String,
}

pub struct Pipeline {
    collaborators: Collaborators,
    measurer: Arc<dyn TextMeasurer>,
    config: PipelineConfig,
}

struct BubbleJob {
    index: usize,
    bubble: Bubble,
    crop: Option<DynamicImage>,
}

struct ProcessedBubble {
    index: usize,
    bubble: Bubble,
    degraded: Option<String>,
}

impl Pipeline {
    pub fn new(
        collaborators: Collaborators,
        measurer: Arc<dyn TextMeasurer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            collaborators,
            measurer,
            config,
        }
    }

    /// Detects, reads, translates and typesets every bubble on `surface`.
    ///
    /// Only a detector failure aborts the run; problems with a single bubble
    /// leave that bubble masked and blank.
    pub async fn run<S>(&self, surface: &mut S) -> OverlayResult<PipelineOutput>
    where
        S: Surface + Send + ?Sized,
    {
        let source = surface.snapshot();
        let detections = call_with_timeout(
            Stage::Detector,
            self.config.timeout,
            self.collaborators.detector.detect(source),
        )
        .await?;
        let detected = detections.len();
        info!("detector returned {} region(s)", detected);

        let mut jobs = Vec::with_capacity(detected);
        let mut skipped = Vec::new();
        for (index, detection) in detections.into_iter().enumerate() {
            match Bubble::try_from(detection) {
                Ok(bubble) => {
                    let crop = surface.crop(bubble.rect());
                    jobs.push(BubbleJob {
                        index,
                        bubble,
                        crop,
                    });
                }
                Err(err) => {
                    warn!("skipping region {}: {}", index, err);
                    skipped.push(SkippedRegion {
                        index,
                        detection,
                        reason: err.to_string(),
                    });
                }
            }
        }

        let processed: Vec<ProcessedBubble> = stream::iter(jobs)
            .map(|job| self.process_bubble(job))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let plans: Vec<LayoutPlan> = processed
            .iter()
            .map(|item| {
                let text = item.bubble.translated_text().unwrap_or_default();
                layout_bubble(item.bubble.rect(), text, self.measurer.as_ref())
            })
            .collect();
        let outcome = render_plans(surface, &plans, &self.config.style);

        let bubbles = processed
            .into_iter()
            .zip(plans)
            .zip(outcome.drawn)
            .map(|((item, plan), drawn)| BubbleOutcome {
                index: item.index,
                bubble: item.bubble,
                plan,
                drawn,
                degraded: item.degraded,
            })
            .collect();

        Ok(PipelineOutput {
            detected,
            skipped,
            bubbles,
        })
    }

    async fn process_bubble(&self, job: BubbleJob) -> ProcessedBubble {
        let BubbleJob {
            index,
            bubble,
            crop,
        } = job;
        let Some(crop) = crop else {
            warn!("bubble {} lies outside the image; masking only", index);
            return ProcessedBubble {
                index,
                bubble,
                degraded: Some("region lies outside the image".to_string()),
            };
        };

        let raw = match call_with_timeout(
            Stage::Recognizer,
            self.config.timeout,
            self.collaborators.recognizer.recognize(crop),
        )
        .await
        {
            Ok(text) => text,
            Err(err) => {
                warn!("bubble {}: {}; masking only", index, err);
                return ProcessedBubble {
                    index,
                    bubble,
                    degraded: Some(err.to_string()),
                };
            }
        };

        let cleaned = clean_text(&raw);
        let bubble = bubble.with_raw_text(raw);
        if cleaned.is_empty() {
            debug!("bubble {} has no recognizable text", index);
            return ProcessedBubble {
                index,
                bubble: bubble.with_translation(String::new()),
                degraded: None,
            };
        }

        match call_with_timeout(
            Stage::Translator,
            self.config.timeout,
            self.collaborators.translator.translate(cleaned),
        )
        .await
        {
            Ok(translated) => ProcessedBubble {
                index,
                bubble: bubble.with_translation(translated.trim()),
                degraded: None,
            },
            Err(err) => {
                warn!("bubble {}: {}; masking only", index, err);
                ProcessedBubble {
                    index,
                    bubble,
                    degraded: Some(err.to_string()),
                }
            }
        }
    }
}

/// Joins recognizer output into one line for the translator.
pub fn clean_text(raw: &str) -> String {
    raw.trim().replace("\r\n", " ").replace(['\n', '\r'], " ")
}

async fn call_with_timeout<T>(
    stage: Stage,
    limit: Option<Duration>,
    future: CollaboratorFuture<'_, T>,
) -> OverlayResult<T> {
    let result = match limit {
        Some(limit) => timeout(limit, future).await.map_err(|_| {
            OverlayError::collaborator(
                stage,
                format!("timed out after {:.1}s", limit.as_secs_f32()),
            )
        })?,
        None => future.await,
    };
    result.map_err(|err| OverlayError::collaborator(stage, format!("{:#}", err)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{EstimatedMeasurer, RasterSurface};
    use anyhow::anyhow;
    use image::{Rgba, RgbaImage};
    use std::sync::Mutex;

    struct FixedDetector(Vec<Detection>);

    impl Detector for FixedDetector {
        fn detect(&self, _image: DynamicImage) -> CollaboratorFuture<'_, Vec<Detection>> {
            let detections = self.0.clone();
            Box::pin(async move { Ok(detections) })
        }
    }

    struct BrokenDetector;

    impl Detector for BrokenDetector {
        fn detect(&self, _image: DynamicImage) -> CollaboratorFuture<'_, Vec<Detection>> {
            Box::pin(async { Err(anyhow!("model not loaded")) })
        }
    }

    /// Returns a canned text per crop width, so each bubble reads differently.
    struct WidthRecognizer;

    impl TextRecognizer for WidthRecognizer {
        fn recognize(&self, region: DynamicImage) -> CollaboratorFuture<'_, String> {
            let text = format!("width\n{}", region.width());
            Box::pin(async move { Ok(text) })
        }
    }

    #[derive(Default)]
    struct RecordingTranslator {
        seen: Mutex<Vec<String>>,
        delay_ms: u64,
    }

    impl Translator for RecordingTranslator {
        fn translate(&self, text: String) -> CollaboratorFuture<'_, String> {
            Box::pin(async move {
                if self.delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
                }
                if let Ok(mut seen) = self.seen.lock() {
                    seen.push(text.clone());
                }
                Ok(format!("T:{}", text))
            })
        }
    }

    fn pipeline(
        detector: impl Detector + 'static,
        translator: Arc<RecordingTranslator>,
        timeout: Option<Duration>,
    ) -> Pipeline {
        Pipeline::new(
            Collaborators {
                detector: Arc::new(detector),
                recognizer: Arc::new(WidthRecognizer),
                translator,
            },
            Arc::new(EstimatedMeasurer),
            PipelineConfig {
                concurrency: 2,
                timeout,
                style: OverlayStyle::default(),
            },
        )
    }

    fn page() -> RasterSurface {
        RasterSurface::new(
            RgbaImage::from_pixel(200, 120, Rgba([40, 80, 120, 255])),
            None,
        )
    }

    #[test]
    fn clean_text_joins_lines() {
        assert_eq!(clean_text("  HELLO\nTHERE\r\nFRIEND \n"), "HELLO THERE FRIEND");
        assert_eq!(clean_text(" \n "), "");
    }

    #[tokio::test]
    async fn sends_cleaned_text_and_keeps_detection_order() {
        let translator = Arc::new(RecordingTranslator::default());
        let detections = vec![
            Detection::new(0, 0, 50, 40),
            Detection::new(60, 0, 90, 40),
            Detection::new(100, 0, 180, 40),
        ];
        let pipeline = pipeline(FixedDetector(detections), translator.clone(), None);
        let mut surface = page();
        let output = pipeline.run(&mut surface).await.expect("run");

        let translated: Vec<Option<&str>> = output
            .bubbles
            .iter()
            .map(|outcome| outcome.bubble.translated_text())
            .collect();
        assert_eq!(
            translated,
            vec![Some("T:width 50"), Some("T:width 30"), Some("T:width 80")]
        );
        assert_eq!(output.bubbles[0].bubble.raw_text(), Some("width\n50"));
        let mut seen = translator.seen.lock().expect("lock").clone();
        seen.sort();
        assert_eq!(seen, vec!["width 30", "width 50", "width 80"]);
    }

    #[tokio::test]
    async fn invalid_regions_are_skipped() {
        let translator = Arc::new(RecordingTranslator::default());
        let detections = vec![
            Detection::new(10, 10, 10, 40),
            Detection::new(20, 20, 80, 60),
        ];
        let pipeline = pipeline(FixedDetector(detections), translator, None);
        let mut surface = page();
        let output = pipeline.run(&mut surface).await.expect("run");
        assert_eq!(output.detected, 2);
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].index, 0);
        assert_eq!(output.bubbles.len(), 1);
        assert_eq!(output.bubbles[0].index, 1);
    }

    #[tokio::test]
    async fn detector_failure_aborts_the_run() {
        let translator = Arc::new(RecordingTranslator::default());
        let pipeline = pipeline(BrokenDetector, translator, None);
        let mut surface = page();
        let err = pipeline.run(&mut surface).await.unwrap_err();
        assert!(matches!(
            err,
            OverlayError::CollaboratorFailure {
                stage: Stage::Detector,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn slow_translator_times_out_to_blank_bubble() {
        let translator = Arc::new(RecordingTranslator {
            seen: Mutex::new(Vec::new()),
            delay_ms: 500,
        });
        let detections = vec![Detection::new(20, 20, 120, 80)];
        let pipeline = pipeline(
            FixedDetector(detections),
            translator,
            Some(Duration::from_millis(20)),
        );
        let mut surface = page();
        let output = pipeline.run(&mut surface).await.expect("run");
        let outcome = &output.bubbles[0];
        assert!(outcome.bubble.translated_text().is_none());
        assert!(outcome.plan.is_empty());
        let reason = outcome.degraded.as_deref().expect("degraded");
        assert!(reason.contains("translator failed: timed out"), "{reason}");
        for (x, y, pixel) in surface.image().enumerate_pixels() {
            if outcome.bubble.rect().contains(x, y) {
                assert_eq!(*pixel, Rgba([255, 255, 255, 255]));
            }
        }
    }
}
