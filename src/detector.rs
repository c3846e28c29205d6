use anyhow::{Context, Result};
use image::DynamicImage;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

use crate::pipeline::{CollaboratorFuture, Detector};
use crate::region::Detection;

/// Detector backed by boxes an external model already wrote to disk.
///
/// Accepts either `[[x1, y1, x2, y2], ...]` or
/// `[{"x1": .., "y1": .., "x2": .., "y2": .., "confidence": ..}, ...]`.
#[derive(Debug, Clone)]
pub struct JsonRegionDetector {
    path: PathBuf,
    min_confidence: Option<f32>,
}

/// Coordinates stay floating point until conversion, so model output like
/// `[10.4, 5.0, 40.9, 60.2]` or a slightly negative corner still parses.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegionEntry {
    Corners([f64; 4]),
    Named {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        #[serde(default)]
        confidence: Option<f32>,
    },
}

impl RegionEntry {
    fn into_detection(self) -> Detection {
        match self {
            RegionEntry::Corners([x1, y1, x2, y2]) => {
                Detection::new(pixel(x1), pixel(y1), pixel(x2), pixel(y2))
            }
            RegionEntry::Named {
                x1,
                y1,
                x2,
                y2,
                confidence,
            } => Detection {
                confidence,
                ..Detection::new(pixel(x1), pixel(y1), pixel(x2), pixel(y2))
            },
        }
    }
}

/// Truncates toward zero; negatives and NaN land on 0.
fn pixel(value: f64) -> u32 {
    value as u32
}

impl JsonRegionDetector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_confidence: None,
        }
    }

    pub fn with_min_confidence(mut self, threshold: Option<f32>) -> Self {
        self.min_confidence = threshold;
        self
    }

    fn load(&self) -> Result<Vec<Detection>> {
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read regions: {}", self.path.display()))?;
        let detections = parse_regions(&content)
            .with_context(|| format!("failed to parse regions: {}", self.path.display()))?;
        Ok(match self.min_confidence {
            Some(threshold) => detections
                .into_iter()
                .filter(|detection| detection.confidence.is_none_or(|conf| conf >= threshold))
                .collect(),
            None => detections,
        })
    }
}

impl Detector for JsonRegionDetector {
    fn detect(&self, _image: DynamicImage) -> CollaboratorFuture<'_, Vec<Detection>> {
        Box::pin(async move { self.load() })
    }
}

/// Parses a list of boxes. Only a file that is not a JSON list fails; an
/// entry that is not a box is dropped with a warning.
pub fn parse_regions(content: &str) -> Result<Vec<Detection>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(content)?;
    Ok(entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| {
            match serde_json::from_value::<RegionEntry>(value) {
                Ok(entry) => Some(entry.into_detection()),
                Err(err) => {
                    warn!("ignoring malformed region {}: {}", index, err);
                    None
                }
            }
        })
        .collect())
}
