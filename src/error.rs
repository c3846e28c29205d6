use std::fmt;

use thiserror::Error;

/// External collaborator a pipeline call was made to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Detector,
    Recognizer,
    Translator,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Detector => "detector",
            Stage::Recognizer => "recognizer",
            Stage::Translator => "translator",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("invalid region ({x1}, {y1}, {x2}, {y2}): expected x1 < x2 and y1 < y2")]
    InvalidRegion { x1: u32, y1: u32, x2: u32, y2: u32 },

    #[error("failed to measure {text:?} at {font_size}px: {reason}")]
    MeasurementFailure {
        text: String,
        font_size: f32,
        reason: String,
    },

    #[error("{stage} failed: {message}")]
    CollaboratorFailure { stage: Stage, message: String },
}

impl OverlayError {
    pub(crate) fn collaborator(stage: Stage, err: impl fmt::Display) -> Self {
        OverlayError::CollaboratorFailure {
            stage,
            message: err.to_string(),
        }
    }
}

pub type OverlayResult<T> = std::result::Result<T, OverlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_failure_names_the_stage() {
        let err = OverlayError::collaborator(Stage::Translator, "connection refused");
        assert_eq!(err.to_string(), "translator failed: connection refused");
    }

    #[test]
    fn invalid_region_lists_coordinates() {
        let err = OverlayError::InvalidRegion {
            x1: 5,
            y1: 1,
            x2: 5,
            y2: 9,
        };
        assert_eq!(
            err.to_string(),
            "invalid region (5, 1, 5, 9): expected x1 < x2 and y1 < y2"
        );
    }
}
