mod preprocess;
mod tesseract;

use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::Write;
use tracing::debug;

use crate::pipeline::{CollaboratorFuture, TextRecognizer};

pub use tesseract::list_tesseract_languages;

/// Page segmentation mode for a single uniform block of text.
pub const DEFAULT_PSM: u32 = 6;

/// [`TextRecognizer`] that shells out to the `tesseract` CLI per bubble.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    languages: String,
    psm: u32,
}

impl TesseractRecognizer {
    /// Checks `languages` against the installed traineddata once, up front.
    pub fn new(languages: &str, psm: u32) -> Result<Self> {
        let languages = tesseract::normalize_ocr_languages(languages)?;
        Ok(Self { languages, psm })
    }

    fn recognize_blocking(&self, region: &DynamicImage) -> Result<String> {
        let prepared = preprocess::prepare_for_ocr(region);
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        DynamicImage::ImageLuma8(prepared)
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();
        let text = tesseract::run_tesseract_text(tmp.path(), &self.languages, self.psm)?;
        debug!("tesseract read {} char(s)", text.chars().count());
        Ok(text)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, region: DynamicImage) -> CollaboratorFuture<'_, String> {
        let recognizer = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || recognizer.recognize_blocking(&region))
                .await
                .map_err(|err| anyhow!("ocr task failed: {}", err))?
        })
    }
}
