use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod detector;
pub mod error;
pub mod image_io;
pub mod logging;
pub mod ocr;
pub mod overlay;
pub mod pipeline;
pub mod providers;
pub mod region;
pub mod settings;

pub use error::{OverlayError, OverlayResult, Stage};
pub use overlay::{
    EstimatedMeasurer, FontMetrics, LayoutPlan, LineBox, OverlayStyle, RasterSurface, Surface,
    TextExtent, TextMeasurer, layout_bubble,
};
pub use pipeline::{
    BubbleOutcome, Collaborators, Detector, Pipeline, PipelineConfig, PipelineOutput,
    TextRecognizer, Translator,
};
pub use region::{Bubble, Detection, Rectangle};

#[derive(Debug, Clone)]
pub struct Config {
    pub input: PathBuf,
    pub output: PathBuf,
    pub regions: PathBuf,
    pub report: Option<PathBuf>,
    pub lang: Option<String>,
    pub source_lang: Option<String>,
    pub model: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
}

/// Translates one page end to end and writes the result next to the
/// optional JSON report.
pub async fn run(config: Config) -> Result<PipelineOutput> {
    validate_config(&config)?;
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    let bytes = std::fs::read(&config.input)
        .with_context(|| format!("failed to read input: {}", config.input.display()))?;
    let decoded = image_io::decode_image(&bytes)
        .with_context(|| format!("failed to load input: {}", config.input.display()))?;

    let (font, measurer) = resolve_measurer(&settings);
    let pipeline_config = pipeline_config(&settings);

    let key = providers::resolve_key(config.key.as_deref())?;
    let source_lang = config.source_lang.unwrap_or(settings.source_lang.clone());
    let target_lang = config.lang.unwrap_or(settings.target_lang.clone());
    let mut translator = providers::OpenAiTranslator::new(key)
        .with_model(config.model.unwrap_or(settings.model.clone()))
        .with_languages(source_lang, target_lang);
    if let Some(base_url) = settings.base_url.as_deref() {
        translator = translator.with_base_url(base_url);
    }
    let recognizer = ocr::TesseractRecognizer::new(&settings.ocr_languages, settings.ocr_psm)?;

    let collaborators = Collaborators {
        detector: Arc::new(
            detector::JsonRegionDetector::new(config.regions.clone())
                .with_min_confidence(settings.detector_min_confidence),
        ),
        recognizer: Arc::new(recognizer),
        translator: Arc::new(translator),
    };
    let pipeline = Pipeline::new(collaborators, measurer, pipeline_config);

    let (image, output) = translate_image(&pipeline, &decoded.image, font).await?;
    let bubbles: Vec<Rectangle> = output.bubbles.iter().map(|item| *item.bubble.rect()).collect();
    let encoded = image_io::encode_page(&bytes, &decoded, &image, &bubbles)?;
    std::fs::write(&config.output, encoded)
        .with_context(|| format!("failed to write output: {}", config.output.display()))?;
    info!(
        "wrote {} ({} bubble(s))",
        config.output.display(),
        output.bubbles.len()
    );

    if let Some(report) = config.report.as_ref() {
        let json = serde_json::to_string_pretty(&output)
            .with_context(|| "failed to serialize report")?;
        std::fs::write(report, json)
            .with_context(|| format!("failed to write report: {}", report.display()))?;
    }
    Ok(output)
}

/// Runs `pipeline` over a copy of `image` and returns the composited page.
pub async fn translate_image(
    pipeline: &Pipeline,
    image: &DynamicImage,
    font: Option<FontMetrics>,
) -> Result<(RgbaImage, PipelineOutput)> {
    let mut surface = RasterSurface::from_dynamic(image, font);
    let output = pipeline.run(&mut surface).await?;
    Ok((surface.into_image(), output))
}

fn resolve_measurer(settings: &settings::Settings) -> (Option<FontMetrics>, Arc<dyn TextMeasurer>) {
    let resolved = overlay::resolve_overlay_font(
        settings.overlay_font_path.as_deref().map(Path::new),
        settings.overlay_font_family.as_deref(),
        overlay::overlay_fallback_fonts(),
    );
    match resolved {
        Ok(resolved) => {
            info!("overlay font: {}", resolved.family);
            let measurer: Arc<dyn TextMeasurer> = Arc::new(resolved.metrics.clone());
            (Some(resolved.metrics), measurer)
        }
        Err(err) => {
            warn!("{}; using estimated text metrics", err);
            (None, Arc::new(EstimatedMeasurer))
        }
    }
}

fn pipeline_config(settings: &settings::Settings) -> PipelineConfig {
    let defaults = PipelineConfig::default();
    let concurrency = if settings.concurrency == 0 {
        defaults.concurrency
    } else {
        settings.concurrency
    };
    let style = OverlayStyle {
        fill_color: color_or(&settings.overlay_fill_color, defaults.style.fill_color),
        text_color: color_or(&settings.overlay_text_color, defaults.style.text_color),
    };
    PipelineConfig {
        concurrency,
        timeout: settings.timeout(),
        style,
    }
}

fn color_or(value: &str, fallback: image::Rgba<u8>) -> image::Rgba<u8> {
    match overlay::parse_hex_color(value) {
        Some(color) => color,
        None => {
            warn!("invalid overlay color '{}'; using default", value);
            fallback
        }
    }
}

/// Checks the input files before any collaborator is built.
pub fn validate_config(config: &Config) -> Result<()> {
    for (flag, path) in [("--input", &config.input), ("--regions", &config.regions)] {
        if !path.exists() {
            return Err(anyhow!("{} not found: {}", flag, path.display()));
        }
    }
    Ok(())
}
