use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ocr::DEFAULT_PSM;
use crate::providers::DEFAULT_MODEL;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub overlay_font_path: Option<String>,
    pub overlay_font_family: Option<String>,
    pub overlay_fill_color: String,
    pub overlay_text_color: String,
    pub detector_min_confidence: Option<f32>,
    pub ocr_languages: String,
    pub ocr_psm: u32,
    pub model: String,
    pub source_lang: String,
    pub target_lang: String,
    pub base_url: Option<String>,
    pub concurrency: usize,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            overlay_font_path: None,
            overlay_font_family: None,
            overlay_fill_color: "#ffffff".to_string(),
            overlay_text_color: "#000000".to_string(),
            detector_min_confidence: None,
            ocr_languages: "eng".to_string(),
            ocr_psm: DEFAULT_PSM,
            model: DEFAULT_MODEL.to_string(),
            source_lang: "en".to_string(),
            target_lang: "fr".to_string(),
            base_url: None,
            concurrency: 0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    overlay: Option<OverlaySettings>,
    detector: Option<DetectorSettings>,
    recognizer: Option<RecognizerSettings>,
    translator: Option<TranslatorSettings>,
    pipeline: Option<PipelineSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_path: Option<String>,
    font_family: Option<String>,
    fill_color: Option<String>,
    text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorSettings {
    min_confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct RecognizerSettings {
    languages: Option<String>,
    psm: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslatorSettings {
    model: Option<String>,
    source_lang: Option<String>,
    target_lang: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineSettings {
    concurrency: Option<usize>,
    timeout_secs: Option<u64>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;
    settings.merge(parse(DEFAULT_SETTINGS_TOML, Path::new("<embedded settings.toml>"))?);

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge(parse(&content, &path)?);
        }
    }

    Ok(settings)
}

fn parse(content: &str, path: &Path) -> Result<SettingsFile> {
    toml::from_str(content).with_context(|| format!("failed to parse settings: {}", path.display()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

impl Settings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(overlay) = incoming.overlay {
            if let Some(path) = non_empty(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
            if let Some(family) = non_empty(overlay.font_family) {
                self.overlay_font_family = Some(family);
            }
            if let Some(color) = non_empty(overlay.fill_color) {
                self.overlay_fill_color = color;
            }
            if let Some(color) = non_empty(overlay.text_color) {
                self.overlay_text_color = color;
            }
        }
        if let Some(detector) = incoming.detector
            && let Some(threshold) = detector.min_confidence
        {
            self.detector_min_confidence = Some(threshold);
        }
        if let Some(recognizer) = incoming.recognizer {
            if let Some(languages) = non_empty(recognizer.languages) {
                self.ocr_languages = languages;
            }
            if let Some(psm) = recognizer.psm {
                self.ocr_psm = psm;
            }
        }
        if let Some(translator) = incoming.translator {
            if let Some(model) = non_empty(translator.model) {
                self.model = model;
            }
            if let Some(lang) = non_empty(translator.source_lang) {
                self.source_lang = lang;
            }
            if let Some(lang) = non_empty(translator.target_lang) {
                self.target_lang = lang;
            }
            if let Some(url) = non_empty(translator.base_url) {
                self.base_url = Some(url);
            }
        }
        if let Some(pipeline) = incoming.pipeline {
            if let Some(concurrency) = pipeline.concurrency {
                self.concurrency = concurrency;
            }
            if let Some(timeout) = pipeline.timeout_secs {
                self.timeout_secs = timeout;
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".manga-translator-rust"))
        }
    })
}
