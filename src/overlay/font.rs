use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::layout::{TextExtent, TextMeasurer};
use crate::error::{OverlayError, OverlayResult};

/// Glyph metrics of the single overlay font. Measures with the same face the
/// raster surface draws with.
#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    line_gap: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish_non_exhaustive()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, font_size: f32) -> f32 {
        font_size / self.units_per_em.max(1) as f32
    }

    /// Distance from the top of a line box to its baseline.
    pub fn ascent_px(&self, font_size: f32) -> f32 {
        self.ascender as f32 * self.scale(font_size)
    }

    pub fn line_height_px(&self, font_size: f32) -> f32 {
        let units = self.ascender as i32 - self.descender as i32 + self.line_gap as i32;
        units.max(1) as f32 * self.scale(font_size)
    }
}

impl TextMeasurer for FontMetrics {
    fn measure(&self, text: &str, font_size: f32) -> OverlayResult<TextExtent> {
        let face = Face::parse(&self.data, self.face_index).map_err(|err| {
            OverlayError::MeasurementFailure {
                text: text.to_string(),
                font_size,
                reason: format!("font face unreadable: {}", err),
            }
        })?;
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(self.space_advance as u32);
                continue;
            }
            match face.glyph_index(ch) {
                Some(glyph) => {
                    let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(self.space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                }
                None if ch.is_whitespace() => {
                    advance = advance.saturating_add(self.space_advance as u32);
                }
                None => {
                    return Err(OverlayError::MeasurementFailure {
                        text: text.to_string(),
                        font_size,
                        reason: format!("no glyph for {:?} (U+{:04X})", ch, ch as u32),
                    });
                }
            }
        }
        Ok(TextExtent {
            width: advance as f32 * self.scale(font_size),
            height: self.line_height_px(font_size),
        })
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

pub struct ResolvedOverlayFont {
    pub metrics: FontMetrics,
    pub family: String,
}

pub fn resolve_overlay_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fallback: &[&str],
) -> Result<ResolvedOverlayFont> {
    if let Some(path) = font_path {
        let metrics = load_font_metrics(path)?;
        let family = metrics
            .family()
            .map(|name| name.to_string())
            .or_else(|| font_family.map(|name| name.to_string()))
            .unwrap_or_else(|| "sans-serif".to_string());
        return Ok(ResolvedOverlayFont { metrics, family });
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family
        && let Ok(resolved) = load_font_metrics_from_family(&db, family)
    {
        return Ok(resolved);
    }

    for candidate in fallback {
        if let Ok(resolved) = load_font_metrics_from_family(&db, candidate) {
            return Ok(resolved);
        }
    }

    Err(anyhow!("no overlay font found (tried {:?}, {:?})", font_family, fallback))
}

#[cfg(target_os = "macos")]
pub fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Anime Ace", "Comic Sans MS", "Helvetica", "sans-serif"]
}

#[cfg(target_os = "windows")]
pub fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Anime Ace", "Comic Sans MS", "Arial", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Anime Ace", "Comic Neue", "DejaVu Sans", "sans-serif"]
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let metrics = FontMetrics {
                data: Arc::new(data.to_vec()),
                units_per_em,
                space_advance,
                ascender: face.ascender(),
                descender: face.descender(),
                line_gap: face.line_gap(),
                family: family.clone(),
                face_index: index,
            };
            if let (Some(preferred), Some(found)) = (preferred_family, &family)
                && found.eq_ignore_ascii_case(preferred)
            {
                return Ok(metrics);
            }
            if fallback.is_none() {
                fallback = Some(metrics);
            }
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(
    db: &fontdb::Database,
    family: &str,
) -> Result<ResolvedOverlayFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let metrics = load_font_metrics_from_data(&data, Some(family))?;
    let resolved_family = metrics
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedOverlayFont {
        metrics,
        family: resolved_family,
    })
}

/// Family of a loaded face that can draw Latin text, preferring the platform
/// fallback list. fontdb's generic `sans-serif` points at "Arial", which is
/// often not installed.
pub(crate) fn loaded_text_family(db: &fontdb::Database) -> Option<String> {
    for candidate in overlay_fallback_fonts() {
        let query = fontdb::Query {
            families: &[fontdb::Family::Name(*candidate)],
            ..Default::default()
        };
        if let Some(face) = db.query(&query).and_then(|id| db.face(id))
            && let Some((family, _)) = face.families.first()
        {
            return Some(family.clone());
        }
    }
    db.faces().find_map(|face| {
        let covers_latin = db
            .with_face_data(face.id, |data, index| {
                Face::parse(data, index)
                    .map(|parsed| parsed.glyph_index('A').is_some())
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if covers_latin {
            face.families.first().map(|(family, _)| family.clone())
        } else {
            None
        }
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}
