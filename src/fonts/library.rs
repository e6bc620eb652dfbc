//! System font loading via fontdb with swash rasterization.
//!
//! Provides the production [`FontSource`]: discovers a monospace family and
//! its style variants from the system font database, keeps a small fallback
//! chain for coverage, and rasterizes glyphs with swash (color bitmap
//! sources first so emoji fonts come out colored).

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use fontdb::Database;
use swash::FontRef;
use swash::scale::ScaleContext;

use super::{FontMetrics, FontSource, FontStyle, GlyphImage};

/// Characters averaged for the advance measurement. Monospace faces give
/// identical advances; the average guards against partial coverage.
const MEASUREMENT_RUN: &str = "MW018ilm";

/// Fallback families tried for glyphs the primary face lacks.
const FALLBACK_FAMILIES: &[&str] = &[
    "Noto Sans Mono",
    "Noto Sans Symbols 2",
    "Noto Color Emoji",
    "Symbola",
];

/// Stores font data with lifetime management.
///
/// Owns the font bytes and provides a `FontRef` valid for the lifetime of
/// this struct.
#[derive(Clone)]
pub struct FontData {
    /// Raw font data bytes (TTF/OTF)
    pub data: Arc<Vec<u8>>,
    /// Swash font reference for glyph operations
    pub font_ref: FontRef<'static>,
}

impl std::fmt::Debug for FontData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontData")
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl FontData {
    /// Create a new FontData from bytes using face index 0.
    pub fn new(data: Vec<u8>) -> Option<Self> {
        Self::new_with_index(data, 0)
    }

    /// Create a new FontData from bytes with a specific face index (for
    /// TrueType Collections where faces share one data blob).
    pub fn new_with_index(data: Vec<u8>, face_index: usize) -> Option<Self> {
        let data_arc = Arc::new(data);

        // SAFETY: the data outlives the FontRef because both are stored in
        // this struct and dropped together; the Arc is never mutated.
        let font_ref = unsafe {
            let bytes = data_arc.as_slice();
            let static_bytes: &'static [u8] = std::mem::transmute(bytes);
            FontRef::from_index(static_bytes, face_index)?
        };

        Some(FontData {
            data: data_arc,
            font_ref,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GlyphKey {
    ch: char,
    style: FontStyle,
    /// Pixel size quantized to quarter pixels.
    size_q: u32,
}

impl GlyphKey {
    fn new(ch: char, style: FontStyle, font_size_px: f32) -> Self {
        Self {
            ch,
            style,
            size_q: (font_size_px * 4.0).round() as u32,
        }
    }
}

/// Production [`FontSource`] backed by the system font database.
pub struct FontLibrary {
    primary: FontData,
    bold: Option<FontData>,
    italic: Option<FontData>,
    bold_italic: Option<FontData>,
    fallbacks: Vec<FontData>,
    scale_context: ScaleContext,
    glyph_cache: HashMap<GlyphKey, Option<GlyphImage>>,
    hinting: bool,
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary")
            .field("bold", &self.bold.is_some())
            .field("italic", &self.italic.is_some())
            .field("fallbacks", &self.fallbacks.len())
            .field("cached_glyphs", &self.glyph_cache.len())
            .finish()
    }
}

impl FontLibrary {
    /// Load a monospace family (or any available monospace face when
    /// `family` is `None`) plus style variants and the fallback chain.
    pub fn new(family: Option<&str>) -> Result<Self> {
        let mut db = Database::new();
        db.load_system_fonts();
        log::info!("Loaded {} system fonts", db.len());

        let primary = Self::load_primary(&db, family)?;

        let bold = Self::load_styled(&db, family, "bold", fontdb::Weight::BOLD, None);
        let italic = Self::load_styled(
            &db,
            family,
            "italic",
            fontdb::Weight::NORMAL,
            Some(fontdb::Style::Italic),
        );
        let bold_italic = Self::load_styled(
            &db,
            family,
            "bold italic",
            fontdb::Weight::BOLD,
            Some(fontdb::Style::Italic),
        );

        let mut fallbacks = Vec::new();
        for family_name in FALLBACK_FAMILIES {
            if let Some(font_data) = Self::load_from_db(&db, family_name, None, None) {
                log::debug!("Added fallback font: {}", family_name);
                fallbacks.push(font_data);
            }
        }
        log::info!("Loaded {} fallback fonts", fallbacks.len());

        Ok(Self {
            primary,
            bold,
            italic,
            bold_italic,
            fallbacks,
            scale_context: ScaleContext::new(),
            glyph_cache: HashMap::new(),
            hinting: true,
        })
    }

    /// Build a library from raw font bytes, bypassing system discovery.
    /// Style variants fall back to the supplied face.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let primary = FontData::new(data).context("font data is not a valid TTF/OTF face")?;
        Ok(Self {
            primary,
            bold: None,
            italic: None,
            bold_italic: None,
            fallbacks: Vec::new(),
            scale_context: ScaleContext::new(),
            glyph_cache: HashMap::new(),
            hinting: true,
        })
    }

    /// Enable or disable hinting for subsequently rasterized glyphs.
    pub fn set_hinting(&mut self, hinting: bool) {
        if self.hinting != hinting {
            self.hinting = hinting;
            self.glyph_cache.clear();
        }
    }

    fn load_primary(db: &Database, family: Option<&str>) -> Result<FontData> {
        if let Some(family_name) = family {
            log::info!("Attempting to load primary font: {}", family_name);
            if let Some(font_data) = Self::load_from_db(db, family_name, None, None) {
                log::info!("Successfully loaded primary font: {}", family_name);
                return Ok(font_data);
            }
            log::warn!(
                "Primary font '{}' not found, falling back to system monospace",
                family_name
            );
        }
        Self::load_generic_monospace(db).context("no usable monospace font found on this system")
    }

    fn load_styled(
        db: &Database,
        family: Option<&str>,
        style_name: &str,
        weight: fontdb::Weight,
        style: Option<fontdb::Style>,
    ) -> Option<FontData> {
        family.and_then(|family_name| {
            let font_data = Self::load_from_db(db, family_name, Some(weight), style);
            if font_data.is_some() {
                log::debug!("Loaded {} variant of {}", style_name, family_name);
            } else {
                log::debug!(
                    "No {} variant of {}, primary face will substitute",
                    style_name,
                    family_name
                );
            }
            font_data
        })
    }

    fn load_from_db(
        db: &Database,
        family: &str,
        weight: Option<fontdb::Weight>,
        style: Option<fontdb::Style>,
    ) -> Option<FontData> {
        let query = fontdb::Query {
            families: &[fontdb::Family::Name(family)],
            weight: weight.unwrap_or(fontdb::Weight::NORMAL),
            stretch: fontdb::Stretch::Normal,
            style: style.unwrap_or(fontdb::Style::Normal),
        };
        let id = db.query(&query)?;
        db.with_face_data(id, |data, face_index| {
            FontData::new_with_index(data.to_vec(), face_index as usize)
        })?
    }

    fn load_generic_monospace(db: &Database) -> Option<FontData> {
        let query = fontdb::Query {
            families: &[fontdb::Family::Monospace],
            weight: fontdb::Weight::NORMAL,
            stretch: fontdb::Stretch::Normal,
            style: fontdb::Style::Normal,
        };
        let id = db.query(&query)?;
        db.with_face_data(id, |data, face_index| {
            FontData::new_with_index(data.to_vec(), face_index as usize)
        })?
    }

    fn styled_font(&self, style: FontStyle) -> &FontData {
        match style {
            FontStyle::Regular => &self.primary,
            FontStyle::Bold => self.bold.as_ref().unwrap_or(&self.primary),
            FontStyle::Italic => self.italic.as_ref().unwrap_or(&self.primary),
            FontStyle::BoldItalic => self
                .bold_italic
                .as_ref()
                .or(self.bold.as_ref())
                .unwrap_or(&self.primary),
        }
    }

    /// Find a face containing `ch`: the styled face first, then the
    /// fallback chain.
    fn find_glyph(&self, ch: char, style: FontStyle) -> Option<(FontRef<'static>, u16)> {
        let styled = self.styled_font(style);
        let glyph_id = styled.font_ref.charmap().map(ch);
        if glyph_id != 0 {
            return Some((styled.font_ref, glyph_id));
        }
        for fallback in &self.fallbacks {
            let glyph_id = fallback.font_ref.charmap().map(ch);
            if glyph_id != 0 {
                log::debug!("Character '{}' (U+{:04X}) found in fallback font", ch, ch as u32);
                return Some((fallback.font_ref, glyph_id));
            }
        }
        None
    }

    fn rasterize_uncached(
        &mut self,
        font_ref: FontRef<'static>,
        glyph_id: u16,
        font_size_px: f32,
    ) -> Option<GlyphImage> {
        use swash::scale::image::Content;
        use swash::scale::{Render, Source, StrikeWith};
        use swash::zeno::Format;

        let mut scaler = self
            .scale_context
            .builder(font_ref)
            .size(font_size_px)
            .hint(self.hinting)
            .build();

        // Color sources first so emoji fonts render as colored bitmaps;
        // text fonts have no color data and fall through to Outline.
        let image = Render::new(&[
            Source::ColorBitmap(StrikeWith::BestFit),
            Source::ColorOutline(0),
            Source::Outline,
        ])
        .format(Format::Alpha)
        .render(&mut scaler, glyph_id)?;

        if image.placement.width == 0 || image.placement.height == 0 {
            return None;
        }

        let (data, is_color) = match image.content {
            Content::Color => (image.data.clone(), true),
            Content::Mask => {
                let mut pixels = Vec::with_capacity(image.data.len() * 4);
                for &mask in &image.data {
                    pixels.extend_from_slice(&[255, 255, 255, mask]);
                }
                (pixels, false)
            }
            Content::SubpixelMask => {
                // Collapse RGB coverage to a single alpha channel.
                let mut pixels = Vec::with_capacity(image.data.len() / 3 * 4);
                for rgb in image.data.chunks_exact(3) {
                    let alpha =
                        ((rgb[0] as u16 + rgb[1] as u16 + rgb[2] as u16) / 3) as u8;
                    pixels.extend_from_slice(&[255, 255, 255, alpha]);
                }
                (pixels, false)
            }
        };

        Some(GlyphImage {
            left: image.placement.left,
            top: image.placement.top,
            width: image.placement.width,
            height: image.placement.height,
            is_color,
            data,
        })
    }
}

impl FontSource for FontLibrary {
    fn measure(&mut self, font_size_px: f32) -> Option<FontMetrics> {
        let font_ref = self.primary.font_ref;
        let metrics = font_ref.metrics(&[]);
        if metrics.units_per_em == 0 {
            log::warn!("Primary font reports zero units_per_em, keeping previous metrics");
            return None;
        }
        let scale = font_size_px / metrics.units_per_em as f32;

        let charmap = font_ref.charmap();
        let glyph_metrics = font_ref.glyph_metrics(&[]);
        let mut total = 0.0f32;
        let mut measured = 0usize;
        for ch in MEASUREMENT_RUN.chars() {
            let glyph_id = charmap.map(ch);
            if glyph_id != 0 {
                total += glyph_metrics.advance_width(glyph_id) * scale;
                measured += 1;
            }
        }
        if measured == 0 {
            log::warn!("Primary font covers none of the measurement run");
            return None;
        }

        Some(FontMetrics {
            advance: total / measured as f32,
            ascent: metrics.ascent * scale,
            descent: metrics.descent * scale,
            leading: metrics.leading * scale,
        })
    }

    fn rasterize(&mut self, ch: char, style: FontStyle, font_size_px: f32) -> Option<GlyphImage> {
        let key = GlyphKey::new(ch, style, font_size_px);
        if let Some(cached) = self.glyph_cache.get(&key) {
            return cached.clone();
        }

        let rendered = match self.find_glyph(ch, style) {
            Some((font_ref, glyph_id)) => {
                self.rasterize_uncached(font_ref, glyph_id, font_size_px)
            }
            None => None,
        };

        self.glyph_cache.insert(key, rendered.clone());
        rendered
    }
}
