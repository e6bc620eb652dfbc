//! Font access for cell measurement and glyph rasterization.
//!
//! The renderer talks to fonts through the [`FontSource`] trait so the
//! production path (system fonts via fontdb + swash) and headless paths
//! (fixed-metrics fonts for tests and snapshot tooling) are interchangeable:
//!
//! - [`FontLibrary`] - system font discovery with style variants and a
//!   fallback chain
//! - [`FixedFont`] - deterministic metrics and box glyphs, no font files

mod library;

pub use library::{FontData, FontLibrary};

/// Font-wide metrics at a specific pixel size, in the same pixel unit the
/// size was given in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontMetrics {
    /// Average advance width of a representative glyph run.
    pub advance: f32,
    /// Distance from baseline to the top of the em box.
    pub ascent: f32,
    /// Distance from baseline to the bottom of the em box.
    pub descent: f32,
    /// Extra line gap recommended by the font.
    pub leading: f32,
}

impl FontMetrics {
    /// Natural line height (`ascent + descent + leading`).
    pub fn line_height(&self) -> f32 {
        self.ascent + self.descent + self.leading
    }
}

/// Style variant of a cell's glyph. Style never moves layout; it only
/// selects which face renders the glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FontStyle {
    #[default]
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontStyle {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontStyle::Regular,
            (true, false) => FontStyle::Bold,
            (false, true) => FontStyle::Italic,
            (true, true) => FontStyle::BoldItalic,
        }
    }
}

/// A rasterized glyph ready for compositing.
///
/// Placement follows swash conventions: `left` offsets from the pen
/// position, `top` is the distance from the baseline up to the first
/// bitmap row. `data` is tightly packed RGBA8; for non-color glyphs the
/// RGB channels are white and the rasterizer tints by foreground color.
#[derive(Debug, Clone)]
pub struct GlyphImage {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    /// Color bitmap glyph (emoji); painted without foreground tinting.
    pub is_color: bool,
    pub data: Vec<u8>,
}

/// Measurement and rasterization interface the renderer depends on.
///
/// `&mut self` because swash scaling contexts require mutable access;
/// sessions share a source behind `Arc<Mutex<_>>`.
pub trait FontSource: Send {
    /// Font metrics at `font_size_px`. `None` when the font is not ready
    /// or measurement failed; callers keep their last good metrics.
    fn measure(&mut self, font_size_px: f32) -> Option<FontMetrics>;

    /// Rasterize one glyph at `font_size_px`. `None` when no loaded face
    /// covers the character; the cell then renders background only.
    fn rasterize(&mut self, ch: char, style: FontStyle, font_size_px: f32) -> Option<GlyphImage>;
}

/// Deterministic font source with fixed fractional metrics and solid box
/// glyphs. Every visible character rasterizes to the same filled block, so
/// pixel output is predictable without any font files installed.
///
/// At a 16px size the cell comes out 8x16 with a baseline of 12, matching
/// common bitmap terminal fonts.
#[derive(Debug, Clone)]
pub struct FixedFont {
    /// Advance as a fraction of the font size.
    pub advance_em: f32,
    /// Ascent as a fraction of the font size.
    pub ascent_em: f32,
    /// Descent as a fraction of the font size.
    pub descent_em: f32,
}

impl Default for FixedFont {
    fn default() -> Self {
        Self {
            advance_em: 0.5,
            ascent_em: 0.75,
            descent_em: 0.25,
        }
    }
}

impl FontSource for FixedFont {
    fn measure(&mut self, font_size_px: f32) -> Option<FontMetrics> {
        Some(FontMetrics {
            advance: font_size_px * self.advance_em,
            ascent: font_size_px * self.ascent_em,
            descent: font_size_px * self.descent_em,
            leading: 0.0,
        })
    }

    fn rasterize(&mut self, ch: char, _style: FontStyle, font_size_px: f32) -> Option<GlyphImage> {
        if ch.is_whitespace() || ch == '\0' {
            return None;
        }
        let advance = font_size_px * self.advance_em;
        let ascent = font_size_px * self.ascent_em;
        let width = ((advance * 0.8).round() as u32).max(1);
        let height = ((ascent * 0.8).round() as u32).max(1);
        let left = ((advance - width as f32) / 2.0).round() as i32;

        Some(GlyphImage {
            left,
            top: height as i32,
            width,
            height,
            is_color: false,
            data: vec![255u8; (width * height * 4) as usize],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_font_metrics_scale_linearly() {
        let mut font = FixedFont::default();
        let m16 = font.measure(16.0).unwrap();
        assert_eq!(m16.advance, 8.0);
        assert_eq!(m16.line_height(), 16.0);
        assert_eq!(m16.ascent, 12.0);

        let m32 = font.measure(32.0).unwrap();
        assert_eq!(m32.advance, 16.0);
        assert_eq!(m32.line_height(), 32.0);
    }

    #[test]
    fn test_fixed_font_skips_whitespace() {
        let mut font = FixedFont::default();
        assert!(font.rasterize(' ', FontStyle::Regular, 16.0).is_none());
        assert!(font.rasterize('\t', FontStyle::Regular, 16.0).is_none());
        assert!(font.rasterize('x', FontStyle::Regular, 16.0).is_some());
    }

    #[test]
    fn test_fixed_font_glyph_fits_cell() {
        let mut font = FixedFont::default();
        let metrics = font.measure(16.0).unwrap();
        let glyph = font.rasterize('x', FontStyle::Regular, 16.0).unwrap();

        assert!(glyph.width as f32 <= metrics.advance);
        assert!(glyph.top as f32 <= metrics.ascent);
        assert_eq!(glyph.data.len(), (glyph.width * glyph.height * 4) as usize);
        assert!(!glyph.is_color);
    }

    #[test]
    fn test_style_from_flags() {
        assert_eq!(FontStyle::from_flags(false, false), FontStyle::Regular);
        assert_eq!(FontStyle::from_flags(true, false), FontStyle::Bold);
        assert_eq!(FontStyle::from_flags(false, true), FontStyle::Italic);
        assert_eq!(FontStyle::from_flags(true, true), FontStyle::BoldItalic);
    }
}
