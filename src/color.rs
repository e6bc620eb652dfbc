//! Cell color resolution.
//!
//! Maps the abstract per-cell color model (default / indexed / direct RGB)
//! plus attribute flags onto concrete RGBA values, honoring:
//!
//! - The active theme (foreground/background/cursor/selection + 16 ANSI colors)
//! - Dynamic palette overrides (OSC 4 style, 256 slots)
//! - The xterm 256-color cube and grayscale ramp
//! - Inverse / dim / invisible / bold-brightening attributes
//! - Selection tinting and an optional minimum-contrast floor

use serde::{Deserialize, Serialize};

use crate::profile::{PaletteOverrides, TerminalProfile, Theme};
use crate::runtime::CellContent;

/// A color in RGB format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn as_array(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Expand to an opaque RGBA quad as used by the rasterizer.
    pub const fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// Abstract color carried by a snapshot cell, resolved against the theme
/// and palette at paint time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellColor {
    /// Theme default (foreground or background depending on position).
    #[default]
    Default,
    /// Palette index 0-255.
    Indexed(u8),
    /// Direct 24-bit color.
    Rgb(u8, u8, u8),
}

/// xterm 256-color palette entry for indices 16-255.
///
/// Indices 0-15 are theme-owned and resolved through [`Theme::ansi_color`];
/// this function covers the 6x6x6 color cube (16-231) and the 24-step
/// grayscale ramp (232-255). For 0-15 it falls back to the conventional
/// xterm constants so the function is total.
pub fn xterm_256(color_idx: u8) -> Color {
    match color_idx {
        // Standard 16 colors (theme normally supersedes these)
        0 => Color::new(0, 0, 0),
        1 => Color::new(205, 0, 0),
        2 => Color::new(0, 205, 0),
        3 => Color::new(205, 205, 0),
        4 => Color::new(0, 0, 238),
        5 => Color::new(205, 0, 205),
        6 => Color::new(0, 205, 205),
        7 => Color::new(229, 229, 229),
        8 => Color::new(127, 127, 127),
        9 => Color::new(255, 0, 0),
        10 => Color::new(0, 255, 0),
        11 => Color::new(255, 255, 0),
        12 => Color::new(92, 92, 255),
        13 => Color::new(255, 0, 255),
        14 => Color::new(0, 255, 255),
        15 => Color::new(255, 255, 255),
        // 216 color cube (16-231)
        16..=231 => {
            let idx = color_idx - 16;
            let r = (idx / 36) * 51;
            let g = ((idx % 36) / 6) * 51;
            let b = (idx % 6) * 51;
            Color::new(r, g, b)
        }
        // Grayscale (232-255)
        232..=255 => {
            let gray = 8 + (color_idx - 232) * 10;
            Color::new(gray, gray, gray)
        }
    }
}

/// Linear interpolation between two colors, `t` in 0.0..=1.0.
pub fn mix(a: Color, b: Color, t: f32) -> Color {
    let t = t.clamp(0.0, 1.0);
    let lerp = |x: u8, y: u8| ((x as f32) * (1.0 - t) + (y as f32) * t).round() as u8;
    Color::new(lerp(a.r, b.r), lerp(a.g, b.g), lerp(a.b, b.b))
}

/// WCAG relative luminance of an sRGB color, 0.0 (black) to 1.0 (white).
pub fn relative_luminance(c: Color) -> f64 {
    fn channel(v: u8) -> f64 {
        let s = v as f64 / 255.0;
        if s <= 0.03928 {
            s / 12.92
        } else {
            ((s + 0.055) / 1.055).powf(2.4)
        }
    }
    0.2126 * channel(c.r) + 0.7152 * channel(c.g) + 0.0722 * channel(c.b)
}

/// WCAG contrast ratio between two colors, 1.0 to 21.0.
pub fn contrast_ratio(a: Color, b: Color) -> f64 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (hi, lo) = if la >= lb { (la, lb) } else { (lb, la) };
    (hi + 0.05) / (lo + 0.05)
}

/// Nudge `fg` toward black or white (whichever contrasts with `bg`) until
/// the contrast ratio meets `minimum`, or return the endpoint if it never
/// does. A `minimum` of 1.0 or less is a no-op.
pub fn apply_minimum_contrast(fg: Color, bg: Color, minimum: f32) -> Color {
    let minimum = minimum as f64;
    if minimum <= 1.0 || contrast_ratio(fg, bg) >= minimum {
        return fg;
    }
    let target = if relative_luminance(bg) < 0.5 {
        Color::new(255, 255, 255)
    } else {
        Color::new(0, 0, 0)
    };
    let mut t = 0.05f32;
    while t < 1.0 {
        let candidate = mix(fg, target, t);
        if contrast_ratio(candidate, bg) >= minimum {
            return candidate;
        }
        t += 0.05;
    }
    target
}

/// Resolves snapshot cell colors against a profile.
///
/// Borrow-only view over the profile; construct one per paint pass.
pub struct ColorResolver<'a> {
    theme: &'a Theme,
    overrides: &'a PaletteOverrides,
    bold_brightens_ansi: bool,
    minimum_contrast: f32,
    selection_opacity: f32,
}

impl<'a> ColorResolver<'a> {
    pub fn new(profile: &'a TerminalProfile) -> Self {
        Self {
            theme: &profile.theme,
            overrides: &profile.palette_overrides,
            bold_brightens_ansi: profile.bold_brightens_ansi,
            minimum_contrast: profile.accessibility.minimum_contrast,
            selection_opacity: profile.overlay.selection_opacity,
        }
    }

    /// Full palette lookup: dynamic override, then theme ANSI (0-15), then
    /// the xterm cube / grayscale ramp.
    pub fn palette_color(&self, index: u8) -> Color {
        if let Some(c) = self.overrides.get(index) {
            return c;
        }
        if index < 16 {
            self.theme.ansi_color(index)
        } else {
            xterm_256(index)
        }
    }

    fn base_color(&self, color: CellColor, default: Color, brighten: bool) -> Color {
        match color {
            CellColor::Default => default,
            CellColor::Indexed(i) => {
                let i = if brighten && i < 8 { i + 8 } else { i };
                self.palette_color(i)
            }
            CellColor::Rgb(r, g, b) => Color::new(r, g, b),
        }
    }

    /// Resolve a cell's foreground and background to opaque RGBA, applying
    /// attribute flags and selection tinting.
    pub fn cell_colors(&self, cell: &CellContent, selected: bool) -> ([u8; 4], [u8; 4]) {
        let brighten = self.bold_brightens_ansi && cell.bold;
        let mut fg = self.base_color(cell.fg, self.theme.foreground, brighten);
        let mut bg = self.base_color(cell.bg, self.theme.background, false);

        if cell.inverse {
            std::mem::swap(&mut fg, &mut bg);
        }
        if cell.dim {
            fg = Color::new(
                (fg.r as u16 * 2 / 3) as u8,
                (fg.g as u16 * 2 / 3) as u8,
                (fg.b as u16 * 2 / 3) as u8,
            );
        }
        if selected {
            bg = mix(bg, self.theme.selection_bg, self.selection_opacity);
            fg = self.theme.selection_fg;
        }
        if cell.invisible {
            fg = bg;
        } else {
            fg = apply_minimum_contrast(fg, bg, self.minimum_contrast);
        }

        (fg.to_rgba(), bg.to_rgba())
    }

    /// Theme background, used to clear the frame before painting.
    pub fn background(&self) -> [u8; 4] {
        self.theme.background.to_rgba()
    }

    /// Cursor overlay fill color.
    pub fn cursor(&self) -> [u8; 4] {
        self.theme.cursor.to_rgba()
    }

    /// Color for the glyph under a block cursor (inverted against the
    /// cursor fill).
    pub fn cursor_text(&self) -> [u8; 4] {
        self.theme.background.to_rgba()
    }
}
