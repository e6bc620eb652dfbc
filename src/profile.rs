//! Terminal profile: theme, overlay defaults, accessibility preferences.
//!
//! The profile is the host-facing appearance bundle. Unlike the renderer
//! configuration (which is wholesale-replaced on resize), profile updates
//! arrive as partial patches and are merged into the current profile.

use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Terminal color theme with 16 ANSI colors plus foreground/background
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Theme {
    pub name: String,
    pub foreground: Color,
    pub background: Color,
    pub cursor: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,

    // ANSI colors (0-15)
    pub black: Color,
    pub red: Color,
    pub green: Color,
    pub yellow: Color,
    pub blue: Color,
    pub magenta: Color,
    pub cyan: Color,
    pub white: Color,
    pub bright_black: Color,
    pub bright_red: Color,
    pub bright_green: Color,
    pub bright_yellow: Color,
    pub bright_blue: Color,
    pub bright_magenta: Color,
    pub bright_cyan: Color,
    pub bright_white: Color,
}

impl Theme {
    /// Get ANSI color by index (0-15)
    pub fn ansi_color(&self, index: u8) -> Color {
        match index {
            0 => self.black,
            1 => self.red,
            2 => self.green,
            3 => self.yellow,
            4 => self.blue,
            5 => self.magenta,
            6 => self.cyan,
            7 => self.white,
            8 => self.bright_black,
            9 => self.bright_red,
            10 => self.bright_green,
            11 => self.bright_yellow,
            12 => self.bright_blue,
            13 => self.bright_magenta,
            14 => self.bright_cyan,
            15 => self.bright_white,
            _ => self.foreground,
        }
    }

    /// Default dark theme
    pub fn default_dark() -> Self {
        Self {
            name: "Default Dark".to_string(),
            foreground: Color::new(229, 229, 229),
            background: Color::new(30, 30, 30),
            cursor: Color::new(229, 229, 229),
            selection_bg: Color::new(58, 95, 135),
            selection_fg: Color::new(255, 255, 255),
            black: Color::new(0, 0, 0),
            red: Color::new(205, 49, 49),
            green: Color::new(13, 188, 121),
            yellow: Color::new(229, 229, 16),
            blue: Color::new(36, 114, 200),
            magenta: Color::new(188, 63, 188),
            cyan: Color::new(17, 168, 205),
            white: Color::new(229, 229, 229),
            bright_black: Color::new(102, 102, 102),
            bright_red: Color::new(241, 76, 76),
            bright_green: Color::new(35, 209, 139),
            bright_yellow: Color::new(245, 245, 67),
            bright_blue: Color::new(59, 142, 234),
            bright_magenta: Color::new(214, 112, 214),
            bright_cyan: Color::new(41, 184, 219),
            bright_white: Color::new(255, 255, 255),
        }
    }

    /// Dracula theme
    pub fn dracula() -> Self {
        Self {
            name: "Dracula".to_string(),
            foreground: Color::new(248, 248, 242),
            background: Color::new(40, 42, 54),
            cursor: Color::new(248, 248, 240),
            selection_bg: Color::new(68, 71, 90),
            selection_fg: Color::new(248, 248, 242),
            black: Color::new(0, 0, 0),
            red: Color::new(255, 85, 85),
            green: Color::new(80, 250, 123),
            yellow: Color::new(241, 250, 140),
            blue: Color::new(189, 147, 249),
            magenta: Color::new(255, 121, 198),
            cyan: Color::new(139, 233, 253),
            white: Color::new(187, 187, 187),
            bright_black: Color::new(85, 85, 85),
            bright_red: Color::new(255, 110, 110),
            bright_green: Color::new(105, 255, 148),
            bright_yellow: Color::new(255, 255, 165),
            bright_blue: Color::new(214, 172, 255),
            bright_magenta: Color::new(255, 146, 223),
            bright_cyan: Color::new(164, 255, 255),
            bright_white: Color::new(255, 255, 255),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_dark()
    }
}

/// Dynamic palette overrides (OSC 4 style), one optional slot per
/// 256-color index. Runtime state, not serialized with the profile.
#[derive(Clone)]
pub struct PaletteOverrides {
    slots: [Option<Color>; 256],
}

impl PaletteOverrides {
    pub fn get(&self, index: u8) -> Option<Color> {
        self.slots[index as usize]
    }

    pub fn set(&mut self, index: u8, color: Color) {
        self.slots[index as usize] = Some(color);
    }

    pub fn clear(&mut self, index: u8) {
        self.slots[index as usize] = None;
    }

    pub fn clear_all(&mut self) {
        self.slots = [None; 256];
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

impl Default for PaletteOverrides {
    fn default() -> Self {
        Self { slots: [None; 256] }
    }
}

impl std::fmt::Debug for PaletteOverrides {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = self.slots.iter().filter(|s| s.is_some()).count();
        write!(f, "PaletteOverrides({set} set)")
    }
}

/// Cursor rendering shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorShape {
    #[default]
    Block,
    Underline,
    Bar,
}

/// Default overlay appearance (cursor and selection), used when the
/// snapshot does not dictate otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayDefaults {
    pub cursor_shape: CursorShape,
    /// Cursor fill opacity, 0.0-1.0.
    pub cursor_opacity: f32,
    /// Selection tint strength, 0.0-1.0 (1.0 paints the selection
    /// background opaquely).
    pub selection_opacity: f32,
}

impl Default for OverlayDefaults {
    fn default() -> Self {
        Self {
            cursor_shape: CursorShape::Block,
            cursor_opacity: 1.0,
            selection_opacity: 1.0,
        }
    }
}

/// Accessibility preferences.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accessibility {
    /// Minimum WCAG contrast ratio enforced between cell foreground and
    /// background. 1.0 disables enforcement.
    pub minimum_contrast: f32,
    /// Hosts honoring this skip animated effects (cursor pulse etc.).
    pub reduce_motion: bool,
}

impl Default for Accessibility {
    fn default() -> Self {
        Self {
            minimum_contrast: 1.0,
            reduce_motion: false,
        }
    }
}

/// The full appearance profile owned by a renderer session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalProfile {
    pub theme: Theme,
    pub overlay: OverlayDefaults,
    pub accessibility: Accessibility,
    /// Render bold cells with the bright variant of ANSI colors 0-7.
    pub bold_brightens_ansi: bool,
    /// OSC 4 palette state; not part of the serialized profile.
    #[serde(skip, default)]
    pub palette_overrides: PaletteOverrides,
}

impl Default for TerminalProfile {
    fn default() -> Self {
        Self {
            theme: Theme::default(),
            overlay: OverlayDefaults::default(),
            accessibility: Accessibility::default(),
            bold_brightens_ansi: true,
            palette_overrides: PaletteOverrides::default(),
        }
    }
}

/// A partial profile patch. `None` fields leave the current value
/// untouched; palette entries are applied after an optional reset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub theme: Option<Theme>,
    pub cursor_shape: Option<CursorShape>,
    pub cursor_opacity: Option<f32>,
    pub selection_opacity: Option<f32>,
    pub minimum_contrast: Option<f32>,
    pub reduce_motion: Option<bool>,
    pub bold_brightens_ansi: Option<bool>,
    /// Palette slots to override, applied in order.
    #[serde(default)]
    pub palette: Vec<(u8, Color)>,
    /// Clear all palette overrides before applying `palette`.
    #[serde(default)]
    pub reset_palette: bool,
}

impl ProfileUpdate {
    /// Patch that swaps the theme and nothing else.
    pub fn theme(theme: Theme) -> Self {
        Self {
            theme: Some(theme),
            ..Self::default()
        }
    }
}

impl TerminalProfile {
    /// Merge a partial update into this profile.
    pub fn merge(&mut self, update: ProfileUpdate) {
        if let Some(theme) = update.theme {
            self.theme = theme;
        }
        if let Some(shape) = update.cursor_shape {
            self.overlay.cursor_shape = shape;
        }
        if let Some(opacity) = update.cursor_opacity {
            self.overlay.cursor_opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(opacity) = update.selection_opacity {
            self.overlay.selection_opacity = opacity.clamp(0.0, 1.0);
        }
        if let Some(contrast) = update.minimum_contrast {
            self.accessibility.minimum_contrast = contrast.max(1.0);
        }
        if let Some(reduce) = update.reduce_motion {
            self.accessibility.reduce_motion = reduce;
        }
        if let Some(brighten) = update.bold_brightens_ansi {
            self.bold_brightens_ansi = brighten;
        }
        if update.reset_palette {
            self.palette_overrides.clear_all();
        }
        for (index, color) in update.palette {
            self.palette_overrides.set(index, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_untouched_fields() {
        let mut profile = TerminalProfile::default();
        let original_theme = profile.theme.clone();

        profile.merge(ProfileUpdate {
            cursor_opacity: Some(0.5),
            ..ProfileUpdate::default()
        });

        assert_eq!(profile.overlay.cursor_opacity, 0.5);
        assert_eq!(profile.theme, original_theme);
        assert_eq!(profile.overlay.cursor_shape, CursorShape::Block);
        assert!(profile.bold_brightens_ansi);
    }

    #[test]
    fn test_merge_theme_patch() {
        let mut profile = TerminalProfile::default();
        profile.merge(ProfileUpdate::theme(Theme::dracula()));
        assert_eq!(profile.theme.name, "Dracula");
        assert_eq!(profile.theme.background, Color::new(40, 42, 54));
    }

    #[test]
    fn test_palette_reset_then_apply() {
        let mut profile = TerminalProfile::default();
        profile.palette_overrides.set(1, Color::new(9, 9, 9));
        profile.palette_overrides.set(2, Color::new(8, 8, 8));

        profile.merge(ProfileUpdate {
            reset_palette: true,
            palette: vec![(5, Color::new(1, 2, 3))],
            ..ProfileUpdate::default()
        });

        assert_eq!(profile.palette_overrides.get(1), None);
        assert_eq!(profile.palette_overrides.get(2), None);
        assert_eq!(profile.palette_overrides.get(5), Some(Color::new(1, 2, 3)));
    }

    #[test]
    fn test_merge_clamps_ranges() {
        let mut profile = TerminalProfile::default();
        profile.merge(ProfileUpdate {
            cursor_opacity: Some(3.0),
            minimum_contrast: Some(0.2),
            ..ProfileUpdate::default()
        });
        assert_eq!(profile.overlay.cursor_opacity, 1.0);
        assert_eq!(profile.accessibility.minimum_contrast, 1.0);
    }

    #[test]
    fn test_partial_update_from_json() {
        // Hosts ship patches as JSON; absent fields must deserialize to None.
        let update: ProfileUpdate =
            serde_json::from_str(r#"{ "selection_opacity": 0.4 }"#).unwrap();
        assert_eq!(update.selection_opacity, Some(0.4));
        assert!(update.theme.is_none());
        assert!(!update.reset_palette);

        let mut profile = TerminalProfile::default();
        profile.merge(update);
        assert_eq!(profile.overlay.selection_opacity, 0.4);
    }
}
