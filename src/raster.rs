//! CPU cell rasterizer.
//!
//! [`TextSurface`] owns one off-screen RGBA8 bitmap sized to the
//! framebuffer and repaints either the whole grid or an explicit list of
//! cell regions. All text and color compositing happens here on the CPU;
//! the GPU stage uploads the finished bitmap and samples it untouched.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::color::ColorResolver;
use crate::fonts::{FontSource, FontStyle};
use crate::layout::{CellRect, PixelRect, RendererConfiguration};
use crate::profile::{CursorShape, TerminalProfile};
use crate::runtime::{CellContent, GridSnapshot};

/// Off-screen RGBA8 bitmap plus the painting routines that fill it.
///
/// Dimensions always match the session's framebuffer; glyphs come from a
/// shared [`FontSource`] so the surface itself stays font-agnostic.
pub struct TextSurface {
    font: Arc<Mutex<dyn FontSource>>,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TextSurface {
    pub fn new(font: Arc<Mutex<dyn FontSource>>, width: u32, height: u32) -> Self {
        Self {
            font,
            width,
            height,
            pixels: vec![0; width as usize * height as usize * 4],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The bitmap, tightly packed RGBA8 rows top to bottom.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Reallocate the bitmap. No-op when the dimensions are unchanged;
    /// otherwise contents reset to transparent black and the caller owes a
    /// full repaint.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        self.width = width;
        self.height = height;
        self.pixels = vec![0; width as usize * height as usize * 4];
    }

    /// Paint the snapshot into the bitmap.
    ///
    /// With `regions` absent the whole surface is cleared to the theme
    /// background and every cell repainted; otherwise painting is limited
    /// to exactly the given cell rects. The cursor overlay paints last and
    /// independent of the region list, so a repaint that crosses the
    /// cursor cell never leaves the cursor erased.
    pub fn render(
        &mut self,
        snapshot: &GridSnapshot,
        config: &RendererConfiguration,
        profile: &TerminalProfile,
        regions: Option<&[CellRect]>,
    ) {
        let resolver = ColorResolver::new(profile);
        match regions {
            None => {
                let full = PixelRect {
                    x: 0,
                    y: 0,
                    width: self.width,
                    height: self.height,
                };
                self.fill_rect(full, resolver.background());
                let all = CellRect {
                    row: 0,
                    col: 0,
                    rows: snapshot.grid.rows,
                    cols: snapshot.grid.columns,
                };
                self.paint_region(all, snapshot, config, &resolver);
            }
            Some(rects) => {
                for rect in rects {
                    self.paint_region(*rect, snapshot, config, &resolver);
                }
            }
        }
        self.paint_cursor(snapshot, config, profile, &resolver);
    }

    /// Paint one rectangular cell region: backgrounds first, then glyphs
    /// and decorations, everything clipped to the region's pixel bounds.
    fn paint_region(
        &mut self,
        rect: CellRect,
        snapshot: &GridSnapshot,
        config: &RendererConfiguration,
        resolver: &ColorResolver,
    ) {
        let grid = snapshot.grid;
        let row_end = (rect.row + rect.rows).min(grid.rows);
        let col_end = (rect.col + rect.cols).min(grid.columns);
        if rect.row >= row_end || rect.col >= col_end {
            return;
        }
        let bounds = config.cell_rect_to_pixels(CellRect {
            row: rect.row,
            col: rect.col,
            rows: row_end - rect.row,
            cols: col_end - rect.col,
        });

        for row in rect.row..row_end {
            for col in rect.col..col_end {
                let cell = snapshot.cell(row, col).copied().unwrap_or_default();
                let selected = snapshot
                    .selection
                    .is_some_and(|s| s.contains(row, col));
                let (_, bg) = resolver.cell_colors(&cell, selected);
                let cell_px = config.cell_rect_to_pixels(CellRect {
                    row,
                    col,
                    rows: 1,
                    cols: 1,
                });
                self.fill_rect(cell_px, bg);
            }
        }

        for row in rect.row..row_end {
            for col in rect.col..col_end {
                let cell = snapshot.cell(row, col).copied().unwrap_or_default();
                let selected = snapshot
                    .selection
                    .is_some_and(|s| s.contains(row, col));
                let (fg, _) = resolver.cell_colors(&cell, selected);
                let cell_px = config.cell_rect_to_pixels(CellRect {
                    row,
                    col,
                    rows: 1,
                    cols: 1,
                });

                if cell.wide_spacer {
                    // Right half of a wide glyph. The glyph belongs to the
                    // cell on the left; repaint it clipped to this cell so
                    // a region covering only the spacer stays correct.
                    if col > 0 {
                        if let Some(owner) = snapshot.cell(row, col - 1).copied() {
                            if owner.wide && owner.has_glyph() {
                                let owner_selected = snapshot
                                    .selection
                                    .is_some_and(|s| s.contains(row, col - 1));
                                let (owner_fg, _) =
                                    resolver.cell_colors(&owner, owner_selected);
                                if let Some(clip) = cell_px.intersect(&bounds) {
                                    self.paint_glyph(&owner, row, col - 1, clip, owner_fg, config);
                                }
                            }
                        }
                    }
                } else if cell.has_glyph() {
                    let span = config.cell_rect_to_pixels(CellRect {
                        row,
                        col,
                        rows: 1,
                        cols: if cell.wide { 2 } else { 1 },
                    });
                    if let Some(clip) = span.intersect(&bounds) {
                        self.paint_glyph(&cell, row, col, clip, fg, config);
                    }
                }

                if cell.underline || cell.strikethrough {
                    self.paint_decorations(&cell, cell_px, fg, config);
                }
            }
        }
    }

    /// Composite one glyph at the cell's baseline, clipped to `clip`.
    ///
    /// Mask glyphs are tinted by `fg`; color glyphs keep their own pixels.
    fn paint_glyph(
        &mut self,
        cell: &CellContent,
        row: usize,
        col: usize,
        clip: PixelRect,
        fg: [u8; 4],
        config: &RendererConfiguration,
    ) {
        let style = FontStyle::from_flags(cell.bold, cell.italic);
        let glyph_px = config.font_size * config.density as f32;
        let glyph = match self.font.lock().rasterize(cell.ch, style, glyph_px) {
            Some(glyph) => glyph,
            None => return,
        };

        let cw = config.cell.width as f64 * config.density;
        let ch = config.cell.height as f64 * config.density;
        let pen_x = (col as f64 * cw).round() as i64 + glyph.left as i64;
        let baseline =
            (row as f64 * ch + config.cell.baseline as f64 * config.density).round() as i64;
        let glyph_top = baseline - glyph.top as i64;

        let clip_x1 = (clip.x + clip.width) as i64;
        let clip_y1 = (clip.y + clip.height) as i64;

        for gy in 0..glyph.height {
            let dst_y = glyph_top + gy as i64;
            if dst_y < clip.y as i64 || dst_y >= clip_y1 {
                continue;
            }
            for gx in 0..glyph.width {
                let dst_x = pen_x + gx as i64;
                if dst_x < clip.x as i64 || dst_x >= clip_x1 {
                    continue;
                }
                let src = (gy * glyph.width + gx) as usize * 4;
                let alpha = glyph.data[src + 3];
                if alpha == 0 {
                    continue;
                }
                let rgb = if glyph.is_color {
                    [glyph.data[src], glyph.data[src + 1], glyph.data[src + 2]]
                } else {
                    [
                        (glyph.data[src] as u32 * fg[0] as u32 / 255) as u8,
                        (glyph.data[src + 1] as u32 * fg[1] as u32 / 255) as u8,
                        (glyph.data[src + 2] as u32 * fg[2] as u32 / 255) as u8,
                    ]
                };
                self.blend_pixel(dst_x as u32, dst_y as u32, rgb, alpha);
            }
        }
    }

    /// Underline and strikethrough bars in the foreground color.
    fn paint_decorations(
        &mut self,
        cell: &CellContent,
        cell_px: PixelRect,
        fg: [u8; 4],
        config: &RendererConfiguration,
    ) {
        let thickness =
            ((config.cell.height as f64 * config.density * 0.07).max(1.0).round() as u32)
                .min(cell_px.height);

        if cell.underline {
            self.fill_rect(
                PixelRect {
                    x: cell_px.x,
                    y: cell_px.y + cell_px.height - thickness,
                    width: cell_px.width,
                    height: thickness,
                },
                fg,
            );
        }
        if cell.strikethrough {
            self.fill_rect(
                PixelRect {
                    x: cell_px.x,
                    y: cell_px.y + (cell_px.height - thickness) / 2,
                    width: cell_px.width,
                    height: thickness,
                },
                fg,
            );
        }
    }

    /// Cursor overlay, painted last over whatever the regions produced.
    ///
    /// Shape precedence: the runtime's requested shape, then the profile
    /// default. An opaque block adopts the cursor text color for the glyph
    /// underneath; a translucent one lets the original glyph show through.
    fn paint_cursor(
        &mut self,
        snapshot: &GridSnapshot,
        config: &RendererConfiguration,
        profile: &TerminalProfile,
        resolver: &ColorResolver,
    ) {
        let cursor = snapshot.cursor;
        if !cursor.visible || cursor.row >= snapshot.grid.rows || cursor.col >= snapshot.grid.columns
        {
            return;
        }
        let opacity = profile.overlay.cursor_opacity.clamp(0.0, 1.0);
        if opacity <= 0.0 {
            return;
        }

        let cell = snapshot
            .cell(cursor.row, cursor.col)
            .copied()
            .unwrap_or_default();
        let cell_px = config.cell_rect_to_pixels(CellRect {
            row: cursor.row,
            col: cursor.col,
            rows: 1,
            cols: if cell.wide { 2 } else { 1 },
        });
        let shape = cursor.shape.unwrap_or(profile.overlay.cursor_shape);
        let fill = resolver.cursor();

        match shape {
            CursorShape::Block => {
                self.blend_rect(cell_px, fill, opacity);
                if opacity >= 0.999 && cell.has_glyph() {
                    self.paint_glyph(
                        &cell,
                        cursor.row,
                        cursor.col,
                        cell_px,
                        resolver.cursor_text(),
                        config,
                    );
                }
            }
            CursorShape::Underline => {
                let bar = cell_px.height.min(2);
                self.blend_rect(
                    PixelRect {
                        x: cell_px.x,
                        y: cell_px.y + cell_px.height - bar,
                        width: cell_px.width,
                        height: bar,
                    },
                    fill,
                    opacity,
                );
            }
            CursorShape::Bar => {
                self.blend_rect(
                    PixelRect {
                        x: cell_px.x,
                        y: cell_px.y,
                        width: cell_px.width.min(2),
                        height: cell_px.height,
                    },
                    fill,
                    opacity,
                );
            }
        }
    }

    fn fill_rect(&mut self, rect: PixelRect, color: [u8; 4]) {
        if rect.x >= self.width || rect.y >= self.height {
            return;
        }
        let x1 = (rect.x + rect.width).min(self.width);
        let y1 = (rect.y + rect.height).min(self.height);
        for y in rect.y..y1 {
            for x in rect.x..x1 {
                let at = (y as usize * self.width as usize + x as usize) * 4;
                self.pixels[at..at + 4].copy_from_slice(&color);
            }
        }
    }

    fn blend_rect(&mut self, rect: PixelRect, color: [u8; 4], opacity: f32) {
        let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
        if alpha == 0 || rect.x >= self.width || rect.y >= self.height {
            return;
        }
        let x1 = (rect.x + rect.width).min(self.width);
        let y1 = (rect.y + rect.height).min(self.height);
        for y in rect.y..y1 {
            for x in rect.x..x1 {
                self.blend_pixel(x, y, [color[0], color[1], color[2]], alpha);
            }
        }
    }

    /// Source-over blend of one opaque-destination pixel.
    fn blend_pixel(&mut self, x: u32, y: u32, rgb: [u8; 3], alpha: u8) {
        if x >= self.width || y >= self.height {
            return;
        }
        let at = (y as usize * self.width as usize + x as usize) * 4;
        let a = alpha as u32;
        let inv = 255 - a;
        let dst = &mut self.pixels[at..at + 4];
        dst[0] = ((rgb[0] as u32 * a + dst[0] as u32 * inv) / 255) as u8;
        dst[1] = ((rgb[1] as u32 * a + dst[1] as u32 * inv) / 255) as u8;
        dst[2] = ((rgb[2] as u32 * a + dst[2] as u32 * inv) / 255) as u8;
        dst[3] = 255;
    }
}

impl std::fmt::Debug for TextSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextSurface")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}
