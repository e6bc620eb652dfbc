//! Surface geometry and configuration derivation.
//!
//! Home of the coordinate types shared across the crate and of
//! [`ConfigDeriver`], which turns host surface observations plus font
//! metrics into immutable [`RendererConfiguration`] snapshots:
//!
//! - cell size from a representative-glyph measurement
//! - grid dimensions by flooring the surface extent, clamped to a minimum
//! - framebuffer pixel size from the logical size times surface density
//! - orientation classification within an epsilon
//!
//! Derivations are coalesced through a single pending slot and drained by
//! [`ConfigDeriver::poll`] on the host's scheduler tick; subscribers are
//! only notified when a derivation differs from the current configuration
//! beyond the epsilon tolerance.

use std::sync::Arc;

use parking_lot::Mutex;
use winit::dpi::{LogicalSize, PhysicalSize};

use crate::SubscriptionId;
use crate::fonts::FontSource;

/// Terminal grid dimensions in cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridDims {
    pub rows: usize,
    pub columns: usize,
}

impl GridDims {
    pub const fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.columns
    }
}

/// A rectangle of cells, `rows x cols` starting at `(row, col)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub row: usize,
    pub col: usize,
    pub rows: usize,
    pub cols: usize,
}

impl CellRect {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.row && row < self.row + self.rows && col >= self.col && col < self.col + self.cols
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }
}

/// A rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte size of this rect's RGBA8 contents.
    pub fn byte_count(&self) -> usize {
        self.pixel_count() * 4
    }

    /// Overlap of two rects, `None` when they are disjoint.
    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some(PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Surface aspect classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
    Square,
}

/// Cell box metrics in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellMetrics {
    pub width: f32,
    pub height: f32,
    /// Distance from the cell top to the text baseline.
    pub baseline: f32,
}

impl CellMetrics {
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self.width - other.width).abs() <= epsilon
            && (self.height - other.height).abs() <= epsilon
            && (self.baseline - other.baseline).abs() <= epsilon
    }
}

/// Immutable renderer geometry snapshot.
///
/// Wholesale-replaced on resize or font change; all consumers treat a new
/// snapshot as invalidating every stored cell or tile coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererConfiguration {
    pub grid: GridDims,
    /// Host surface size in logical pixels.
    pub surface: LogicalSize<f64>,
    /// Physical-to-logical pixel ratio of the surface.
    pub density: f64,
    /// Off-screen framebuffer size, `round(surface * density)`, at least
    /// one pixel per axis.
    pub framebuffer: PhysicalSize<u32>,
    pub cell: CellMetrics,
    /// Font size (logical pixels) the cell metrics were measured at;
    /// glyphs rasterize at `font_size * density`.
    pub font_size: f32,
    pub orientation: Orientation,
}

impl RendererConfiguration {
    /// Derive a configuration from a surface observation and cell metrics.
    pub fn compute(
        surface: LogicalSize<f64>,
        density: f64,
        cell: CellMetrics,
        font_size: f32,
        min_grid: GridDims,
        epsilon: f64,
    ) -> Self {
        let columns = ((surface.width / cell.width as f64).floor() as usize).max(min_grid.columns);
        let rows = ((surface.height / cell.height as f64).floor() as usize).max(min_grid.rows);
        let framebuffer = PhysicalSize::new(
            ((surface.width * density).round() as u32).max(1),
            ((surface.height * density).round() as u32).max(1),
        );
        let orientation = if (surface.width - surface.height).abs() <= epsilon {
            Orientation::Square
        } else if surface.width > surface.height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };

        Self {
            grid: GridDims::new(rows, columns),
            surface,
            density,
            framebuffer,
            cell,
            font_size,
            orientation,
        }
    }

    /// Equality within `epsilon` on the floating-point members, exact on
    /// grid and framebuffer dimensions.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.grid == other.grid
            && self.framebuffer == other.framebuffer
            && self.orientation == other.orientation
            && (self.density - other.density).abs() <= epsilon
            && (self.surface.width - other.surface.width).abs() <= epsilon
            && (self.surface.height - other.surface.height).abs() <= epsilon
            && (self.font_size - other.font_size).abs() <= epsilon as f32
            && self.cell.approx_eq(&other.cell, epsilon as f32)
    }

    /// Total RGBA8 byte size of the framebuffer.
    pub fn framebuffer_bytes(&self) -> usize {
        self.framebuffer.width as usize * self.framebuffer.height as usize * 4
    }

    /// Convert a cell rect to framebuffer pixel bounds.
    ///
    /// Edges are rounded independently so adjacent rects stay seamless at
    /// fractional cell sizes; the result is clamped to the framebuffer and
    /// floored at one pixel per axis.
    pub fn cell_rect_to_pixels(&self, rect: CellRect) -> PixelRect {
        let cw = self.cell.width as f64 * self.density;
        let ch = self.cell.height as f64 * self.density;

        let x0 = ((rect.col as f64 * cw).round() as u32).min(self.framebuffer.width - 1);
        let y0 = ((rect.row as f64 * ch).round() as u32).min(self.framebuffer.height - 1);
        let x1 = (((rect.col + rect.cols) as f64 * cw).round() as u32)
            .clamp(x0 + 1, self.framebuffer.width);
        let y1 = (((rect.row + rect.rows) as f64 * ch).round() as u32)
            .clamp(y0 + 1, self.framebuffer.height);

        PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        }
    }
}

/// Tunables for configuration derivation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeriveOptions {
    /// Font size in logical pixels.
    pub font_size: f32,
    /// Multiplier on the natural line height.
    pub line_spacing: f32,
    /// Multiplier on the measured advance.
    pub char_spacing: f32,
    /// The derived grid never shrinks below this.
    pub min_grid: GridDims,
    /// Tolerance for float comparisons and orientation classification.
    pub epsilon: f64,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            font_size: 16.0,
            line_spacing: 1.0,
            char_spacing: 1.0,
            min_grid: GridDims::new(1, 1),
            epsilon: 0.01,
        }
    }
}

/// Derives renderer configurations from surface observations.
///
/// Owned by the host; publish a derived configuration into a session by
/// dispatching a configure event with [`ConfigDeriver::poll`]'s result.
pub struct ConfigDeriver {
    font: Arc<Mutex<dyn FontSource>>,
    options: DeriveOptions,
    surface: Option<(LogicalSize<f64>, f64)>,
    current: Option<RendererConfiguration>,
    refresh_pending: bool,
    font_ready_seen: bool,
    subscribers: Vec<(SubscriptionId, Box<dyn FnMut(&RendererConfiguration)>)>,
    next_subscription: u64,
}

impl std::fmt::Debug for ConfigDeriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDeriver")
            .field("options", &self.options)
            .field("surface", &self.surface)
            .field("current", &self.current)
            .field("refresh_pending", &self.refresh_pending)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl ConfigDeriver {
    pub fn new(font: Arc<Mutex<dyn FontSource>>, options: DeriveOptions) -> Self {
        Self {
            font,
            options,
            surface: None,
            current: None,
            refresh_pending: false,
            font_ready_seen: false,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Record a host surface observation and queue a derivation.
    pub fn observe_surface(&mut self, size: LogicalSize<f64>, density: f64) {
        self.surface = Some((size, density));
        self.refresh_pending = true;
    }

    /// Queue a re-derivation with the current surface (font change,
    /// spacing change).
    pub fn refresh(&mut self) {
        self.refresh_pending = true;
    }

    /// One-shot font readiness signal; queues a re-measurement the first
    /// time it fires, later calls are ignored.
    pub fn font_ready(&mut self) {
        if !self.font_ready_seen {
            self.font_ready_seen = true;
            self.refresh_pending = true;
        }
    }

    /// Whether a derivation is queued for the next [`poll`](Self::poll).
    pub fn has_pending(&self) -> bool {
        self.refresh_pending
    }

    /// The configuration of the last publication, if any.
    pub fn current(&self) -> Option<&RendererConfiguration> {
        self.current.as_ref()
    }

    /// Subscribe to configuration publications.
    pub fn on_configuration(
        &mut self,
        callback: Box<dyn FnMut(&RendererConfiguration)>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, callback));
        id
    }

    /// Remove a subscription; returns whether it existed.
    pub fn off_configuration(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.subscribers.len() != before
    }

    /// Drain the pending slot: derive, and publish when the result differs
    /// from the current configuration beyond the epsilon tolerance.
    ///
    /// Returns the newly published configuration, or `None` when nothing
    /// was pending, no surface has been observed, measurement failed, or
    /// the derivation matched the current configuration.
    pub fn poll(&mut self) -> Option<RendererConfiguration> {
        if !self.refresh_pending {
            return None;
        }
        self.refresh_pending = false;

        let (surface, density) = self.surface?;
        let cell = match self.measure_cell() {
            Some(cell) => cell,
            None => {
                log::warn!("Cell measurement failed, keeping previous configuration");
                return None;
            }
        };

        let next = RendererConfiguration::compute(
            surface,
            density,
            cell,
            self.options.font_size,
            self.options.min_grid,
            self.options.epsilon,
        );
        if let Some(current) = &self.current {
            if current.approx_eq(&next, self.options.epsilon) {
                return None;
            }
        }

        log::info!(
            "Derived configuration: {}x{} cells, {:.1}x{:.1} px cell, {}x{} px framebuffer",
            next.grid.columns,
            next.grid.rows,
            next.cell.width,
            next.cell.height,
            next.framebuffer.width,
            next.framebuffer.height,
        );
        self.current = Some(next);
        for (_, callback) in &mut self.subscribers {
            callback(&next);
        }
        Some(next)
    }

    fn measure_cell(&mut self) -> Option<CellMetrics> {
        let metrics = self.font.lock().measure(self.options.font_size)?;
        let natural_line_height = metrics.line_height();
        let height = (natural_line_height * self.options.line_spacing).max(1.0);
        let width = (metrics.advance * self.options.char_spacing).max(1.0);
        // Extra line spacing is split evenly above and below the glyph box.
        let baseline = metrics.ascent + (height - natural_line_height) / 2.0;
        Some(CellMetrics {
            width,
            height,
            baseline,
        })
    }
}
