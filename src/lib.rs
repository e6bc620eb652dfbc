//! Damage-tracked cell-grid renderer for terminal emulators.
//!
//! This crate turns a terminal runtime's update stream into paced,
//! tile-partitioned repaints and GPU frame uploads. It provides:
//!
//! - Tile-based damage tracking with repaint-region merging
//! - A CPU cell rasterizer with selection, decoration, and cursor overlays
//! - A wgpu blit pipeline with sub-rectangle texture uploads (plus a
//!   headless backend for tests and snapshot tooling)
//! - Host event translation into terminal runtime calls
//! - Grid and cell-metric derivation from surface size and font metrics
//! - Frame pacing and the session that orchestrates the whole path
//!
//! The terminal state machine itself lives outside this crate behind the
//! [`TerminalRuntime`] trait. A host builds a [`RendererSession`] around a
//! runtime and a font source, mounts a [`BlitBackend`] ([`WgpuBlit`] on a
//! window, [`HeadlessBlit`] anywhere), dispatches [`SessionEvent`]s into
//! it, and produces frames from its pacing callback.

pub mod blit;
pub mod bridge;
pub mod color;
pub mod damage;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod pacer;
pub mod profile;
pub mod raster;
pub mod runtime;
pub mod session;

// Re-export main public types
pub use blit::{BlitBackend, BlitStats, HeadlessBlit, WgpuBlit};
pub use bridge::{Key, KeyEvent, NamedKey, SessionEvent};
pub use color::{CellColor, Color, ColorResolver};
pub use damage::{DamageTracker, DrainedDamage, TILE_HEIGHT, TILE_WIDTH, TileLayout};
pub use error::{RenderError, SessionError};
pub use fonts::{FixedFont, FontLibrary, FontSource};
pub use layout::{
    CellMetrics, CellRect, ConfigDeriver, DeriveOptions, GridDims, Orientation, PixelRect,
    RendererConfiguration,
};
pub use pacer::{DEFAULT_FRAME_INTERVAL, FramePacer, FrameRequest};
pub use profile::{CursorShape, ProfileUpdate, TerminalProfile, Theme};
pub use raster::TextSurface;
pub use runtime::{
    EchoRuntime, GridSnapshot, RuntimeUpdate, Selection, TerminalRuntime, UpdateBatch,
};
pub use session::{
    FrameEvent, FrameReason, RendererOptions, RendererSession, ResizeReason, ResizeRequest,
    SessionState,
};

/// Identifies one subscription on a session or deriver event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);
