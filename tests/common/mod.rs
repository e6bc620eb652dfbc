//! Shared integration test helpers for termblit.
//!
//! Include this module at the top of each test file that needs it:
//!
//! ```ignore
//! mod common;
//! use common::{mounted_80x24, pixel};
//! ```
//!
//! Sessions built here run [`EchoRuntime`] with [`FixedFont`] metrics (8x16
//! logical cells at density 1) on a [`HeadlessBlit`] backend, so frames are
//! deterministic without a GPU or font files. The `#[allow(dead_code)]`
//! suppresses warnings when only a subset of helpers are used per file.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use winit::dpi::LogicalSize;

use termblit::blit::{BlitBackend, BlitStats, HeadlessBlit};
use termblit::error::RenderError;
use termblit::fonts::FixedFont;
use termblit::layout::{CellMetrics, GridDims, PixelRect, RendererConfiguration};
use termblit::profile::TerminalProfile;
use termblit::runtime::EchoRuntime;
use termblit::session::{RendererOptions, RendererSession};

/// Configuration with 8x16 logical cells; a 640x384 surface at density 1
/// derives the classic 80x24 grid.
pub fn config_for(surface: LogicalSize<f64>, density: f64) -> RendererConfiguration {
    RendererConfiguration::compute(
        surface,
        density,
        CellMetrics {
            width: 8.0,
            height: 16.0,
            baseline: 12.0,
        },
        16.0,
        GridDims::new(1, 1),
        0.01,
    )
}

/// An unattached 80x24 session.
pub fn session_80x24() -> RendererSession {
    let config = config_for(LogicalSize::new(640.0, 384.0), 1.0);
    RendererSession::new(
        Box::new(EchoRuntime::new(config.grid)),
        Arc::new(Mutex::new(FixedFont::default())),
        config,
        TerminalProfile::default(),
        RendererOptions::default(),
    )
}

/// An 80x24 session mounted on a fresh [`HeadlessBlit`].
pub fn mounted_80x24() -> RendererSession {
    let mut session = session_80x24();
    session
        .mount(Box::new(HeadlessBlit::new(640, 384)))
        .expect("mount headless backend");
    session
}

/// RGBA of the pixel at `(x, y)` in a `width`-pixel-wide RGBA8 buffer.
pub fn pixel(pixels: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let idx = ((y * width + x) * 4) as usize;
    [pixels[idx], pixels[idx + 1], pixels[idx + 2], pixels[idx + 3]]
}

/// Headless backend that fails selected presents with a lost surface.
///
/// `fail_frames` lists 0-based present indices to reject; every other
/// present delegates to the wrapped [`HeadlessBlit`]. Used to verify that
/// sessions restore drained damage after a backend error.
pub struct FailingBlit {
    inner: HeadlessBlit,
    fail_frames: Vec<usize>,
    presented: usize,
}

impl FailingBlit {
    pub fn new(width: u32, height: u32, fail_frames: Vec<usize>) -> Self {
        Self {
            inner: HeadlessBlit::new(width, height),
            fail_frames,
            presented: 0,
        }
    }
}

impl BlitBackend for FailingBlit {
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.inner.resize(width, height)
    }

    fn present(
        &mut self,
        frame: &[u8],
        regions: Option<&[PixelRect]>,
    ) -> Result<BlitStats, RenderError> {
        let index = self.presented;
        self.presented += 1;
        if self.fail_frames.contains(&index) {
            return Err(RenderError::Surface(wgpu::SurfaceError::Lost));
        }
        self.inner.present(frame, regions)
    }
}
