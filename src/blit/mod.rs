//! GPU blit stage.
//!
//! The rasterizer leaves a fully composited RGBA8 bitmap; this stage only
//! moves it onto the screen. Uploads are planned once ([`plan_upload`]) and
//! executed by a [`BlitBackend`]:
//!
//! - [`WgpuBlit`] - the production path: one destination texture, one
//!   full-screen quad, one draw call per frame
//! - [`HeadlessBlit`] - keeps a CPU mirror of the texture for tests and
//!   snapshot tooling, byte-for-byte equivalent upload semantics

mod headless;
mod pipeline;
mod plan;

pub use headless::HeadlessBlit;
pub use pipeline::WgpuBlit;
pub use plan::{UploadPlan, plan_upload};

use crate::error::RenderError;
use crate::layout::PixelRect;

/// Upload accounting for one presented frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitStats {
    /// Pixel bytes pushed to the destination texture.
    pub bytes_uploaded: usize,
    /// Number of sub-rectangle uploads (1 for a full upload).
    pub upload_rects: usize,
    /// Draw calls issued; always 1 per presented frame.
    pub draw_calls: usize,
    /// Whether the whole bitmap was uploaded.
    pub full_upload: bool,
}

/// Destination for rasterized frames.
///
/// A session owns exactly one backend at a time; the backend is handed in
/// at mount so hosts pick the strategy (GPU surface, headless mirror)
/// without any process-global registry.
pub trait BlitBackend {
    /// Match the destination to a new framebuffer size. The next `present`
    /// must upload the whole bitmap.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Upload `frame` (whole, or just `regions` of it) and put it on
    /// screen. `frame` is the full framebuffer even for partial uploads;
    /// region uploads address into it.
    fn present(
        &mut self,
        frame: &[u8],
        regions: Option<&[PixelRect]>,
    ) -> Result<BlitStats, RenderError>;
}
