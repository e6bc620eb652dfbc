//! Typed error types for termblit.
//!
//! This module provides structured error types so callers at the crate boundary
//! can match on specific error variants instead of relying on opaque `anyhow`
//! strings.

use thiserror::Error;

/// Top-level error type for the GPU blit path.
///
/// Covers the failure categories that callers may want to distinguish:
/// - GPU initialisation (adapter, device, surface)
/// - Frame data validation
/// - GPU surface / presentation
#[derive(Debug, Error)]
pub enum RenderError {
    // -----------------------------------------------------------------------
    // GPU initialisation
    // -----------------------------------------------------------------------
    /// A suitable wgpu GPU adapter could not be found for the given surface.
    #[error("GPU adapter not found: no compatible GPU adapter available for this surface")]
    AdapterNotFound,

    /// The wgpu device could not be created or the device was lost.
    #[error("GPU device error: {0}")]
    DeviceError(String),

    /// The wgpu surface could not be created for the window.
    #[error("GPU surface creation failed: {0}")]
    SurfaceCreation(String),

    // -----------------------------------------------------------------------
    // Frame data
    // -----------------------------------------------------------------------
    /// The supplied raw RGBA frame has an unexpected length for the current
    /// framebuffer dimensions.
    #[error("Invalid frame data size: expected {expected} bytes, got {actual} bytes")]
    InvalidFrameData {
        /// Expected byte count (`width * height * 4`).
        expected: usize,
        /// Actual byte count received.
        actual: usize,
    },

    // -----------------------------------------------------------------------
    // Surface / presentation
    // -----------------------------------------------------------------------
    /// `Surface::get_current_texture()` failed (timeout, outdated, lost, ...).
    #[error("GPU surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}

/// Lifecycle errors produced by [`crate::session::RendererSession`].
///
/// These indicate host programming errors (driving a session outside its
/// state machine), not GPU conditions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was freed; it accepts no further events or frames.
    #[error("renderer session is disposed")]
    Disposed,

    /// A frame was requested or produced while no blit backend is mounted.
    #[error("renderer session is not mounted")]
    NotMounted,

    /// `mount()` was called while a backend is already attached.
    #[error("renderer session is already mounted")]
    AlreadyMounted,

    /// The blit backend failed while producing a frame.
    #[error("frame production failed: {0}")]
    Render(#[from] RenderError),
}

// ---------------------------------------------------------------------------
// Convenience conversions from common upstream error types
// ---------------------------------------------------------------------------

impl From<wgpu::CreateSurfaceError> for RenderError {
    fn from(e: wgpu::CreateSurfaceError) -> Self {
        RenderError::SurfaceCreation(e.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for RenderError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        RenderError::DeviceError(e.to_string())
    }
}
