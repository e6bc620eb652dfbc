//! Renderer session orchestration.
//!
//! [`RendererSession`] ties the crate together: it owns the terminal
//! runtime, the damage tracker, the CPU rasterizer, the frame pacer, and
//! (while mounted) a [`BlitBackend`]. Hosts drive it with three calls:
//! [`dispatch`](RendererSession::dispatch) feeds events in,
//! [`render_frame`](RendererSession::render_frame) produces a frame on the
//! pacing callback, and the `on_frame` / `on_resize_request` subscriptions
//! carry results back out.
//!
//! Lifecycle: a session starts unattached, becomes attached via
//! [`mount`](RendererSession::mount), and may unmount and remount any
//! number of times; [`free`](RendererSession::free) is terminal. Unmounting
//! drops the backend (and with it every GPU resource) while runtime,
//! profile, configuration, and the raster bitmap survive, so a remount
//! costs one full repaint and nothing else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::SubscriptionId;
use crate::blit::BlitBackend;
use crate::damage::DamageTracker;
use crate::error::SessionError;
use crate::fonts::FontSource;
use crate::layout::{GridDims, RendererConfiguration};
use crate::pacer::{DEFAULT_FRAME_INTERVAL, FramePacer};
use crate::profile::TerminalProfile;
use crate::raster::TextSurface;
use crate::runtime::{BatchReason, RuntimeUpdate, TerminalRuntime, UpdateBatch};

mod dispatch;
mod frame;

/// Where a session sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No blit backend attached; dispatch still works, frames do not.
    Unattached,
    /// Mounted on a backend and producing frames.
    Attached,
    /// Freed. Terminal; every dispatch or frame call fails.
    Disposed,
}

/// Why a frame was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameReason {
    /// First paint after mount or reset.
    Initial,
    /// Host-driven reconfiguration.
    Sync,
    /// Ordinary runtime updates.
    ApplyUpdates,
    /// The profile changed; every painted color is suspect.
    ThemeChange,
    /// Explicitly forced by the host.
    Manual,
}

impl FrameReason {
    /// Whether this reason produces a frame even with no damage and no
    /// pending batches.
    pub fn forces_paint(&self) -> bool {
        matches!(
            self,
            FrameReason::Initial | FrameReason::ThemeChange | FrameReason::Manual
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrameReason::Initial => "initial",
            FrameReason::Sync => "sync",
            FrameReason::ApplyUpdates => "apply-updates",
            FrameReason::ThemeChange => "theme-change",
            FrameReason::Manual => "manual",
        }
    }
}

impl From<BatchReason> for FrameReason {
    fn from(reason: BatchReason) -> Self {
        match reason {
            BatchReason::Initial => FrameReason::Initial,
            BatchReason::Sync => FrameReason::Sync,
            BatchReason::ApplyUpdates => FrameReason::ApplyUpdates,
            BatchReason::Manual => FrameReason::Manual,
        }
    }
}

/// Dirty-region summary of one produced frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDirty {
    /// The whole grid was repainted; `tiles_repainted` counts every tile.
    pub full_redraw: bool,
    /// Tiles repainted this frame.
    pub tiles_repainted: usize,
    /// Uploaded fraction of the framebuffer, `0.0..=1.0`.
    pub coverage: f64,
}

/// Upload and draw accounting for one produced frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDiagnostics {
    pub bytes_uploaded: usize,
    pub upload_rects: usize,
    pub draw_calls: usize,
}

/// Delivered to `on_frame` subscribers for every produced frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameEvent {
    /// When the frame was produced.
    pub timestamp: Instant,
    /// Approximate duration since the previous produced frame; `None` on
    /// the first frame.
    pub interval: Option<Duration>,
    pub dirty: FrameDirty,
    pub diagnostics: FrameDiagnostics,
    /// Runtime updates aggregated since the previous frame, in dispatch
    /// order.
    pub updates: Vec<RuntimeUpdate>,
    /// Grid dimensions the frame was rendered at.
    pub viewport: GridDims,
    pub reason: FrameReason,
}

/// What prompted a grid resize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeReason {
    /// The application asked for new dimensions (remote resize).
    Remote,
    /// A host reconfiguration changed the derived grid.
    HostTriggered,
    /// First report after mount.
    Initial,
}

impl ResizeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeReason::Remote => "remote",
            ResizeReason::HostTriggered => "host-triggered",
            ResizeReason::Initial => "initial",
        }
    }
}

/// Delivered to `on_resize_request` subscribers. The session never resizes
/// itself; the host answers by dispatching a configure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeRequest {
    pub rows: usize,
    pub columns: usize,
    pub reason: ResizeReason,
}

/// Host-tunable session behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererOptions {
    /// Minimum spacing between produced frames.
    pub frame_interval: Duration,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
        }
    }
}

type FrameCallback = Box<dyn FnMut(&FrameEvent)>;
type ResizeCallback = Box<dyn FnMut(&ResizeRequest)>;
type Waker = Box<dyn FnMut(Duration)>;

/// One terminal surface: runtime, damage, rasterizer, pacer, and an
/// optional blit backend.
pub struct RendererSession {
    runtime: Box<dyn TerminalRuntime>,
    config: RendererConfiguration,
    profile: TerminalProfile,
    damage: DamageTracker,
    pacer: FramePacer,
    surface: TextSurface,
    backend: Option<Box<dyn BlitBackend>>,
    disposed: bool,
    pending_batches: Vec<UpdateBatch>,
    pending_reason: Option<FrameReason>,
    frame_subscribers: Vec<(SubscriptionId, FrameCallback)>,
    resize_subscribers: Vec<(SubscriptionId, ResizeCallback)>,
    waker: Option<Waker>,
    next_subscription: u64,
}

impl RendererSession {
    /// Build an unattached session around a runtime and a font source.
    ///
    /// The runtime is resized to the configuration's grid so both sides
    /// agree on dimensions from the first snapshot.
    pub fn new(
        mut runtime: Box<dyn TerminalRuntime>,
        font: Arc<Mutex<dyn FontSource>>,
        config: RendererConfiguration,
        profile: TerminalProfile,
        options: RendererOptions,
    ) -> Self {
        runtime.resize(config.grid);
        let surface = TextSurface::new(font, config.framebuffer.width, config.framebuffer.height);
        Self {
            runtime,
            profile,
            damage: DamageTracker::new(config.grid),
            pacer: FramePacer::new(options.frame_interval),
            surface,
            backend: None,
            disposed: false,
            pending_batches: Vec::new(),
            pending_reason: None,
            frame_subscribers: Vec::new(),
            resize_subscribers: Vec::new(),
            waker: None,
            next_subscription: 0,
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        if self.disposed {
            SessionState::Disposed
        } else if self.backend.is_some() {
            SessionState::Attached
        } else {
            SessionState::Unattached
        }
    }

    pub fn configuration(&self) -> &RendererConfiguration {
        &self.config
    }

    pub fn profile(&self) -> &TerminalProfile {
        &self.profile
    }

    pub fn runtime(&self) -> &dyn TerminalRuntime {
        self.runtime.as_ref()
    }

    /// The current off-screen framebuffer as raw RGBA8 pixels.
    pub fn serialize_buffer(&self) -> &[u8] {
        self.surface.pixels()
    }

    /// Whether a frame request is waiting for the pacing callback.
    pub fn has_pending_frame(&self) -> bool {
        self.pacer.is_scheduled()
    }

    /// Attach a blit backend and queue the initial full frame.
    ///
    /// The backend is resized to the current framebuffer before first use.
    /// Fails on a disposed session and when a backend is already attached.
    pub fn mount(&mut self, mut backend: Box<dyn BlitBackend>) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        if self.backend.is_some() {
            return Err(SessionError::AlreadyMounted);
        }

        backend.resize(self.config.framebuffer.width, self.config.framebuffer.height)?;
        self.backend = Some(backend);
        self.damage.mark_all();
        log::info!(
            "Session mounted: {}x{} cells, {}x{} px framebuffer",
            self.config.grid.columns,
            self.config.grid.rows,
            self.config.framebuffer.width,
            self.config.framebuffer.height,
        );

        let grid = self.config.grid;
        self.emit_resize_request(ResizeRequest {
            rows: grid.rows,
            columns: grid.columns,
            reason: ResizeReason::Initial,
        });
        self.request_frame(FrameReason::Initial);
        Ok(())
    }

    /// Detach from the backend, dropping it and every GPU resource it
    /// holds. Pending frame requests are cancelled; runtime, profile,
    /// configuration, and the raster bitmap are preserved for remounting.
    pub fn unmount(&mut self) {
        if self.backend.take().is_none() {
            return;
        }
        self.pacer.cancel();
        self.pending_reason = None;
        log::info!("Session unmounted, render state preserved");
    }

    /// Tear the session down for good: unmount, drop all subscribers and
    /// the waker, discard pending work, and reset the runtime. Irreversible;
    /// later dispatches fail with [`SessionError::Disposed`].
    pub fn free(&mut self) {
        if self.disposed {
            return;
        }
        self.unmount();
        self.disposed = true;
        self.frame_subscribers.clear();
        self.resize_subscribers.clear();
        self.waker = None;
        self.pending_batches.clear();
        self.pending_reason = None;
        self.runtime.reset();
        log::info!("Session freed");
    }

    /// Subscribe to produced frames.
    pub fn on_frame(&mut self, callback: FrameCallback) -> SubscriptionId {
        let id = self.next_subscription_id();
        self.frame_subscribers.push((id, callback));
        id
    }

    /// Remove a frame subscription; returns whether it existed.
    pub fn off_frame(&mut self, id: SubscriptionId) -> bool {
        let before = self.frame_subscribers.len();
        self.frame_subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.frame_subscribers.len() != before
    }

    /// Subscribe to grid resize requests.
    pub fn on_resize_request(&mut self, callback: ResizeCallback) -> SubscriptionId {
        let id = self.next_subscription_id();
        self.resize_subscribers.push((id, callback));
        id
    }

    /// Remove a resize-request subscription; returns whether it existed.
    pub fn off_resize_request(&mut self, id: SubscriptionId) -> bool {
        let before = self.resize_subscribers.len();
        self.resize_subscribers.retain(|(sub_id, _)| *sub_id != id);
        self.resize_subscribers.len() != before
    }

    /// Install the host wake callback. It receives the delay after which
    /// the host must call [`render_frame`](Self::render_frame); without one
    /// the host has to poll [`has_pending_frame`](Self::has_pending_frame).
    pub fn set_waker(&mut self, waker: Waker) {
        self.waker = Some(waker);
    }

    pub fn clear_waker(&mut self) {
        self.waker = None;
    }

    fn next_subscription_id(&mut self) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        id
    }

    fn emit_resize_request(&mut self, request: ResizeRequest) {
        log::debug!(
            "Resize request: {}x{} ({})",
            request.columns,
            request.rows,
            request.reason.as_str(),
        );
        for (_, callback) in &mut self.resize_subscribers {
            callback(&request);
        }
    }
}

impl std::fmt::Debug for RendererSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererSession")
            .field("state", &self.state())
            .field("grid", &self.config.grid)
            .field("pending_batches", &self.pending_batches.len())
            .field("pending_reason", &self.pending_reason)
            .field("frame_subscribers", &self.frame_subscribers.len())
            .field("resize_subscribers", &self.resize_subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blit::HeadlessBlit;
    use crate::bridge::SessionEvent;
    use crate::fonts::FixedFont;
    use crate::layout::CellMetrics;
    use crate::runtime::EchoRuntime;
    use std::cell::RefCell;
    use std::rc::Rc;
    use winit::dpi::LogicalSize;

    fn test_config() -> RendererConfiguration {
        RendererConfiguration::compute(
            LogicalSize::new(640.0, 384.0),
            1.0,
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

    fn session() -> RendererSession {
        let config = test_config();
        RendererSession::new(
            Box::new(EchoRuntime::new(config.grid)),
            Arc::new(Mutex::new(FixedFont::default())),
            config,
            TerminalProfile::default(),
            RendererOptions::default(),
        )
    }

    fn mounted() -> RendererSession {
        let mut s = session();
        s.mount(Box::new(HeadlessBlit::new(640, 384))).unwrap();
        s
    }

    #[test]
    fn test_frame_reason_forcing() {
        assert!(FrameReason::Initial.forces_paint());
        assert!(FrameReason::ThemeChange.forces_paint());
        assert!(FrameReason::Manual.forces_paint());
        assert!(!FrameReason::Sync.forces_paint());
        assert!(!FrameReason::ApplyUpdates.forces_paint());
    }

    #[test]
    fn test_frame_reason_strings() {
        assert_eq!(FrameReason::Initial.as_str(), "initial");
        assert_eq!(FrameReason::Sync.as_str(), "sync");
        assert_eq!(FrameReason::ApplyUpdates.as_str(), "apply-updates");
        assert_eq!(FrameReason::ThemeChange.as_str(), "theme-change");
        assert_eq!(FrameReason::Manual.as_str(), "manual");
        assert_eq!(ResizeReason::HostTriggered.as_str(), "host-triggered");
    }

    #[test]
    fn test_batch_reason_maps_to_frame_reason() {
        assert_eq!(FrameReason::from(BatchReason::Initial), FrameReason::Initial);
        assert_eq!(
            FrameReason::from(BatchReason::ApplyUpdates),
            FrameReason::ApplyUpdates
        );
    }

    #[test]
    fn test_new_session_is_unattached() {
        let s = session();
        assert_eq!(s.state(), SessionState::Unattached);
        assert_eq!(s.serialize_buffer().len(), 640 * 384 * 4);
        assert!(!s.has_pending_frame());
    }

    #[test]
    fn test_mount_unmount_remount() {
        let mut s = session();
        s.mount(Box::new(HeadlessBlit::new(640, 384))).unwrap();
        assert_eq!(s.state(), SessionState::Attached);

        // A second backend cannot be attached over the first.
        let err = s.mount(Box::new(HeadlessBlit::new(640, 384)));
        assert!(matches!(err, Err(SessionError::AlreadyMounted)));

        s.unmount();
        assert_eq!(s.state(), SessionState::Unattached);

        s.mount(Box::new(HeadlessBlit::new(640, 384))).unwrap();
        assert_eq!(s.state(), SessionState::Attached);
    }

    #[test]
    fn test_unmount_when_unattached_is_noop() {
        let mut s = session();
        s.unmount();
        assert_eq!(s.state(), SessionState::Unattached);
    }

    #[test]
    fn test_free_is_terminal() {
        let mut s = mounted();
        s.free();
        assert_eq!(s.state(), SessionState::Disposed);

        assert!(matches!(
            s.dispatch(&SessionEvent::Text("x".into())),
            Err(SessionError::Disposed)
        ));
        assert!(matches!(
            s.mount(Box::new(HeadlessBlit::new(640, 384))),
            Err(SessionError::Disposed)
        ));
        assert!(matches!(
            s.render_frame(Instant::now()),
            Err(SessionError::Disposed)
        ));

        // Freeing twice is harmless.
        s.free();
        assert_eq!(s.state(), SessionState::Disposed);
    }

    #[test]
    fn test_mount_emits_initial_resize_request() {
        let mut s = session();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        s.on_resize_request(Box::new(move |request| {
            sink.borrow_mut().push(*request);
        }));

        s.mount(Box::new(HeadlessBlit::new(640, 384))).unwrap();
        assert_eq!(
            seen.borrow().as_slice(),
            &[ResizeRequest {
                rows: 24,
                columns: 80,
                reason: ResizeReason::Initial,
            }]
        );
        assert!(s.has_pending_frame());
    }

    #[test]
    fn test_render_without_mount_fails() {
        let mut s = session();
        assert!(matches!(
            s.render_frame(Instant::now()),
            Err(SessionError::NotMounted)
        ));
    }

    #[test]
    fn test_subscription_removal() {
        let mut s = session();
        let count = Rc::new(RefCell::new(0usize));
        let sink = Rc::clone(&count);
        let id = s.on_frame(Box::new(move |_| {
            *sink.borrow_mut() += 1;
        }));

        assert!(s.off_frame(id));
        assert!(!s.off_frame(id));

        s.mount(Box::new(HeadlessBlit::new(640, 384))).unwrap();
        s.render_frame(Instant::now()).unwrap();
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn test_waker_receives_schedule() {
        let mut s = session();
        let delays = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delays);
        s.set_waker(Box::new(move |delay| {
            sink.borrow_mut().push(delay);
        }));

        // Unattached requests never wake the host.
        s.request_frame(FrameReason::Manual);
        assert!(delays.borrow().is_empty());

        s.mount(Box::new(HeadlessBlit::new(640, 384))).unwrap();
        assert_eq!(delays.borrow().len(), 1);

        // Coalesced requests do not wake again.
        s.request_frame(FrameReason::ApplyUpdates);
        assert_eq!(delays.borrow().len(), 1);
    }

    #[test]
    fn test_options_default_interval() {
        let options = RendererOptions::default();
        assert_eq!(options.frame_interval, DEFAULT_FRAME_INTERVAL);
    }
}
