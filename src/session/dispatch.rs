//! Event routing: host events into runtime calls, damage, and frame
//! requests.

use super::{FrameReason, RendererSession, ResizeReason, ResizeRequest};
use crate::bridge::{self, SessionEvent};
use crate::error::SessionError;
use crate::layout::RendererConfiguration;
use crate::profile::ProfileUpdate;
use crate::runtime::{BatchReason, RuntimeUpdate, UpdateBatch};

impl RendererSession {
    /// Route one event into the session.
    ///
    /// Renderer-owned events (configure, profile update) are applied
    /// directly; everything else goes through the bridge into the runtime,
    /// whose returned updates are recorded as damage and queued for the
    /// next frame. Legal in every state except disposed; events dispatched
    /// while unattached accumulate and surface with the next mount's
    /// initial frame.
    pub fn dispatch(&mut self, event: &SessionEvent) -> Result<(), SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        match event {
            SessionEvent::Configure(config) => self.configure(*config),
            SessionEvent::UpdateProfile(update) => {
                self.update_profile(update.clone());
                Ok(())
            }
            runtime_event => {
                self.forward_to_runtime(runtime_event);
                Ok(())
            }
        }
    }

    /// Adopt a new configuration: resize runtime, damage layout, raster
    /// bitmap, and backend, then queue a full sync frame. A changed grid is
    /// reported to resize subscribers as host-triggered.
    fn configure(&mut self, next: RendererConfiguration) -> Result<(), SessionError> {
        let grid_changed = next.grid != self.config.grid;
        log::info!(
            "Configure: {}x{} cells, {}x{} px framebuffer",
            next.grid.columns,
            next.grid.rows,
            next.framebuffer.width,
            next.framebuffer.height,
        );
        self.config = next;

        // The reconfigure below forces a full redraw, so resize updates
        // only need to reach frame subscribers, not the damage tracker.
        let updates = self.runtime.resize(next.grid);
        if !updates.is_empty() {
            self.pending_batches.push(UpdateBatch {
                reason: BatchReason::Sync,
                updates,
            });
        }

        self.damage.reconfigure(next.grid);
        self.surface
            .resize(next.framebuffer.width, next.framebuffer.height);
        if let Some(backend) = self.backend.as_mut() {
            backend.resize(next.framebuffer.width, next.framebuffer.height)?;
        }

        if grid_changed {
            self.emit_resize_request(ResizeRequest {
                rows: next.grid.rows,
                columns: next.grid.columns,
                reason: ResizeReason::HostTriggered,
            });
        }
        self.request_frame(FrameReason::Sync);
        Ok(())
    }

    /// Merge a profile patch; colors changed, so everything repaints.
    fn update_profile(&mut self, update: ProfileUpdate) {
        self.profile.merge(update);
        self.damage.mark_all();
        log::debug!("Profile updated, full repaint queued");
        self.request_frame(FrameReason::ThemeChange);
    }

    fn forward_to_runtime(&mut self, event: &SessionEvent) {
        let bridged = bridge::apply(self.runtime.as_mut(), event);
        debug_assert!(bridged.handled, "bridge owns every runtime-bound event");
        let Some(batch) = bridged.batch else {
            return;
        };

        self.record_damage(&batch.updates);
        let reason = FrameReason::from(batch.reason);
        self.pending_batches.push(batch);
        self.request_frame(reason);
    }

    /// Translate one batch of runtime updates into damage marks and
    /// outbound resize requests.
    fn record_damage(&mut self, updates: &[RuntimeUpdate]) {
        for update in updates {
            match update {
                RuntimeUpdate::Cell { row, col } => self.damage.mark_cell(*row, *col),
                RuntimeUpdate::CursorMove { row, col } => self.damage.track_cursor(*row, *col),
                // Selection extents are not tracked per-cell; repaint
                // everything.
                RuntimeUpdate::SelectionSet
                | RuntimeUpdate::SelectionUpdate
                | RuntimeUpdate::SelectionCleared => {
                    self.damage.mark_overlay();
                    self.damage.mark_all();
                }
                RuntimeUpdate::Scroll { .. }
                | RuntimeUpdate::Clear
                | RuntimeUpdate::ModeChange
                | RuntimeUpdate::PaletteChange { .. } => self.damage.mark_all(),
                RuntimeUpdate::Resize { rows, columns } => {
                    self.emit_resize_request(ResizeRequest {
                        rows: *rows,
                        columns: *columns,
                        reason: ResizeReason::Remote,
                    });
                }
                RuntimeUpdate::AttributeChange
                | RuntimeUpdate::Bell
                | RuntimeUpdate::Response(_)
                | RuntimeUpdate::Title(_) => {}
            }
        }
    }
}
