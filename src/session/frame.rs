//! Frame production: drain damage, rasterize, upload, emit.

use std::time::Instant;

use super::{FrameDiagnostics, FrameDirty, FrameEvent, FrameReason, RendererSession};
use crate::error::SessionError;
use crate::layout::PixelRect;
use crate::pacer::FrameRequest;

impl RendererSession {
    /// Ask for a frame on the next pacing callback.
    ///
    /// Later requests overwrite the pending reason without producing
    /// duplicate wakes; at most one wake fires per pacing interval. While
    /// unattached the reason is remembered but the host is not woken.
    pub fn request_frame(&mut self, reason: FrameReason) {
        if self.disposed {
            return;
        }
        self.pending_reason = Some(reason);
        if self.backend.is_none() {
            return;
        }
        if let FrameRequest::Schedule { delay } = self.pacer.request(Instant::now()) {
            if let Some(wake) = self.waker.as_mut() {
                wake(delay);
            }
        }
    }

    /// Produce one frame: drain damage, repaint the dirty regions, upload
    /// them to the backend, present, and emit a [`FrameEvent`].
    ///
    /// Returns `Ok(None)` when the tick is dropped: no damage, no pending
    /// batches, and a reason without forcing authority. On a backend error
    /// the drained damage and the reason are re-marked, so the repaint work
    /// is carried by the next frame instead of being lost.
    pub fn render_frame(&mut self, now: Instant) -> Result<Option<FrameEvent>, SessionError> {
        if self.disposed {
            return Err(SessionError::Disposed);
        }
        if self.backend.is_none() {
            return Err(SessionError::NotMounted);
        }
        self.pacer.begin_paint();

        let reason = self
            .pending_reason
            .take()
            .unwrap_or(FrameReason::ApplyUpdates);
        if !self.damage.has_work() && self.pending_batches.is_empty() && !reason.forces_paint() {
            log::trace!("Frame skipped: nothing to paint ({})", reason.as_str());
            return Ok(None);
        }

        let snapshot = self.runtime.snapshot();
        let layout = *self.damage.layout();
        let drained = self.damage.consume();

        // Repaint regions: everything on a full redraw, otherwise the
        // merged dirty tiles. An overlay change drags the cursor tile in
        // even when no cell under it was touched.
        let (cell_regions, tiles_repainted) = if drained.full_redraw {
            (None, layout.tile_count())
        } else {
            let mut regions = layout.merge_regions(&drained.tiles);
            let mut tiles = drained.tiles.len();
            let cursor = snapshot.cursor;
            if drained.overlay
                && cursor.visible
                && cursor.row < snapshot.grid.rows
                && cursor.col < snapshot.grid.columns
            {
                let tile = layout.tile_for_cell(cursor.row, cursor.col);
                if drained.tiles.binary_search(&tile).is_err() {
                    regions.push(layout.tile_rect(tile));
                    tiles += 1;
                }
            }
            (Some(regions), tiles)
        };

        self.surface
            .render(&snapshot, &self.config, &self.profile, cell_regions.as_deref());

        let pixel_regions: Option<Vec<PixelRect>> = cell_regions.as_ref().map(|regions| {
            regions
                .iter()
                .map(|rect| self.config.cell_rect_to_pixels(*rect))
                .collect()
        });

        let Some(backend) = self.backend.as_mut() else {
            return Err(SessionError::NotMounted);
        };
        let stats = match backend.present(self.surface.pixels(), pixel_regions.as_deref()) {
            Ok(stats) => stats,
            Err(err) => {
                self.damage.restore(drained);
                self.pending_reason = Some(reason);
                log::warn!("Frame presentation failed, damage restored: {err}");
                return Err(SessionError::Render(err));
            }
        };

        let framebuffer_pixels =
            (self.config.framebuffer.width as u64 * self.config.framebuffer.height as u64).max(1);
        let coverage = if stats.full_upload {
            1.0
        } else {
            (stats.bytes_uploaded as f64 / 4.0) / framebuffer_pixels as f64
        };

        self.pacer.on_paint(now);

        let updates = std::mem::take(&mut self.pending_batches)
            .into_iter()
            .flat_map(|batch| batch.updates)
            .collect::<Vec<_>>();

        let event = FrameEvent {
            timestamp: now,
            interval: self.pacer.last_frame_gap(),
            dirty: FrameDirty {
                full_redraw: drained.full_redraw,
                tiles_repainted,
                coverage,
            },
            diagnostics: FrameDiagnostics {
                bytes_uploaded: stats.bytes_uploaded,
                upload_rects: stats.upload_rects,
                draw_calls: stats.draw_calls,
            },
            updates,
            viewport: self.config.grid,
            reason,
        };

        log::debug!(
            "Frame: reason={} full={} tiles={} rects={} bytes={}",
            reason.as_str(),
            drained.full_redraw,
            tiles_repainted,
            stats.upload_rects,
            stats.bytes_uploaded,
        );

        for (_, callback) in &mut self.frame_subscribers {
            callback(&event);
        }
        Ok(Some(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blit::HeadlessBlit;
    use crate::bridge::SessionEvent;
    use crate::fonts::FixedFont;
    use crate::layout::{CellMetrics, GridDims, RendererConfiguration};
    use crate::profile::{ProfileUpdate, TerminalProfile, Theme};
    use crate::runtime::EchoRuntime;
    use crate::session::RendererOptions;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use winit::dpi::LogicalSize;

    fn config(surface: LogicalSize<f64>) -> RendererConfiguration {
        RendererConfiguration::compute(
            surface,
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

    fn mounted() -> RendererSession {
        let config = config(LogicalSize::new(640.0, 384.0));
        let mut session = RendererSession::new(
            Box::new(EchoRuntime::new(config.grid)),
            Arc::new(Mutex::new(FixedFont::default())),
            config,
            TerminalProfile::default(),
            RendererOptions::default(),
        );
        session
            .mount(Box::new(HeadlessBlit::new(640, 384)))
            .unwrap();
        session
    }

    #[test]
    fn test_initial_frame_covers_everything() {
        let mut session = mounted();
        let event = session
            .render_frame(Instant::now())
            .unwrap()
            .expect("mount queues an initial frame");

        assert_eq!(event.reason, FrameReason::Initial);
        assert!(event.dirty.full_redraw);
        assert_eq!(event.dirty.coverage, 1.0);
        assert_eq!(event.dirty.tiles_repainted, 60);
        assert_eq!(event.diagnostics.bytes_uploaded, 640 * 384 * 4);
        assert_eq!(event.diagnostics.draw_calls, 1);
        assert_eq!(event.viewport, GridDims::new(24, 80));
        assert_eq!(event.interval, None);
        assert!(!session.has_pending_frame());
    }

    #[test]
    fn test_idle_tick_is_skipped() {
        let mut session = mounted();
        session.render_frame(Instant::now()).unwrap();
        assert_eq!(session.render_frame(Instant::now()).unwrap(), None);
    }

    #[test]
    fn test_single_cell_update_uploads_one_rect() {
        let mut session = mounted();
        session.render_frame(Instant::now()).unwrap();

        session.dispatch(&SessionEvent::Text("x".into())).unwrap();
        let event = session.render_frame(Instant::now()).unwrap().unwrap();

        assert_eq!(event.reason, FrameReason::ApplyUpdates);
        assert!(!event.dirty.full_redraw);
        assert_eq!(event.diagnostics.upload_rects, 1);
        // Cell write plus cursor tracking stay inside the first tile:
        // one 8x4-cell strip is 64x64 px.
        assert_eq!(event.diagnostics.bytes_uploaded, 64 * 64 * 4);
        assert!(event.dirty.coverage < 0.02);
        assert_eq!(event.updates.len(), 2);
    }

    #[test]
    fn test_frame_interval_spans_produced_frames() {
        let mut session = mounted();
        let t0 = Instant::now();
        session.render_frame(t0).unwrap();

        session.dispatch(&SessionEvent::Text("x".into())).unwrap();
        let event = session
            .render_frame(t0 + std::time::Duration::from_millis(17))
            .unwrap()
            .unwrap();
        assert_eq!(
            event.interval,
            Some(std::time::Duration::from_millis(17))
        );
    }

    #[test]
    fn test_sync_frame_after_configure() {
        let mut session = mounted();
        session.render_frame(Instant::now()).unwrap();

        let next = config(LogicalSize::new(960.0, 768.0));
        session.dispatch(&SessionEvent::Configure(next)).unwrap();
        let event = session.render_frame(Instant::now()).unwrap().unwrap();

        assert_eq!(event.reason, FrameReason::Sync);
        assert_eq!(event.viewport, GridDims::new(48, 120));
        assert_eq!(event.dirty.coverage, 1.0);
        assert_eq!(event.diagnostics.bytes_uploaded, 960 * 768 * 4);
    }

    #[test]
    fn test_theme_change_frame() {
        let mut session = mounted();
        session.render_frame(Instant::now()).unwrap();

        session
            .dispatch(&SessionEvent::UpdateProfile(ProfileUpdate::theme(
                Theme::dracula(),
            )))
            .unwrap();
        let event = session.render_frame(Instant::now()).unwrap().unwrap();

        assert_eq!(event.reason, FrameReason::ThemeChange);
        assert!(event.dirty.full_redraw);

        // The repaint uses the new theme's background; probe the
        // bottom-right pixel, well away from the cursor cell.
        let pixels = session.serialize_buffer();
        let background = Theme::dracula().background;
        let last = pixels.len() - 4;
        assert_eq!(pixels[last], background.r);
        assert_eq!(pixels[last + 1], background.g);
        assert_eq!(pixels[last + 2], background.b);
    }

    #[test]
    fn test_manual_frame_without_damage_presents() {
        let mut session = mounted();
        session.render_frame(Instant::now()).unwrap();

        session.request_frame(FrameReason::Manual);
        let event = session.render_frame(Instant::now()).unwrap().unwrap();

        assert_eq!(event.reason, FrameReason::Manual);
        assert!(!event.dirty.full_redraw);
        assert_eq!(event.diagnostics.upload_rects, 0);
        assert_eq!(event.diagnostics.bytes_uploaded, 0);
        assert_eq!(event.diagnostics.draw_calls, 1);
        assert!(event.updates.is_empty());
    }

    #[test]
    fn test_batches_aggregate_into_one_frame() {
        let mut session = mounted();
        session.render_frame(Instant::now()).unwrap();

        // Three dispatches, each two updates (cell write + cursor move).
        session.dispatch(&SessionEvent::Text("a".into())).unwrap();
        session.dispatch(&SessionEvent::Text("b".into())).unwrap();
        session.dispatch(&SessionEvent::Text("c".into())).unwrap();

        let event = session.render_frame(Instant::now()).unwrap().unwrap();
        assert_eq!(event.updates.len(), 6);

        // Everything was consumed by that one frame.
        assert_eq!(session.render_frame(Instant::now()).unwrap(), None);
    }
}
