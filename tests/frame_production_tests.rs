//! End-to-end frame production tests.
//!
//! Events go in through [`RendererSession::dispatch`], frames come out of
//! `render_frame`, and the assertions check what actually reached the
//! headless backend: upload accounting, repaint coverage, and the pixels
//! in the shared bitmap.

mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use winit::dpi::LogicalSize;

use termblit::bridge::SessionEvent;
use termblit::error::{RenderError, SessionError};
use termblit::layout::GridDims;
use termblit::profile::{ProfileUpdate, Theme};
use termblit::runtime::{ParserEvent, RuntimeUpdate};
use termblit::session::{FrameReason, ResizeReason, SessionState};

use common::{config_for, mounted_80x24, pixel, session_80x24, FailingBlit};

#[test]
fn test_mount_produces_full_initial_frame() {
    let mut session = mounted_80x24();

    let event = session
        .render_frame(Instant::now())
        .expect("render after mount")
        .expect("mount queues an initial frame");

    assert_eq!(event.reason, FrameReason::Initial);
    assert!(event.dirty.full_redraw);
    assert_eq!(event.dirty.coverage, 1.0);
    assert_eq!(event.viewport, GridDims::new(24, 80));
    assert_eq!(event.diagnostics.bytes_uploaded, 640 * 384 * 4);
    assert_eq!(event.diagnostics.upload_rects, 1);
    assert_eq!(event.diagnostics.draw_calls, 1);
    assert_eq!(event.interval, None);

    // A cell nobody wrote to carries the default dark background.
    let buffer = session.serialize_buffer();
    assert_eq!(pixel(buffer, 640, 300, 200), [30, 30, 30, 255]);

    // Nothing left over: the next tick is a skip.
    assert!(session.render_frame(Instant::now()).expect("idle tick").is_none());
}

#[test]
fn test_text_updates_render_single_region() {
    let mut session = mounted_80x24();
    session.render_frame(Instant::now()).expect("initial frame");

    session
        .dispatch(&SessionEvent::Text("hi".into()))
        .expect("dispatch text");
    assert!(session.has_pending_frame());

    let event = session
        .render_frame(Instant::now())
        .expect("render text frame")
        .expect("text produces a frame");

    assert_eq!(event.reason, FrameReason::ApplyUpdates);
    assert!(!event.dirty.full_redraw);
    // Two cell writes plus the cursor all land in the top-left 64x64 tile.
    assert_eq!(event.dirty.tiles_repainted, 1);
    assert_eq!(event.diagnostics.upload_rects, 1);
    assert_eq!(event.diagnostics.bytes_uploaded, 64 * 64 * 4);
    assert_eq!(event.updates.len(), 3);

    let snapshot = session.runtime().snapshot();
    assert_eq!(snapshot.cursor.row, 0);
    assert_eq!(snapshot.cursor.col, 2);

    // Glyph ink at the center of cell (0, 0).
    let buffer = session.serialize_buffer();
    assert_eq!(pixel(buffer, 640, 4, 8), [229, 229, 229, 255]);
}

#[test]
fn test_events_between_frames_collapse_into_one() {
    let mut session = mounted_80x24();
    session.render_frame(Instant::now()).expect("initial frame");

    session
        .dispatch(&SessionEvent::Text("a".into()))
        .expect("dispatch a");
    session
        .dispatch(&SessionEvent::Text("b".into()))
        .expect("dispatch b");
    session
        .dispatch(&SessionEvent::SetCursor { row: 5, col: 10 })
        .expect("dispatch cursor move");

    let event = session
        .render_frame(Instant::now())
        .expect("render combined frame")
        .expect("pending events produce a frame");

    // a -> Cell + CursorMove, b -> Cell + CursorMove, SetCursor -> CursorMove.
    assert_eq!(event.updates.len(), 5);
    assert!(
        event
            .updates
            .contains(&RuntimeUpdate::CursorMove { row: 5, col: 10 })
    );
    // Writes stay in tile (0, 0); the cursor lands in the second tile row.
    assert_eq!(event.dirty.tiles_repainted, 2);
    assert_eq!(event.diagnostics.upload_rects, 2);
    assert_eq!(event.diagnostics.bytes_uploaded, 2 * 64 * 64 * 4);

    assert!(session.render_frame(Instant::now()).expect("idle tick").is_none());
}

#[test]
fn test_configure_applies_new_geometry() {
    let mut session = mounted_80x24();
    session.render_frame(Instant::now()).expect("initial frame");

    let requests = Rc::new(RefCell::new(Vec::new()));
    let seen = requests.clone();
    session.on_resize_request(Box::new(move |request| {
        seen.borrow_mut()
            .push((request.rows, request.columns, request.reason));
    }));

    let next = config_for(LogicalSize::new(960.0, 768.0), 1.0);
    session
        .dispatch(&SessionEvent::Configure(next))
        .expect("dispatch configure");

    assert_eq!(session.configuration().grid, GridDims::new(48, 120));
    assert_eq!(
        requests.borrow().as_slice(),
        &[(48, 120, ResizeReason::HostTriggered)]
    );

    let event = session
        .render_frame(Instant::now())
        .expect("render sync frame")
        .expect("configure forces a frame");

    assert_eq!(event.reason, FrameReason::Sync);
    assert_eq!(event.viewport, GridDims::new(48, 120));
    assert_eq!(event.dirty.coverage, 1.0);
    assert_eq!(session.serialize_buffer().len(), 960 * 768 * 4);
}

#[test]
fn test_theme_change_repaints_with_new_colors() {
    let mut session = mounted_80x24();
    session.render_frame(Instant::now()).expect("initial frame");

    session
        .dispatch(&SessionEvent::UpdateProfile(ProfileUpdate::theme(
            Theme::dracula(),
        )))
        .expect("dispatch theme update");

    let event = session
        .render_frame(Instant::now())
        .expect("render theme frame")
        .expect("theme change forces a frame");

    assert_eq!(event.reason, FrameReason::ThemeChange);
    assert!(event.dirty.full_redraw);
    assert_eq!(session.profile().theme.name, "Dracula");

    // Bottom-right corner, well away from the cursor cell.
    let buffer = session.serialize_buffer();
    assert_eq!(pixel(buffer, 640, 639, 383), [40, 42, 54, 255]);
}

#[test]
fn test_manual_frame_redraws_without_damage() {
    let mut session = mounted_80x24();
    session.render_frame(Instant::now()).expect("initial frame");

    session.request_frame(FrameReason::Manual);
    let event = session
        .render_frame(Instant::now())
        .expect("render manual frame")
        .expect("manual request forces a frame");

    assert_eq!(event.reason, FrameReason::Manual);
    assert!(!event.dirty.full_redraw);
    assert_eq!(event.dirty.tiles_repainted, 0);
    // The persistent texture is re-presented without any upload.
    assert_eq!(event.diagnostics.bytes_uploaded, 0);
    assert_eq!(event.diagnostics.upload_rects, 0);
    assert_eq!(event.diagnostics.draw_calls, 1);
    assert!(event.updates.is_empty());
}

#[test]
fn test_failed_present_retries_same_damage() {
    let mut session = session_80x24();
    session
        .mount(Box::new(FailingBlit::new(640, 384, vec![1])))
        .expect("mount failing backend");
    session.render_frame(Instant::now()).expect("initial frame");

    session
        .dispatch(&SessionEvent::Text("x".into()))
        .expect("dispatch text");

    let err = session
        .render_frame(Instant::now())
        .expect_err("second present fails");
    assert!(matches!(
        err,
        SessionError::Render(RenderError::Surface(_))
    ));
    assert_eq!(session.state(), SessionState::Attached);

    // The drained damage and the pending batch were put back; the retry
    // repaints exactly the cells the failed frame covered.
    let event = session
        .render_frame(Instant::now())
        .expect("retry after failure")
        .expect("retry produces a frame");

    assert_eq!(event.reason, FrameReason::ApplyUpdates);
    assert_eq!(event.diagnostics.upload_rects, 1);
    assert_eq!(event.diagnostics.bytes_uploaded, 64 * 64 * 4);
    assert_eq!(event.updates.len(), 2);

    let buffer = session.serialize_buffer();
    assert_eq!(pixel(buffer, 640, 4, 8), [229, 229, 229, 255]);
}

#[test]
fn test_failed_initial_present_repaints_everything() {
    let mut session = session_80x24();
    session
        .mount(Box::new(FailingBlit::new(640, 384, vec![0])))
        .expect("mount failing backend");

    let err = session
        .render_frame(Instant::now())
        .expect_err("first present fails");
    assert!(matches!(err, SessionError::Render(_)));

    let event = session
        .render_frame(Instant::now())
        .expect("retry after failure")
        .expect("retry produces a frame");

    assert_eq!(event.reason, FrameReason::Initial);
    assert!(event.dirty.full_redraw);
    assert_eq!(event.dirty.coverage, 1.0);
}

#[test]
fn test_remote_resize_request_round_trip() {
    let mut session = session_80x24();
    let requests = Rc::new(RefCell::new(Vec::new()));
    let seen = requests.clone();
    session.on_resize_request(Box::new(move |request| {
        seen.borrow_mut()
            .push((request.rows, request.columns, request.reason));
    }));
    session
        .mount(Box::new(termblit::blit::HeadlessBlit::new(640, 384)))
        .expect("mount backend");
    session.render_frame(Instant::now()).expect("initial frame");

    // XTWINOPS 8: the application asks for 30 rows by 100 columns.
    session
        .dispatch(&SessionEvent::ParserDispatch(ParserEvent::Csi {
            params: vec![8, 30, 100],
            intermediates: Vec::new(),
            final_byte: b't',
        }))
        .expect("dispatch resize request");

    assert_eq!(
        requests.borrow().as_slice(),
        &[
            (24, 80, ResizeReason::Initial),
            (30, 100, ResizeReason::Remote),
        ]
    );
    // Advisory only: the grid stays put until the host configures.
    assert_eq!(session.configuration().grid, GridDims::new(24, 80));
    assert_eq!(session.runtime().grid(), GridDims::new(24, 80));

    // The host answers by resizing the surface to fit the request.
    let next = config_for(LogicalSize::new(800.0, 480.0), 1.0);
    session
        .dispatch(&SessionEvent::Configure(next))
        .expect("dispatch configure");

    let event = session
        .render_frame(Instant::now())
        .expect("render sync frame")
        .expect("configure forces a frame");

    assert_eq!(event.reason, FrameReason::Sync);
    assert_eq!(event.viewport, GridDims::new(30, 100));
    assert_eq!(event.dirty.coverage, 1.0);
    assert!(
        event
            .updates
            .contains(&RuntimeUpdate::Resize {
                rows: 30,
                columns: 100
            })
    );
}
