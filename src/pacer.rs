//! Frame pacing.
//!
//! Coalesces repaint requests into at most one paint per refresh interval.
//! The pacer never sleeps or spawns timers itself; it hands the host a
//! delay and the host wakes the session with a paint callback.

use std::time::{Duration, Instant};

/// Default pacing interval, one frame at 60 Hz.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// Outcome of a frame request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    /// No paint was pending; the host must invoke the paint callback
    /// after `delay`.
    Schedule { delay: Duration },
    /// A paint is already pending; this request coalesces into it.
    AlreadyScheduled,
}

/// Request coalescing and inter-frame timing.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval: Duration,
    scheduled: bool,
    last_paint: Option<Instant>,
    last_frame_gap: Option<Duration>,
}

impl FramePacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            scheduled: false,
            last_paint: None,
            last_frame_gap: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Request a paint. The first request after a paint (or at startup)
    /// schedules one; requests made while a paint is pending coalesce.
    ///
    /// The returned delay keeps paints at least one interval apart: zero
    /// when the last paint is old enough, otherwise the remainder of the
    /// interval.
    pub fn request(&mut self, now: Instant) -> FrameRequest {
        if self.scheduled {
            return FrameRequest::AlreadyScheduled;
        }
        self.scheduled = true;
        let delay = match self.last_paint {
            None => Duration::ZERO,
            Some(last) => self.interval.saturating_sub(now.duration_since(last)),
        };
        log::trace!("Frame scheduled in {:?}", delay);
        FrameRequest::Schedule { delay }
    }

    /// The paint callback fired; further requests schedule a fresh paint.
    /// Call before producing the frame.
    pub fn begin_paint(&mut self) {
        self.scheduled = false;
    }

    /// A frame was actually produced; stamps the inter-frame gap.
    pub fn on_paint(&mut self, now: Instant) {
        if let Some(last) = self.last_paint {
            self.last_frame_gap = Some(now.duration_since(last));
        }
        self.last_paint = Some(now);
    }

    /// Drop a pending request. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        std::mem::take(&mut self.scheduled)
    }

    /// Approximate duration between the two most recent produced frames.
    pub fn last_frame_gap(&self) -> Option<Duration> {
        self.last_frame_gap
    }
}

impl Default for FramePacer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_schedules_immediately() {
        let mut pacer = FramePacer::default();
        let now = Instant::now();
        assert_eq!(
            pacer.request(now),
            FrameRequest::Schedule {
                delay: Duration::ZERO
            }
        );
        assert!(pacer.is_scheduled());
    }

    #[test]
    fn test_requests_coalesce_until_paint() {
        let mut pacer = FramePacer::default();
        let now = Instant::now();
        pacer.request(now);
        assert_eq!(pacer.request(now), FrameRequest::AlreadyScheduled);
        assert_eq!(pacer.request(now), FrameRequest::AlreadyScheduled);

        pacer.begin_paint();
        pacer.on_paint(now);
        assert!(matches!(pacer.request(now), FrameRequest::Schedule { .. }));
    }

    #[test]
    fn test_delay_respects_interval() {
        let mut pacer = FramePacer::new(Duration::from_millis(16));
        let t0 = Instant::now();
        pacer.request(t0);
        pacer.begin_paint();
        pacer.on_paint(t0);

        // 5ms after a paint, the next one waits out the remaining 11ms.
        let request = pacer.request(t0 + Duration::from_millis(5));
        match request {
            FrameRequest::Schedule { delay } => {
                assert_eq!(delay, Duration::from_millis(11));
            }
            FrameRequest::AlreadyScheduled => panic!("expected a schedule"),
        }
    }

    #[test]
    fn test_stale_last_paint_schedules_immediately() {
        let mut pacer = FramePacer::new(Duration::from_millis(16));
        let t0 = Instant::now();
        pacer.request(t0);
        pacer.begin_paint();
        pacer.on_paint(t0);

        let request = pacer.request(t0 + Duration::from_millis(40));
        assert_eq!(
            request,
            FrameRequest::Schedule {
                delay: Duration::ZERO
            }
        );
    }

    #[test]
    fn test_cancel_clears_pending() {
        let mut pacer = FramePacer::default();
        pacer.request(Instant::now());
        assert!(pacer.cancel());
        assert!(!pacer.cancel());
        assert!(matches!(
            pacer.request(Instant::now()),
            FrameRequest::Schedule { .. }
        ));
    }

    #[test]
    fn test_frame_gap_tracks_produced_frames() {
        let mut pacer = FramePacer::default();
        let t0 = Instant::now();
        assert_eq!(pacer.last_frame_gap(), None);

        pacer.on_paint(t0);
        assert_eq!(pacer.last_frame_gap(), None);

        pacer.on_paint(t0 + Duration::from_millis(17));
        assert_eq!(pacer.last_frame_gap(), Some(Duration::from_millis(17)));
    }
}
