use std::time::Instant;

use crate::error::{Error, Result};
use crate::power::PowerProfile;

use super::{FrameClock, FrameTime};

/// Per-outcome frame counters.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct FrameStats {
    pub presented: u64,
    /// Frames that could not be acquired or presented for a transient reason.
    pub skipped: u64,
    pub lost: u64,
    pub stale: u64,
    pub timeouts: u64,
}

/// Decides when the render loop may start a frame.
///
/// Frames are spaced by the profile's target interval. Outcomes are fed back
/// through [`record`](Self::record).
#[derive(Debug, Default)]
pub struct FramePacer {
    clock: FrameClock,
    stats: FrameStats,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a frame at `now` if the profile allows one.
    pub fn begin(&mut self, now: Instant, profile: &PowerProfile) -> Option<FrameTime> {
        if let Some(last) = self.clock.last_tick() {
            if !profile.should_render(now.saturating_duration_since(last)) {
                return None;
            }
        }
        Some(self.clock.tick_at(now))
    }

    /// When the next frame is due, or `None` if one is due now.
    pub fn next_deadline(&self, profile: &PowerProfile) -> Option<Instant> {
        let last = self.clock.last_tick()?;
        let wait = profile
            .target_frame_interval
            .saturating_sub(PowerProfile::SLACK);
        Some(last + wait)
    }

    /// Classifies the outcome of an acquire/present pair.
    pub fn record(&mut self, outcome: &Result<()>) {
        match outcome {
            Ok(()) => self.stats.presented += 1,
            Err(Error::SurfaceLost) => self.stats.lost += 1,
            Err(Error::StalePresent { .. }) => self.stats.stale += 1,
            Err(Error::AcquireTimeout) => self.stats.timeouts += 1,
            Err(e) => {
                log::trace!("frame skipped: {e}");
                self.stats.skipped += 1;
            }
        }
    }

    /// Forgets the last frame time so the next `begin` fires immediately.
    pub fn reset(&mut self) {
        self.clock.reset();
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::ProfileKind;
    use std::time::Duration;

    fn profile(ms: u64) -> PowerProfile {
        PowerProfile {
            kind: ProfileKind::Balanced,
            target_frame_interval: Duration::from_millis(ms),
        }
    }

    #[test]
    fn first_frame_is_immediate() {
        let mut pacer = FramePacer::new();
        assert!(pacer.begin(Instant::now(), &profile(33)).is_some());
    }

    #[test]
    fn frames_are_spaced_by_profile() {
        let mut pacer = FramePacer::new();
        let t0 = Instant::now();
        let p = profile(33);

        pacer.begin(t0, &p).unwrap();
        assert!(pacer.begin(t0 + Duration::from_millis(10), &p).is_none());
        assert_eq!(pacer.next_deadline(&p), Some(t0 + Duration::from_millis(31)));

        let ft = pacer.begin(t0 + Duration::from_millis(33), &p).unwrap();
        assert_eq!(ft.frame_index, 1);
    }

    #[test]
    fn reset_allows_immediate_frame() {
        let mut pacer = FramePacer::new();
        let t0 = Instant::now();
        pacer.begin(t0, &profile(50)).unwrap();
        pacer.reset();
        assert!(pacer.begin(t0 + Duration::from_millis(1), &profile(50)).is_some());
    }

    #[test]
    fn outcomes_are_classified() {
        let mut pacer = FramePacer::new();
        pacer.record(&Ok(()));
        pacer.record(&Err(Error::SurfaceLost));
        pacer.record(&Err(Error::StalePresent { frame: 0, current: 1 }));
        pacer.record(&Err(Error::AcquireTimeout));
        pacer.record(&Err(Error::NotActive));

        assert_eq!(
            pacer.stats(),
            FrameStats {
                presented: 1,
                skipped: 1,
                lost: 1,
                stale: 1,
                timeouts: 1,
            }
        );
    }
}
