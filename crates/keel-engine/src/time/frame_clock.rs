use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous frame tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Monotonic frame counter.
    pub frame_index: u64,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// Delta time is clamped so a long suspension (or a debugger stop) does not
/// reach the application as one enormous step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Option<Instant>,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_clamps(Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: None,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Forgets the previous tick. The next frame reports `dt_min`.
    ///
    /// Call after resuming from suspension.
    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// Advances the clock to `now`.
    pub fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = self
            .last
            .map_or(self.dt_min, |last| now.saturating_duration_since(last))
            .clamp(self.dt_min, self.dt_max);

        self.last = Some(now);

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.last
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dt_is_clamped() {
        let mut clock = FrameClock::with_clamps(Duration::from_millis(1), Duration::from_millis(100));
        let t0 = Instant::now();

        assert_eq!(clock.tick_at(t0).dt, 0.001);
        assert_eq!(clock.tick_at(t0 + Duration::from_secs(5)).dt, 0.1);

        let ft = clock.tick_at(t0 + Duration::from_secs(5) + Duration::from_millis(20));
        assert!((ft.dt - 0.020).abs() < 1e-6);
        assert_eq!(ft.frame_index, 2);
    }

    #[test]
    fn reset_drops_the_baseline() {
        let mut clock = FrameClock::new();
        let t0 = Instant::now();
        clock.tick_at(t0);
        clock.reset();
        assert_eq!(clock.tick_at(t0 + Duration::from_millis(200)).dt, 0.0001);
    }
}
