//! Power profile selection from thermal and battery signals.
//!
//! Pure bookkeeping: nothing here touches the device or blocks. The render
//! loop reads [`PowerProfileController::current_profile`] once per frame.

use std::fmt;
use std::time::Duration;

use crate::config::PowerConfig;

/// Device thermal status as reported by the OS.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum ThermalLevel {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

/// Battery condition as reported by the OS.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum BatteryState {
    #[default]
    Normal,
    /// The user or OS enabled battery saver.
    Saver,
    /// Charge is critically low.
    Low,
}

/// Rendering budget class. Later variants are more restrictive.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ProfileKind {
    HighPerformance,
    Balanced,
    PowerSaving,
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProfileKind::HighPerformance => "high-performance",
            ProfileKind::Balanced => "balanced",
            ProfileKind::PowerSaving => "power-saving",
        };
        f.write_str(name)
    }
}

/// The profile the render loop paces itself against.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PowerProfile {
    pub kind: ProfileKind,
    pub target_frame_interval: Duration,
}

impl PowerProfile {
    /// Early wakeups within this window still count as on time.
    pub const SLACK: Duration = Duration::from_millis(2);

    /// Whether enough time has passed since the last presented frame.
    pub fn should_render(&self, since_last: Duration) -> bool {
        since_last + Self::SLACK >= self.target_frame_interval
    }

    pub fn target_fps(&self) -> f32 {
        let secs = self.target_frame_interval.as_secs_f32();
        if secs > 0.0 { 1.0 / secs } else { f32::INFINITY }
    }
}

/// Maps thermal and battery signals to a [`PowerProfile`].
///
/// The more restrictive of the two inputs wins.
#[derive(Debug, Clone)]
pub struct PowerProfileController {
    config: PowerConfig,
    thermal: ThermalLevel,
    battery: BatteryState,
}

impl PowerProfileController {
    pub fn new(config: PowerConfig) -> Self {
        Self {
            config,
            thermal: ThermalLevel::Nominal,
            battery: BatteryState::Normal,
        }
    }

    pub fn on_thermal_signal(&mut self, level: ThermalLevel) {
        if self.thermal != level {
            let before = self.current_profile().kind;
            self.thermal = level;
            self.log_change("thermal", before);
        }
    }

    pub fn on_battery_signal(&mut self, state: BatteryState) {
        if self.battery != state {
            let before = self.current_profile().kind;
            self.battery = state;
            self.log_change("battery", before);
        }
    }

    pub fn thermal(&self) -> ThermalLevel {
        self.thermal
    }

    pub fn battery(&self) -> BatteryState {
        self.battery
    }

    pub fn current_profile(&self) -> PowerProfile {
        let kind = thermal_kind(self.thermal).max(battery_cap(self.battery));
        PowerProfile {
            kind,
            target_frame_interval: self.interval(kind),
        }
    }

    fn interval(&self, kind: ProfileKind) -> Duration {
        match kind {
            ProfileKind::HighPerformance => self.config.high_performance_interval,
            ProfileKind::Balanced => self.config.balanced_interval,
            ProfileKind::PowerSaving => self.config.power_saving_interval,
        }
    }

    fn log_change(&self, source: &str, before: ProfileKind) {
        let after = self.current_profile().kind;
        if before != after {
            log::info!(
                "power profile {before} -> {after} ({source}: {:?}/{:?})",
                self.thermal,
                self.battery
            );
        }
    }
}

impl Default for PowerProfileController {
    fn default() -> Self {
        Self::new(PowerConfig::default())
    }
}

fn thermal_kind(level: ThermalLevel) -> ProfileKind {
    match level {
        ThermalLevel::Nominal => ProfileKind::HighPerformance,
        ThermalLevel::Fair => ProfileKind::Balanced,
        ThermalLevel::Serious | ThermalLevel::Critical => ProfileKind::PowerSaving,
    }
}

fn battery_cap(state: BatteryState) -> ProfileKind {
    match state {
        BatteryState::Normal => ProfileKind::HighPerformance,
        BatteryState::Saver => ProfileKind::Balanced,
        BatteryState::Low => ProfileKind::PowerSaving,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thermal_table() {
        let mut pc = PowerProfileController::default();
        let cases = [
            (ThermalLevel::Nominal, ProfileKind::HighPerformance),
            (ThermalLevel::Fair, ProfileKind::Balanced),
            (ThermalLevel::Serious, ProfileKind::PowerSaving),
            (ThermalLevel::Critical, ProfileKind::PowerSaving),
        ];
        for (level, kind) in cases {
            pc.on_thermal_signal(level);
            assert_eq!(pc.current_profile().kind, kind, "{level:?}");
        }
    }

    #[test]
    fn intervals_come_from_config() {
        let config = PowerConfig {
            high_performance_interval: Duration::from_millis(8),
            balanced_interval: Duration::from_millis(16),
            power_saving_interval: Duration::from_millis(100),
        };
        let mut pc = PowerProfileController::new(config);
        assert_eq!(pc.current_profile().target_frame_interval, Duration::from_millis(8));

        pc.on_thermal_signal(ThermalLevel::Critical);
        assert_eq!(pc.current_profile().target_frame_interval, Duration::from_millis(100));
    }

    #[test]
    fn more_restrictive_input_wins() {
        let mut pc = PowerProfileController::default();
        pc.on_battery_signal(BatteryState::Saver);
        assert_eq!(pc.current_profile().kind, ProfileKind::Balanced);

        pc.on_thermal_signal(ThermalLevel::Serious);
        assert_eq!(pc.current_profile().kind, ProfileKind::PowerSaving);

        pc.on_thermal_signal(ThermalLevel::Nominal);
        assert_eq!(pc.current_profile().kind, ProfileKind::Balanced);

        pc.on_battery_signal(BatteryState::Normal);
        assert_eq!(pc.current_profile().kind, ProfileKind::HighPerformance);
    }

    #[test]
    fn should_render_honors_interval_with_slack() {
        let profile = PowerProfile {
            kind: ProfileKind::Balanced,
            target_frame_interval: Duration::from_millis(33),
        };
        assert!(!profile.should_render(Duration::from_millis(20)));
        assert!(profile.should_render(Duration::from_millis(31)));
        assert!(profile.should_render(Duration::from_millis(40)));
        assert!((profile.target_fps() - 30.3).abs() < 0.1);
    }
}
