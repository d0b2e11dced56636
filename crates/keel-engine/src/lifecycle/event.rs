use crate::power::{BatteryState, ThermalLevel};
use crate::surface::{SurfaceSize, WindowHandle};

/// A normalized OS notification.
///
/// Hosts translate whatever their platform delivers into these variants; the
/// engine never sees platform callbacks directly.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    /// A native window is available to render into.
    WindowCreated(WindowHandle),
    /// The OS took the window away. Rendering must stop before it is reused.
    WindowDestroyed,
    Resumed,
    Paused,
    /// Memory pressure from the OS. Evicts the resource cache down to its
    /// low-memory target.
    LowMemory,
    OrientationChanged(SurfaceSize),
    Thermal(ThermalLevel),
    Battery(BatteryState),
    /// Terminal. Nothing queued after it is delivered.
    Destroy,
}

impl LifecycleEvent {
    /// Whether this event can change the surface state machine.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::WindowCreated(_)
                | Self::WindowDestroyed
                | Self::Resumed
                | Self::Paused
                | Self::OrientationChanged(_)
                | Self::Destroy
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::WindowCreated(_) => "WindowCreated",
            Self::WindowDestroyed => "WindowDestroyed",
            Self::Resumed => "Resumed",
            Self::Paused => "Paused",
            Self::LowMemory => "LowMemory",
            Self::OrientationChanged(_) => "OrientationChanged",
            Self::Thermal(_) => "Thermal",
            Self::Battery(_) => "Battery",
            Self::Destroy => "Destroy",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::WindowId;

    #[test]
    fn signals_are_not_structural() {
        assert!(!LifecycleEvent::LowMemory.is_structural());
        assert!(!LifecycleEvent::Thermal(ThermalLevel::Serious).is_structural());
        assert!(!LifecycleEvent::Battery(BatteryState::Saver).is_structural());
    }

    #[test]
    fn window_events_are_structural() {
        let created = LifecycleEvent::WindowCreated(WindowHandle::headless(
            WindowId(1),
            SurfaceSize::new(1, 1),
        ));
        assert!(created.is_structural());
        assert!(LifecycleEvent::Destroy.is_structural());
        assert_eq!(created.name(), "WindowCreated");
    }
}
