use anyhow::Result;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use keel_engine::cache::{CacheKey, UsageTag};
use keel_engine::core::{App, AppControl, FrameCtx};
use keel_engine::device::ResourceDesc;
use keel_engine::engine::{Engine, PumpReport};
use keel_engine::lifecycle::{EventSender, LifecycleEvent};
use keel_engine::logging::{init_logging, LoggingConfig};
use keel_engine::power::{BatteryState, ProfileKind, ThermalLevel};
use keel_engine::window::{Runtime, RuntimeConfig};

/// Lifecycle playground.
///
/// Keys:
/// - `T` cycles the simulated thermal level
/// - `B` cycles the simulated battery state
/// - `M` sends a low-memory warning
/// - `Esc` quits
struct Studio {
    sender: Option<EventSender>,
    thermal: ThermalLevel,
    battery: BatteryState,
}

impl Studio {
    fn new() -> Self {
        Self {
            sender: None,
            thermal: ThermalLevel::Nominal,
            battery: BatteryState::Normal,
        }
    }

    fn send(&self, event: LifecycleEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.send(event) {
                log::warn!("event rejected: {e}");
            }
        }
    }
}

impl App for Studio {
    fn on_start(&mut self, engine: &mut Engine) {
        log::info!(
            "running on {} ({})",
            engine.backend(),
            engine.capabilities().adapter_name
        );
        self.sender = Some(engine.sender());
    }

    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return AppControl::Continue;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return AppControl::Continue;
        }

        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => return AppControl::Exit,
            PhysicalKey::Code(KeyCode::KeyT) => {
                self.thermal = match self.thermal {
                    ThermalLevel::Nominal => ThermalLevel::Fair,
                    ThermalLevel::Fair => ThermalLevel::Serious,
                    ThermalLevel::Serious => ThermalLevel::Critical,
                    ThermalLevel::Critical => ThermalLevel::Nominal,
                };
                self.send(LifecycleEvent::Thermal(self.thermal));
            }
            PhysicalKey::Code(KeyCode::KeyB) => {
                self.battery = match self.battery {
                    BatteryState::Normal => BatteryState::Saver,
                    BatteryState::Saver => BatteryState::Low,
                    BatteryState::Low => BatteryState::Normal,
                };
                self.send(LifecycleEvent::Battery(self.battery));
            }
            PhysicalKey::Code(KeyCode::KeyM) => self.send(LifecycleEvent::LowMemory),
            _ => {}
        }
        AppControl::Continue
    }

    fn on_lifecycle(&mut self, engine: &Engine, report: &PumpReport) {
        for (event, error) in &report.errors {
            log::warn!("{event}: {error}");
        }
        log::debug!(
            "surface {:?} at {}, cache {:?}",
            engine.surface_state(),
            engine.generation(),
            engine.cache_stats()
        );
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl {
        // A stand-in for the pipeline a real renderer would build once per format.
        let format = ctx.frame.format();
        let key = CacheKey::of(&format, UsageTag::Pipeline);
        if let Err(e) = ctx
            .engine
            .get_or_create(key, || ResourceDesc::opaque(format!("clear pipeline {format:?}"), 64 * 1024))
        {
            log::warn!("pipeline cache: {e}");
        }

        let t = (ctx.time.frame_index % 240) as f64 / 240.0;
        let base = match ctx.profile().kind {
            ProfileKind::HighPerformance => [0.10, 0.35, 0.20],
            ProfileKind::Balanced => [0.35, 0.30, 0.10],
            ProfileKind::PowerSaving => [0.40, 0.10, 0.10],
        };
        let pulse = 0.5 + 0.5 * (t * std::f64::consts::TAU).sin();
        let color = keel_engine::wgpu::Color {
            r: base[0] * (0.6 + 0.4 * pulse),
            g: base[1] * (0.6 + 0.4 * pulse),
            b: base[2] * (0.6 + 0.4 * pulse),
            a: 1.0,
        };

        if let Err(e) = ctx.clear(color) {
            log::debug!("clear skipped: {e}");
        }
        AppControl::Continue
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "Keel Studio".to_string(),
        ..RuntimeConfig::default()
    };

    Runtime::run(config, Studio::new())
}
