//! The explicit owner of the whole lifecycle stack.
//!
//! [`Engine`] holds the graphics context, the surface controller, the
//! resource cache and the power controller. Host threads only enqueue events
//! through an [`EventSender`]; every state change happens in [`Engine::pump`]
//! on the owning thread.

use crate::backend::{rank_backends, Backend, Capabilities};
use crate::cache::{CacheKey, CacheStats, MemoryPressure, ResourceCache};
use crate::config::EngineConfig;
use crate::device::{ContextStats, GraphicsContext, Platform, ResourceDesc, ResourceHandle};
use crate::error::{Error, Result};
use crate::lifecycle::{EventSender, LifecycleEvent, LifecycleEventBus};
use crate::power::{PowerProfile, PowerProfileController};
use crate::surface::{Frame, Generation, Surface, SurfaceController, SurfaceState};

/// Outcome of one [`Engine::pump`].
#[derive(Debug, Default)]
pub struct PumpReport {
    /// Events applied, in order.
    pub delivered: usize,

    /// Errors absorbed while applying events, tagged with the event name.
    pub errors: Vec<(&'static str, Error)>,

    /// Structural events that moved the surface to a new state.
    pub surface_changes: usize,

    /// `Destroy` was applied; the engine is shut down.
    pub terminated: bool,
}

impl PumpReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Engine {
    context: GraphicsContext,
    surface: SurfaceController,
    cache: ResourceCache,
    power: PowerProfileController,
    bus: LifecycleEventBus,
    shut_down: bool,
}

impl Engine {
    /// Probes `platform` and opens a device on the best backend that works.
    ///
    /// Backends are tried in rank order; a device that fails to open falls
    /// through to the next candidate.
    pub fn new(config: EngineConfig, platform: &dyn Platform) -> Result<Self> {
        let descriptor = platform.describe();
        let requested = config.required_features;
        let ranked = rank_backends(&descriptor, requested);

        if ranked.is_empty() {
            log::error!(
                "no backend supports {requested:?} (available: {:?})",
                descriptor.backends.iter().map(|r| r.backend).collect::<Vec<_>>()
            );
            return Err(Error::NoCompatibleBackend { requested });
        }

        let mut last_error = None;
        let mut context = None;
        for backend in ranked {
            match GraphicsContext::create(platform, backend, requested) {
                Ok(ctx) => {
                    context = Some(ctx);
                    break;
                }
                Err(e) => {
                    log::warn!("{backend} unusable, trying next backend: {e}");
                    last_error = Some(e);
                }
            }
        }

        let Some(context) = context else {
            return Err(last_error.unwrap_or(Error::NoCompatibleBackend { requested }));
        };

        Ok(Self {
            context,
            surface: SurfaceController::new(config.swapchain),
            cache: ResourceCache::new(config.cache),
            power: PowerProfileController::new(config.power),
            bus: LifecycleEventBus::new(),
            shut_down: false,
        })
    }

    /// Handle for host threads to enqueue lifecycle events.
    pub fn sender(&self) -> EventSender {
        self.bus.sender()
    }

    /// Enqueues an event from the owning thread.
    pub fn post(&self, event: LifecycleEvent) -> Result<()> {
        self.bus.sender().send(event)
    }

    pub fn pending_events(&self) -> usize {
        self.bus.pending()
    }

    /// Applies every queued event in arrival order.
    ///
    /// Errors from individual events are logged and collected in the report;
    /// they never stop the remaining events from being applied.
    pub fn pump(&mut self) -> PumpReport {
        let mut report = PumpReport::default();

        for event in self.bus.drain() {
            let name = event.name();
            log::debug!("applying {name}");

            let terminal = matches!(event, LifecycleEvent::Destroy);
            let structural = event.is_structural();
            let before = self.surface.state();
            if let Err(e) = self.apply(event) {
                if e == Error::Destroyed {
                    log::debug!("{name} ignored: engine destroyed");
                } else {
                    log::warn!("{name} failed: {e}");
                }
                report.errors.push((name, e));
            }
            if structural && self.surface.state() != before {
                log::info!("{name}: surface {before:?} -> {:?}", self.surface.state());
                report.surface_changes += 1;
            }

            report.delivered += 1;
            if terminal {
                report.terminated = true;
            }
        }

        report
    }

    fn apply(&mut self, event: LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::LowMemory => {
                self.ensure_running()?;
                let report = self
                    .cache
                    .on_pressure_signal(&mut self.context, MemoryPressure::LowMemory)?;
                log::info!(
                    "low memory: evicted {} entries ({} bytes), resident {}/{}",
                    report.evicted,
                    report.freed_bytes,
                    report.resident_bytes,
                    report.target_bytes
                );
                Ok(())
            }
            LifecycleEvent::Thermal(level) => {
                self.ensure_running()?;
                self.power.on_thermal_signal(level);
                Ok(())
            }
            LifecycleEvent::Battery(state) => {
                self.ensure_running()?;
                self.power.on_battery_signal(state);
                Ok(())
            }
            LifecycleEvent::Resumed => {
                let result = self.surface.handle(&mut self.context, &LifecycleEvent::Resumed);
                if !self.shut_down && self.cache.pressure() == MemoryPressure::LowMemory {
                    self.cache
                        .on_pressure_signal(&mut self.context, MemoryPressure::Normal)?;
                }
                result
            }
            LifecycleEvent::Destroy => {
                if self.shut_down {
                    return Err(Error::Destroyed);
                }
                self.shutdown();
                Ok(())
            }
            structural => self.surface.handle(&mut self.context, &structural),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shut_down {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    /// See [`SurfaceController::acquire_frame`].
    pub fn acquire_frame(&mut self) -> Result<Frame> {
        self.surface.acquire_frame(&mut self.context)
    }

    pub fn clear(&mut self, frame: &Frame, color: wgpu::Color) -> Result<()> {
        self.surface.clear(&mut self.context, frame, color)
    }

    pub fn present(&mut self, frame: Frame) -> Result<()> {
        self.surface.present(&mut self.context, frame)
    }

    pub fn current_profile(&self) -> PowerProfile {
        self.power.current_profile()
    }

    pub fn get_or_create<F>(&mut self, key: CacheKey, factory: F) -> Result<ResourceHandle>
    where
        F: FnOnce() -> ResourceDesc,
    {
        self.ensure_running()?;
        self.cache.get_or_create(&mut self.context, key, factory)
    }

    pub fn resource(&mut self, key: &CacheKey) -> Option<ResourceHandle> {
        self.cache.resource(key)
    }

    pub fn invalidate(&mut self, key: &CacheKey) -> Result<bool> {
        self.ensure_running()?;
        self.cache.invalidate(&mut self.context, key)
    }

    pub fn pin(&mut self, key: &CacheKey) -> bool {
        self.cache.pin(key)
    }

    pub fn unpin(&mut self, key: &CacheKey) -> bool {
        self.cache.unpin(key)
    }

    pub fn backend(&self) -> Backend {
        self.context.backend()
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.context.capabilities()
    }

    pub fn surface_state(&self) -> SurfaceState {
        self.surface.state()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.surface()
    }

    pub fn generation(&self) -> Generation {
        self.surface.generation()
    }

    pub fn can_acquire(&self) -> bool {
        self.surface.can_acquire()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache_pressure(&self) -> MemoryPressure {
        self.cache.pressure()
    }

    pub fn context_stats(&self) -> ContextStats {
        self.context.stats()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Tears everything down: surface first, then cached resources, then the
    /// device. Idempotent.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        if let Err(e) = self.surface.destroy(&mut self.context) {
            log::debug!("surface already destroyed: {e}");
        }
        let released = self.cache.clear(&mut self.context);
        self.context.destroy();
        self.bus.close();

        let stats = self.context.stats();
        log::info!(
            "engine shut down: {} swapchain(s) built, {} released, {} cached resource(s) freed",
            stats.swapchains_built,
            stats.swapchains_released,
            released
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendReport, FeatureSet, PlatformDescriptor};
    use crate::cache::UsageTag;
    use crate::config::CacheConfig;
    use crate::device::{BufferUsage, HeadlessLedger, HeadlessPlatform};
    use crate::power::{BatteryState, ProfileKind, ThermalLevel};
    use crate::surface::{SurfaceSize, WindowHandle, WindowId};

    fn engine() -> (Engine, HeadlessLedger) {
        let platform = HeadlessPlatform::vulkan();
        let ledger = platform.ledger();
        (Engine::new(EngineConfig::default(), &platform).unwrap(), ledger)
    }

    fn window(id: u64) -> LifecycleEvent {
        LifecycleEvent::WindowCreated(WindowHandle::headless(
            WindowId(id),
            SurfaceSize::new(720, 1280),
        ))
    }

    #[test]
    fn no_compatible_backend() {
        let platform = HeadlessPlatform::new(PlatformDescriptor::new(vec![BackendReport::new(
            Backend::Gles,
            FeatureSet::TEXTURE_COMPRESSION_ETC2,
            4096,
        )]));
        let config = EngineConfig {
            required_features: FeatureSet::TEXTURE_COMPRESSION_ASTC,
            ..EngineConfig::default()
        };

        let err = Engine::new(config, &platform).err().unwrap();
        assert_eq!(
            err,
            Error::NoCompatibleBackend {
                requested: FeatureSet::TEXTURE_COMPRESSION_ASTC
            }
        );
    }

    #[test]
    fn falls_back_when_best_backend_fails_to_open() {
        let platform = HeadlessPlatform::new(PlatformDescriptor::new(vec![
            BackendReport::new(Backend::Gles, FeatureSet::TEXTURE_COMPRESSION_ETC2, 4096),
            BackendReport::new(Backend::Vulkan, FeatureSet::TEXTURE_COMPRESSION_ETC2, 8192),
        ]))
        .with_unopenable(Backend::Vulkan);

        let engine = Engine::new(EngineConfig::default(), &platform).unwrap();
        assert_eq!(engine.backend(), Backend::Gles);
    }

    #[test]
    fn all_backends_failing_reports_device_creation() {
        let platform = HeadlessPlatform::vulkan().with_unopenable(Backend::Vulkan);
        let err = Engine::new(EngineConfig::default(), &platform).err().unwrap();
        assert!(matches!(err, Error::DeviceCreationFailed(_)));
    }

    #[test]
    fn pump_counts_surface_transitions() {
        let (mut engine, _) = engine();
        engine.post(window(1)).unwrap();
        engine.post(LifecycleEvent::OrientationChanged(SurfaceSize::new(800, 600))).unwrap();
        engine.post(LifecycleEvent::LowMemory).unwrap();
        let report = engine.pump();
        assert_eq!(report.delivered, 3);
        // Resizing rebuilds in place; only Uninitialized -> Active counts.
        assert_eq!(report.surface_changes, 1);

        engine.post(LifecycleEvent::Paused).unwrap();
        engine.post(LifecycleEvent::Resumed).unwrap();
        assert_eq!(engine.pump().surface_changes, 2);

        engine.post(LifecycleEvent::Thermal(ThermalLevel::Serious)).unwrap();
        assert_eq!(engine.pump().surface_changes, 0);
    }

    #[test]
    fn pause_resume_recreate_scenario() {
        let (mut engine, ledger) = engine();
        let tx = engine.sender();

        tx.send(window(1)).unwrap();
        assert!(engine.pump().is_clean());
        assert_eq!(engine.surface_state(), SurfaceState::Active);
        let g0 = engine.generation();

        let frame = engine.acquire_frame().unwrap();
        engine.present(frame).unwrap();

        tx.send(LifecycleEvent::Paused).unwrap();
        tx.send(LifecycleEvent::WindowDestroyed).unwrap();
        engine.pump();
        assert_eq!(engine.surface_state(), SurfaceState::Suspended);
        assert_eq!(engine.acquire_frame().unwrap_err(), Error::NotActive);
        assert_eq!(ledger.live_swapchains(), 0);

        tx.send(LifecycleEvent::Resumed).unwrap();
        tx.send(window(2)).unwrap();
        assert!(engine.pump().is_clean());
        assert_eq!(engine.surface_state(), SurfaceState::Active);
        assert_eq!(engine.generation(), g0.next());

        let frame = engine.acquire_frame().unwrap();
        assert_eq!(frame.generation(), g0.next());
        engine.present(frame).unwrap();

        tx.send(LifecycleEvent::Destroy).unwrap();
        let report = engine.pump();
        assert!(report.terminated);
        assert!(engine.is_shut_down());

        let stats = engine.context_stats();
        assert_eq!(stats.swapchains_built, 2);
        assert_eq!(stats.swapchains_released, 2);
        assert_eq!(ledger.devices_shut_down(), 1);
        assert_eq!(ledger.images_presented(), 2);
    }

    #[test]
    fn teardown_order_surface_cache_context() {
        let (mut engine, ledger) = engine();
        engine.post(window(1)).unwrap();
        engine.pump();
        engine
            .get_or_create(CacheKey::new(1, UsageTag::Pipeline), || {
                ResourceDesc::opaque("pipeline", 4096)
            })
            .unwrap();

        engine.shutdown();

        // The headless driver logs an error if shut down with live swapchains;
        // the ledger confirms nothing was left behind.
        assert_eq!(ledger.live_swapchains(), 0);
        assert_eq!(ledger.bytes_in_use(), 0);
        assert_eq!(ledger.devices_shut_down(), 1);
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn destroy_is_idempotent_and_closes_the_bus() {
        let (mut engine, ledger) = engine();
        let tx = engine.sender();
        tx.send(window(1)).unwrap();
        tx.send(LifecycleEvent::Destroy).unwrap();
        engine.pump();

        assert_eq!(tx.send(LifecycleEvent::Destroy), Err(Error::Destroyed));
        assert_eq!(engine.acquire_frame().unwrap_err(), Error::Destroyed);
        assert_eq!(
            engine
                .get_or_create(CacheKey::new(1, UsageTag::Texture), || ResourceDesc::opaque("t", 1))
                .err(),
            Some(Error::Destroyed)
        );

        engine.shutdown();
        drop(engine);
        assert_eq!(ledger.devices_shut_down(), 1);
        assert_eq!(ledger.double_destroys(), 0);
    }

    #[test]
    fn events_after_destroy_in_same_batch_are_discarded() {
        let (mut engine, ledger) = engine();
        let tx = engine.sender();
        tx.send(window(1)).unwrap();
        tx.send(LifecycleEvent::Destroy).unwrap();
        tx.send(window(2)).unwrap();

        let report = engine.pump();
        assert_eq!(report.delivered, 2);
        assert!(report.terminated);
        assert_eq!(ledger.swapchains_created(), 1);
    }

    #[test]
    fn low_memory_trims_cache_and_resume_relaxes() {
        let platform = HeadlessPlatform::vulkan();
        let config = EngineConfig {
            cache: CacheConfig {
                budget_bytes: 10_000,
                ..CacheConfig::default()
            },
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config, &platform).unwrap();

        for n in 0..10 {
            engine
                .get_or_create(CacheKey::new(n, UsageTag::TransientBuffer), || {
                    ResourceDesc::buffer("ubo", 1_000, BufferUsage::Uniform)
                })
                .unwrap();
        }

        engine.post(LifecycleEvent::LowMemory).unwrap();
        assert!(engine.pump().is_clean());
        assert!(engine.cache_stats().resident_bytes <= 9_000);
        assert_eq!(engine.cache_pressure(), MemoryPressure::LowMemory);

        engine.post(LifecycleEvent::Resumed).unwrap();
        engine.pump();
        assert_eq!(engine.cache_pressure(), MemoryPressure::Normal);
    }

    #[test]
    fn low_memory_with_all_pinned_is_reported() {
        let platform = HeadlessPlatform::vulkan();
        let config = EngineConfig {
            cache: CacheConfig {
                budget_bytes: 1_000,
                ..CacheConfig::default()
            },
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config, &platform).unwrap();
        let key = CacheKey::new(1, UsageTag::Texture);
        engine
            .get_or_create(key, || ResourceDesc::opaque("atlas", 1_000))
            .unwrap();
        assert!(engine.pin(&key));

        engine.post(LifecycleEvent::LowMemory).unwrap();
        let report = engine.pump();
        assert!(matches!(
            report.errors.as_slice(),
            [("LowMemory", Error::BudgetExceeded { .. })]
        ));
        assert!(engine.resource(&key).is_some());
    }

    #[test]
    fn power_signals_change_profile() {
        let (mut engine, _) = engine();
        assert_eq!(engine.current_profile().kind, ProfileKind::HighPerformance);

        engine.post(LifecycleEvent::Thermal(ThermalLevel::Fair)).unwrap();
        engine.pump();
        assert_eq!(engine.current_profile().kind, ProfileKind::Balanced);

        engine.post(LifecycleEvent::Battery(BatteryState::Low)).unwrap();
        engine.pump();
        assert_eq!(engine.current_profile().kind, ProfileKind::PowerSaving);
    }

    #[test]
    fn sender_works_from_another_thread() {
        let (mut engine, _) = engine();
        let tx = engine.sender();
        std::thread::spawn(move || {
            tx.send(window(1)).unwrap();
            tx.send(LifecycleEvent::Thermal(ThermalLevel::Serious)).unwrap();
        })
        .join()
        .unwrap();

        assert_eq!(engine.pending_events(), 2);
        engine.pump();
        assert!(engine.can_acquire());
        assert_eq!(engine.current_profile().kind, ProfileKind::PowerSaving);
    }
}
