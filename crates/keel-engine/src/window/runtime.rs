use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId as WinitWindowId};

use crate::config::EngineConfig;
use crate::core::{App, AppControl, FrameCtx};
use crate::device::WgpuPlatform;
use crate::engine::{Engine, PumpReport};
use crate::lifecycle::LifecycleEvent;
use crate::surface::{NativeWindow, SurfaceSize, WindowHandle, WindowId};
use crate::time::FramePacer;

/// Window/runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
    pub engine: EngineConfig,
    pub power_preference: wgpu::PowerPreference,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "keel".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
            engine: EngineConfig::default(),
            power_preference: wgpu::PowerPreference::LowPower,
        }
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    pub fn run<A>(config: RuntimeConfig, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        Self::run_with_event_loop(event_loop, config, app)
    }

    /// Runs on a caller-built event loop (Android builds one from its
    /// `AndroidApp`).
    pub fn run_with_event_loop<A>(event_loop: EventLoop<()>, config: RuntimeConfig, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let mut state = HostState::new(config, app);

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        if let Some(message) = state.fatal.take() {
            anyhow::bail!(message);
        }
        Ok(())
    }
}

struct HostState<A>
where
    A: App + 'static,
{
    config: RuntimeConfig,
    platform: WgpuPlatform,
    app: A,

    engine: Option<Engine>,
    window: Option<Arc<Window>>,
    pacer: FramePacer,

    /// Counts native window (re)deliveries; the engine sees each as a new window.
    window_serial: u64,

    exit_requested: bool,
    fatal: Option<String>,
}

impl<A> HostState<A>
where
    A: App + 'static,
{
    fn new(config: RuntimeConfig, app: A) -> Self {
        let platform = WgpuPlatform::new().with_power_preference(config.power_preference);
        Self {
            config,
            platform,
            app,
            engine: None,
            window: None,
            pacer: FramePacer::new(),
            window_serial: 0,
            exit_requested: false,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{error:#}");
        self.fatal = Some(format!("{error:#}"));
        self.request_exit(event_loop);
    }

    fn request_exit(&mut self, event_loop: &ActiveEventLoop) {
        if !self.exit_requested {
            self.exit_requested = true;
            if let Some(engine) = self.engine.as_mut() {
                destroy_engine(engine);
            }
        }
        event_loop.exit();
    }

    fn ensure_engine(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }

        let mut engine = Engine::new(self.config.engine.clone(), &self.platform)
            .context("failed to initialize graphics")?;
        self.app.on_start(&mut engine);
        self.engine = Some(engine);
        Ok(())
    }

    fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<Arc<Window>> {
        if let Some(window) = &self.window {
            return Ok(Arc::clone(window));
        }

        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);

        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        self.window = Some(Arc::clone(&window));
        Ok(window)
    }

    fn window_handle(&mut self, window: &Arc<Window>) -> WindowHandle {
        self.window_serial += 1;
        let target: Arc<dyn NativeWindow> = window.clone();
        WindowHandle::new(
            WindowId(self.window_serial),
            surface_size(window.inner_size()),
            target,
        )
    }

    fn post(&mut self, events: Vec<LifecycleEvent>) {
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        for event in events {
            if let Err(e) = engine.post(event) {
                log::debug!("lifecycle event rejected: {e}");
            }
        }
    }

    /// Applies queued events. Returns `false` once the engine has terminated.
    fn pump(&mut self) -> bool {
        let Some(engine) = self.engine.as_mut() else {
            return true;
        };

        if engine.pending_events() == 0 {
            return !engine.is_shut_down();
        }

        let report = engine.pump();
        self.app.on_lifecycle(engine, &report);
        if report.terminated {
            return false;
        }

        // Frame timing restarts after any structural change.
        if report.delivered > 0 {
            self.pacer.reset();
        }
        true
    }

    fn render(&mut self, event_loop: &ActiveEventLoop) {
        if !self.pump() {
            self.request_exit(event_loop);
            return;
        }

        let (Some(engine), Some(window)) = (self.engine.as_mut(), self.window.as_ref()) else {
            return;
        };
        if !engine.can_acquire() {
            return;
        }

        let profile = engine.current_profile();
        let Some(time) = self.pacer.begin(Instant::now(), &profile) else {
            return;
        };

        let frame = match engine.acquire_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("frame {} skipped: {e}", time.frame_index);
                self.pacer.record(&Err(e));
                return;
            }
        };

        let control = {
            let mut ctx = FrameCtx {
                engine: &mut *engine,
                frame: &frame,
                time,
                window,
            };
            self.app.on_frame(&mut ctx)
        };

        window.pre_present_notify();
        let outcome = engine.present(frame);
        if let Err(e) = &outcome {
            log::debug!("present failed: {e}");
        }
        self.pacer.record(&outcome);

        if control == AppControl::Exit {
            self.request_exit(event_loop);
        }
    }

    fn schedule(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(engine), Some(window)) = (self.engine.as_ref(), self.window.as_ref()) else {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        };

        if !engine.can_acquire() {
            event_loop.set_control_flow(ControlFlow::Wait);
            return;
        }

        match self.pacer.next_deadline(&engine.current_profile()) {
            Some(deadline) if deadline > Instant::now() => {
                event_loop.set_control_flow(ControlFlow::WaitUntil(deadline));
            }
            _ => {
                event_loop.set_control_flow(ControlFlow::Wait);
                window.request_redraw();
            }
        }
    }
}

impl<A> ApplicationHandler for HostState<A>
where
    A: App + 'static,
{
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.ensure_engine() {
            self.fail(event_loop, e);
            return;
        }

        let first = self.window.is_none();
        let window = match self.ensure_window(event_loop) {
            Ok(window) => window,
            Err(e) => {
                self.fail(event_loop, e);
                return;
            }
        };

        let handle = (first || cfg!(target_os = "android")).then(|| self.window_handle(&window));
        self.post(resume_events(first, handle));
        self.pump();
        window.request_redraw();
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.post(suspend_events());
        self.pump();
    }

    fn memory_warning(&mut self, _event_loop: &ActiveEventLoop) {
        self.post(vec![LifecycleEvent::LowMemory]);
        self.pump();
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }

        if !self.pump() {
            self.request_exit(event_loop);
            return;
        }
        self.schedule(event_loop);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WinitWindowId,
        event: WindowEvent,
    ) {
        if self.exit_requested {
            event_loop.exit();
            return;
        }
        if self.window.as_ref().map(|w| w.id()) != Some(window_id) {
            return;
        }

        if self.app.on_window_event(&event) == AppControl::Exit {
            self.request_exit(event_loop);
            return;
        }

        if let Some(lifecycle) = translate_window_event(&event) {
            self.post(vec![lifecycle]);
        }

        match event {
            WindowEvent::CloseRequested => self.request_exit(event_loop),
            WindowEvent::RedrawRequested => self.render(event_loop),
            WindowEvent::Resized(_) => {
                self.pump();
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut engine) = self.engine.take() {
            engine.shutdown();
            let stats = self.pacer.stats();
            log::info!(
                "frames: {} presented, {} skipped, {} lost, {} stale, {} timeouts",
                stats.presented,
                stats.skipped,
                stats.lost,
                stats.stale,
                stats.timeouts
            );
        }
        // The swapchain is gone; the window can follow.
        self.window = None;
    }
}

fn surface_size(size: PhysicalSize<u32>) -> SurfaceSize {
    SurfaceSize::new(size.width, size.height)
}

/// Maps the window events that affect presentation.
fn translate_window_event(event: &WindowEvent) -> Option<LifecycleEvent> {
    match event {
        WindowEvent::Resized(size) => Some(LifecycleEvent::OrientationChanged(surface_size(*size))),
        WindowEvent::Occluded(true) => Some(LifecycleEvent::Paused),
        WindowEvent::Occluded(false) => Some(LifecycleEvent::Resumed),
        _ => None,
    }
}

/// Android takes the native window away on suspend; desktop keeps it.
fn suspend_events() -> Vec<LifecycleEvent> {
    if cfg!(target_os = "android") {
        vec![LifecycleEvent::WindowDestroyed, LifecycleEvent::Paused]
    } else {
        vec![LifecycleEvent::Paused]
    }
}

fn resume_events(first: bool, handle: Option<WindowHandle>) -> Vec<LifecycleEvent> {
    let mut events = Vec::with_capacity(2);
    if !first {
        events.push(LifecycleEvent::Resumed);
    }
    if let Some(handle) = handle {
        events.push(LifecycleEvent::WindowCreated(handle));
    }
    events
}

/// Queues `Destroy` and drains it. An engine already shut down has a closed
/// bus; that is only worth a debug line.
fn destroy_engine(engine: &mut Engine) -> PumpReport {
    if let Err(e) = engine.post(LifecycleEvent::Destroy) {
        log::debug!("destroy not queued: {e}");
    }
    engine.pump()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(events: &[LifecycleEvent]) -> Vec<&'static str> {
        events.iter().map(LifecycleEvent::name).collect()
    }

    #[test]
    fn resize_becomes_orientation_change() {
        let event = WindowEvent::Resized(PhysicalSize::new(1920, 1080));
        match translate_window_event(&event) {
            Some(LifecycleEvent::OrientationChanged(size)) => {
                assert_eq!(size, SurfaceSize::new(1920, 1080));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn occlusion_pauses_and_resumes() {
        let paused = translate_window_event(&WindowEvent::Occluded(true)).unwrap();
        let resumed = translate_window_event(&WindowEvent::Occluded(false)).unwrap();
        assert_eq!(paused.name(), "Paused");
        assert_eq!(resumed.name(), "Resumed");
        assert!(translate_window_event(&WindowEvent::Focused(true)).is_none());
        // Close is handled by the runtime's own exit path.
        assert!(translate_window_event(&WindowEvent::CloseRequested).is_none());
    }

    #[test]
    fn first_resume_only_delivers_the_window() {
        let handle = WindowHandle::headless(WindowId(1), SurfaceSize::new(4, 4));
        assert_eq!(names(&resume_events(true, Some(handle))), ["WindowCreated"]);
    }

    #[test]
    fn later_resume_precedes_window_redelivery() {
        let handle = WindowHandle::headless(WindowId(2), SurfaceSize::new(4, 4));
        assert_eq!(
            names(&resume_events(false, Some(handle))),
            ["Resumed", "WindowCreated"]
        );
        assert_eq!(names(&resume_events(false, None)), ["Resumed"]);
    }

    #[test]
    fn destroy_engine_tolerates_a_closed_bus() {
        let platform = crate::device::HeadlessPlatform::vulkan();
        let mut engine = Engine::new(EngineConfig::default(), &platform).unwrap();

        let report = destroy_engine(&mut engine);
        assert!(report.terminated);
        assert!(engine.is_shut_down());

        let again = destroy_engine(&mut engine);
        assert_eq!(again.delivered, 0);
        assert!(!again.terminated);
    }

    #[test]
    fn suspend_always_pauses() {
        assert!(names(&suspend_events()).contains(&"Paused"));
    }
}
