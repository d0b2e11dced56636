use winit::event::WindowEvent;

use crate::engine::{Engine, PumpReport};

use super::ctx::FrameCtx;

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract implemented by host programs.
pub trait App {
    /// Called once the engine exists, before the first window is delivered.
    ///
    /// A good place to clone [`Engine::sender`] for thermal or battery
    /// monitors running on their own threads.
    fn on_start(&mut self, engine: &mut Engine) {
        let _ = engine;
    }

    /// Called for raw window events.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called after queued lifecycle events were applied.
    fn on_lifecycle(&mut self, engine: &Engine, report: &PumpReport) {
        let _ = (engine, report);
    }

    /// Called once per acquired frame. The runtime presents afterwards.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl;
}
