use winit::window::Window;

use crate::engine::Engine;
use crate::error::Result;
use crate::power::PowerProfile;
use crate::surface::Frame;
use crate::time::FrameTime;

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
pub struct FrameCtx<'a> {
    pub engine: &'a mut Engine,
    pub frame: &'a Frame,
    pub time: FrameTime,
    pub window: &'a Window,
}

impl FrameCtx<'_> {
    /// Clears the frame's image.
    pub fn clear(&mut self, color: wgpu::Color) -> Result<()> {
        self.engine.clear(self.frame, color)
    }

    pub fn profile(&self) -> PowerProfile {
        self.engine.current_profile()
    }

    /// Window size in logical pixels.
    pub fn logical_size(&self) -> (f32, f32) {
        let logical: winit::dpi::LogicalSize<f64> =
            self.window.inner_size().to_logical(self.window.scale_factor());
        (logical.width as f32, logical.height as f32)
    }
}
