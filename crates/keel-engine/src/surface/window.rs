use std::fmt;
use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// A platform window that can back a GPU surface.
///
/// Blanket-implemented for anything exposing raw window and display handles,
/// e.g. `winit::window::Window`.
pub trait NativeWindow: HasWindowHandle + HasDisplayHandle + Send + Sync {}

impl<T> NativeWindow for T where T: HasWindowHandle + HasDisplayHandle + Send + Sync {}

/// Host-assigned identity of one native window instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WindowId(pub u64);

/// Drawable size in physical pixels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Clamps both edges to `max`.
    pub fn clamped(self, max: u32) -> Self {
        Self {
            width: self.width.min(max),
            height: self.height.min(max),
        }
    }
}

impl fmt::Display for SurfaceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Borrowed handle to an OS-owned window.
///
/// The OS owns the window; this crate only holds a reference and releases it
/// (drops the handle) when the window goes away. Headless handles carry no
/// native target and are accepted only by drivers that do not present.
#[derive(Clone)]
pub struct WindowHandle {
    id: WindowId,
    size: SurfaceSize,
    target: Option<Arc<dyn NativeWindow>>,
}

impl WindowHandle {
    pub fn new(id: WindowId, size: SurfaceSize, target: Arc<dyn NativeWindow>) -> Self {
        Self {
            id,
            size,
            target: Some(target),
        }
    }

    pub fn headless(id: WindowId, size: SurfaceSize) -> Self {
        Self {
            id,
            size,
            target: None,
        }
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    /// Size at the time the host delivered the window.
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn target(&self) -> Option<&Arc<dyn NativeWindow>> {
        self.target.as_ref()
    }
}

impl fmt::Debug for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowHandle")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("native", &self.target.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_edge_is_empty() {
        assert!(SurfaceSize::new(0, 720).is_empty());
        assert!(SurfaceSize::new(1280, 0).is_empty());
        assert!(!SurfaceSize::new(1, 1).is_empty());
    }

    #[test]
    fn clamp_limits_each_edge() {
        assert_eq!(
            SurfaceSize::new(9000, 100).clamped(4096),
            SurfaceSize::new(4096, 100)
        );
    }

    #[test]
    fn headless_handle_has_no_target() {
        let h = WindowHandle::headless(WindowId(3), SurfaceSize::new(10, 20));
        assert!(h.target().is_none());
        assert_eq!(h.id(), WindowId(3));
        assert!(format!("{h:?}").contains("native: false"));
    }
}
