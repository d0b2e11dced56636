//! Surface ownership and the lifecycle state machine.
//!
//! The [`SurfaceController`] owns at most one swapchain, bound to one borrowed
//! native window. Every OS-specific teardown/recreate sequence is reduced to
//! four states; the render loop only asks whether a frame can be acquired.

mod controller;
mod frame;
mod swapchain;
mod window;

pub use controller::{Surface, SurfaceController, SurfaceState};
pub use frame::{Frame, ImageIndex};
pub use swapchain::{Generation, SwapchainConfig, SwapchainId};
pub use window::{NativeWindow, SurfaceSize, WindowHandle, WindowId};
