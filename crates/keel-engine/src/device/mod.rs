//! GPU device management.
//!
//! This module is responsible for:
//! - the [`Driver`] / [`Platform`] seam every native backend implements
//! - the long-lived [`GraphicsContext`] that owns the opened device
//! - the `wgpu` backend and an in-memory headless backend

mod context;
mod driver;
pub mod headless;
mod surface_caps;
mod wgpu_driver;

pub use context::{ContextStats, GraphicsContext};
pub use driver::{
    AcquireFailure, BufferUsage, Driver, Platform, ResourceDesc, ResourceHandle, ResourceKind,
};
pub use headless::{HeadlessDriver, HeadlessLedger, HeadlessPlatform};
pub use wgpu_driver::{WgpuDriver, WgpuPlatform};
