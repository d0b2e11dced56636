//! Keel engine crate.
//!
//! Keeps a GPU device alive across the surface teardown/recreate cycles of a
//! mobile app lifecycle: backend selection, swapchain state machine, resource
//! cache under memory pressure, and power-aware frame pacing. The `window`
//! and `core` modules host it on `winit`.

pub mod backend;
pub mod cache;
pub mod config;
pub mod core;
pub mod device;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod power;
pub mod surface;
pub mod time;
pub mod window;

pub use engine::{Engine, PumpReport};
pub use error::{Error, Result};

pub use wgpu;
