//! `winit` host runtime.
//!
//! Owns the event loop and the native window, translates OS callbacks into
//! lifecycle events and drives the frame loop.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
