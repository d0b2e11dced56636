//! Frame timing and pacing.
//!
//! - one [`FrameClock`] per render loop produces [`FrameTime`] snapshots
//! - [`FramePacer`] gates frames against the current power profile and keeps
//!   [`FrameStats`]

mod frame_clock;
mod pacer;

pub use frame_clock::{FrameClock, FrameTime};
pub use pacer::{FramePacer, FrameStats};
