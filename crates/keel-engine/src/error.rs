//! Error taxonomy for the lifecycle manager.
//!
//! Every fallible operation in this crate returns [`Result<T>`]. Variants fall
//! into three groups:
//! - fatal at startup: [`Error::NoCompatibleBackend`], [`Error::DeviceCreationFailed`]
//! - recoverable on the next lifecycle event or frame: surface and frame errors
//! - surfaced to the caller of a specific allocation: memory and budget errors
//!
//! [`Error::Destroyed`] is the expected answer after teardown and is not an
//! error condition worth logging above `debug`.

use thiserror::Error;

use crate::backend::FeatureSet;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No backend on this platform supports the requested feature set.
    #[error("no compatible graphics backend (requested features: {requested:?})")]
    NoCompatibleBackend { requested: FeatureSet },

    /// The chosen backend refused to open a device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(String),

    /// A swapchain could not be built for the supplied window.
    #[error("surface unavailable: {0}")]
    SurfaceUnavailable(String),

    /// The native surface went away underneath an acquire or present.
    #[error("surface lost; waiting for a new window")]
    SurfaceLost,

    /// The frame was acquired against an older swapchain.
    #[error("stale present: frame generation {frame} does not match current generation {current}")]
    StalePresent { frame: u64, current: u64 },

    /// Frames can only be acquired or presented while the surface is active.
    #[error("surface is not active")]
    NotActive,

    /// The driver could not hand out an image in time; the frame is skipped.
    #[error("timed out acquiring a swapchain image")]
    AcquireTimeout,

    /// The component has been torn down.
    #[error("already destroyed")]
    Destroyed,

    /// The device has no room for the requested allocation.
    #[error("out of device memory ({requested} bytes requested)")]
    OutOfDeviceMemory { requested: u64 },

    /// The cache cannot get under its budget without evicting pinned entries.
    #[error("cache budget exceeded: {resident} bytes resident, target {target} bytes")]
    BudgetExceeded { resident: u64, target: u64 },
}

impl Error {
    /// Startup errors with no in-process recovery.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::NoCompatibleBackend { .. } | Error::DeviceCreationFailed(_)
        )
    }

    /// Errors the caller should absorb and retry on the next event or frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::SurfaceUnavailable(_)
                | Error::SurfaceLost
                | Error::StalePresent { .. }
                | Error::NotActive
                | Error::AcquireTimeout
                | Error::OutOfDeviceMemory { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        assert!(Error::DeviceCreationFailed("no adapter".into()).is_fatal());
        assert!(
            Error::NoCompatibleBackend {
                requested: FeatureSet::HDR_SURFACE
            }
            .is_fatal()
        );
        assert!(!Error::SurfaceLost.is_fatal());
    }

    #[test]
    fn destroyed_is_neither_fatal_nor_recoverable() {
        assert!(!Error::Destroyed.is_fatal());
        assert!(!Error::Destroyed.is_recoverable());
    }

    #[test]
    fn stale_present_message_names_both_generations() {
        let msg = Error::StalePresent { frame: 2, current: 3 }.to_string();
        assert!(msg.contains('2') && msg.contains('3'));
    }
}
