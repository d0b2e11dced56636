//! Logger initialization.
//!
//! The crate itself only uses the `log` facade. Binaries call
//! [`init_logging`] once: `env_logger` on desktop, logcat on Android.

mod init;

pub use init::{init_logging, LoggingConfig};
