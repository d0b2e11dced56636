//! Backend capability probing.
//!
//! Backend choice is a runtime decision: a [`PlatformDescriptor`] lists what the
//! current device can do, and [`select_backend`] picks the best backend that
//! satisfies the requested [`FeatureSet`].

mod features;
mod probe;

pub use features::{Backend, Capabilities, FeatureSet};
pub use probe::{rank_backends, select_backend, BackendReport, PlatformDescriptor};
