use crate::error::{Error, Result};

use super::{Backend, Capabilities, FeatureSet};

/// What one backend offers on the current platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReport {
    pub backend: Backend,
    pub adapter_name: String,
    pub features: FeatureSet,
    pub max_texture_size: u32,
}

impl BackendReport {
    pub fn new(backend: Backend, features: FeatureSet, max_texture_size: u32) -> Self {
        Self {
            backend,
            adapter_name: format!("{backend} adapter"),
            features,
            max_texture_size,
        }
    }

    pub fn with_adapter_name(mut self, name: impl Into<String>) -> Self {
        self.adapter_name = name.into();
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            backend: self.backend,
            adapter_name: self.adapter_name.clone(),
            features: self.features,
            max_texture_size: self.max_texture_size,
        }
    }
}

/// Snapshot of the backends usable on a platform.
///
/// Produced by a [`Platform`](crate::device::Platform) implementation. Tests
/// build one by hand to stand in for real hardware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub backends: Vec<BackendReport>,
}

impl PlatformDescriptor {
    pub fn new(backends: Vec<BackendReport>) -> Self {
        Self { backends }
    }

    pub fn report(&self, backend: Backend) -> Option<&BackendReport> {
        self.backends.iter().find(|r| r.backend == backend)
    }
}

/// Returns every backend that supports `requested`, best first.
///
/// A backend reported more than once (several adapters) is ranked once.
pub fn rank_backends(descriptor: &PlatformDescriptor, requested: FeatureSet) -> Vec<Backend> {
    let mut ranked: Vec<Backend> = Vec::with_capacity(descriptor.backends.len());

    for report in &descriptor.backends {
        if !report.features.contains(requested) {
            log::debug!(
                "backend {} lacks {:?}",
                report.backend,
                requested.difference(report.features)
            );
            continue;
        }
        if !ranked.contains(&report.backend) {
            ranked.push(report.backend);
        }
    }

    // Stable sort keeps platform enumeration order between equal priorities.
    ranked.sort_by_key(|b| b.priority());
    ranked
}

/// Picks the highest-priority backend that supports every requested feature.
pub fn select_backend(descriptor: &PlatformDescriptor, requested: FeatureSet) -> Result<Backend> {
    rank_backends(descriptor, requested)
        .first()
        .copied()
        .ok_or(Error::NoCompatibleBackend { requested })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobile_android() -> PlatformDescriptor {
        PlatformDescriptor::new(vec![
            BackendReport::new(
                Backend::Gles,
                FeatureSet::TEXTURE_COMPRESSION_ETC2 | FeatureSet::TEXTURE_COMPRESSION_ASTC,
                4096,
            ),
            BackendReport::new(
                Backend::Vulkan,
                FeatureSet::TEXTURE_COMPRESSION_ETC2 | FeatureSet::HDR_SURFACE,
                8192,
            ),
        ])
    }

    #[test]
    fn prefers_native_api_over_portability_layer() {
        let chosen = select_backend(&mobile_android(), FeatureSet::empty()).unwrap();
        assert_eq!(chosen, Backend::Vulkan);
    }

    #[test]
    fn filters_backends_missing_a_feature() {
        let chosen =
            select_backend(&mobile_android(), FeatureSet::TEXTURE_COMPRESSION_ASTC).unwrap();
        assert_eq!(chosen, Backend::Gles);
    }

    #[test]
    fn no_survivor_is_an_error() {
        let requested = FeatureSet::TEXTURE_COMPRESSION_BC;
        let err = select_backend(&mobile_android(), requested).unwrap_err();
        assert_eq!(err, Error::NoCompatibleBackend { requested });
    }

    #[test]
    fn empty_platform_has_no_backend() {
        let err = select_backend(&PlatformDescriptor::default(), FeatureSet::empty()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn ranking_is_deterministic() {
        let d = mobile_android();
        let first = rank_backends(&d, FeatureSet::TEXTURE_COMPRESSION_ETC2);
        let second = rank_backends(&d, FeatureSet::TEXTURE_COMPRESSION_ETC2);
        assert_eq!(first, vec![Backend::Vulkan, Backend::Gles]);
        assert_eq!(first, second);
    }

    #[test]
    fn duplicate_reports_rank_once() {
        let mut d = mobile_android();
        d.backends
            .push(BackendReport::new(Backend::Vulkan, FeatureSet::all(), 16384));
        assert_eq!(
            rank_backends(&d, FeatureSet::empty()),
            vec![Backend::Vulkan, Backend::Gles]
        );
    }
}
