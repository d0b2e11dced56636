use std::collections::HashMap;

use crate::backend::{Backend, Capabilities, FeatureSet};
use crate::error::{Error, Result};
use crate::surface::{ImageIndex, SwapchainConfig, SwapchainId, WindowHandle};

use super::{AcquireFailure, Driver, Platform, ResourceDesc, ResourceHandle};

/// Counters maintained by a [`GraphicsContext`].
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct ContextStats {
    pub swapchains_built: u64,
    pub swapchains_released: u64,
    pub allocations: u64,
    pub frees: u64,
    pub bytes_in_use: u64,
}

impl ContextStats {
    pub fn live_swapchains(&self) -> u64 {
        self.swapchains_built - self.swapchains_released
    }
}

/// The long-lived device context.
///
/// This type is the process-wide owner of the opened device:
/// - holds the driver (device, queues, allocator) and its capabilities
/// - hands out allocation handles and keeps a ledger of live ones
/// - builds and releases swapchains on behalf of the surface controller
///
/// It survives every surface destroy/recreate cycle and is destroyed once, at
/// teardown, after the surface has released its swapchain.
pub struct GraphicsContext {
    backend: Backend,
    capabilities: Capabilities,

    /// `None` once destroyed.
    driver: Option<Box<dyn Driver>>,

    /// Live allocations and their sizes.
    live: HashMap<ResourceHandle, u64>,

    next_resource: u64,
    next_swapchain: u64,
    stats: ContextStats,
}

impl GraphicsContext {
    /// Opens a device on `backend`.
    pub fn create(platform: &dyn Platform, backend: Backend, features: FeatureSet) -> Result<Self> {
        let driver = platform.open(backend, features).map_err(|e| match e {
            Error::DeviceCreationFailed(_) => e,
            other => Error::DeviceCreationFailed(other.to_string()),
        })?;

        let capabilities = driver.capabilities();
        log::info!(
            "graphics context created: backend={} adapter=\"{}\" max_texture_size={} hdr={}",
            backend,
            capabilities.adapter_name,
            capabilities.max_texture_size,
            capabilities.supports_hdr()
        );

        Ok(Self {
            backend,
            capabilities,
            driver: Some(driver),
            live: HashMap::new(),
            next_resource: 1,
            next_swapchain: 1,
            stats: ContextStats::default(),
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn stats(&self) -> ContextStats {
        self.stats
    }

    pub fn is_destroyed(&self) -> bool {
        self.driver.is_none()
    }

    fn driver(&mut self) -> Result<&mut (dyn Driver + 'static)> {
        self.driver.as_deref_mut().ok_or(Error::Destroyed)
    }

    /// Allocates a device resource.
    pub fn allocate(&mut self, desc: &ResourceDesc) -> Result<ResourceHandle> {
        let handle = ResourceHandle(self.next_resource);
        let size = desc.size_bytes();

        self.driver()?.allocate(handle, desc)?;

        self.next_resource += 1;
        self.live.insert(handle, size);
        self.stats.allocations += 1;
        self.stats.bytes_in_use += size;

        log::trace!("allocated {:?} \"{}\" ({} bytes)", handle, desc.label, size);
        Ok(handle)
    }

    /// Frees a resource. Unknown handles are ignored.
    pub fn free(&mut self, handle: ResourceHandle) -> Result<()> {
        let driver = self.driver.as_deref_mut().ok_or(Error::Destroyed)?;

        let Some(size) = self.live.remove(&handle) else {
            log::warn!("free of unknown resource {handle:?} ignored");
            return Ok(());
        };

        driver.free(handle);
        self.stats.frees += 1;
        self.stats.bytes_in_use -= size;
        Ok(())
    }

    pub fn resource_size(&self, handle: ResourceHandle) -> Option<u64> {
        self.live.get(&handle).copied()
    }

    pub(crate) fn create_swapchain(
        &mut self,
        window: &WindowHandle,
        config: &SwapchainConfig,
    ) -> Result<(SwapchainId, SwapchainConfig)> {
        let id = SwapchainId(self.next_swapchain);
        let effective = self.driver()?.create_swapchain(id, window, config)?;

        self.next_swapchain += 1;
        self.stats.swapchains_built += 1;
        Ok((id, effective))
    }

    pub(crate) fn destroy_swapchain(&mut self, id: SwapchainId) {
        match self.driver.as_deref_mut() {
            Some(driver) => {
                driver.destroy_swapchain(id);
                self.stats.swapchains_released += 1;
            }
            None => log::error!("swapchain {id:?} outlived its graphics context"),
        }
    }

    pub(crate) fn acquire_image(&mut self, id: SwapchainId) -> Result<ImageIndex> {
        self.driver()?.acquire_image(id).map_err(map_acquire_failure)
    }

    pub(crate) fn clear_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
        color: wgpu::Color,
    ) -> Result<()> {
        self.driver()?
            .clear_image(id, image, color)
            .map_err(map_acquire_failure)
    }

    pub(crate) fn discard_image(&mut self, id: SwapchainId, image: ImageIndex) {
        if let Some(driver) = self.driver.as_deref_mut() {
            driver.discard_image(id, image);
        }
    }

    pub(crate) fn present_image(&mut self, id: SwapchainId, image: ImageIndex) -> Result<()> {
        self.driver()?
            .present_image(id, image)
            .map_err(map_acquire_failure)
    }

    /// Releases the device. Idempotent: later calls are no-ops.
    ///
    /// Allocations still alive at this point are freed and reported as leaks.
    pub fn destroy(&mut self) {
        let Some(mut driver) = self.driver.take() else {
            return;
        };

        if !self.live.is_empty() {
            log::warn!(
                "destroying graphics context with {} live allocation(s), {} bytes",
                self.live.len(),
                self.stats.bytes_in_use
            );
            let mut leaked: Vec<ResourceHandle> = self.live.keys().copied().collect();
            leaked.sort();
            for handle in leaked {
                driver.free(handle);
                self.stats.frees += 1;
            }
            self.live.clear();
            self.stats.bytes_in_use = 0;
        }

        if self.stats.live_swapchains() != 0 {
            log::error!(
                "destroying graphics context with {} live swapchain(s)",
                self.stats.live_swapchains()
            );
        }

        driver.shutdown();
        log::info!("graphics context destroyed ({})", self.backend);
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn map_acquire_failure(failure: AcquireFailure) -> Error {
    match failure {
        AcquireFailure::Lost => Error::SurfaceLost,
        AcquireFailure::Timeout => Error::AcquireTimeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendReport, PlatformDescriptor};
    use crate::device::{BufferUsage, HeadlessPlatform};

    #[test]
    fn create_reports_backend_and_capabilities() {
        let platform = HeadlessPlatform::vulkan();
        let ctx =
            GraphicsContext::create(&platform, Backend::Vulkan, FeatureSet::TEXTURE_COMPRESSION_ASTC)
                .unwrap();
        assert_eq!(ctx.backend(), Backend::Vulkan);
        assert!(ctx.capabilities().features.contains(FeatureSet::TEXTURE_COMPRESSION_ASTC));
        assert_eq!(platform.ledger().devices_opened(), 1);
    }

    #[test]
    fn create_failure_is_device_creation_failed() {
        let platform = HeadlessPlatform::new(PlatformDescriptor::new(vec![BackendReport::new(
            Backend::Gles,
            FeatureSet::TEXTURE_COMPRESSION_ETC2,
            4096,
        )]));
        let err = GraphicsContext::create(&platform, Backend::Gles, FeatureSet::TEXTURE_COMPRESSION_ASTC)
            .err()
            .unwrap();
        assert!(matches!(err, Error::DeviceCreationFailed(_)));
    }

    #[test]
    fn allocation_ledger_tracks_bytes() {
        let platform = HeadlessPlatform::vulkan();
        let mut ctx = GraphicsContext::create(&platform, Backend::Vulkan, FeatureSet::empty()).unwrap();

        let a = ctx
            .allocate(&ResourceDesc::buffer("a", 256, BufferUsage::Vertex))
            .unwrap();
        let b = ctx.allocate(&ResourceDesc::opaque("b", 64)).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.stats().bytes_in_use, 320);
        assert_eq!(ctx.resource_size(b), Some(64));

        ctx.free(a).unwrap();
        ctx.free(a).unwrap();
        assert_eq!(ctx.stats().bytes_in_use, 64);
        assert_eq!(ctx.stats().frees, 1);
    }

    #[test]
    fn destroy_is_idempotent_and_reclaims_leaks() {
        let platform = HeadlessPlatform::vulkan();
        let ledger = platform.ledger();
        let mut ctx = GraphicsContext::create(&platform, Backend::Vulkan, FeatureSet::empty()).unwrap();
        ctx.allocate(&ResourceDesc::opaque("leak", 128)).unwrap();

        ctx.destroy();
        ctx.destroy();
        drop(ctx);

        assert_eq!(ledger.devices_shut_down(), 1);
        assert_eq!(ledger.bytes_in_use(), 0);
    }

    #[test]
    fn calls_after_destroy_fail() {
        let platform = HeadlessPlatform::vulkan();
        let mut ctx = GraphicsContext::create(&platform, Backend::Vulkan, FeatureSet::empty()).unwrap();
        let handle = ctx.allocate(&ResourceDesc::opaque("x", 1)).unwrap();
        ctx.destroy();

        assert!(ctx.is_destroyed());
        assert_eq!(ctx.free(handle), Err(Error::Destroyed));
        assert_eq!(
            ctx.allocate(&ResourceDesc::opaque("y", 1)).err(),
            Some(Error::Destroyed)
        );
    }
}
