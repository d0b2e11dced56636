//! In-memory driver for machines without a GPU.
//!
//! [`HeadlessPlatform`] serves a hand-built [`PlatformDescriptor`] and opens
//! [`HeadlessDriver`]s that keep swapchains and allocations as plain records.
//! A shared [`HeadlessLedger`] lets the owner observe what the driver did and
//! script acquire/present faults.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::backend::{Backend, BackendReport, Capabilities, FeatureSet, PlatformDescriptor};
use crate::error::{Error, Result};
use crate::surface::{ImageIndex, SwapchainConfig, SwapchainId, WindowHandle};

use super::{AcquireFailure, Driver, Platform, ResourceDesc, ResourceHandle};

#[derive(Debug, Default)]
struct LedgerState {
    devices_opened: u64,
    devices_shut_down: u64,
    swapchains_created: u64,
    swapchains_destroyed: u64,
    double_destroys: u64,
    live_swapchains: HashSet<SwapchainId>,
    images_presented: u64,
    images_discarded: u64,
    images_cleared: u64,
    bytes_in_use: u64,
    acquire_faults: VecDeque<AcquireFailure>,
    present_faults: VecDeque<AcquireFailure>,
    allocation_faults: u32,
}

/// Shared view of everything headless drivers have done.
#[derive(Debug, Clone, Default)]
pub struct HeadlessLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl HeadlessLedger {
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn devices_opened(&self) -> u64 {
        self.lock().devices_opened
    }

    pub fn devices_shut_down(&self) -> u64 {
        self.lock().devices_shut_down
    }

    pub fn swapchains_created(&self) -> u64 {
        self.lock().swapchains_created
    }

    pub fn swapchains_destroyed(&self) -> u64 {
        self.lock().swapchains_destroyed
    }

    /// Destroy calls for swapchains that were not alive.
    pub fn double_destroys(&self) -> u64 {
        self.lock().double_destroys
    }

    pub fn live_swapchains(&self) -> usize {
        self.lock().live_swapchains.len()
    }

    pub fn images_presented(&self) -> u64 {
        self.lock().images_presented
    }

    pub fn images_discarded(&self) -> u64 {
        self.lock().images_discarded
    }

    pub fn images_cleared(&self) -> u64 {
        self.lock().images_cleared
    }

    pub fn bytes_in_use(&self) -> u64 {
        self.lock().bytes_in_use
    }

    /// Makes the next acquire fail with `failure`.
    pub fn fail_next_acquire(&self, failure: AcquireFailure) {
        self.lock().acquire_faults.push_back(failure);
    }

    /// Makes the next present fail with `failure`.
    pub fn fail_next_present(&self, failure: AcquireFailure) {
        self.lock().present_faults.push_back(failure);
    }

    /// Makes the next `count` allocations report out-of-memory.
    pub fn fail_next_allocations(&self, count: u32) {
        self.lock().allocation_faults += count;
    }
}

/// A platform whose capabilities are whatever the test says they are.
#[derive(Debug, Clone)]
pub struct HeadlessPlatform {
    descriptor: PlatformDescriptor,
    unopenable: Vec<Backend>,
    memory_capacity: u64,
    ledger: HeadlessLedger,
}

impl HeadlessPlatform {
    pub fn new(descriptor: PlatformDescriptor) -> Self {
        Self {
            descriptor,
            unopenable: Vec::new(),
            memory_capacity: u64::MAX,
            ledger: HeadlessLedger::default(),
        }
    }

    /// A single Vulkan backend with every feature.
    pub fn vulkan() -> Self {
        Self::new(PlatformDescriptor::new(vec![
            BackendReport::new(Backend::Vulkan, FeatureSet::all(), 8192)
                .with_adapter_name("headless vulkan"),
        ]))
    }

    /// Device memory available to allocations, in bytes.
    pub fn with_memory_capacity(mut self, bytes: u64) -> Self {
        self.memory_capacity = bytes;
        self
    }

    /// Makes `open` fail for `backend` even though it is described.
    pub fn with_unopenable(mut self, backend: Backend) -> Self {
        self.unopenable.push(backend);
        self
    }

    pub fn ledger(&self) -> HeadlessLedger {
        self.ledger.clone()
    }
}

impl Platform for HeadlessPlatform {
    fn describe(&self) -> PlatformDescriptor {
        self.descriptor.clone()
    }

    fn open(&self, backend: Backend, features: FeatureSet) -> Result<Box<dyn Driver>> {
        if self.unopenable.contains(&backend) {
            return Err(Error::DeviceCreationFailed(format!(
                "{backend} device refused to open"
            )));
        }

        let report = self
            .descriptor
            .backends
            .iter()
            .find(|r| r.backend == backend && r.features.contains(features))
            .ok_or_else(|| {
                Error::DeviceCreationFailed(format!("{backend} is not available"))
            })?;

        self.ledger.lock().devices_opened += 1;

        Ok(Box::new(HeadlessDriver {
            capabilities: report.capabilities(),
            memory_capacity: self.memory_capacity,
            allocations: HashMap::new(),
            swapchains: HashMap::new(),
            next_image: 0,
            ledger: self.ledger.clone(),
        }))
    }
}

struct HeadlessSwapchain {
    config: SwapchainConfig,
    acquired: Option<ImageIndex>,
}

/// Driver that records instead of rendering.
pub struct HeadlessDriver {
    capabilities: Capabilities,
    memory_capacity: u64,
    allocations: HashMap<ResourceHandle, u64>,
    swapchains: HashMap<SwapchainId, HeadlessSwapchain>,
    next_image: u32,
    ledger: HeadlessLedger,
}

impl HeadlessDriver {
    fn bytes_in_use(&self) -> u64 {
        self.allocations.values().sum()
    }
}

impl Driver for HeadlessDriver {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn allocate(&mut self, handle: ResourceHandle, desc: &ResourceDesc) -> Result<()> {
        let size = desc.size_bytes();
        let mut ledger = self.ledger.lock();

        if ledger.allocation_faults > 0 {
            ledger.allocation_faults -= 1;
            return Err(Error::OutOfDeviceMemory { requested: size });
        }

        if self.bytes_in_use().saturating_add(size) > self.memory_capacity {
            return Err(Error::OutOfDeviceMemory { requested: size });
        }

        self.allocations.insert(handle, size);
        ledger.bytes_in_use += size;
        Ok(())
    }

    fn free(&mut self, handle: ResourceHandle) {
        if let Some(size) = self.allocations.remove(&handle) {
            self.ledger.lock().bytes_in_use -= size;
        }
    }

    fn create_swapchain(
        &mut self,
        id: SwapchainId,
        window: &WindowHandle,
        config: &SwapchainConfig,
    ) -> Result<SwapchainConfig> {
        log::trace!("headless swapchain {id:?} for {:?}", window.id());

        self.swapchains.insert(
            id,
            HeadlessSwapchain {
                config: config.clone(),
                acquired: None,
            },
        );

        let mut ledger = self.ledger.lock();
        ledger.swapchains_created += 1;
        ledger.live_swapchains.insert(id);
        Ok(config.clone())
    }

    fn destroy_swapchain(&mut self, id: SwapchainId) {
        let mut ledger = self.ledger.lock();
        if self.swapchains.remove(&id).is_none() || !ledger.live_swapchains.remove(&id) {
            ledger.double_destroys += 1;
            return;
        }
        ledger.swapchains_destroyed += 1;
    }

    fn acquire_image(&mut self, id: SwapchainId) -> std::result::Result<ImageIndex, AcquireFailure> {
        if let Some(fault) = self.ledger.lock().acquire_faults.pop_front() {
            return Err(fault);
        }

        let swapchain = self.swapchains.get_mut(&id).ok_or(AcquireFailure::Lost)?;
        if swapchain.acquired.is_some() {
            // Same contract as a real swapchain: one image at a time.
            return Err(AcquireFailure::Timeout);
        }

        let image = ImageIndex(self.next_image % swapchain.config.desired_maximum_frame_latency.max(1));
        self.next_image = self.next_image.wrapping_add(1);
        swapchain.acquired = Some(image);
        Ok(image)
    }

    fn clear_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
        _color: wgpu::Color,
    ) -> std::result::Result<(), AcquireFailure> {
        let swapchain = self.swapchains.get(&id).ok_or(AcquireFailure::Lost)?;
        if swapchain.acquired != Some(image) {
            return Err(AcquireFailure::Lost);
        }
        self.ledger.lock().images_cleared += 1;
        Ok(())
    }

    fn discard_image(&mut self, id: SwapchainId, image: ImageIndex) {
        if let Some(swapchain) = self.swapchains.get_mut(&id) {
            if swapchain.acquired == Some(image) {
                swapchain.acquired = None;
                self.ledger.lock().images_discarded += 1;
            }
        }
    }

    fn present_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
    ) -> std::result::Result<(), AcquireFailure> {
        let swapchain = self.swapchains.get_mut(&id).ok_or(AcquireFailure::Lost)?;
        if swapchain.acquired != Some(image) {
            return Err(AcquireFailure::Lost);
        }
        swapchain.acquired = None;

        let mut ledger = self.ledger.lock();
        if let Some(fault) = ledger.present_faults.pop_front() {
            return Err(fault);
        }
        ledger.images_presented += 1;
        Ok(())
    }

    fn shutdown(&mut self) {
        let mut ledger = self.ledger.lock();
        if !self.swapchains.is_empty() {
            log::error!("headless driver shut down with {} live swapchain(s)", self.swapchains.len());
        }
        ledger.devices_shut_down += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Generation, SurfaceSize, WindowId};

    fn config() -> SwapchainConfig {
        SwapchainConfig {
            generation: Generation::INITIAL,
            size: SurfaceSize::new(64, 64),
            format: wgpu::TextureFormat::Bgra8UnormSrgb,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            desired_maximum_frame_latency: 2,
        }
    }

    #[test]
    fn open_rejects_missing_features() {
        let platform = HeadlessPlatform::new(PlatformDescriptor::new(vec![BackendReport::new(
            Backend::Gles,
            FeatureSet::empty(),
            2048,
        )]));
        assert!(matches!(
            platform.open(Backend::Gles, FeatureSet::HDR_SURFACE),
            Err(Error::DeviceCreationFailed(_))
        ));
        assert!(platform.open(Backend::Gles, FeatureSet::empty()).is_ok());
        assert_eq!(platform.ledger().devices_opened(), 1);
    }

    #[test]
    fn capacity_bounds_allocations() {
        let platform = HeadlessPlatform::vulkan().with_memory_capacity(100);
        let mut driver = platform.open(Backend::Vulkan, FeatureSet::empty()).unwrap();

        driver
            .allocate(ResourceHandle(1), &ResourceDesc::opaque("a", 60))
            .unwrap();
        assert_eq!(
            driver.allocate(ResourceHandle(2), &ResourceDesc::opaque("b", 60)),
            Err(Error::OutOfDeviceMemory { requested: 60 })
        );
        driver.free(ResourceHandle(1));
        assert!(driver.allocate(ResourceHandle(2), &ResourceDesc::opaque("b", 60)).is_ok());
        assert_eq!(platform.ledger().bytes_in_use(), 60);
    }

    #[test]
    fn one_image_in_flight_per_swapchain() {
        let platform = HeadlessPlatform::vulkan();
        let mut driver = platform.open(Backend::Vulkan, FeatureSet::empty()).unwrap();
        let window = WindowHandle::headless(WindowId(1), SurfaceSize::new(64, 64));
        driver.create_swapchain(SwapchainId(1), &window, &config()).unwrap();

        let image = driver.acquire_image(SwapchainId(1)).unwrap();
        assert_eq!(driver.acquire_image(SwapchainId(1)), Err(AcquireFailure::Timeout));
        driver.present_image(SwapchainId(1), image).unwrap();
        assert!(driver.acquire_image(SwapchainId(1)).is_ok());
    }

    #[test]
    fn destroying_twice_is_recorded() {
        let platform = HeadlessPlatform::vulkan();
        let ledger = platform.ledger();
        let mut driver = platform.open(Backend::Vulkan, FeatureSet::empty()).unwrap();
        let window = WindowHandle::headless(WindowId(1), SurfaceSize::new(64, 64));
        driver.create_swapchain(SwapchainId(7), &window, &config()).unwrap();

        driver.destroy_swapchain(SwapchainId(7));
        driver.destroy_swapchain(SwapchainId(7));
        assert_eq!(ledger.swapchains_destroyed(), 1);
        assert_eq!(ledger.double_destroys(), 1);
    }

    #[test]
    fn scripted_faults_fire_once() {
        let platform = HeadlessPlatform::vulkan();
        let ledger = platform.ledger();
        let mut driver = platform.open(Backend::Vulkan, FeatureSet::empty()).unwrap();
        let window = WindowHandle::headless(WindowId(1), SurfaceSize::new(64, 64));
        driver.create_swapchain(SwapchainId(1), &window, &config()).unwrap();

        ledger.fail_next_acquire(AcquireFailure::Lost);
        assert_eq!(driver.acquire_image(SwapchainId(1)), Err(AcquireFailure::Lost));
        assert!(driver.acquire_image(SwapchainId(1)).is_ok());
    }
}
