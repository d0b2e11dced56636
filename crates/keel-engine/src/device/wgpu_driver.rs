use std::collections::HashMap;
use std::sync::Arc;

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle as RawWindow,
};

use crate::backend::{Backend, BackendReport, Capabilities, FeatureSet, PlatformDescriptor};
use crate::error::{Error, Result};
use crate::surface::{ImageIndex, NativeWindow, SwapchainConfig, SwapchainId, WindowHandle};

use super::surface_caps;
use super::{AcquireFailure, BufferUsage, Driver, Platform, ResourceDesc, ResourceHandle, ResourceKind};

const PROBE_ORDER: [Backend; 4] = [Backend::Vulkan, Backend::Metal, Backend::Dx12, Backend::Gles];

/// The real platform: every backend `wgpu` can reach on this machine.
#[derive(Debug, Clone)]
pub struct WgpuPlatform {
    power_preference: wgpu::PowerPreference,
    memory_budget: Option<u64>,
}

impl Default for WgpuPlatform {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            memory_budget: None,
        }
    }
}

impl WgpuPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    /// Caps the bytes drivers opened by this platform will allocate.
    ///
    /// Past the cap, allocations fail with `OutOfDeviceMemory` instead of
    /// letting the OS kill the process.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = Some(bytes);
        self
    }

    fn request_adapter(&self, backend: Backend) -> Option<(wgpu::Instance, wgpu::Adapter)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu_backends(backend),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: self.power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|e| log::debug!("no {backend} adapter: {e}"))
        .ok()?;

        Some((instance, adapter))
    }
}

impl Platform for WgpuPlatform {
    fn describe(&self) -> PlatformDescriptor {
        let backends = PROBE_ORDER
            .iter()
            .filter_map(|&backend| {
                let (_, adapter) = self.request_adapter(backend)?;
                let info = adapter.get_info();
                Some(
                    BackendReport::new(
                        backend,
                        feature_set(&adapter),
                        adapter.limits().max_texture_dimension_2d,
                    )
                    .with_adapter_name(info.name),
                )
            })
            .collect();

        PlatformDescriptor::new(backends)
    }

    fn open(&self, backend: Backend, features: FeatureSet) -> Result<Box<dyn Driver>> {
        let (instance, adapter) = self
            .request_adapter(backend)
            .ok_or_else(|| Error::DeviceCreationFailed(format!("no {backend} adapter")))?;

        let available = feature_set(&adapter);
        if !available.contains(features) {
            return Err(Error::DeviceCreationFailed(format!(
                "{backend} adapter lacks {:?}",
                features.difference(available)
            )));
        }

        let base_limits = match backend {
            Backend::Gles => wgpu::Limits::downlevel_webgl2_defaults(),
            _ => wgpu::Limits::downlevel_defaults(),
        };

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("keel device"),
            required_features: wgpu_features(features),
            required_limits: base_limits.using_resolution(adapter.limits()),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| Error::DeviceCreationFailed(e.to_string()))?;

        let info = adapter.get_info();
        let capabilities = Capabilities {
            backend,
            adapter_name: info.name,
            features: available,
            max_texture_size: device.limits().max_texture_dimension_2d,
        };

        Ok(Box::new(WgpuDriver {
            instance,
            adapter,
            device,
            queue,
            capabilities,
            memory_budget: self.memory_budget.unwrap_or(u64::MAX),
            bytes_in_use: 0,
            swapchains: HashMap::new(),
            resources: HashMap::new(),
        }))
    }
}

/// Lets `wgpu` build a `'static` surface from a shared window.
struct SharedWindow(Arc<dyn NativeWindow>);

impl HasWindowHandle for SharedWindow {
    fn window_handle(&self) -> std::result::Result<RawWindow<'_>, HandleError> {
        self.0.window_handle()
    }
}

impl HasDisplayHandle for SharedWindow {
    fn display_handle(&self) -> std::result::Result<DisplayHandle<'_>, HandleError> {
        self.0.display_handle()
    }
}

struct SwapchainSlot {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    acquired: Option<(ImageIndex, wgpu::SurfaceTexture)>,
    next_image: u32,
}

enum GpuResource {
    Buffer(wgpu::Buffer, u64),
    Texture(wgpu::Texture, u64),
    Opaque(u64),
}

impl GpuResource {
    fn size(&self) -> u64 {
        match self {
            GpuResource::Buffer(_, size)
            | GpuResource::Texture(_, size)
            | GpuResource::Opaque(size) => *size,
        }
    }
}

/// Owns `wgpu` core objects and every swapchain built on them.
pub struct WgpuDriver {
    /// Instance used to create surfaces for new windows.
    instance: wgpu::Instance,

    /// Selected adapter; surface capabilities are queried against it.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    capabilities: Capabilities,
    memory_budget: u64,
    bytes_in_use: u64,
    swapchains: HashMap<SwapchainId, SwapchainSlot>,
    resources: HashMap<ResourceHandle, GpuResource>,
}

impl WgpuDriver {
    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn reconfigure(&self, slot: &SwapchainSlot) {
        if slot.config.width > 0 && slot.config.height > 0 {
            slot.surface.configure(&self.device, &slot.config);
        }
    }
}

impl Driver for WgpuDriver {
    fn capabilities(&self) -> Capabilities {
        self.capabilities.clone()
    }

    fn allocate(&mut self, handle: ResourceHandle, desc: &ResourceDesc) -> Result<()> {
        let size = desc.size_bytes();
        if self.bytes_in_use.saturating_add(size) > self.memory_budget {
            return Err(Error::OutOfDeviceMemory { requested: size });
        }

        let limits = self.device.limits();
        let resource = match &desc.kind {
            ResourceKind::Buffer { size, usage } => {
                if *size > limits.max_buffer_size {
                    return Err(Error::OutOfDeviceMemory { requested: *size });
                }
                let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&desc.label),
                    size: *size,
                    usage: buffer_usages(*usage),
                    mapped_at_creation: false,
                });
                GpuResource::Buffer(buffer, *size)
            }
            ResourceKind::Texture {
                width,
                height,
                mip_levels,
                format,
            } => {
                if *width > limits.max_texture_dimension_2d
                    || *height > limits.max_texture_dimension_2d
                {
                    return Err(Error::OutOfDeviceMemory { requested: size });
                }
                let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&desc.label),
                    size: wgpu::Extent3d {
                        width: *width,
                        height: *height,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: *mip_levels,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: *format,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                GpuResource::Texture(texture, size)
            }
            ResourceKind::Opaque { size } => GpuResource::Opaque(*size),
        };

        self.bytes_in_use += resource.size();
        self.resources.insert(handle, resource);
        Ok(())
    }

    fn free(&mut self, handle: ResourceHandle) {
        let Some(resource) = self.resources.remove(&handle) else {
            return;
        };
        self.bytes_in_use -= resource.size();
        match resource {
            GpuResource::Buffer(buffer, _) => buffer.destroy(),
            GpuResource::Texture(texture, _) => texture.destroy(),
            GpuResource::Opaque(_) => {}
        }
    }

    fn create_swapchain(
        &mut self,
        id: SwapchainId,
        window: &WindowHandle,
        config: &SwapchainConfig,
    ) -> Result<SwapchainConfig> {
        let target = window.target().ok_or_else(|| {
            Error::SurfaceUnavailable("window has no native handle".to_string())
        })?;

        let surface = self
            .instance
            .create_surface(SharedWindow(Arc::clone(target)))
            .map_err(|e| Error::SurfaceUnavailable(format!("failed to create wgpu surface: {e}")))?;

        let caps = surface.get_capabilities(&self.adapter);
        let format = surface_caps::choose_surface_format(&caps, config.format)
            .ok_or_else(|| Error::SurfaceUnavailable("no supported surface formats".to_string()))?;
        let present_mode = surface_caps::choose_present_mode(&caps, config.present_mode);
        let alpha_mode = surface_caps::choose_alpha_mode(&caps, config.alpha_mode);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: config.size.width,
            height: config.size.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: config.desired_maximum_frame_latency,
        };

        surface.configure(&self.device, &surface_config);

        self.swapchains.insert(
            id,
            SwapchainSlot {
                surface,
                config: surface_config,
                acquired: None,
                next_image: 0,
            },
        );

        Ok(SwapchainConfig {
            format,
            present_mode,
            alpha_mode,
            ..config.clone()
        })
    }

    fn destroy_swapchain(&mut self, id: SwapchainId) {
        if let Some(mut slot) = self.swapchains.remove(&id) {
            // Unpresented textures must go before their surface.
            drop(slot.acquired.take());
            drop(slot);
        }
    }

    fn acquire_image(&mut self, id: SwapchainId) -> std::result::Result<ImageIndex, AcquireFailure> {
        let Some(slot) = self.swapchains.get(&id) else {
            return Err(AcquireFailure::Lost);
        };

        let texture = match slot.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Outdated) => {
                // Reconfigure once; a second failure means the window is gone.
                self.reconfigure(slot);
                slot.surface
                    .get_current_texture()
                    .map_err(|_| AcquireFailure::Lost)?
            }
            Err(wgpu::SurfaceError::Lost) => return Err(AcquireFailure::Lost),
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("out of memory acquiring from swapchain {id:?}");
                return Err(AcquireFailure::Lost);
            }
            Err(wgpu::SurfaceError::Timeout) => return Err(AcquireFailure::Timeout),
            Err(wgpu::SurfaceError::Other) => return Err(AcquireFailure::Timeout),
        };

        if texture.suboptimal {
            log::debug!("swapchain {id:?} is suboptimal");
        }

        let slot = self.swapchains.get_mut(&id).ok_or(AcquireFailure::Lost)?;
        let image = ImageIndex(slot.next_image);
        slot.next_image = slot.next_image.wrapping_add(1);
        slot.acquired = Some((image, texture));
        Ok(image)
    }

    fn clear_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
        color: wgpu::Color,
    ) -> std::result::Result<(), AcquireFailure> {
        let slot = self.swapchains.get(&id).ok_or(AcquireFailure::Lost)?;
        let Some((_, texture)) = slot.acquired.as_ref().filter(|(held, _)| *held == image) else {
            return Err(AcquireFailure::Lost);
        };

        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("keel clear encoder"),
            });

        {
            let _rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("keel clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(color),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn discard_image(&mut self, id: SwapchainId, image: ImageIndex) {
        if let Some(slot) = self.swapchains.get_mut(&id) {
            if matches!(slot.acquired, Some((held, _)) if held == image) {
                // Dropping an unpresented surface texture discards it.
                slot.acquired = None;
            }
        }
    }

    fn present_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
    ) -> std::result::Result<(), AcquireFailure> {
        let slot = self.swapchains.get_mut(&id).ok_or(AcquireFailure::Lost)?;
        match slot.acquired.take() {
            Some((held, texture)) if held == image => {
                texture.present();
                Ok(())
            }
            other => {
                slot.acquired = other;
                Err(AcquireFailure::Lost)
            }
        }
    }

    fn shutdown(&mut self) {
        self.swapchains.clear();
        for (_, resource) in self.resources.drain() {
            match resource {
                GpuResource::Buffer(buffer, _) => buffer.destroy(),
                GpuResource::Texture(texture, _) => texture.destroy(),
                GpuResource::Opaque(_) => {}
            }
        }
        self.bytes_in_use = 0;
        self.device.destroy();
    }
}

fn wgpu_backends(backend: Backend) -> wgpu::Backends {
    match backend {
        Backend::Vulkan => wgpu::Backends::VULKAN,
        Backend::Metal => wgpu::Backends::METAL,
        Backend::Dx12 => wgpu::Backends::DX12,
        Backend::Gles => wgpu::Backends::GL,
    }
}

const FEATURE_MAP: [(FeatureSet, wgpu::Features); 6] = [
    (FeatureSet::TEXTURE_COMPRESSION_ASTC, wgpu::Features::TEXTURE_COMPRESSION_ASTC),
    (FeatureSet::TEXTURE_COMPRESSION_ETC2, wgpu::Features::TEXTURE_COMPRESSION_ETC2),
    (FeatureSet::TEXTURE_COMPRESSION_BC, wgpu::Features::TEXTURE_COMPRESSION_BC),
    (FeatureSet::TIMESTAMP_QUERY, wgpu::Features::TIMESTAMP_QUERY),
    (FeatureSet::SHADER_F16, wgpu::Features::SHADER_F16),
    (FeatureSet::INDIRECT_FIRST_INSTANCE, wgpu::Features::INDIRECT_FIRST_INSTANCE),
];

fn feature_set(adapter: &wgpu::Adapter) -> FeatureSet {
    let features = adapter.features();
    let mut set = FeatureSet::empty();
    for (ours, theirs) in FEATURE_MAP {
        set.set(ours, features.contains(theirs));
    }

    let hdr = adapter
        .get_texture_format_features(wgpu::TextureFormat::Rgba16Float)
        .allowed_usages
        .contains(wgpu::TextureUsages::RENDER_ATTACHMENT);
    set.set(FeatureSet::HDR_SURFACE, hdr);
    set
}

/// `HDR_SURFACE` is a format capability, not a device feature; it maps to nothing.
fn wgpu_features(set: FeatureSet) -> wgpu::Features {
    FEATURE_MAP
        .iter()
        .filter(|(ours, _)| set.contains(*ours))
        .fold(wgpu::Features::empty(), |acc, (_, theirs)| acc | *theirs)
}

fn buffer_usages(usage: BufferUsage) -> wgpu::BufferUsages {
    match usage {
        BufferUsage::Vertex => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        BufferUsage::Index => wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
        BufferUsage::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        BufferUsage::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        BufferUsage::Staging => wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hdr_is_not_requested_as_a_device_feature() {
        assert_eq!(wgpu_features(FeatureSet::HDR_SURFACE), wgpu::Features::empty());
    }

    #[test]
    fn compression_features_map_one_to_one() {
        let f = wgpu_features(
            FeatureSet::TEXTURE_COMPRESSION_ASTC | FeatureSet::TEXTURE_COMPRESSION_ETC2,
        );
        assert_eq!(
            f,
            wgpu::Features::TEXTURE_COMPRESSION_ASTC | wgpu::Features::TEXTURE_COMPRESSION_ETC2
        );
    }

    #[test]
    fn each_backend_maps_to_a_single_wgpu_backend() {
        for backend in PROBE_ORDER {
            assert_eq!(wgpu_backends(backend).iter().count(), 1);
        }
    }
}
