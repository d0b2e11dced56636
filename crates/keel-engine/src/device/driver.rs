use crate::backend::{Backend, Capabilities, FeatureSet, PlatformDescriptor};
use crate::error::Result;
use crate::surface::{ImageIndex, SwapchainConfig, SwapchainId, WindowHandle};

/// Opaque handle to a device allocation, assigned by the context.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceHandle(pub u64);

/// Intended use of a buffer allocation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    Storage,
    Staging,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceKind {
    Buffer {
        size: u64,
        usage: BufferUsage,
    },
    Texture {
        width: u32,
        height: u32,
        mip_levels: u32,
        format: wgpu::TextureFormat,
    },
    /// Memory accounted for an object built outside this crate (e.g. a
    /// compiled pipeline). The driver only books the bytes.
    Opaque {
        size: u64,
    },
}

/// Description of one device allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceDesc {
    pub label: String,
    pub kind: ResourceKind,
}

impl ResourceDesc {
    pub fn buffer(label: impl Into<String>, size: u64, usage: BufferUsage) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Buffer { size, usage },
        }
    }

    pub fn texture(
        label: impl Into<String>,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: wgpu::TextureFormat,
    ) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Texture {
                width,
                height,
                mip_levels: mip_levels.clamp(1, full_mip_chain(width, height)),
                format,
            },
        }
    }

    pub fn opaque(label: impl Into<String>, size: u64) -> Self {
        Self {
            label: label.into(),
            kind: ResourceKind::Opaque { size },
        }
    }

    /// Resident size in bytes, including the full mip chain for textures.
    ///
    /// Block-compressed formats are sized per block.
    pub fn size_bytes(&self) -> u64 {
        match &self.kind {
            ResourceKind::Buffer { size, .. } | ResourceKind::Opaque { size } => *size,
            ResourceKind::Texture {
                width,
                height,
                mip_levels,
                format,
            } => {
                let (bw, bh) = format.block_dimensions();
                let block_bytes = u64::from(format.block_copy_size(None).unwrap_or(4));

                (0..(*mip_levels).min(full_mip_chain(*width, *height)))
                    .map(|level| {
                        let w = (*width >> level).max(1);
                        let h = (*height >> level).max(1);
                        u64::from(w.div_ceil(bw)) * u64::from(h.div_ceil(bh)) * block_bytes
                    })
                    .sum()
            }
        }
    }
}

/// Number of levels down to 1x1 for a `width` x `height` texture.
fn full_mip_chain(width: u32, height: u32) -> u32 {
    u32::BITS - width.max(height).max(1).leading_zeros()
}

/// Why a swapchain image could not be acquired or presented.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AcquireFailure {
    /// The native surface is gone; the swapchain cannot be used again.
    Lost,
    /// Transient; skip the current frame.
    Timeout,
}

/// A native graphics backend bound to one opened device.
///
/// Drivers are owned by a [`GraphicsContext`](super::GraphicsContext) and only
/// ever called from the lifecycle owner thread.
pub trait Driver {
    fn capabilities(&self) -> Capabilities;

    fn allocate(&mut self, handle: ResourceHandle, desc: &ResourceDesc) -> Result<()>;

    fn free(&mut self, handle: ResourceHandle);

    /// Builds a swapchain for `window` and returns the effective configuration,
    /// which may differ from the request where the surface lacks support.
    fn create_swapchain(
        &mut self,
        id: SwapchainId,
        window: &WindowHandle,
        config: &SwapchainConfig,
    ) -> Result<SwapchainConfig>;

    fn destroy_swapchain(&mut self, id: SwapchainId);

    fn acquire_image(&mut self, id: SwapchainId) -> std::result::Result<ImageIndex, AcquireFailure>;

    /// Clears an acquired image to `color`.
    fn clear_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
        color: wgpu::Color,
    ) -> std::result::Result<(), AcquireFailure>;

    /// Returns an acquired image without presenting it.
    fn discard_image(&mut self, id: SwapchainId, image: ImageIndex);

    fn present_image(
        &mut self,
        id: SwapchainId,
        image: ImageIndex,
    ) -> std::result::Result<(), AcquireFailure>;

    /// Releases the device and queues. Called exactly once.
    fn shutdown(&mut self);
}

/// Entry point to a platform's graphics stack.
pub trait Platform {
    /// Enumerates the backends usable on this platform.
    fn describe(&self) -> PlatformDescriptor;

    /// Opens a device on `backend` with `features` enabled.
    fn open(&self, backend: Backend, features: FeatureSet) -> Result<Box<dyn Driver>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_size_is_its_length() {
        let d = ResourceDesc::buffer("vb", 1024, BufferUsage::Vertex);
        assert_eq!(d.size_bytes(), 1024);
    }

    #[test]
    fn texture_size_includes_mips() {
        // 4x4 + 2x2 + 1x1 texels at 4 bytes each.
        let d = ResourceDesc::texture("t", 4, 4, 3, wgpu::TextureFormat::Rgba8Unorm);
        assert_eq!(d.size_bytes(), (16 + 4 + 1) * 4);
    }

    #[test]
    fn compressed_texture_is_sized_per_block() {
        // ETC2 RGB8: 4x4 blocks of 8 bytes; 8x8 -> 4 blocks.
        let d = ResourceDesc::texture("etc", 8, 8, 1, wgpu::TextureFormat::Etc2Rgb8Unorm);
        assert_eq!(d.size_bytes(), 32);
    }

    #[test]
    fn zero_mips_counts_as_one() {
        let d = ResourceDesc::texture("t", 2, 2, 0, wgpu::TextureFormat::R8Unorm);
        assert_eq!(d.size_bytes(), 4);
    }

    #[test]
    fn mip_count_stops_at_one_by_one() {
        let d = ResourceDesc::texture("t", 4, 4, 40, wgpu::TextureFormat::Rgba8Unorm);
        assert!(matches!(d.kind, ResourceKind::Texture { mip_levels: 3, .. }));
        assert_eq!(d.size_bytes(), (16 + 4 + 1) * 4);

        // Hand-built descriptors past the chain are capped the same way.
        let raw = ResourceDesc {
            label: "raw".into(),
            kind: ResourceKind::Texture {
                width: 4,
                height: 4,
                mip_levels: 40,
                format: wgpu::TextureFormat::Rgba8Unorm,
            },
        };
        assert_eq!(raw.size_bytes(), (16 + 4 + 1) * 4);
    }
}
