use super::{Generation, SurfaceSize, SwapchainId};

/// Index of an acquired swapchain image, assigned by the driver.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ImageIndex(pub u32);

/// Represents a single acquired frame.
///
/// Short-lived: present it (or drop it) before acquiring the next one. A frame
/// that outlives a swapchain rebuild is rejected with `StalePresent`.
#[derive(Debug)]
#[must_use = "an acquired frame should be presented"]
pub struct Frame {
    pub(crate) generation: Generation,
    pub(crate) swapchain: SwapchainId,
    pub(crate) image: ImageIndex,
    pub(crate) serial: u64,
    pub(crate) size: SurfaceSize,
    pub(crate) format: wgpu::TextureFormat,
}

impl Frame {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn image(&self) -> ImageIndex {
        self.image
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}
