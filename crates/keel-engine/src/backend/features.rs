use bitflags::bitflags;

bitflags! {
    /// Optional device features a caller can require from a backend.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FeatureSet: u32 {
        const TEXTURE_COMPRESSION_ASTC = 1 << 0;
        const TEXTURE_COMPRESSION_ETC2 = 1 << 1;
        const TEXTURE_COMPRESSION_BC = 1 << 2;
        /// A float16 render target usable as an HDR swapchain format.
        const HDR_SURFACE = 1 << 3;
        const TIMESTAMP_QUERY = 1 << 4;
        const SHADER_F16 = 1 << 5;
        const INDIRECT_FIRST_INSTANCE = 1 << 6;
    }
}

/// Native graphics API family.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Backend {
    Vulkan,
    Metal,
    Dx12,
    /// OpenGL ES through a portability layer.
    Gles,
}

impl Backend {
    /// Selection priority; lower wins.
    ///
    /// Explicit low-overhead APIs rank first, the GLES portability path last.
    pub fn priority(self) -> u8 {
        match self {
            Backend::Vulkan => 0,
            Backend::Metal => 1,
            Backend::Dx12 => 2,
            Backend::Gles => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Backend::Vulkan => "vulkan",
            Backend::Metal => "metal",
            Backend::Dx12 => "dx12",
            Backend::Gles => "gles",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability metadata of an opened device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub backend: Backend,
    pub adapter_name: String,
    pub features: FeatureSet,
    /// Largest 2D texture edge, in texels. Swapchain extents are clamped to it.
    pub max_texture_size: u32,
}

impl Capabilities {
    pub fn supports_hdr(&self) -> bool {
        self.features.contains(FeatureSet::HDR_SURFACE)
    }
}
