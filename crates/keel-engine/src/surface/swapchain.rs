use std::fmt;

use crate::backend::Capabilities;
use crate::config::SwapchainPrefs;
use crate::error::{Error, Result};

use super::SurfaceSize;

/// Construction epoch of a surface's swapchain.
///
/// Bumped on every recreation. A frame or swapchain tagged with an older
/// generation is stale and must never be presented.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub const INITIAL: Generation = Generation(0);

    pub fn next(self) -> Generation {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Driver-side identity of one built swapchain. Never reused.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SwapchainId(pub u64);

/// Everything a driver needs to build a swapchain.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapchainConfig {
    pub generation: Generation,
    pub size: SurfaceSize,
    pub format: wgpu::TextureFormat,
    pub present_mode: wgpu::PresentMode,
    pub alpha_mode: wgpu::CompositeAlphaMode,
    pub desired_maximum_frame_latency: u32,
}

impl SwapchainConfig {
    /// Derives a config from the surface size and device capabilities.
    ///
    /// The extent is clamped to the device's maximum texture size. A zero-size
    /// surface cannot back a swapchain.
    pub fn derive(
        size: SurfaceSize,
        generation: Generation,
        caps: &Capabilities,
        prefs: &SwapchainPrefs,
    ) -> Result<Self> {
        if size.is_empty() {
            return Err(Error::SurfaceUnavailable(format!(
                "window has zero size ({size})"
            )));
        }

        let format = if prefs.prefer_hdr && caps.supports_hdr() {
            wgpu::TextureFormat::Rgba16Float
        } else if prefs.prefer_srgb {
            wgpu::TextureFormat::Bgra8UnormSrgb
        } else {
            wgpu::TextureFormat::Bgra8Unorm
        };

        Ok(Self {
            generation,
            size: size.clamped(caps.max_texture_size),
            format,
            present_mode: prefs.present_mode,
            alpha_mode: prefs.alpha_mode.unwrap_or(wgpu::CompositeAlphaMode::Auto),
            desired_maximum_frame_latency: prefs.desired_maximum_frame_latency.max(1),
        })
    }
}
