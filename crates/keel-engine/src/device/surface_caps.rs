//! Fallback rules for matching a requested swapchain config to what a native
//! surface actually supports.

/// Picks `requested` if supported, else an sRGB/non-sRGB sibling matching the
/// request's encoding, else the surface's first format.
pub(crate) fn choose_surface_format(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::TextureFormat,
) -> Option<wgpu::TextureFormat> {
    if caps.formats.is_empty() {
        return None;
    }

    if caps.formats.contains(&requested) {
        return Some(requested);
    }

    let preferred: &[wgpu::TextureFormat] = if requested.is_srgb() {
        &[
            wgpu::TextureFormat::Bgra8UnormSrgb,
            wgpu::TextureFormat::Rgba8UnormSrgb,
        ]
    } else {
        &[wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Rgba8Unorm]
    };

    preferred
        .iter()
        .copied()
        .find(|f| caps.formats.contains(f))
        .or_else(|| caps.formats.first().copied())
}

/// FIFO is the fallback; every conformant surface supports it.
pub(crate) fn choose_present_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::PresentMode,
) -> wgpu::PresentMode {
    if caps.present_modes.contains(&requested) {
        requested
    } else {
        wgpu::PresentMode::Fifo
    }
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: wgpu::CompositeAlphaMode,
) -> wgpu::CompositeAlphaMode {
    Some(requested)
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}
