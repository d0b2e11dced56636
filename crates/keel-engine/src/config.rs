//! Engine configuration.
//!
//! Plain data passed explicitly at construction. Every field has a default that
//! is reasonable for a phone-class device.

use std::time::Duration;

use crate::backend::FeatureSet;

/// Top-level configuration consumed by [`Engine::new`](crate::engine::Engine::new).
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Features every candidate backend must support.
    pub required_features: FeatureSet,

    /// Swapchain preferences applied on every (re)build.
    pub swapchain: SwapchainPrefs,

    /// Resource cache budget and pressure response.
    pub cache: CacheConfig,

    /// Frame intervals per power profile.
    pub power: PowerConfig,
}

/// Swapchain preferences.
///
/// These are requests; the driver falls back to what the native surface
/// actually supports and reports the effective values back.
#[derive(Debug, Clone)]
pub struct SwapchainPrefs {
    /// Prefer an sRGB surface format when available.
    pub prefer_srgb: bool,

    /// Request a float16 surface when the device reports HDR support.
    pub prefer_hdr: bool,

    /// Present mode (swap behavior).
    ///
    /// FIFO is the only mode every mobile driver must support.
    pub present_mode: wgpu::PresentMode,

    /// Optional alpha mode preference for the surface.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,

    /// Desired maximum frame latency. A hint; support depends on the backend.
    pub desired_maximum_frame_latency: u32,
}

impl Default for SwapchainPrefs {
    fn default() -> Self {
        Self {
            prefer_srgb: true,
            prefer_hdr: false,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: None,
            desired_maximum_frame_latency: 2,
        }
    }
}

/// Resource cache sizing.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Upper bound on resident bytes.
    pub budget_bytes: u64,

    /// Fraction of the budget kept resident under normal conditions.
    pub normal_fraction: f64,

    /// Fraction of the budget kept resident after a low-memory signal.
    pub low_memory_fraction: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 64 * 1024 * 1024,
            normal_fraction: 1.0,
            low_memory_fraction: 0.9,
        }
    }
}

/// Target frame intervals per power profile.
#[derive(Debug, Clone)]
pub struct PowerConfig {
    pub high_performance_interval: Duration,
    pub balanced_interval: Duration,
    pub power_saving_interval: Duration,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            high_performance_interval: Duration::from_nanos(16_666_667), // 60 Hz
            balanced_interval: Duration::from_nanos(33_333_333),         // 30 Hz
            power_saving_interval: Duration::from_nanos(50_000_000),     // 20 Hz
        }
    }
}
