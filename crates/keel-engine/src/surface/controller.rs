use crate::config::SwapchainPrefs;
use crate::device::GraphicsContext;
use crate::error::{Error, Result};
use crate::lifecycle::LifecycleEvent;

use super::{Frame, Generation, ImageIndex, SurfaceSize, SwapchainConfig, SwapchainId, WindowHandle};

/// Lifecycle state of a [`SurfaceController`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceState {
    /// No window has been delivered yet.
    Uninitialized,
    /// A swapchain is built; frames may be acquired.
    Active,
    /// Presentation resources are released; waiting for a window or resume.
    Suspended,
    /// Terminal.
    Destroyed,
}

/// The drawable target this controller renders into.
///
/// `window` is `None` once the OS has taken the window away; the surface keeps
/// its generation so the next creation can bump it.
#[derive(Debug, Clone)]
pub struct Surface {
    window: Option<WindowHandle>,
    size: SurfaceSize,
    format: wgpu::TextureFormat,
    present_mode: wgpu::PresentMode,
    generation: Generation,
}

impl Surface {
    pub fn window(&self) -> Option<&WindowHandle> {
        self.window.as_ref()
    }

    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn present_mode(&self) -> wgpu::PresentMode {
        self.present_mode
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }
}

struct Swapchain {
    id: SwapchainId,
    config: SwapchainConfig,
}

/// Frame handed out and not yet presented or abandoned.
#[derive(Debug, Copy, Clone)]
struct Outstanding {
    serial: u64,
    image: ImageIndex,
}

/// Owns at most one swapchain and the state machine that governs it.
///
/// The controller never holds the [`GraphicsContext`]; the owner passes it in
/// on every call, which keeps the context's lifetime strictly outside the
/// surface's.
pub struct SurfaceController {
    state: SurfaceState,
    prefs: SwapchainPrefs,
    surface: Option<Surface>,
    swapchain: Option<Swapchain>,
    outstanding: Option<Outstanding>,

    /// Suspended because a resize rebuild failed, not by the host.
    resize_failed: bool,

    next_serial: u64,
    swapchains_built: u64,
    swapchains_released: u64,
}

impl SurfaceController {
    pub fn new(prefs: SwapchainPrefs) -> Self {
        Self {
            state: SurfaceState::Uninitialized,
            prefs,
            surface: None,
            swapchain: None,
            outstanding: None,
            resize_failed: false,
            next_serial: 0,
            swapchains_built: 0,
            swapchains_released: 0,
        }
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    /// `Some` once a window has been adopted; cleared on destroy.
    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    pub fn generation(&self) -> Generation {
        self.surface
            .as_ref()
            .map_or(Generation::INITIAL, |s| s.generation)
    }

    /// Effective config of the live swapchain, if any.
    pub fn swapchain_config(&self) -> Option<&SwapchainConfig> {
        self.swapchain.as_ref().map(|s| &s.config)
    }

    pub fn swapchains_built(&self) -> u64 {
        self.swapchains_built
    }

    pub fn swapchains_released(&self) -> u64 {
        self.swapchains_released
    }

    /// Only `Active` can hand out frames.
    pub fn can_acquire(&self) -> bool {
        self.state == SurfaceState::Active
    }

    /// Applies one lifecycle event. Non-structural events are ignored.
    pub fn handle(&mut self, ctx: &mut GraphicsContext, event: &LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::WindowCreated(window) => self.on_window_created(ctx, window),
            LifecycleEvent::WindowDestroyed => self.on_window_destroyed(ctx),
            LifecycleEvent::Paused => self.on_paused(ctx),
            LifecycleEvent::Resumed => self.on_resumed(ctx),
            LifecycleEvent::OrientationChanged(size) => self.on_orientation_changed(ctx, *size),
            LifecycleEvent::Destroy => self.destroy(ctx),
            LifecycleEvent::LowMemory
            | LifecycleEvent::Thermal(_)
            | LifecycleEvent::Battery(_) => self.ensure_alive(),
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.state == SurfaceState::Destroyed {
            Err(Error::Destroyed)
        } else {
            Ok(())
        }
    }

    fn on_window_created(&mut self, ctx: &mut GraphicsContext, window: &WindowHandle) -> Result<()> {
        match self.state {
            SurfaceState::Destroyed => Err(Error::Destroyed),
            SurfaceState::Uninitialized => {
                self.build(ctx, window.clone(), window.size(), Generation::INITIAL)?;
                self.enter(SurfaceState::Active);
                Ok(())
            }
            SurfaceState::Active | SurfaceState::Suspended => {
                // A window delivered while active means the host skipped the
                // destroy notification; the old swapchain is stale either way.
                if self.state == SurfaceState::Active {
                    self.release_swapchain(ctx);
                    self.drop_window();
                    self.enter(SurfaceState::Suspended);
                }

                let next = self.generation().next();
                self.build(ctx, window.clone(), window.size(), next)?;
                self.enter(SurfaceState::Active);
                Ok(())
            }
        }
    }

    fn on_window_destroyed(&mut self, ctx: &mut GraphicsContext) -> Result<()> {
        match self.state {
            SurfaceState::Destroyed => Err(Error::Destroyed),
            SurfaceState::Uninitialized => Ok(()),
            SurfaceState::Active => {
                self.release_swapchain(ctx);
                self.drop_window();
                self.enter(SurfaceState::Suspended);
                Ok(())
            }
            SurfaceState::Suspended => {
                self.drop_window();
                Ok(())
            }
        }
    }

    fn on_paused(&mut self, ctx: &mut GraphicsContext) -> Result<()> {
        match self.state {
            SurfaceState::Destroyed => Err(Error::Destroyed),
            SurfaceState::Active => {
                self.release_swapchain(ctx);
                self.enter(SurfaceState::Suspended);
                Ok(())
            }
            SurfaceState::Uninitialized | SurfaceState::Suspended => Ok(()),
        }
    }

    fn on_resumed(&mut self, ctx: &mut GraphicsContext) -> Result<()> {
        match self.state {
            SurfaceState::Destroyed => Err(Error::Destroyed),
            SurfaceState::Uninitialized | SurfaceState::Active => Ok(()),
            SurfaceState::Suspended => {
                let Some(surface) = self.surface.as_ref() else {
                    return Ok(());
                };
                let Some(window) = surface.window.clone() else {
                    log::debug!("resumed without a window; waiting for a new one");
                    return Ok(());
                };
                if self.resize_failed {
                    log::debug!("resumed after a failed resize; waiting for a new size");
                    return Ok(());
                }

                // Same window, same generation: only presentation resources return.
                let (size, generation) = (surface.size, surface.generation);
                self.build(ctx, window, size, generation)?;
                self.enter(SurfaceState::Active);
                Ok(())
            }
        }
    }

    fn on_orientation_changed(&mut self, ctx: &mut GraphicsContext, size: SurfaceSize) -> Result<()> {
        match self.state {
            SurfaceState::Destroyed => Err(Error::Destroyed),
            SurfaceState::Uninitialized => Ok(()),
            SurfaceState::Suspended if self.resize_failed => {
                // Suspended by a rebuild that failed; a new size is the way back.
                let Some(surface) = self.surface.as_ref() else {
                    return Ok(());
                };
                let Some(window) = surface.window.clone() else {
                    return Ok(());
                };
                let next = surface.generation.next();
                self.build(ctx, window, size, next)?;
                self.enter(SurfaceState::Active);
                Ok(())
            }
            SurfaceState::Suspended => {
                // Paused: remember the size for the resume rebuild.
                if let Some(surface) = self.surface.as_mut() {
                    if surface.window.is_some() && !size.is_empty() {
                        surface.size = size;
                    }
                }
                Ok(())
            }
            SurfaceState::Active => {
                let Some(surface) = self.surface.as_ref() else {
                    return Ok(());
                };
                if surface.size == size {
                    return Ok(());
                }
                let Some(window) = surface.window.clone() else {
                    return Ok(());
                };

                let next = surface.generation.next();
                self.release_swapchain(ctx);
                match self.build(ctx, window, size, next) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        // The last size that built is kept; the next resize retries.
                        self.resize_failed = true;
                        self.enter(SurfaceState::Suspended);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Releases the swapchain and the window reference. Terminal.
    ///
    /// Every later call on this controller returns [`Error::Destroyed`].
    pub fn destroy(&mut self, ctx: &mut GraphicsContext) -> Result<()> {
        if self.state == SurfaceState::Destroyed {
            return Err(Error::Destroyed);
        }

        self.release_swapchain(ctx);
        self.surface = None;
        self.enter(SurfaceState::Destroyed);
        Ok(())
    }

    /// Acquires the next swapchain image.
    ///
    /// On [`Error::SurfaceLost`] the controller has already moved to
    /// `Suspended` and waits for the next window; do not retry immediately.
    /// A frame still outstanding from an earlier acquire is abandoned.
    pub fn acquire_frame(&mut self, ctx: &mut GraphicsContext) -> Result<Frame> {
        match self.state {
            SurfaceState::Destroyed => return Err(Error::Destroyed),
            SurfaceState::Active => {}
            _ => return Err(Error::NotActive),
        }

        let Some(swapchain) = self.swapchain.as_ref() else {
            return Err(Error::NotActive);
        };
        let (id, size, format) = (swapchain.id, swapchain.config.size, swapchain.config.format);

        if let Some(old) = self.outstanding.take() {
            log::debug!("abandoning unpresented frame #{}", old.serial);
            ctx.discard_image(id, old.image);
        }

        match ctx.acquire_image(id) {
            Ok(image) => {
                self.next_serial += 1;
                self.outstanding = Some(Outstanding {
                    serial: self.next_serial,
                    image,
                });
                log::trace!("acquired frame #{} ({:?})", self.next_serial, image);
                Ok(Frame {
                    generation: self.generation(),
                    swapchain: id,
                    image,
                    serial: self.next_serial,
                    size,
                    format,
                })
            }
            Err(Error::SurfaceLost) => {
                self.lose_surface(ctx);
                Err(Error::SurfaceLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Presents a frame previously returned by [`acquire_frame`](Self::acquire_frame).
    pub fn present(&mut self, ctx: &mut GraphicsContext, frame: Frame) -> Result<()> {
        let id = self.check_current(&frame)?;

        self.outstanding = None;
        match ctx.present_image(id, frame.image) {
            Ok(()) => Ok(()),
            Err(Error::SurfaceLost) => {
                self.lose_surface(ctx);
                Err(Error::SurfaceLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Clears the frame's image to `color` without presenting it.
    pub fn clear(&mut self, ctx: &mut GraphicsContext, frame: &Frame, color: wgpu::Color) -> Result<()> {
        let id = self.check_current(frame)?;
        ctx.clear_image(id, frame.image, color)
    }

    /// Checks that `frame` is the one outstanding on the live swapchain.
    fn check_current(&self, frame: &Frame) -> Result<SwapchainId> {
        if self.state == SurfaceState::Destroyed {
            return Err(Error::Destroyed);
        }

        let current = self.generation();
        let stale = Error::StalePresent {
            frame: frame.generation.0,
            current: current.0,
        };

        if frame.generation != current {
            return Err(stale);
        }
        if self.state != SurfaceState::Active {
            return Err(Error::NotActive);
        }

        match (&self.swapchain, self.outstanding) {
            (Some(swapchain), Some(outstanding))
                if swapchain.id == frame.swapchain && outstanding.serial == frame.serial =>
            {
                Ok(swapchain.id)
            }
            // Same generation but an older swapchain epoch or an abandoned frame.
            _ => Err(stale),
        }
    }

    fn build(
        &mut self,
        ctx: &mut GraphicsContext,
        window: WindowHandle,
        size: SurfaceSize,
        generation: Generation,
    ) -> Result<()> {
        debug_assert!(self.swapchain.is_none(), "previous swapchain must be released first");

        let requested = SwapchainConfig::derive(size, generation, ctx.capabilities(), &self.prefs)?;
        let (id, config) = ctx.create_swapchain(&window, &requested)?;

        log::info!(
            "swapchain {:?} built for {:?}: {} {:?} {:?} {}",
            id,
            window.id(),
            config.size,
            config.format,
            config.present_mode,
            generation
        );

        self.surface = Some(Surface {
            window: Some(window),
            size,
            format: config.format,
            present_mode: config.present_mode,
            generation,
        });
        self.swapchain = Some(Swapchain { id, config });
        self.swapchains_built += 1;
        self.resize_failed = false;
        Ok(())
    }

    fn release_swapchain(&mut self, ctx: &mut GraphicsContext) {
        let Some(swapchain) = self.swapchain.take() else {
            return;
        };

        if let Some(old) = self.outstanding.take() {
            ctx.discard_image(swapchain.id, old.image);
        }
        ctx.destroy_swapchain(swapchain.id);
        self.swapchains_released += 1;
        log::debug!("swapchain {:?} released", swapchain.id);
    }

    fn drop_window(&mut self) {
        self.resize_failed = false;
        if let Some(surface) = self.surface.as_mut() {
            surface.window = None;
        }
    }

    fn lose_surface(&mut self, ctx: &mut GraphicsContext) {
        log::warn!("surface lost at {}; waiting for a new window", self.generation());
        self.release_swapchain(ctx);
        self.drop_window();
        self.enter(SurfaceState::Suspended);
    }

    fn enter(&mut self, next: SurfaceState) {
        if self.state != next {
            log::info!("surface {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}
