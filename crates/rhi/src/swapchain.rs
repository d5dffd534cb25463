//! Swapchain management.
//!
//! [`Swapchain`] owns the `VkSwapchainKHR`, its color image views, the
//! shared depth image and one framebuffer per swapchain image. It is never
//! patched in place: [`Swapchain::recreate`] idles the device, destroys
//! everything and builds a fresh generation.
//!
//! # Overview
//!
//! Stale-surface results are handled here, not by callers.
//! [`Swapchain::acquire_next_image`] and [`Swapchain::present`] rebuild on
//! `ERROR_OUT_OF_DATE_KHR` (and on `SUBOPTIMAL_KHR` when presenting) and
//! report [`AcquireOutcome::Recreated`] / [`PresentOutcome::Recreated`] so
//! the frame can be skipped. Every other failure is returned as an error.
//!
//! A rebuild may choose a different surface format. The render pass passed
//! in through [`RebuildTarget`] is rebuilt for the new format before the
//! framebuffers are created against it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::instance::Instance;
//! use ember_rhi::render_pass::{RenderPass, RenderPassClear};
//! use ember_rhi::surface::Surface;
//! use ember_rhi::swapchain::Swapchain;
//! use ember_rhi::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: &Surface)
//! #     -> Result<(), ember_rhi::RhiError> {
//! let mut swapchain = Swapchain::new(instance, device.clone(), surface, 1280, 720)?;
//!
//! let render_area = vk::Rect2D {
//!     offset: vk::Offset2D { x: 0, y: 0 },
//!     extent: swapchain.extent(),
//! };
//! let render_pass = RenderPass::new(
//!     device,
//!     swapchain.render_pass_formats(),
//!     render_area,
//!     RenderPassClear::default(),
//! )?;
//! swapchain.regenerate_framebuffers(&render_pass)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::framebuffer::{Framebuffer, create_framebuffers};
use crate::image::{Image, ImageDesc};
use crate::instance::Instance;
use crate::render_pass::{RenderPass, RenderPassFormats};
use crate::surface::Surface;

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// What a surface supports on a given physical device.
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupportDetails {
    /// Image count and extent limits, current extent and transform.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries capabilities, formats and present modes of `surface`.
    ///
    /// # Arguments
    ///
    /// * `physical_device` - The device the swapchain will live on
    /// * `surface` - The window surface
    /// * `surface_loader` - `VK_KHR_surface` function table
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three surface queries fails.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unbounded".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns `true` if at least one format and one present mode exist.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Everything decided about a swapchain before it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    /// Chosen image format and color space.
    pub surface_format: vk::SurfaceFormatKHR,
    /// Chosen presentation mode.
    pub present_mode: vk::PresentModeKHR,
    /// Image extent after clamping to the surface limits.
    pub extent: vk::Extent2D,
    /// Minimum image count requested from the driver.
    pub image_count: u32,
}

impl SwapchainSettings {
    /// Chooses format, present mode, extent and image count for a
    /// `width` x `height` request. Deterministic for identical input.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface reports no
    /// formats or no present modes.
    pub fn choose(support: &SwapchainSupportDetails, width: u32, height: u32) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Surface reports no formats or present modes".to_string(),
            ));
        }

        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: choose_image_count(&support.capabilities),
        })
    }
}

/// Result of [`Swapchain::acquire_next_image`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready. `suboptimal` images are still rendered to.
    Ready { image_index: u32, suboptimal: bool },
    /// The surface was out of date; the swapchain has been rebuilt and the
    /// frame should be skipped.
    Recreated,
}

/// Result of [`Swapchain::present`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// The surface was out of date or suboptimal; the swapchain has been
    /// rebuilt.
    Recreated,
}

/// What a rebuild triggered from acquire or present needs besides the
/// swapchain itself.
pub struct RebuildTarget<'a> {
    /// Render pass the new framebuffers are created against. Rebuilt in
    /// place if the new swapchain format differs from its color format.
    pub render_pass: &'a mut RenderPass,
    /// Current framebuffer width.
    pub width: u32,
    /// Current framebuffer height.
    pub height: u32,
}

/// Vulkan swapchain with its per-image attachments.
///
/// # Thread Safety
///
/// Acquire, present and rebuild all take `&mut self`. Drive them from the
/// thread that renders.
pub struct Swapchain {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Surface the swapchain presents to. Owned by the caller.
    surface: vk::SurfaceKHR,
    /// `VK_KHR_surface` function table.
    surface_loader: ash::khr::surface::Instance,
    /// `VK_KHR_swapchain` function table.
    swapchain_loader: ash::khr::swapchain::Device,
    /// Vulkan swapchain handle; null between `destroy` and `build`.
    swapchain: vk::SwapchainKHR,
    /// Images owned by the swapchain.
    images: Vec<vk::Image>,
    /// One color view per image.
    image_views: Vec<vk::ImageView>,
    /// Settings the current generation was built with.
    settings: SwapchainSettings,
    /// Depth image shared by every framebuffer.
    depth_attachment: Option<Image>,
    /// One framebuffer per image, in image order.
    framebuffers: Vec<Framebuffer>,
    /// Number of generations built so far.
    generation: u64,
}

impl Swapchain {
    /// Creates the swapchain, its image views and the depth attachment.
    ///
    /// Framebuffers need the render pass, which in turn needs the chosen
    /// format; call [`Swapchain::regenerate_framebuffers`] once it exists.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance, used to load the swapchain functions
    /// * `device` - The logical device
    /// * `surface` - The window surface to present to
    /// * `width` - Requested width in pixels
    /// * `height` - Requested height in pixels
    ///
    /// # Errors
    ///
    /// Returns an error if the surface queries fail, the surface is not
    /// adequate, or creating the swapchain, its views or the depth image
    /// fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: &Surface,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());

        let mut swapchain = Self {
            device,
            surface: surface.handle(),
            surface_loader: surface.loader().clone(),
            swapchain_loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            settings: SwapchainSettings {
                surface_format: vk::SurfaceFormatKHR::default(),
                present_mode: vk::PresentModeKHR::FIFO,
                extent: vk::Extent2D::default(),
                image_count: 0,
            },
            depth_attachment: None,
            framebuffers: Vec::new(),
            generation: 0,
        };

        swapchain.build(width, height)?;
        Ok(swapchain)
    }

    fn build(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        let settings = SwapchainSettings::choose(&support, width, height)?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            settings.extent.width,
            settings.extent.height,
            settings.surface_format.format,
            settings.surface_format.color_space,
            settings.present_mode,
            settings.image_count
        );

        let graphics_family = self.device.graphics_family();
        let present_family = self.device.present_family();
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, queue_family_indices_slice) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing mode between graphics ({}) and present ({}) queues",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        self.swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        self.settings = settings;
        self.images = unsafe { self.swapchain_loader.get_swapchain_images(self.swapchain)? };
        self.image_views =
            create_image_views(&self.device, &self.images, settings.surface_format.format)?;

        let depth_format = self.device.depth_format();
        self.depth_attachment = Some(Image::new(
            self.device.clone(),
            &ImageDesc::depth_attachment(settings.extent.width, settings.extent.height, depth_format),
        )?);

        self.generation += 1;
        info!(
            "Swapchain generation {} ready with {} images",
            self.generation,
            self.images.len()
        );

        Ok(())
    }

    /// Rebuilds framebuffers for the current images against `render_pass`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the depth attachment is
    /// missing, or an error if framebuffer creation fails.
    pub fn regenerate_framebuffers(&mut self, render_pass: &RenderPass) -> RhiResult<()> {
        self.framebuffers.clear();

        let depth_view = self
            .depth_attachment
            .as_ref()
            .and_then(Image::view)
            .ok_or_else(|| RhiError::SwapchainError("Depth attachment missing".to_string()))?;

        self.framebuffers = create_framebuffers(
            &self.device,
            render_pass,
            self.settings.extent,
            &self.image_views,
            depth_view,
        )?;

        debug!("Created {} framebuffers", self.framebuffers.len());
        Ok(())
    }

    /// Idles the device, destroys the current generation and builds a new
    /// one for `width` x `height`.
    ///
    /// If the new generation's attachment formats differ from the ones
    /// `render_pass` was built for, the render pass is rebuilt first. The
    /// framebuffers are then created against it.
    ///
    /// # Arguments
    ///
    /// * `width` - Current framebuffer width
    /// * `height` - Current framebuffer height
    /// * `render_pass` - The main render pass
    ///
    /// # Errors
    ///
    /// Returns an error if idling the device, building the swapchain,
    /// rebuilding the render pass or creating framebuffers fails. The
    /// swapchain has no framebuffers afterwards and must not be rendered
    /// with.
    pub fn recreate(
        &mut self,
        width: u32,
        height: u32,
        render_pass: &mut RenderPass,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;

        info!("Recreating swapchain for {}x{}", width, height);

        self.destroy();
        self.build(width, height)?;

        let formats = self.render_pass_formats();
        if render_pass.formats().needs_rebuild(formats) {
            render_pass.recreate(formats)?;
        }

        self.regenerate_framebuffers(render_pass)
    }

    /// Destroys framebuffers, depth attachment, image views and the
    /// swapchain. Safe to call more than once.
    pub fn destroy(&mut self) {
        self.framebuffers.clear();
        self.depth_attachment = None;

        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
        self.images.clear();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            self.swapchain = vk::SwapchainKHR::null();
            debug!("Swapchain generation {} destroyed", self.generation);
        }
    }

    /// Acquires the next image, rebuilding the swapchain if the surface is
    /// out of date.
    ///
    /// # Arguments
    ///
    /// * `timeout_ns` - Acquire timeout; `u64::MAX` waits indefinitely
    /// * `semaphore` - Signaled when the image is ready to be written
    /// * `fence` - Optional fence to signal, or `vk::Fence::null()`
    /// * `target` - Render pass and size used if a rebuild is needed
    ///
    /// # Returns
    ///
    /// [`AcquireOutcome::Ready`] with the image index, or
    /// [`AcquireOutcome::Recreated`] after a rebuild. A recreated result
    /// means nothing was acquired and the frame should be skipped.
    ///
    /// # Errors
    ///
    /// Returns an error for any acquire failure other than out-of-date, or
    /// if the rebuild fails.
    pub fn acquire_next_image(
        &mut self,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
        target: RebuildTarget<'_>,
    ) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, fence)
        };

        resolve_acquire(result, move || {
            self.recreate(target.width, target.height, target.render_pass)
        })
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals,
    /// rebuilding the swapchain if the surface is out of date or
    /// suboptimal.
    ///
    /// # Arguments
    ///
    /// * `present_queue` - Queue from the device's present family
    /// * `wait_semaphore` - Signaled when rendering to the image finished
    /// * `image_index` - Index returned by [`Swapchain::acquire_next_image`]
    /// * `target` - Render pass and size used if a rebuild is needed
    ///
    /// # Errors
    ///
    /// Returns an error for any present failure other than out-of-date or
    /// suboptimal, or if the rebuild fails.
    pub fn present(
        &mut self,
        present_queue: vk::Queue,
        wait_semaphore: vk::Semaphore,
        image_index: u32,
        target: RebuildTarget<'_>,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(present_queue, &present_info)
        };

        resolve_present(result, move || {
            self.recreate(target.width, target.height, target.render_pass)
        })
    }

    /// Returns the Vulkan swapchain handle.
    ///
    /// This handle can be used directly with Vulkan API calls.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn settings(&self) -> SwapchainSettings {
        self.settings
    }

    /// Returns the color format of the current images.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    /// Attachment formats a render pass for this generation must use.
    #[inline]
    pub fn render_pass_formats(&self) -> RenderPassFormats {
        RenderPassFormats {
            color: self.format(),
            depth: self.device.depth_format(),
        }
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.settings.present_mode
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&Image> {
        self.depth_attachment.as_ref()
    }

    /// Returns the framebuffer for `image_index`, if it exists.
    #[inline]
    pub fn framebuffer(&self, image_index: u32) -> Option<&Framebuffer> {
        self.framebuffers.get(image_index as usize)
    }

    #[inline]
    pub fn framebuffers(&self) -> &[Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn max_frames_in_flight(&self) -> usize {
        MAX_FRAMES_IN_FLIGHT
    }

    /// Incremented every time a new swapchain is built.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
        info!("Swapchain destroyed");
    }
}

/// Maps a raw acquire result to an outcome.
///
/// Out-of-date runs `rebuild` exactly once and yields
/// [`AcquireOutcome::Recreated`]. Suboptimal is tolerated. Anything else is
/// an error and `rebuild` is not called.
pub fn resolve_acquire<F>(
    result: Result<(u32, bool), vk::Result>,
    rebuild: F,
) -> RhiResult<AcquireOutcome>
where
    F: FnOnce() -> RhiResult<()>,
{
    match result {
        Ok((image_index, suboptimal)) => {
            if suboptimal {
                debug!("Acquired image {} from a suboptimal swapchain", image_index);
            }
            Ok(AcquireOutcome::Ready {
                image_index,
                suboptimal,
            })
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            debug!("Swapchain out of date on acquire");
            rebuild()?;
            Ok(AcquireOutcome::Recreated)
        }
        Err(e) => {
            warn!("Failed to acquire swapchain image: {:?}", e);
            Err(e.into())
        }
    }
}

/// Maps a raw present result to an outcome.
///
/// Out-of-date and suboptimal both run `rebuild` exactly once. Anything
/// else is an error and `rebuild` is not called.
pub fn resolve_present<F>(result: Result<bool, vk::Result>, rebuild: F) -> RhiResult<PresentOutcome>
where
    F: FnOnce() -> RhiResult<()>,
{
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
            debug!("Swapchain out of date or suboptimal on present");
            rebuild()?;
            Ok(PresentOutcome::Recreated)
        }
        Err(e) => {
            warn!("Failed to present swapchain image: {:?}", e);
            Err(e.into())
        }
    }
}

/// Prefers `B8G8R8A8_UNORM` with `SRGB_NONLINEAR`, otherwise the first
/// reported format. `formats` must not be empty.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let preferred = formats.iter().find(|f| {
        f.format == vk::Format::B8G8R8A8_UNORM && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(&format) = preferred {
        return format;
    }

    warn!(
        "Preferred surface format unavailable, using {:?} / {:?}",
        formats[0].format, formats[0].color_space
    );
    formats[0]
}

/// MAILBOX, then IMMEDIATE, then FIFO (always available).
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    for preferred in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
        if present_modes.contains(&preferred) {
            return preferred;
        }
    }

    warn!("Neither MAILBOX nor IMMEDIATE present mode available, using FIFO");
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's current extent when it is defined, otherwise the
/// requested size, and clamps the result to the surface's min/max extent.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    let requested = if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D { width, height }
    };

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;

    let extent = vk::Extent2D {
        width: requested.width.max(min.width).min(max.width.max(min.width)),
        height: requested.height.max(min.height).min(max.height.max(min.height)),
    };

    debug!(
        "Extent {}x{} (requested {}x{}, min {}x{}, max {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        min.width,
        min.height,
        max.width,
        max.height
    );

    extent
}

/// `min_image_count + 1`, clamped to `max_image_count` when it is non-zero.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for &view in &image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface_format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_unorm() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            surface_format(vk::Format::B8G8R8A8_SRGB),
            surface_format(vk::Format::B8G8R8A8_UNORM),
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_requires_matching_color_space() {
        let formats = vec![
            surface_format(vk::Format::R8G8B8A8_UNORM),
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_order() {
        use vk::PresentModeKHR as Mode;

        assert_eq!(
            choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE, Mode::MAILBOX]),
            Mode::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[Mode::FIFO, Mode::IMMEDIATE]),
            Mode::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&[Mode::FIFO, Mode::FIFO_RELAXED]),
            Mode::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current_extent() {
        let caps = capabilities((1920, 1080), (1, 1), (4096, 4096));
        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_requested_size() {
        let caps = capabilities((u32::MAX, u32::MAX), (100, 100), (2000, 2000));

        let extent = choose_extent(&caps, 3000, 3000);
        assert_eq!((extent.width, extent.height), (2000, 2000));

        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_zero_request_clamps_to_minimum_extent() {
        let caps = capabilities((u32::MAX, u32::MAX), (64, 48), (2000, 2000));
        let extent = choose_extent(&caps, 0, 0);
        assert_eq!((extent.width, extent.height), (64, 48));
    }

    #[test]
    fn test_zero_current_extent_clamps_to_minimum() {
        let caps = capabilities((0, 0), (1, 1), (2000, 2000));
        let extent = choose_extent(&caps, 0, 0);
        assert_eq!((extent.width, extent.height), (1, 1));
    }

    #[test]
    fn test_choose_image_count() {
        let mut caps = capabilities((800, 600), (1, 1), (800, 600));
        assert_eq!(choose_image_count(&caps), 3);

        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);

        caps.max_image_count = 0;
        caps.min_image_count = 4;
        assert_eq!(choose_image_count(&caps), 5);
    }

    #[test]
    fn test_image_count_never_below_minimum() {
        for (min, max) in [(1, 0), (2, 2), (3, 8), (2, 3)] {
            let caps = vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                ..Default::default()
            };
            assert!(choose_image_count(&caps) >= min);
        }
    }

    #[test]
    fn test_settings_are_stable_for_identical_requests() {
        let support = SwapchainSupportDetails {
            capabilities: capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096)),
            formats: vec![
                surface_format(vk::Format::B8G8R8A8_SRGB),
                surface_format(vk::Format::B8G8R8A8_UNORM),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        let first = SwapchainSettings::choose(&support, 1024, 768).unwrap();
        let second = SwapchainSettings::choose(&support, 1024, 768).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.image_count, 3);
        assert_eq!(first.surface_format.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_format_change_across_rebuild_flags_render_pass() {
        let caps = capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096));
        let before = SwapchainSupportDetails {
            capabilities: caps,
            formats: vec![surface_format(vk::Format::B8G8R8A8_UNORM)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let after = SwapchainSupportDetails {
            capabilities: caps,
            formats: vec![surface_format(vk::Format::R8G8B8A8_UNORM)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let pass_formats = |settings: SwapchainSettings| RenderPassFormats {
            color: settings.surface_format.format,
            depth: vk::Format::D32_SFLOAT,
        };

        let built = pass_formats(SwapchainSettings::choose(&before, 800, 600).unwrap());
        let same = pass_formats(SwapchainSettings::choose(&before, 1024, 768).unwrap());
        let changed = pass_formats(SwapchainSettings::choose(&after, 1024, 768).unwrap());

        assert!(!built.needs_rebuild(same));
        assert!(built.needs_rebuild(changed));
    }

    #[test]
    fn test_settings_reject_inadequate_support() {
        let support = SwapchainSupportDetails {
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
            ..Default::default()
        };

        assert!(matches!(
            SwapchainSettings::choose(&support, 800, 600),
            Err(RhiError::SwapchainError(_))
        ));
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate.clone()
        };
        assert!(!no_modes.is_adequate());
    }

    #[test]
    fn test_acquire_out_of_date_rebuilds_once() {
        let mut rebuilds = 0;
        let outcome = resolve_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), || {
            rebuilds += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(outcome, AcquireOutcome::Recreated);
        assert_eq!(rebuilds, 1);
    }

    #[test]
    fn test_acquire_suboptimal_does_not_rebuild() {
        let mut rebuilds = 0;
        let outcome = resolve_acquire(Ok((2, true)), || {
            rebuilds += 1;
            Ok(())
        })
        .unwrap();

        assert_eq!(
            outcome,
            AcquireOutcome::Ready {
                image_index: 2,
                suboptimal: true
            }
        );
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn test_acquire_other_errors_are_fatal() {
        let mut rebuilds = 0;
        let result = resolve_acquire(Err(vk::Result::ERROR_DEVICE_LOST), || {
            rebuilds += 1;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn test_present_suboptimal_and_out_of_date_rebuild_once() {
        for result in [
            Ok(true),
            Err(vk::Result::SUBOPTIMAL_KHR),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR),
        ] {
            let mut rebuilds = 0;
            let outcome = resolve_present(result, || {
                rebuilds += 1;
                Ok(())
            })
            .unwrap();

            assert_eq!(outcome, PresentOutcome::Recreated);
            assert_eq!(rebuilds, 1);
        }
    }

    #[test]
    fn test_present_success_does_not_rebuild() {
        let outcome = resolve_present(Ok(false), || panic!("no rebuild expected")).unwrap();
        assert_eq!(outcome, PresentOutcome::Presented);
    }

    #[test]
    fn test_present_other_errors_are_fatal() {
        let result = resolve_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR), || {
            panic!("no rebuild expected")
        });
        assert!(matches!(
            result,
            Err(RhiError::VulkanError(vk::Result::ERROR_SURFACE_LOST_KHR))
        ));
    }

    #[test]
    fn test_failed_rebuild_propagates() {
        let result = resolve_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), || {
            Err(RhiError::SwapchainError("rebuild failed".to_string()))
        });
        assert!(matches!(result, Err(RhiError::SwapchainError(_))));
    }
}
