//! The Vulkan render context.
//!
//! [`RenderContext`] owns every long-lived GPU object of the Vulkan backend.
//! It is created by [`VulkanBackend::initialize`](super::VulkanBackend) and
//! dropped on shutdown; nothing else holds Vulkan handles.
//!
//! # Destruction order
//!
//! Fields drop in declaration order, which is also the order Vulkan needs:
//! 1. Per-frame semaphores and fences
//! 2. Command buffers, then the swapchain with its framebuffers and depth
//!    image
//! 3. Render pass and command pool
//! 4. Device (once the last `Arc` is gone), then surface
//! 5. Instance
//!
//! [`Drop`] waits for the device to go idle before any of that happens.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use ember_core::RendererConfig;
use ember_rhi::RhiResult;
use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::device::Device;
use ember_rhi::instance::{Instance, InstanceDesc};
use ember_rhi::physical_device::{DeviceRequirements, select_physical_device};
use ember_rhi::render_pass::{RenderPass, RenderPassClear};
use ember_rhi::surface::{Surface, SurfaceSource};
use ember_rhi::swapchain::{MAX_FRAMES_IN_FLIGHT, Swapchain};
use ember_rhi::sync::{Fence, Semaphore};

use crate::frame::{FrameTracker, ResizeTracker};

/// Every GPU object the Vulkan backend draws with.
///
/// # Thread Safety
///
/// Owned by [`VulkanBackend`](super::VulkanBackend) and only touched from
/// the thread driving frames.
pub struct RenderContext {
    /// Signaled by acquire, waited on by submit. One per frame slot.
    pub(crate) image_available: Vec<Semaphore>,
    /// Signaled by submit, waited on by present. One per frame slot.
    pub(crate) queue_complete: Vec<Semaphore>,
    /// Signaled when a frame slot's submission has finished.
    pub(crate) in_flight_fences: Vec<Fence>,
    /// One per swapchain image.
    pub(crate) command_buffers: Vec<CommandBuffer>,
    /// Swapchain with its depth image and framebuffers.
    pub(crate) swapchain: Swapchain,
    /// Main render pass; rebuilt with the swapchain if the format changes.
    pub(crate) render_pass: RenderPass,
    pub(crate) command_pool: CommandPool,
    pub(crate) device: Arc<Device>,
    surface: Surface,
    instance: Instance,

    /// Frame slot cycle and swapchain image ownership.
    pub(crate) frames: FrameTracker,
    /// Framebuffer size and whether the swapchain still has to catch up.
    pub(crate) size: ResizeTracker,
    /// Bound on every frame fence wait.
    pub(crate) fence_timeout_ns: u64,
}

impl RenderContext {
    /// Brings up Vulkan for `platform`'s surface.
    ///
    /// Creation order: instance, surface, physical device, logical device,
    /// swapchain, render pass, framebuffers, command pool and buffers,
    /// then one fence and two semaphores per frame slot.
    ///
    /// # Arguments
    ///
    /// * `config` - Validation, device requirements, clear color and fence
    ///   timeout
    /// * `app_name` - Application name reported to the driver
    /// * `platform` - Window providing extensions, surface and size
    ///
    /// # Errors
    ///
    /// Returns the first creation failure. Everything created up to that
    /// point is destroyed in reverse order.
    pub fn new(
        config: &RendererConfig,
        app_name: &str,
        platform: &dyn SurfaceSource,
    ) -> RhiResult<Self> {
        let (width, height) = platform.framebuffer_size();
        info!("Initializing Vulkan render context ({}x{})", width, height);

        let instance = Instance::new(
            &InstanceDesc {
                application_name: app_name.to_string(),
                enable_validation: config.validation_enabled(),
            },
            platform,
        )?;

        let surface = Surface::new(&instance, platform)?;

        let requirements = DeviceRequirements {
            discrete_gpu: config.require_discrete_gpu,
            compute: config.require_compute_queue,
            ..Default::default()
        };
        let physical_device = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            &requirements,
        )?;

        let device = Device::new(&instance, physical_device)?;

        let mut swapchain = Swapchain::new(&instance, device.clone(), &surface, width, height)?;

        let render_pass = RenderPass::new(
            device.clone(),
            swapchain.render_pass_formats(),
            full_area(swapchain.extent()),
            RenderPassClear {
                color: config.clear_color,
                ..Default::default()
            },
        )?;

        swapchain.regenerate_framebuffers(&render_pass)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffers = command_pool.allocate_primary(swapchain.image_count())?;

        let mut image_available = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut queue_complete = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        let mut in_flight_fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            image_available.push(Semaphore::new(device.clone())?);
            queue_complete.push(Semaphore::new(device.clone())?);
            // Signaled so the first wait on each slot returns at once.
            in_flight_fences.push(Fence::new(device.clone(), true)?);
        }

        let frames = FrameTracker::new(MAX_FRAMES_IN_FLIGHT, swapchain.image_count() as usize);

        info!(
            "Render context ready: {} swapchain images, {} frames in flight",
            swapchain.image_count(),
            MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            image_available,
            queue_complete,
            in_flight_fences,
            command_buffers,
            swapchain,
            render_pass,
            command_pool,
            device,
            surface,
            instance,
            frames,
            size: ResizeTracker::new(width, height),
            fence_timeout_ns: config.fence_timeout_ns(),
        })
    }

    /// Records a framebuffer resize. The rebuild happens on the next frame.
    pub fn resized(&mut self, width: u32, height: u32) {
        self.size.resized(width, height);

        debug!(
            "Framebuffer resized to {}x{} (generation {})",
            width,
            height,
            self.size.size_generation()
        );
    }

    /// Idles the device and rebuilds the swapchain, and the render pass if
    /// the surface format changed, for the current framebuffer size.
    pub fn recreate_swapchain(&mut self) -> RhiResult<()> {
        let mut result = self.swapchain.recreate(
            self.size.width(),
            self.size.height(),
            &mut self.render_pass,
        );
        if result.is_ok() {
            result = self.on_swapchain_rebuilt();
        }

        if let Err(e) = &result {
            error!("Swapchain rebuild failed: {}", e);
        }
        result
    }

    /// Brings dependent state in line with a freshly built swapchain:
    /// render area, command buffer count, image ownership and the pending
    /// resize.
    ///
    /// The device is idle at this point: every rebuild path waits for it
    /// before destroying the old swapchain.
    pub fn on_swapchain_rebuilt(&mut self) -> RhiResult<()> {
        let extent = self.swapchain.extent();
        self.render_pass.set_render_area(full_area(extent));

        let image_count = self.swapchain.image_count();
        if self.command_buffers.len() != image_count as usize {
            debug!(
                "Swapchain image count changed {} -> {}, reallocating command buffers",
                self.command_buffers.len(),
                image_count
            );

            for buffer in &mut self.command_buffers {
                buffer.free(&self.command_pool)?;
            }
            self.command_buffers = self.command_pool.allocate_primary(image_count)?;
        }

        self.frames.reset_images(image_count as usize);
        self.size.mark_rebuilt();

        Ok(())
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn frames(&self) -> &FrameTracker {
        &self.frames
    }

    #[inline]
    pub fn size(&self) -> &ResizeTracker {
        &self.size
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        info!("Destroying render context");

        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle: {}", e);
        }
    }
}

/// Render area / scissor covering the whole of `extent`.
pub fn full_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Full-extent viewport with Y pointing up.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}
