//! Vulkan frame driver.
//!
//! [`VulkanBackend`] turns the [`RendererBackend`] calls into the Vulkan
//! frame sequence. A frame that begins successfully goes through:
//!
//! 1. Wait on the frame slot's fence
//! 2. Acquire a swapchain image
//! 3. Wait on the fence of the slot that last rendered to that image
//! 4. Begin the command buffer and the main render pass
//!
//! and on `end_frame`:
//!
//! 5. End the render pass and the command buffer
//! 6. Reset the fence and submit
//! 7. Present and move to the next frame slot
//!
//! Resizes, minimized windows and out-of-date swapchains skip the frame
//! instead of failing it. See [`ResizeTracker`](crate::frame::ResizeTracker).
//!
//! # Example
//!
//! ```no_run
//! use ember_core::RendererConfig;
//! use ember_renderer::{RendererBackend, VulkanBackend};
//! use ember_rhi::surface::SurfaceSource;
//!
//! # fn example(window: &dyn SurfaceSource) -> Result<(), ember_rhi::RhiError> {
//! let mut backend = VulkanBackend::new(RendererConfig::default());
//! backend.initialize("Ember", window)?;
//!
//! if backend.begin_frame(0.016)? {
//!     backend.end_frame(0.016)?;
//! }
//! # Ok(())
//! # }
//! ```

use ash::vk;
use tracing::{debug, info, trace, warn};

use ember_core::RendererConfig;
use ember_rhi::surface::SurfaceSource;
use ember_rhi::swapchain::{AcquireOutcome, PresentOutcome, RebuildTarget};
use ember_rhi::{RhiError, RhiResult};

use super::context::{RenderContext, flipped_viewport, full_area};
use crate::backend::RendererBackend;
use crate::frame::FrameAction;

/// Vulkan implementation of [`RendererBackend`].
///
/// Holds no GPU state until [`RendererBackend::initialize`] succeeds.
///
/// # Thread Safety
///
/// Every frame call takes `&mut self`; the backend is driven from the event
/// loop thread that owns the window.
pub struct VulkanBackend {
    /// Settings applied when the context is created.
    config: RendererConfig,
    /// GPU state; `None` before `initialize` and after `shutdown`.
    context: Option<RenderContext>,
}

impl VulkanBackend {
    /// Creates an uninitialized backend.
    ///
    /// # Arguments
    ///
    /// * `config` - Validation, device requirements, clear color and fence
    ///   timeout
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            context: None,
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// Returns the render context, if initialized.
    #[inline]
    pub fn context(&self) -> Option<&RenderContext> {
        self.context.as_ref()
    }

    fn context_mut(&mut self) -> RhiResult<&mut RenderContext> {
        self.context.as_mut().ok_or(RhiError::NotInitialized)
    }
}

impl RendererBackend for VulkanBackend {
    /// Creates the instance, surface, device, swapchain, render pass,
    /// command buffers and per-frame sync objects.
    ///
    /// Calling this again while initialized logs a warning and does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object cannot be created or no
    /// physical device meets the configured requirements. Objects created
    /// before the failure are destroyed.
    fn initialize(&mut self, app_name: &str, platform: &dyn SurfaceSource) -> RhiResult<()> {
        if self.context.is_some() {
            warn!("Vulkan backend already initialized");
            return Ok(());
        }

        self.context = Some(RenderContext::new(&self.config, app_name, platform)?);
        info!("Vulkan backend initialized");
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.context.take().is_some() {
            info!("Vulkan backend shut down");
        }
    }

    fn resized(&mut self, width: u32, height: u32) {
        match self.context.as_mut() {
            Some(context) => context.resized(width, height),
            None => debug!("Ignoring resize before initialization"),
        }
    }

    /// Waits for the frame slot, acquires an image and starts recording
    /// into it with the main render pass begun.
    ///
    /// # Returns
    ///
    /// `Ok(true)` when the frame is recording. `Ok(false)` when it was
    /// skipped: the framebuffer is 0x0, a pending resize was just applied,
    /// or acquire found the swapchain out of date and rebuilt it.
    ///
    /// # Errors
    ///
    /// * [`RhiError::NotInitialized`] before `initialize`
    /// * [`RhiError::FenceTimeout`] if a fence wait exceeds the configured
    ///   timeout
    /// * Any acquire, rebuild or recording failure
    fn begin_frame(&mut self, _delta_time: f32) -> RhiResult<bool> {
        let context = self.context_mut()?;

        match context.size.next_action() {
            FrameAction::SkipMinimized => {
                trace!("Framebuffer is 0x0, skipping frame");
                return Ok(false);
            }
            FrameAction::Rebuild => {
                context.recreate_swapchain()?;
                debug!("Swapchain rebuilt after resize, skipping frame");
                return Ok(false);
            }
            FrameAction::Render => {}
        }

        let frame = context.frames.current_frame();
        let timeout_ns = context.fence_timeout_ns;

        context.in_flight_fences[frame].wait(timeout_ns)?;

        let outcome = context.swapchain.acquire_next_image(
            u64::MAX,
            context.image_available[frame].handle(),
            vk::Fence::null(),
            RebuildTarget {
                render_pass: &mut context.render_pass,
                width: context.size.width(),
                height: context.size.height(),
            },
        )?;

        let image_index = match outcome {
            AcquireOutcome::Ready { image_index, .. } => image_index,
            AcquireOutcome::Recreated => {
                context.on_swapchain_rebuilt()?;
                debug!("Swapchain rebuilt on acquire, skipping frame");
                return Ok(false);
            }
        };

        if let Some(previous_slot) = context.frames.claim_image(image_index) {
            trace!(
                "Image {} still in use by frame slot {}, waiting",
                image_index, previous_slot
            );
            context.in_flight_fences[previous_slot].wait(timeout_ns)?;
        }

        let extent = context.swapchain.extent();
        let framebuffer = context.swapchain.framebuffer(image_index).ok_or_else(|| {
            RhiError::SwapchainError(format!("No framebuffer for image {}", image_index))
        })?;
        let command_buffer = context
            .command_buffers
            .get_mut(image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!("No command buffer for image {}", image_index))
            })?;

        command_buffer.begin(false, false, false)?;
        command_buffer.set_viewport(&flipped_viewport(extent));
        command_buffer.set_scissor(&full_area(extent));

        context.render_pass.begin(command_buffer, framebuffer)?;

        trace!("Frame slot {} recording into image {}", frame, image_index);
        Ok(true)
    }

    /// Ends recording, submits the command buffer and presents the image.
    ///
    /// The slot's fence is reset immediately before submission. A present that finds the swapchain out of date or suboptimal rebuilds
    /// it; the frame still counts as finished.
    ///
    /// # Errors
    ///
    /// * [`RhiError::NotInitialized`] before `initialize`
    /// * [`RhiError::InvalidCommandBufferState`] if no frame is recording
    /// * Any submit, present or rebuild failure
    fn end_frame(&mut self, _delta_time: f32) -> RhiResult<()> {
        let context = self.context_mut()?;

        let frame = context.frames.current_frame();
        let image_index = context.frames.image_index();

        let command_buffer = context
            .command_buffers
            .get_mut(image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!("No command buffer for image {}", image_index))
            })?;

        context.render_pass.end(command_buffer)?;
        command_buffer.end()?;

        let wait_semaphores = [context.image_available[frame].handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [context.queue_complete[frame].handle()];
        let command_buffers = [command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = &mut context.in_flight_fences[frame];
        fence.reset()?;

        unsafe {
            context
                .device
                .submit_graphics(std::slice::from_ref(&submit_info), fence.handle())?;
        }
        command_buffer.mark_submitted()?;

        let outcome = context.swapchain.present(
            context.device.present_queue(),
            context.queue_complete[frame].handle(),
            image_index,
            RebuildTarget {
                render_pass: &mut context.render_pass,
                width: context.size.width(),
                height: context.size.height(),
            },
        )?;

        if outcome == PresentOutcome::Recreated {
            context.on_swapchain_rebuilt()?;
            debug!("Swapchain rebuilt on present");
        }

        context.frames.advance();
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_calls_before_initialize_fail() {
        let mut backend = VulkanBackend::new(RendererConfig::default());

        assert!(!backend.is_initialized());
        assert!(matches!(
            backend.begin_frame(0.016),
            Err(RhiError::NotInitialized)
        ));
        assert!(matches!(
            backend.end_frame(0.016),
            Err(RhiError::NotInitialized)
        ));
    }

    #[test]
    fn test_resize_and_shutdown_before_initialize_are_noops() {
        let mut backend = VulkanBackend::new(RendererConfig::default());
        backend.resized(1024, 768);
        backend.shutdown();
        assert!(backend.context().is_none());
    }
}
