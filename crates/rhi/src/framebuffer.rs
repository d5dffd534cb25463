//! Framebuffers binding swapchain images to the main render pass.
//!
//! Each framebuffer pairs one swapchain color view with the depth view
//! shared by all of them. Framebuffers are created against a specific
//! render pass handle, so they are rebuilt whenever the render pass or the
//! swapchain is.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::error::RhiResult;
use crate::render_pass::RenderPass;

/// Vulkan framebuffer wrapper.
pub struct Framebuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan framebuffer handle.
    framebuffer: vk::Framebuffer,
    /// Attachment views in render pass order.
    attachments: Vec<vk::ImageView>,
    /// Framebuffer size in pixels.
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a single-layer framebuffer.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `render_pass` - Render pass the framebuffer must be compatible with
    /// * `extent` - Width and height in pixels
    /// * `attachments` - Views in the render pass's attachment order
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        attachments: &[vk::ImageView],
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        Ok(Self {
            device,
            framebuffer,
            attachments: attachments.to_vec(),
            extent,
        })
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn attachments(&self) -> &[vk::ImageView] {
        &self.attachments
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Attachment list for one swapchain image: its color view, then the
/// shared depth view. Order matches the render pass attachments.
pub fn framebuffer_attachments(
    color_view: vk::ImageView,
    depth_view: vk::ImageView,
) -> [vk::ImageView; 2] {
    [color_view, depth_view]
}

/// One framebuffer per color view, all sharing `depth_view`.
///
/// # Errors
///
/// Returns the first framebuffer creation error. Framebuffers already
/// created are destroyed.
pub fn create_framebuffers(
    device: &Arc<Device>,
    render_pass: &RenderPass,
    extent: vk::Extent2D,
    color_views: &[vk::ImageView],
    depth_view: vk::ImageView,
) -> RhiResult<Vec<Framebuffer>> {
    color_views
        .iter()
        .map(|&color_view| {
            Framebuffer::new(
                device.clone(),
                render_pass,
                extent,
                &framebuffer_attachments(color_view, depth_view),
            )
        })
        .collect()
}
