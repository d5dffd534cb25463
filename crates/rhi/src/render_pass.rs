//! The main render pass.
//!
//! One color attachment (the swapchain image) and one depth attachment, a
//! single graphics subpass, and an external → subpass dependency that holds
//! color writes until the presentation engine has finished reading the
//! previous contents of the image.
//!
//! # Lifecycle
//!
//! The render pass belongs to a swapchain generation. When a rebuilt
//! swapchain reports a different color format (or the depth format changes)
//! the pass is rebuilt in place with [`RenderPass::recreate`] before any
//! framebuffer is created against it. A rebuild that keeps both formats
//! only updates the render area.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::render_pass::{RenderPass, RenderPassClear, RenderPassFormats};
//! use ember_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let formats = RenderPassFormats {
//!     color: vk::Format::B8G8R8A8_UNORM,
//!     depth: device.depth_format(),
//! };
//! let render_area = vk::Rect2D {
//!     offset: vk::Offset2D { x: 0, y: 0 },
//!     extent: vk::Extent2D { width: 800, height: 600 },
//! };
//! let render_pass = RenderPass::new(device, formats, render_area, RenderPassClear::default())?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::command::CommandBuffer;
use crate::device::Device;
use crate::error::RhiResult;
use crate::framebuffer::Framebuffer;

/// Clear values applied every time the pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassClear {
    /// RGBA clear color of the color attachment.
    pub color: [f32; 4],
    /// Depth clear value, `1.0` for the far plane.
    pub depth: f32,
    /// Stencil clear value.
    pub stencil: u32,
}

impl Default for RenderPassClear {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.2, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Attachment formats a render pass was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassFormats {
    /// Format of the color attachment; the swapchain image format.
    pub color: vk::Format,
    /// Format of the depth attachment; the device's detected depth format.
    pub depth: vk::Format,
}

impl RenderPassFormats {
    /// Returns `true` when a pass built for `self` cannot be used with
    /// attachments of `wanted` formats and must be rebuilt.
    #[inline]
    pub fn needs_rebuild(&self, wanted: RenderPassFormats) -> bool {
        *self != wanted
    }
}

/// Vulkan render pass wrapper.
///
/// Carries the render area and clear values used by [`RenderPass::begin`],
/// so recording a frame only needs a command buffer and a framebuffer.
pub struct RenderPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan render pass handle.
    render_pass: vk::RenderPass,
    /// Attachment formats the handle was created with.
    formats: RenderPassFormats,
    /// Region cleared and rendered every frame; follows the swapchain extent.
    render_area: vk::Rect2D,
    /// Clear values in use.
    clear: RenderPassClear,
}

impl RenderPass {
    /// Creates the main render pass.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `formats` - Color and depth attachment formats
    /// * `render_area` - Initial render area, normally the full swapchain extent
    /// * `clear` - Clear values used when the pass begins
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<Device>,
        formats: RenderPassFormats,
        render_area: vk::Rect2D,
        clear: RenderPassClear,
    ) -> RhiResult<Self> {
        let render_pass = create_render_pass(&device, formats)?;

        info!(
            "Render pass created (color {:?}, depth {:?})",
            formats.color, formats.depth
        );

        Ok(Self {
            device,
            render_pass,
            formats,
            render_area,
            clear,
        })
    }

    /// Rebuilds the handle for new attachment formats.
    ///
    /// The render area and clear values are kept. Every framebuffer created
    /// against the old handle must already be destroyed and the device must
    /// be idle.
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails. The old handle is
    /// left untouched in that case.
    pub fn recreate(&mut self, formats: RenderPassFormats) -> RhiResult<()> {
        let render_pass = create_render_pass(&self.device, formats)?;

        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }

        info!(
            "Render pass rebuilt: color {:?} -> {:?}, depth {:?} -> {:?}",
            self.formats.color, formats.color, self.formats.depth, formats.depth
        );

        self.render_pass = render_pass;
        self.formats = formats;
        Ok(())
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the attachment formats of the current handle.
    #[inline]
    pub fn formats(&self) -> RenderPassFormats {
        self.formats
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }

    /// Tracks the swapchain extent after a rebuild.
    pub fn set_render_area(&mut self, render_area: vk::Rect2D) {
        if self.render_area != render_area {
            debug!(
                "Render area now {}x{} at ({}, {})",
                render_area.extent.width,
                render_area.extent.height,
                render_area.offset.x,
                render_area.offset.y
            );
            self.render_area = render_area;
        }
    }

    #[inline]
    pub fn clear(&self) -> RenderPassClear {
        self.clear
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear.color = color;
    }

    /// Clear values in attachment order: color, then depth/stencil.
    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear.depth,
                    stencil: self.clear.stencil,
                },
            },
        ]
    }

    /// Begins the pass on `command_buffer` with inline subpass contents.
    ///
    /// # Arguments
    ///
    /// * `command_buffer` - A buffer in the `Recording` state
    /// * `framebuffer` - The framebuffer of the acquired swapchain image
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`](crate::RhiError::InvalidCommandBufferState)
    /// if the buffer is not recording or is already inside a render pass.
    pub fn begin(
        &self,
        command_buffer: &mut CommandBuffer,
        framebuffer: &Framebuffer,
    ) -> RhiResult<()> {
        let clear_values = self.clear_values();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass)
            .framebuffer(framebuffer.handle())
            .render_area(self.render_area)
            .clear_values(&clear_values);

        command_buffer.begin_render_pass(&begin_info)
    }

    /// Ends the pass on `command_buffer`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`](crate::RhiError::InvalidCommandBufferState)
    /// if the buffer is not inside a render pass.
    pub fn end(&self, command_buffer: &mut CommandBuffer) -> RhiResult<()> {
        command_buffer.end_render_pass()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

fn create_render_pass(device: &Device, formats: RenderPassFormats) -> RhiResult<vk::RenderPass> {
    let attachments = attachment_descriptions(formats.color, formats.depth);

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)];

    let dependencies = [external_dependency()];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };
    Ok(render_pass)
}

/// Color attachment at index 0, depth at index 1.
pub fn attachment_descriptions(
    color_format: vk::Format,
    depth_format: vk::Format,
) -> [vk::AttachmentDescription; 2] {
    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    [color, depth]
}

/// Stalls the subpass's color writes until the previous frame's color
/// output stage has finished with the image.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
}
