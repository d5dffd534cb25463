//! Allocated images.
//!
//! [`Image`] owns a `VkImage`, its gpu-allocator allocation and an optional
//! view. The swapchain uses it for the shared depth attachment.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::image::{Image, ImageDesc};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let desc = ImageDesc::depth_attachment(1280, 720, device.depth_format());
//! let depth = Image::new(device, &desc)?;
//! assert!(depth.view().is_some());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Parameters for [`Image::new`].
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    /// Debug name passed to the allocator.
    pub name: &'static str,
    /// Width in pixels; must be non-zero.
    pub width: u32,
    /// Height in pixels; must be non-zero.
    pub height: u32,
    /// Image format.
    pub format: vk::Format,
    /// Linear or optimal tiling.
    pub tiling: vk::ImageTiling,
    /// Usage flags.
    pub usage: vk::ImageUsageFlags,
    /// Memory location for the allocation.
    pub location: MemoryLocation,
    /// Aspect of the view to create, or `None` for no view.
    pub view_aspect: Option<vk::ImageAspectFlags>,
}

impl ImageDesc {
    /// Device-local, optimally tiled depth attachment with a depth view.
    pub fn depth_attachment(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            name: "depth_attachment",
            width,
            height,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            location: MemoryLocation::GpuOnly,
            view_aspect: Some(vk::ImageAspectFlags::DEPTH),
        }
    }
}

/// A 2D image with one mip level, its memory and an optional view.
///
/// # Thread Safety
///
/// The image is immutable after creation. Dropping it locks the device's
/// allocator to free the memory.
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// View over the whole image, if requested.
    view: Option<vk::ImageView>,
    /// Backing memory; `None` only while the image is being built.
    allocation: Option<Allocation>,
    /// Image format.
    format: vk::Format,
    /// Image size in pixels.
    extent: vk::Extent2D,
}

impl Image {
    /// Creates the image, allocates and binds its memory, then creates the
    /// view if `desc.view_aspect` is set.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `desc` - Size, format, usage and memory location
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero, or if image creation,
    /// allocation, binding or view creation fails. Anything created before
    /// the failure is released.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "Image '{}' must have a non-zero extent",
                desc.name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(desc.tiling)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // From here on `Drop` cleans up whatever has been created.
        let mut created = Self {
            device,
            image,
            view: None,
            allocation: None,
            format: desc.format,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
        };

        let requirements = unsafe {
            created
                .device
                .handle()
                .get_image_memory_requirements(image)
        };

        let allocation = created.device.allocator()?.allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: desc.location,
            linear: desc.tiling == vk::ImageTiling::LINEAR,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        created.allocation = Some(allocation);

        unsafe {
            created
                .device
                .handle()
                .bind_image_memory(image, memory, offset)?;
        }

        if let Some(aspect) = desc.view_aspect {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(desc.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(aspect)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            created.view = Some(unsafe { created.device.handle().create_image_view(&view_info, None)? });
        }

        debug!(
            "Created image '{}': {}x{} ({:?})",
            desc.name, desc.width, desc.height, desc.format
        );

        Ok(created)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// The image view, if one was requested.
    #[inline]
    pub fn view(&self) -> Option<vk::ImageView> {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.handle().destroy_image_view(view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image allocation: {}", e);
                    }
                }
                Err(e) => error!("Leaking image allocation: {}", e),
            }
        }

        debug!(
            "Destroyed image {}x{} ({:?})",
            self.extent.width, self.extent.height, self.format
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_attachment_desc() {
        let desc = ImageDesc::depth_attachment(1280, 720, vk::Format::D32_SFLOAT);
        assert_eq!(desc.usage, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT);
        assert_eq!(desc.tiling, vk::ImageTiling::OPTIMAL);
        assert_eq!(desc.location, MemoryLocation::GpuOnly);
        assert_eq!(desc.view_aspect, Some(vk::ImageAspectFlags::DEPTH));
        assert_eq!((desc.width, desc.height), (1280, 720));
    }

    #[test]
    fn test_image_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Image>();
    }
}
