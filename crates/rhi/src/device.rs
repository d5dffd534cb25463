//! Vulkan logical device and queue management.
//!
//! [`Device`] owns the `VkDevice`, one queue per distinct family chosen by
//! the selector, the gpu-allocator instance used for image memory, and the
//! depth format detected for this GPU.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::device::Device;
//! use ember_rhi::instance::Instance;
//! use ember_rhi::physical_device::PhysicalDeviceInfo;
//!
//! # fn example(instance: &Instance, selected: PhysicalDeviceInfo)
//! #     -> Result<(), ember_rhi::RhiError> {
//! let device = Device::new(instance, selected)?;
//! println!("Depth format: {:?}", device.depth_format());
//! device.wait_idle()?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

pub(crate) const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Depth formats tried in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Vulkan logical device wrapper.
///
/// Shared as `Arc<Device>` by every object created from it; the device is
/// destroyed when the last of them is dropped.
///
/// # Thread Safety
///
/// `Device` is `Send + Sync`. The allocator is behind a `Mutex`. Queue
/// submission is externally synchronized in Vulkan, so submit to a given
/// queue from one thread at a time.
pub struct Device {
    /// Loaded device function table.
    device: ash::Device,
    /// The physical device and the queue families chosen for it.
    physical_device: PhysicalDeviceInfo,
    /// Memory allocator; dropped manually before `vkDestroyDevice`.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Queue used for rendering submissions.
    graphics_queue: vk::Queue,
    /// Queue used for presentation; may equal `graphics_queue`.
    present_queue: vk::Queue,
    /// Queue from the preferred transfer family.
    transfer_queue: vk::Queue,
    /// Compute queue, if a compute family was found.
    compute_queue: Option<vk::Queue>,
    /// Graphics queue family index.
    graphics_family: u32,
    /// Present queue family index.
    present_family: u32,
    /// Transfer queue family index.
    transfer_family: u32,
    /// First supported entry of [`DEPTH_FORMAT_CANDIDATES`].
    depth_format: vk::Format,
}

impl Device {
    /// Creates the logical device for a selected physical device.
    ///
    /// One queue is created per distinct family. The swapchain extension
    /// and sampler anisotropy are enabled. The depth format is detected
    /// before the device exists and the allocator is created after.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device` - Result of physical device selection
    ///
    /// # Errors
    ///
    /// * [`RhiError::NoSuitableDevice`] if the selection lacks a graphics,
    ///   present or transfer family
    /// * [`RhiError::UnsupportedDepthFormat`] if no depth candidate works
    /// * An error if device or allocator creation fails; a device created
    ///   before an allocator failure is destroyed again
    pub fn new(instance: &Instance, physical_device: PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let families = physical_device.queue_families;
        let graphics_family = require_family(families.graphics_family, "graphics")?;
        let present_family = require_family(families.present_family, "present")?;
        let transfer_family = require_family(families.transfer_family, "transfer")?;

        let depth_format = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
            instance
                .handle()
                .get_physical_device_format_properties(physical_device.device, format)
        })?;
        info!("Depth format: {:?}", depth_format);

        let unique_families = families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let transfer_queue = unsafe { device.get_device_queue(transfer_family, 0) };
        let compute_queue = families
            .compute_family
            .map(|family| unsafe { device.get_device_queue(family, 0) });

        debug!(
            "Queues: graphics={}, present={}, transfer={}, compute={:?}",
            graphics_family, present_family, transfer_family, families.compute_family
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            transfer_queue,
            compute_queue,
            graphics_family,
            present_family,
            transfer_family,
            depth_format,
        }))
    }

    /// Returns the `ash` device used for raw Vulkan calls.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device.device
    }

    #[inline]
    pub fn physical_device_info(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    #[inline]
    pub fn compute_queue(&self) -> Option<vk::Queue> {
        self.compute_queue
    }

    #[inline]
    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    #[inline]
    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    #[inline]
    pub fn transfer_family(&self) -> u32 {
        self.transfer_family
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.physical_device.queue_families
    }

    /// Depth attachment format detected at device creation.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Locks the memory allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::AllocatorPoisoned`] if a previous holder
    /// panicked.
    pub fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| RhiError::AllocatorPoisoned)
    }

    /// Blocks until every queue of the device is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkDeviceWaitIdle` fails, typically on device
    /// loss.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkQueueSubmit` fails.
    ///
    /// # Safety
    ///
    /// Every handle referenced by `submit_infos` must be valid and the
    /// command buffers must have finished recording.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// ash::Device is Send + Sync, queues are plain handles and the allocator is
// behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

fn require_family(family: Option<u32>, name: &str) -> RhiResult<u32> {
    family.ok_or_else(|| {
        error!("Selected device has no {} queue family", name);
        RhiError::NoSuitableDevice
    })
}

/// Picks the first candidate usable as a depth/stencil attachment with
/// either linear or optimal tiling.
pub fn choose_depth_format<F>(candidates: &[vk::Format], format_properties: F) -> RhiResult<vk::Format>
where
    F: Fn(vk::Format) -> vk::FormatProperties,
{
    let required = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

    candidates
        .iter()
        .copied()
        .find(|&format| {
            let properties = format_properties(format);
            properties.linear_tiling_features.contains(required)
                || properties.optimal_tiling_features.contains(required)
        })
        .ok_or(RhiError::UnsupportedDepthFormat)
}
