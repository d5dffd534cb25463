//! Physical device (GPU) selection.
//!
//! Selection is split in two layers:
//!
//! 1. [`snapshot_device`] gathers everything the selector needs about one
//!    `VkPhysicalDevice` into a plain [`DeviceSnapshot`].
//! 2. [`select_first_suitable`] walks snapshots in enumeration order and returns
//!    the first one that satisfies a [`DeviceRequirements`]. It performs no
//!    Vulkan calls, so the same enumeration order and capability matrix
//!    always produce the same device and queue-family indices.
//!
//! [`select_physical_device`] wires the two together lazily: once a device
//! is accepted no further devices are queried.

use std::ffi::{CStr, CString};

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Queue-family indices discovered for a device.
///
/// On a device accepted by the selector, `graphics_family`,
/// `present_family` and `transfer_family` are always `Some`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
    pub compute_family: Option<u32>,
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Graphics, present and transfer are all resolved.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some()
            && self.present_family.is_some()
            && self.transfer_family.is_some()
    }

    /// Distinct family indices in graphics, present, compute, transfer order.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);

        for family in [
            self.graphics_family,
            self.present_family,
            self.compute_family,
            self.transfer_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }

        families
    }
}

/// Capabilities of one queue family as seen by the selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilySnapshot {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    /// Result of the surface-support query for this family.
    pub supports_present: bool,
}

/// Snapshot of a physical device taken during enumeration.
#[derive(Clone, Debug)]
pub struct DeviceSnapshot {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: Vec<QueueFamilySnapshot>,
    pub extensions: Vec<CString>,
    pub swapchain_support: SwapchainSupportDetails,
}

impl DeviceSnapshot {
    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    fn supports_extension(&self, extension: &CStr) -> bool {
        self.extensions.iter().any(|ext| ext.as_c_str() == extension)
    }
}

/// What a device must offer to be accepted.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    /// Require a graphics-capable family.
    pub graphics: bool,
    /// Require a family that can present to the surface.
    pub present: bool,
    /// Require a compute-capable family.
    pub compute: bool,
    /// Require a transfer-capable family.
    pub transfer: bool,
    /// Require the `samplerAnisotropy` feature.
    pub sampler_anisotropy: bool,
    /// Reject anything but a discrete GPU.
    pub discrete_gpu: bool,
    /// Device extensions that must all be supported.
    pub extensions: Vec<&'static CStr>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            graphics: true,
            present: true,
            compute: false,
            transfer: true,
            sampler_anisotropy: true,
            discrete_gpu: false,
            extensions: vec![ash::khr::swapchain::NAME],
        }
    }
}

/// Reason a device was passed over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    NotDiscrete,
    MissingQueueFamily(&'static str),
    MissingExtension(String),
    MissingSamplerAnisotropy,
    InadequateSurfaceSupport,
}

/// The device chosen by the selector. Immutable once created.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    fn from_snapshot(snapshot: DeviceSnapshot, queue_families: QueueFamilyIndices) -> Self {
        Self {
            device: snapshot.device,
            properties: snapshot.properties,
            features: snapshot.features,
            memory_properties: snapshot.memory_properties,
            queue_families,
        }
    }

    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Total size of device-local heaps in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Index of the first memory type allowed by `type_filter` that has all
    /// of `properties`.
    pub fn find_memory_index(
        &self,
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        find_memory_index(&self.memory_properties, type_filter, properties)
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

pub fn find_memory_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_filter & (1 << i) != 0 && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
}

/// Number of capability bits other than transfer on a transfer-capable
/// family. Lower means more dedicated.
pub fn transfer_score(flags: vk::QueueFlags) -> u32 {
    [vk::QueueFlags::GRAPHICS, vk::QueueFlags::COMPUTE]
        .into_iter()
        .filter(|&bit| flags.contains(bit))
        .count() as u32
}

/// Resolves queue-family indices from per-family capabilities.
///
/// Graphics, present and compute take the first family that qualifies.
/// Transfer takes the family with the lowest [`transfer_score`]; on a tie
/// the later family replaces the earlier one. Families exposing no queues
/// are skipped.
pub fn find_queue_families(families: &[QueueFamilySnapshot]) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    let mut best_transfer_score = u32::MAX;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if family.flags.contains(vk::QueueFlags::GRAPHICS) && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }

        if family.flags.contains(vk::QueueFlags::COMPUTE) && indices.compute_family.is_none() {
            indices.compute_family = Some(i);
        }

        if family.flags.contains(vk::QueueFlags::TRANSFER) {
            let score = transfer_score(family.flags);
            if score <= best_transfer_score {
                best_transfer_score = score;
                indices.transfer_family = Some(i);
            }
        }

        if family.supports_present && indices.present_family.is_none() {
            indices.present_family = Some(i);
        }
    }

    indices
}

/// Checks one device against `requirements`.
pub fn evaluate_device(
    snapshot: &DeviceSnapshot,
    requirements: &DeviceRequirements,
) -> Result<QueueFamilyIndices, Rejection> {
    if requirements.discrete_gpu
        && snapshot.properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    {
        return Err(Rejection::NotDiscrete);
    }

    let indices = find_queue_families(&snapshot.queue_families);

    let required_queues = [
        (requirements.graphics, indices.graphics_family, "graphics"),
        (requirements.present, indices.present_family, "present"),
        (requirements.compute, indices.compute_family, "compute"),
        (requirements.transfer, indices.transfer_family, "transfer"),
    ];
    for (required, family, name) in required_queues {
        if required && family.is_none() {
            return Err(Rejection::MissingQueueFamily(name));
        }
    }

    if let Some(missing) = requirements
        .extensions
        .iter()
        .find(|ext| !snapshot.supports_extension(ext))
    {
        return Err(Rejection::MissingExtension(
            missing.to_string_lossy().into_owned(),
        ));
    }

    if requirements.sampler_anisotropy && snapshot.features.sampler_anisotropy == vk::FALSE {
        return Err(Rejection::MissingSamplerAnisotropy);
    }

    if requirements.present && !snapshot.swapchain_support.is_adequate() {
        return Err(Rejection::InadequateSurfaceSupport);
    }

    Ok(indices)
}

/// Returns the first snapshot that satisfies `requirements`.
///
/// Snapshots are pulled from the iterator one at a time; iteration stops at
/// the first accepted device.
pub fn select_first_suitable<I>(
    snapshots: I,
    requirements: &DeviceRequirements,
) -> RhiResult<(DeviceSnapshot, QueueFamilyIndices)>
where
    I: IntoIterator<Item = DeviceSnapshot>,
{
    for snapshot in snapshots {
        log_queue_families(&snapshot);

        match evaluate_device(&snapshot, requirements) {
            Ok(indices) => return Ok((snapshot, indices)),
            Err(reason) => {
                debug!("Device '{}' rejected: {:?}", snapshot.device_name(), reason);
            }
        }
    }

    warn!("No device met the requirements");
    Err(RhiError::NoSuitableDevice)
}

/// Enumerates devices and returns the first suitable one for `surface`.
///
/// Devices that fail to answer a capability query are skipped with a
/// warning.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableDevice`] if no device exists or none
/// meets `requirements`, or an error if enumeration fails.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    requirements: &DeviceRequirements,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable devices found");
        return Err(RhiError::NoSuitableDevice);
    }

    info!("Found {} physical device(s)", devices.len());

    let snapshots = devices.into_iter().filter_map(|device| {
        match snapshot_device(instance, device, surface, surface_loader) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Skipping device that could not be queried: {}", e);
                None
            }
        }
    });

    let (snapshot, indices) = select_first_suitable(snapshots, requirements)?;
    let selected = PhysicalDeviceInfo::from_snapshot(snapshot, indices);

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected device: '{}' ({}), Vulkan {}.{}.{}, {} MiB device-local",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        selected.device_local_memory() / (1024 * 1024)
    );
    debug!("Queue families: {:?}", selected.queue_families);

    Ok(selected)
}

/// Gathers the selector's view of one physical device.
///
/// # Errors
///
/// Returns an error if a surface-support, extension or swapchain-support
/// query fails.
pub fn snapshot_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<DeviceSnapshot> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut queue_families = Vec::with_capacity(family_properties.len());
    for (i, family) in family_properties.iter().enumerate() {
        let supports_present = unsafe {
            surface_loader.get_physical_device_surface_support(device, i as u32, surface)?
        };
        queue_families.push(QueueFamilySnapshot {
            flags: family.queue_flags,
            queue_count: family.queue_count,
            supports_present,
        });
    }

    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? }
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();

    let swapchain_support = SwapchainSupportDetails::query(device, surface, surface_loader)?;

    Ok(DeviceSnapshot {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        extensions,
        swapchain_support,
    })
}

fn log_queue_families(snapshot: &DeviceSnapshot) {
    debug!(
        "Evaluating '{}' ({})",
        snapshot.device_name(),
        device_type_name(snapshot.properties.device_type)
    );
    debug!("  family | graphics | present | compute | transfer | queues");
    for (i, family) in snapshot.queue_families.iter().enumerate() {
        debug!(
            "  {:>6} | {:>8} | {:>7} | {:>7} | {:>8} | {}",
            i,
            family.flags.contains(vk::QueueFlags::GRAPHICS),
            family.supports_present,
            family.flags.contains(vk::QueueFlags::COMPUTE),
            family.flags.contains(vk::QueueFlags::TRANSFER),
            family.queue_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, supports_present: bool) -> QueueFamilySnapshot {
        QueueFamilySnapshot {
            flags,
            queue_count: 1,
            supports_present,
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(indices.compute_family.is_none());
        assert!(indices.transfer_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_complete_requires_transfer() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            compute_family: None,
            transfer_family: None,
        };
        assert!(!indices.is_complete());

        let indices = QueueFamilyIndices {
            transfer_family: Some(1),
            ..indices
        };
        assert!(indices.is_complete());
    }

    #[test]
    fn test_unique_families_preserves_order() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            compute_family: Some(2),
            transfer_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![0, 2, 1]);
    }

    #[test]
    fn test_transfer_score_counts_other_capabilities() {
        assert_eq!(transfer_score(vk::QueueFlags::TRANSFER), 0);
        assert_eq!(
            transfer_score(vk::QueueFlags::TRANSFER | vk::QueueFlags::COMPUTE),
            1
        );
        assert_eq!(
            transfer_score(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
            ),
            2
        );
    }

    #[test]
    fn test_transfer_only_family_beats_graphics_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::TRANSFER, false),
        ];

        let indices = find_queue_families(&families);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.transfer_family, Some(1));
    }

    #[test]
    fn test_transfer_tie_takes_last_family() {
        let families = [
            family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                true,
            ),
            family(vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, false),
        ];

        assert_eq!(find_queue_families(&families).transfer_family, Some(2));
    }

    #[test]
    fn test_transfer_tie_between_shared_families_takes_last() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
        ];

        let indices = find_queue_families(&families);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.transfer_family, Some(1));
    }

    #[test]
    fn test_first_graphics_and_present_families_win() {
        let families = [
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
            family(vk::QueueFlags::TRANSFER, true),
        ];

        let indices = find_queue_families(&families);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(2));
        assert_eq!(indices.compute_family, Some(0));
        assert_eq!(indices.transfer_family, Some(3));
    }

    #[test]
    fn test_empty_families_are_ignored() {
        let families = [
            QueueFamilySnapshot {
                flags: vk::QueueFlags::TRANSFER,
                queue_count: 0,
                supports_present: true,
            },
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true),
        ];

        let indices = find_queue_families(&families);
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.transfer_family, Some(1));
    }

    #[test]
    fn test_find_memory_index_respects_filter_and_flags() {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        memory_properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        memory_properties.memory_types[1].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory_properties.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;

        let device_local = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        assert_eq!(
            find_memory_index(&memory_properties, 0b111, device_local),
            Some(1)
        );
        assert_eq!(
            find_memory_index(&memory_properties, 0b101, device_local),
            Some(2)
        );
        assert_eq!(
            find_memory_index(&memory_properties, 0b001, device_local),
            None
        );
    }
}
