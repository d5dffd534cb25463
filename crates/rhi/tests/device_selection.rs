//! Device selection over synthetic capability matrices.

use std::ffi::CString;

use ash::vk::Handle;
use ember_rhi::RhiError;
use ember_rhi::physical_device::{
    DeviceSnapshot, DeviceRequirements, QueueFamilyIndices, QueueFamilySnapshot, Rejection,
    evaluate_device, select_first_suitable,
};
use ember_rhi::swapchain::SwapchainSupportDetails;
use ember_rhi::vk;

fn family(flags: vk::QueueFlags, supports_present: bool) -> QueueFamilySnapshot {
    QueueFamilySnapshot {
        flags,
        queue_count: 1,
        supports_present,
    }
}

fn adequate_surface() -> SwapchainSupportDetails {
    SwapchainSupportDetails {
        capabilities: vk::SurfaceCapabilitiesKHR::default(),
        formats: vec![vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }],
        present_modes: vec![vk::PresentModeKHR::FIFO],
    }
}

struct SnapshotBuilder {
    snapshot: DeviceSnapshot,
}

impl SnapshotBuilder {
    fn new(raw: u64) -> Self {
        let properties = vk::PhysicalDeviceProperties {
            device_type: vk::PhysicalDeviceType::INTEGRATED_GPU,
            ..Default::default()
        };
        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: vk::TRUE,
            ..Default::default()
        };

        Self {
            snapshot: DeviceSnapshot {
                device: vk::PhysicalDevice::from_raw(raw),
                properties,
                features,
                memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
                queue_families: vec![family(
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                    true,
                )],
                extensions: vec![CString::from(ash::khr::swapchain::NAME)],
                swapchain_support: adequate_surface(),
            },
        }
    }

    fn discrete(mut self) -> Self {
        self.snapshot.properties.device_type = vk::PhysicalDeviceType::DISCRETE_GPU;
        self
    }

    fn families(mut self, families: Vec<QueueFamilySnapshot>) -> Self {
        self.snapshot.queue_families = families;
        self
    }

    fn no_extensions(mut self) -> Self {
        self.snapshot.extensions.clear();
        self
    }

    fn no_anisotropy(mut self) -> Self {
        self.snapshot.features.sampler_anisotropy = vk::FALSE;
        self
    }

    fn no_present_modes(mut self) -> Self {
        self.snapshot.swapchain_support.present_modes.clear();
        self
    }

    fn build(self) -> DeviceSnapshot {
        self.snapshot
    }
}

#[test]
fn test_selection_is_deterministic() {
    let snapshots = || {
        vec![
            SnapshotBuilder::new(1).no_extensions().build(),
            SnapshotBuilder::new(2)
                .families(vec![
                    family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, false),
                    family(vk::QueueFlags::TRANSFER, true),
                ])
                .build(),
            SnapshotBuilder::new(3).build(),
        ]
    };
    let requirements = DeviceRequirements::default();

    let (first, first_indices) = select_first_suitable(snapshots(), &requirements).unwrap();
    let (second, second_indices) = select_first_suitable(snapshots(), &requirements).unwrap();

    assert_eq!(first.device, second.device);
    assert_eq!(first_indices, second_indices);
    assert_eq!(first.device.as_raw(), 2);
    assert_eq!(
        first_indices,
        QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
            compute_family: None,
            transfer_family: Some(1),
        }
    );
}

#[test]
fn test_first_suitable_device_wins_over_later_discrete() {
    let snapshots = vec![
        SnapshotBuilder::new(10).build(),
        SnapshotBuilder::new(11).discrete().build(),
    ];

    let (selected, _) = select_first_suitable(snapshots, &DeviceRequirements::default()).unwrap();
    assert_eq!(selected.device.as_raw(), 10);
}

#[test]
fn test_discrete_requirement_skips_integrated() {
    let snapshots = vec![
        SnapshotBuilder::new(10).build(),
        SnapshotBuilder::new(11).discrete().build(),
    ];
    let requirements = DeviceRequirements {
        discrete_gpu: true,
        ..Default::default()
    };

    let (selected, _) = select_first_suitable(snapshots, &requirements).unwrap();
    assert_eq!(selected.device.as_raw(), 11);
}

#[test]
fn test_no_present_family_means_no_device() {
    let snapshots = vec![
        SnapshotBuilder::new(1)
            .families(vec![family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
                false,
            )])
            .build(),
    ];

    let result = select_first_suitable(snapshots, &DeviceRequirements::default());
    assert!(matches!(result, Err(RhiError::NoSuitableDevice)));
}

#[test]
fn test_empty_enumeration_means_no_device() {
    let result = select_first_suitable(Vec::new(), &DeviceRequirements::default());
    assert!(matches!(result, Err(RhiError::NoSuitableDevice)));
}

#[test]
fn test_rejection_reasons() {
    let requirements = DeviceRequirements::default();

    let missing_ext = SnapshotBuilder::new(1).no_extensions().build();
    assert!(matches!(
        evaluate_device(&missing_ext, &requirements),
        Err(Rejection::MissingExtension(_))
    ));

    let no_aniso = SnapshotBuilder::new(2).no_anisotropy().build();
    assert_eq!(
        evaluate_device(&no_aniso, &requirements),
        Err(Rejection::MissingSamplerAnisotropy)
    );

    let no_modes = SnapshotBuilder::new(3).no_present_modes().build();
    assert_eq!(
        evaluate_device(&no_modes, &requirements),
        Err(Rejection::InadequateSurfaceSupport)
    );

    let integrated = SnapshotBuilder::new(4).build();
    let discrete_only = DeviceRequirements {
        discrete_gpu: true,
        ..Default::default()
    };
    assert_eq!(
        evaluate_device(&integrated, &discrete_only),
        Err(Rejection::NotDiscrete)
    );
}

#[test]
fn test_anisotropy_not_required_when_disabled() {
    let requirements = DeviceRequirements {
        sampler_anisotropy: false,
        ..Default::default()
    };

    let snapshot = SnapshotBuilder::new(1).no_anisotropy().build();
    assert!(evaluate_device(&snapshot, &requirements).is_ok());
}

#[test]
fn test_compute_requirement() {
    let requirements = DeviceRequirements {
        compute: true,
        ..Default::default()
    };

    let graphics_only = SnapshotBuilder::new(1)
        .families(vec![family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
            true,
        )])
        .build();
    assert_eq!(
        evaluate_device(&graphics_only, &requirements),
        Err(Rejection::MissingQueueFamily("compute"))
    );

    let with_compute = SnapshotBuilder::new(2).build();
    let indices = evaluate_device(&with_compute, &requirements).unwrap();
    assert_eq!(indices.compute_family, Some(0));
}

#[test]
fn test_dedicated_transfer_family_is_preferred() {
    let snapshot = SnapshotBuilder::new(1)
        .families(vec![
            family(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                true,
            ),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, false),
            family(vk::QueueFlags::TRANSFER, false),
        ])
        .build();

    let indices = evaluate_device(&snapshot, &DeviceRequirements::default()).unwrap();
    assert_eq!(indices.graphics_family, Some(0));
    assert_eq!(indices.present_family, Some(0));
    assert_eq!(indices.compute_family, Some(0));
    assert_eq!(indices.transfer_family, Some(2));
    assert_eq!(indices.unique_families(), vec![0, 2]);
}
