//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and the debug
//! messenger that forwards driver diagnostics to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use ember_rhi::instance::{Instance, InstanceDesc};
//! use ember_rhi::surface::SurfaceSource;
//!
//! # fn example(window: &dyn SurfaceSource) -> ember_rhi::RhiResult<()> {
//! let desc = InstanceDesc {
//!     application_name: "demo".to_string(),
//!     enable_validation: cfg!(debug_assertions),
//! };
//! let instance = Instance::new(&desc, window)?;
//! assert_eq!(instance.has_validation(), desc.enable_validation);
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::{RhiError, RhiResult};
use crate::surface::SurfaceSource;

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"Ember";

/// Instance creation parameters.
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub application_name: String,
    /// Enable the Khronos validation layer and debug messenger. Creation
    /// fails if the layer is not installed.
    pub enable_validation: bool,
}

/// Vulkan instance wrapper.
///
/// Must outlive every surface and device created from it.
pub struct Instance {
    /// Loaded Vulkan library entry points.
    entry: Entry,
    /// Vulkan instance handle and function table.
    instance: ash::Instance,
    /// Debug utils function table, present when validation is enabled.
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Messenger forwarding validation output to `tracing`.
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Loads the Vulkan library and creates an instance that can present to
    /// surfaces produced by `platform`.
    ///
    /// # Arguments
    ///
    /// * `desc` - Application name and validation switch
    /// * `platform` - Appends the platform's surface extensions
    ///
    /// # Errors
    ///
    /// * [`RhiError::ValidationLayerMissing`] if validation is requested and
    ///   the Khronos layer is not installed
    /// * An error if the Vulkan library cannot be loaded or instance or
    ///   messenger creation fails
    pub fn new(desc: &InstanceDesc, platform: &dyn SurfaceSource) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        if desc.enable_validation && !Self::is_validation_layer_available(&entry)? {
            error!(
                "Validation layer {:?} is not installed",
                VALIDATION_LAYER_NAME
            );
            return Err(RhiError::ValidationLayerMissing(
                VALIDATION_LAYER_NAME.to_string_lossy().into_owned(),
            ));
        }

        let application_name = CString::new(desc.application_name.as_str())
            .unwrap_or_else(|_| CString::from(c"Ember application"));

        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_2);

        let extensions = required_extensions(platform, desc.enable_validation)?;
        for extension in &extensions {
            debug!("Instance extension: {:?}", extension);
        }
        let extension_ptrs: Vec<*const std::ffi::c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let layers = if desc.enable_validation {
            vec![VALIDATION_LAYER_NAME.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!("Vulkan instance created (API version 1.2)");

        let (debug_utils, debug_messenger) = if desc.enable_validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => {
                    info!("Validation layer and debug messenger enabled");
                    (Some(debug_utils), Some(messenger))
                }
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns `true` if the debug messenger is installed.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers
            .iter()
            .any(|layer| layer.layer_name_as_c_str() == Ok(VALIDATION_LAYER_NAME)))
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };

        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Builds the ordered instance extension list: the generic surface
/// extension, then whatever the platform appends, then debug utils when
/// validation is on. Duplicates keep their first position.
pub fn required_extensions(
    platform: &dyn SurfaceSource,
    enable_validation: bool,
) -> RhiResult<Vec<&'static CStr>> {
    let mut extensions = vec![ash::khr::surface::NAME];
    platform.required_extensions(&mut extensions)?;

    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME);
    }

    Ok(dedup_preserving_order(extensions))
}

fn dedup_preserving_order(extensions: Vec<&'static CStr>) -> Vec<&'static CStr> {
    let mut unique: Vec<&'static CStr> = Vec::with_capacity(extensions.len());
    for extension in extensions {
        if !unique.contains(&extension) {
            unique.push(extension);
        }
    }
    unique
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "general",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "performance",
        _ => "other",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!(target: "vulkan", kind, "{}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!(target: "vulkan", kind, "{}", message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!(target: "vulkan", kind, "{}", message),
        _ => trace!(target: "vulkan", kind, "{}", message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    struct HeadlessPlatform {
        extensions: Vec<&'static CStr>,
    }

    impl SurfaceSource for HeadlessPlatform {
        fn required_extensions(&self, extensions: &mut Vec<&'static CStr>) -> RhiResult<()> {
            extensions.extend(self.extensions.iter().copied());
            Ok(())
        }

        fn create_surface(
            &self,
            _entry: &ash::Entry,
            _instance: &ash::Instance,
        ) -> RhiResult<vk::SurfaceKHR> {
            Err(RhiError::SurfaceError("headless".to_string()))
        }

        fn framebuffer_size(&self) -> (u32, u32) {
            (0, 0)
        }
    }

    #[test]
    fn test_platform_extensions_follow_generic_surface() {
        let platform = HeadlessPlatform {
            extensions: vec![ash::khr::xlib_surface::NAME, ash::khr::wayland_surface::NAME],
        };

        let extensions = required_extensions(&platform, false).unwrap();
        assert_eq!(
            extensions,
            vec![
                ash::khr::surface::NAME,
                ash::khr::xlib_surface::NAME,
                ash::khr::wayland_surface::NAME,
            ]
        );
    }

    #[test]
    fn test_duplicate_surface_extension_is_dropped() {
        let platform = HeadlessPlatform {
            extensions: vec![ash::khr::surface::NAME, ash::khr::win32_surface::NAME],
        };

        let extensions = required_extensions(&platform, true).unwrap();
        assert_eq!(
            extensions,
            vec![
                ash::khr::surface::NAME,
                ash::khr::win32_surface::NAME,
                ash::ext::debug_utils::NAME,
            ]
        );
    }

    #[test]
    fn test_debug_utils_only_with_validation() {
        let platform = HeadlessPlatform { extensions: vec![] };

        let without = required_extensions(&platform, false).unwrap();
        assert!(!without.contains(&ash::ext::debug_utils::NAME));

        let with = required_extensions(&platform, true).unwrap();
        assert!(with.contains(&ash::ext::debug_utils::NAME));
    }

    #[test]
    fn test_instance_creation_without_validation() {
        let platform = HeadlessPlatform { extensions: vec![] };
        let desc = InstanceDesc {
            application_name: "instance-test".to_string(),
            enable_validation: false,
        };

        match Instance::new(&desc, &platform) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(RhiError::VulkanError(e)) => {
                eprintln!("Skipping test: no usable Vulkan driver ({:?})", e);
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }
}
