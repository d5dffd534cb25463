//! Presentation surface and the platform contract that produces it.
//!
//! The RHI never talks to a windowing system directly. A platform layer
//! implements [`SurfaceSource`] to report the instance extensions it needs
//! and to create a `VkSurfaceKHR` for its native drawable.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info};

use crate::error::RhiResult;
use crate::instance::Instance;

/// Platform collaborator that owns a native drawable.
pub trait SurfaceSource {
    /// Appends the platform's instance extensions to `extensions`.
    ///
    /// The generic `VK_KHR_surface` entry is already present when this is
    /// called; implementations add platform entries after it.
    fn required_extensions(&self, extensions: &mut Vec<&'static CStr>) -> RhiResult<()>;

    /// Creates a surface for the native drawable.
    ///
    /// The returned handle is owned by the caller, who wraps it in a
    /// [`Surface`].
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance)
    -> RhiResult<vk::SurfaceKHR>;

    /// Current drawable size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);
}

/// Owned `VkSurfaceKHR` plus the loader needed to query and destroy it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Asks `source` for a surface and takes ownership of it.
    pub fn new(instance: &Instance, source: &dyn SurfaceSource) -> RhiResult<Self> {
        let handle = source.create_surface(instance.entry(), instance.handle())?;
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        info!("Vulkan surface created");

        Ok(Self { handle, loader })
    }

    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}
