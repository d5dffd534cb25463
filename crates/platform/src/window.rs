//! Window management using winit.
//!
//! [`Window`] is the platform side of surface creation: it implements
//! [`SurfaceSource`] so the renderer can ask it for instance extensions and
//! a `VkSurfaceKHR` without knowing which windowing system is underneath.

use std::ffi::CStr;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::dpi::{PhysicalPosition, PhysicalSize};
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use ember_core::{Error, Result, WindowConfig};
use ember_rhi::surface::SurfaceSource;
use ember_rhi::{RhiError, RhiResult};

/// A resizable winit window.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Creates a window with the size, position and title from `config`.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_position(PhysicalPosition::new(config.x, config.y))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        // The window manager may not honor the requested size.
        let size = window.inner_size();

        tracing::info!(
            "Window '{}' created: {}x{} at ({}, {})",
            config.title,
            size.width,
            size.height,
            config.x,
            config.y
        );

        Ok(Self {
            window: Arc::new(window),
            width: size.width,
            height: size.height,
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    pub fn inner_arc(&self) -> Arc<WinitWindow> {
        self.window.clone()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Update the stored dimensions (call this when handling resize events).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl SurfaceSource for Window {
    fn required_extensions(&self, extensions: &mut Vec<&'static CStr>) -> RhiResult<()> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {}", e)))?;

        let names = ash_window::enumerate_required_extensions(display_handle.as_raw())?;

        for &name in names {
            // SAFETY: ash_window returns pointers to static, null-terminated
            // extension name constants.
            let name = unsafe { CStr::from_ptr(name) };
            tracing::debug!("Platform requires instance extension {:?}", name);
            extensions.push(name);
        }

        Ok(())
    }

    fn create_surface(
        &self,
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> RhiResult<vk::SurfaceKHR> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get display handle: {}", e)))?;

        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| RhiError::SurfaceError(format!("Failed to get window handle: {}", e)))?;

        // SAFETY: The display and window handles come from a live winit
        // window that outlives the surface; the caller owns and destroys
        // the returned handle.
        let surface = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
        }
        .map_err(|e| RhiError::SurfaceError(format!("Failed to create Vulkan surface: {}", e)))?;

        Ok(surface)
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}
