//! Graphics-API backend contract.

use ember_core::RendererConfig;
use ember_rhi::RhiResult;
use ember_rhi::surface::SurfaceSource;

use crate::vulkan::VulkanBackend;

/// One implementation per graphics API. The frontend only ever holds a
/// `Box<dyn RendererBackend>`.
pub trait RendererBackend {
    /// Creates every GPU object needed to draw into `platform`'s surface.
    fn initialize(&mut self, app_name: &str, platform: &dyn SurfaceSource) -> RhiResult<()>;

    /// Releases all GPU objects. Safe to call when not initialized.
    fn shutdown(&mut self);

    /// Records a new framebuffer size; the swapchain is rebuilt on the next
    /// frame.
    fn resized(&mut self, width: u32, height: u32);

    /// Prepares a frame for recording.
    ///
    /// `Ok(false)` means the frame was skipped (minimized window or a
    /// swapchain rebuild) and `end_frame` must not be called.
    fn begin_frame(&mut self, delta_time: f32) -> RhiResult<bool>;

    /// Submits and presents the frame started by a successful `begin_frame`.
    fn end_frame(&mut self, delta_time: f32) -> RhiResult<()>;
}

/// Graphics APIs with a backend implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererBackendKind {
    #[default]
    Vulkan,
}

/// Builds an uninitialized backend of the requested kind.
pub fn create_backend(kind: RendererBackendKind, config: &RendererConfig) -> Box<dyn RendererBackend> {
    match kind {
        RendererBackendKind::Vulkan => Box::new(VulkanBackend::new(config.clone())),
    }
}
