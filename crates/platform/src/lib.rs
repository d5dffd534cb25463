//! Platform layer for the renderer.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation through [`ember_rhi::surface::SurfaceSource`]

mod window;

pub use window::Window;

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
