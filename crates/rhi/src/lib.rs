//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps the Vulkan objects a frame needs using `ash`:
//! - Instance, surface and device creation
//! - Physical device and queue-family selection
//! - Swapchain management and rebuilds
//! - Render pass and framebuffers
//! - Command buffer recording with state tracking
//! - Synchronization primitives

mod error;

pub mod command;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod render_pass;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
