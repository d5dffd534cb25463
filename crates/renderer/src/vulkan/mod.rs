//! Vulkan implementation of [`RendererBackend`](crate::backend::RendererBackend).

mod backend;
mod context;

pub use backend::VulkanBackend;
pub use context::{RenderContext, flipped_viewport, full_area};
