//! Rendering frontend and backends.
//!
//! This crate drives frames:
//! - The [`Renderer`] frontend and its [`RendererBackend`] contract
//! - Frame-in-flight bookkeeping
//! - The Vulkan backend and its render context

pub mod backend;
pub mod frame;
pub mod frontend;
pub mod vulkan;

pub use backend::{RendererBackend, RendererBackendKind, create_backend};
pub use frame::{FrameAction, FrameTracker, ResizeTracker};
pub use frontend::{RenderPacket, Renderer};
pub use vulkan::{RenderContext, VulkanBackend};

pub use ember_rhi::swapchain::MAX_FRAMES_IN_FLIGHT;
