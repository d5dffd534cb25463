//! RHI error types.
//!
//! Every variant is fatal for the caller. Recoverable swapchain conditions
//! (out-of-date, suboptimal) are resolved inside the swapchain manager and
//! reported through its outcome enums instead.

use thiserror::Error;

use crate::command::{CommandBufferOp, CommandBufferState};

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No enumerated device satisfied the requirements
    #[error("No suitable device found")]
    NoSuitableDevice,

    /// Validation was requested but the Khronos layer is not installed
    #[error("Validation layer {0} requested but not available")]
    ValidationLayerMissing(String),

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// None of the candidate depth formats can back a depth attachment
    #[error("No supported depth format found")]
    UnsupportedDepthFormat,

    /// A command buffer call did not match the recording protocol
    #[error("Cannot {operation:?} a command buffer in state {state:?}")]
    InvalidCommandBufferState {
        operation: CommandBufferOp,
        state: CommandBufferState,
    },

    /// A frame fence did not signal within the configured bound
    #[error("Fence wait timed out after {timeout_ns} ns")]
    FenceTimeout { timeout_ns: u64 },

    /// The GPU memory allocator lock was poisoned by a panicking thread
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    /// A backend call arrived before `initialize` or after `shutdown`
    #[error("Renderer backend is not initialized")]
    NotInitialized,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
