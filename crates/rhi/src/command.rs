//! Command pool and command buffer management.
//!
//! [`CommandBuffer`] pairs a `VkCommandBuffer` with a [`CommandBufferState`]
//! tag. Every recording call checks the tag first and fails with
//! [`RhiError::InvalidCommandBufferState`] when the call does not match the
//! recording protocol:
//!
//! ```text
//! NotAllocated --allocate--> Ready --begin--> Recording
//! Recording --begin render pass--> InRenderPass --end render pass--> Recording
//! Recording --end--> RecordingEnded --submit--> Submitted
//! Submitted --reset (implicit on begin)--> Ready
//! any allocated state --free--> NotAllocated
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::command::CommandPool;
//! use ember_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.graphics_family())?;
//! let mut buffers = pool.allocate_primary(3)?;
//!
//! let cmd = &mut buffers[0];
//! cmd.begin(false, false, false)?;
//! // ... record commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Recording state of a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferState {
    /// No Vulkan buffer behind the wrapper.
    NotAllocated,
    /// Allocated or reset; may begin recording.
    Ready,
    /// Between begin and end, outside a render pass.
    Recording,
    /// Inside a render pass.
    InRenderPass,
    /// Recording finished; may be submitted.
    RecordingEnded,
    /// Handed to a queue.
    Submitted,
}

/// Operation requested on a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandBufferOp {
    Allocate,
    Begin,
    BeginRenderPass,
    EndRenderPass,
    End,
    Submit,
    Reset,
    Free,
}

impl CommandBufferState {
    /// Returns the state after `op`, or an error if `op` is not legal here.
    ///
    /// `Begin` on a `Submitted` buffer performs the implicit reset.
    pub fn transition(self, op: CommandBufferOp) -> RhiResult<Self> {
        use CommandBufferOp as Op;
        use CommandBufferState as State;

        let next = match (self, op) {
            (State::NotAllocated, Op::Allocate) => State::Ready,
            (State::Ready | State::Submitted, Op::Begin) => State::Recording,
            (State::Recording, Op::BeginRenderPass) => State::InRenderPass,
            (State::InRenderPass, Op::EndRenderPass) => State::Recording,
            (State::Recording, Op::End) => State::RecordingEnded,
            (State::RecordingEnded, Op::Submit) => State::Submitted,
            (State::Submitted, Op::Reset) => State::Ready,
            (state, Op::Free) if state != State::NotAllocated => State::NotAllocated,
            (state, operation) => {
                error!(
                    "Command buffer protocol violation: {:?} in state {:?}",
                    operation, state
                );
                return Err(RhiError::InvalidCommandBufferState { operation, state });
            }
        };

        Ok(next)
    }
}

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so each buffer can be reset on its
/// own when it is begun again.
///
/// # Thread Safety
///
/// Vulkan command pools are externally synchronized. Allocate, free and
/// record buffers of one pool from a single thread.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family the buffers are submitted to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a command pool for `queue_family_index`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `queue_family_index` - Family of the queue the buffers will be
    ///   submitted to
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers in the `Ready` state.
    ///
    /// # Errors
    ///
    /// Returns an error if any allocation fails. Buffers allocated before
    /// the failure are released with the pool.
    pub fn allocate_primary(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        (0..count)
            .map(|_| CommandBuffer::allocate(self.device.clone(), self, true))
            .collect()
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// A command buffer and its recording state.
///
/// Buffers are returned to their pool with [`CommandBuffer::free`]; any
/// still allocated when the pool is destroyed are released with it.
///
/// # Thread Safety
///
/// Recording mutates both the Vulkan buffer and the state tag, so every
/// recording call takes `&mut self`. The owning pool's synchronization
/// rules apply as well.
pub struct CommandBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command buffer handle; null once freed.
    buffer: vk::CommandBuffer,
    /// Where the buffer is in the recording protocol.
    state: CommandBufferState,
}

impl CommandBuffer {
    /// Allocates one command buffer from `pool`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - Pool to allocate from
    /// * `primary` - `true` for a primary buffer, `false` for a secondary
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate(device: Arc<Device>, pool: &CommandPool, primary: bool) -> RhiResult<Self> {
        let level = if primary {
            vk::CommandBufferLevel::PRIMARY
        } else {
            vk::CommandBufferLevel::SECONDARY
        };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool.handle())
            .level(level)
            .command_buffer_count(1);

        let state = CommandBufferState::NotAllocated.transition(CommandBufferOp::Allocate)?;
        let buffers = unsafe { device.handle().allocate_command_buffers(&alloc_info)? };
        let buffer = buffers
            .into_iter()
            .next()
            .ok_or(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?;

        Ok(Self {
            device,
            buffer,
            state,
        })
    }

    /// Returns the Vulkan command buffer handle.
    ///
    /// This handle can be used directly with Vulkan API calls.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the current recording state.
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    fn advance(&self, op: CommandBufferOp) -> RhiResult<CommandBufferState> {
        self.state.transition(op)
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Starts recording. A previously submitted buffer is reset first.
    ///
    /// # Arguments
    ///
    /// * `single_use` - Sets `ONE_TIME_SUBMIT`
    /// * `render_pass_continue` - Sets `RENDER_PASS_CONTINUE` (secondary
    ///   buffers only)
    /// * `simultaneous_use` - Sets `SIMULTANEOUS_USE`
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless the buffer is
    /// `Ready` or `Submitted`, or an error if the reset or
    /// `vkBeginCommandBuffer` fails. The state is unchanged on error.
    pub fn begin(
        &mut self,
        single_use: bool,
        render_pass_continue: bool,
        simultaneous_use: bool,
    ) -> RhiResult<()> {
        let next = self.advance(CommandBufferOp::Begin)?;

        if self.state == CommandBufferState::Submitted {
            unsafe {
                self.device
                    .handle()
                    .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
            }
        }

        let mut flags = vk::CommandBufferUsageFlags::empty();
        if single_use {
            flags |= vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT;
        }
        if render_pass_continue {
            flags |= vk::CommandBufferUsageFlags::RENDER_PASS_CONTINUE;
        }
        if simultaneous_use {
            flags |= vk::CommandBufferUsageFlags::SIMULTANEOUS_USE;
        }

        let begin_info = vk::CommandBufferBeginInfo::default().flags(flags);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        self.state = next;
        Ok(())
    }

    /// Finishes recording.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless the buffer is
    /// `Recording` (in particular, inside a render pass), or an error if
    /// `vkEndCommandBuffer` fails.
    pub fn end(&mut self) -> RhiResult<()> {
        let next = self.advance(CommandBufferOp::End)?;

        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        self.state = next;
        Ok(())
    }

    /// Records that the buffer was handed to a queue.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless recording has
    /// ended.
    pub fn mark_submitted(&mut self) -> RhiResult<()> {
        self.state = self.advance(CommandBufferOp::Submit)?;
        Ok(())
    }

    /// Returns a submitted buffer to `Ready` without recording.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless the buffer is
    /// `Submitted`, or an error if `vkResetCommandBuffer` fails.
    pub fn reset(&mut self) -> RhiResult<()> {
        let next = self.advance(CommandBufferOp::Reset)?;

        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }

        self.state = next;
        Ok(())
    }

    /// Returns the buffer to `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] if the buffer was
    /// already freed.
    pub fn free(&mut self, pool: &CommandPool) -> RhiResult<()> {
        let next = self.advance(CommandBufferOp::Free)?;

        unsafe {
            self.device
                .handle()
                .free_command_buffers(pool.handle(), &[self.buffer]);
        }

        self.buffer = vk::CommandBuffer::null();
        self.state = next;
        Ok(())
    }

    // =========================================================================
    // Render Pass Scope
    // =========================================================================

    /// Records `vkCmdBeginRenderPass` and enters the `InRenderPass` state.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless the buffer is
    /// `Recording`.
    pub fn begin_render_pass(&mut self, begin_info: &vk::RenderPassBeginInfo) -> RhiResult<()> {
        let next = self.advance(CommandBufferOp::BeginRenderPass)?;

        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                begin_info,
                vk::SubpassContents::INLINE,
            );
        }

        self.state = next;
        Ok(())
    }

    /// Records `vkCmdEndRenderPass` and returns to `Recording`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless the buffer is
    /// `InRenderPass`.
    pub fn end_render_pass(&mut self) -> RhiResult<()> {
        let next = self.advance(CommandBufferOp::EndRenderPass)?;

        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }

        self.state = next;
        Ok(())
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Sets viewport 0. Only valid while recording.
    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }
}
