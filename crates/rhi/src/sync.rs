//! Synchronization primitives.
//!
//! - [`Semaphore`] orders queue operations on the GPU (acquire → submit →
//!   present).
//! - [`Fence`] lets the CPU wait for submitted work. It also caches whether
//!   it is known to be signaled so repeated waits on a finished frame are
//!   free.
//!
//! # Overview
//!
//! Each frame slot owns one fence and two semaphores. The fence is waited
//! on before the slot is reused and reset right before the slot's next
//! submission. The semaphores chain image acquisition to the submit and the
//! submit to presentation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ember_rhi::device::Device;
//! use ember_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let mut in_flight = Fence::new(device, true)?;
//!
//! // Starts signaled, so the first wait returns at once.
//! in_flight.wait(5_000_000_000)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper, created unsignaled.
///
/// Used for "image available" (signaled by acquire, waited on by submit)
/// and "queue complete" (signaled by submit, waited on by present).
///
/// # Thread Safety
///
/// The handle never changes after creation. Semaphores are only touched
/// through queue submissions, which the device serializes.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    ///
    /// This handle can be used directly with Vulkan API calls.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper with a host-side signaled flag.
///
/// The flag mirrors what the host last observed: set by a successful
/// [`Fence::wait`] (or creation in the signaled state), cleared by
/// [`Fence::reset`]. It is never set by the GPU behind the host's back, so
/// a fence that is still `false` may in fact have signaled already.
///
/// # Thread Safety
///
/// `wait` and `reset` take `&mut self` because they update the flag. Share
/// a fence across threads only behind a lock.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
    /// `true` once the host has seen the fence signaled.
    is_signaled: bool,
}

impl Fence {
    /// Creates a fence. Frame fences start signaled so the first wait on
    /// each slot returns immediately.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Whether the fence starts in the signaled state
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use ember_rhi::device::Device;
    /// use ember_rhi::sync::Fence;
    ///
    /// # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
    /// let fence = Fence::new(device, true)?;
    /// assert!(fence.is_signaled());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self {
            device,
            fence,
            is_signaled: signaled,
        })
    }

    /// Returns the Vulkan fence handle.
    ///
    /// This handle can be passed to `vkQueueSubmit`.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Host-side view of the fence: `true` once a wait has observed the
    /// signal, `false` after [`Fence::reset`].
    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.is_signaled
    }

    /// Blocks until the fence signals or `timeout_ns` elapses.
    ///
    /// Returns immediately if the fence is already known to be signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout_ns` - Maximum wait in nanoseconds
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FenceTimeout`] if the timeout elapses, which
    /// means the GPU stopped making progress. Any other wait failure is
    /// returned as a Vulkan error. The flag stays unset on error.
    pub fn wait(&mut self, timeout_ns: u64) -> RhiResult<()> {
        if self.is_signaled {
            return Ok(());
        }

        let fences = [self.fence];
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_ns)
        };

        match result {
            Ok(()) => {
                self.is_signaled = true;
                Ok(())
            }
            Err(vk::Result::TIMEOUT) => {
                error!("Fence wait timed out after {} ns", timeout_ns);
                Err(RhiError::FenceTimeout { timeout_ns })
            }
            Err(e) => {
                error!("Fence wait failed: {:?}", e);
                Err(e.into())
            }
        }
    }

    /// Returns the fence to the unsignaled state. The fence must not be in
    /// use by a pending submission.
    ///
    /// Does nothing if the host has not seen the fence signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkResetFences` fails.
    pub fn reset(&mut self) -> RhiResult<()> {
        if self.is_signaled {
            let fences = [self.fence];
            unsafe { self.device.handle().reset_fences(&fences)? };
            self.is_signaled = false;
        }
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
