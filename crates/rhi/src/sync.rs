//! Synchronization primitives.
//!
//! - [`Semaphore`] orders one GPU operation's completion before another GPU
//!   operation begins; never inspected by the CPU.
//! - [`Fence`] lets the host wait for a submitted batch of GPU work. The
//!   per-frame submit fence is the engine's only backpressure: the CPU may
//!   not touch a slot's resources until that slot's fence has signaled.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiError;

/// Binary semaphore for GPU-to-GPU ordering.
///
/// Image acquisition signals one that the submit waits on; the submit
/// signals one that presentation waits on.
///
/// # Thread Safety
///
/// Immutable after creation; freely shareable.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn new(device: Arc<Device>) -> Result<Self, RhiError> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Raw semaphore handle.
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

/// Fence for GPU-to-CPU waiting.
///
/// # Thread Safety
///
/// Immutable after creation. Wait and reset may be called from any thread;
/// ordering between them is the caller's responsibility.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally in the signaled state.
    ///
    /// Per-frame submit fences start signaled so the first gate pass on a
    /// slot that has never been submitted completes immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self, RhiError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Fence created ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Raw fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence signals or `timeout` (nanoseconds) expires.
    ///
    /// The render loop passes `u64::MAX`: with a healthy GPU an unbounded
    /// wait always completes, so a wait failure is treated as fatal rather
    /// than retried.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or wait failure.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// Must not race a queue operation that still references the fence.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Non-blocking signaled check.
    pub fn is_signaled(&self) -> bool {
        let status = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(status, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
