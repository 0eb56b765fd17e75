//! Command pool and command buffer management.
//!
//! Wrappers for VkCommandPool and VkCommandBuffer. The recycling model is
//! pool-level: each per-frame slot owns one pool and one primary buffer,
//! and the whole pool is reset once the slot's fence proves the previous
//! submission complete. Individual buffers are never reset on their own,
//! so pools are created without the `RESET_COMMAND_BUFFER` flag.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan command pool wrapper.
///
/// Allocates command buffers for one queue family. Resetting the pool
/// returns every buffer allocated from it to the initial state; the buffers
/// stay allocated and can be re-recorded.
///
/// # Thread Safety
///
/// Not thread-safe; multi-threaded recording needs a pool per thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a command pool for `queue_family_index`.
    ///
    /// No per-buffer reset support; recycling goes through
    /// [`CommandPool::reset`].
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!("Command pool created (family {})", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Raw command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Queue family this pool allocates for.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates one primary command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_primary(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }

    /// Returns every buffer allocated from this pool to the initial state.
    ///
    /// Only valid once the GPU is known to be done with all of them — for a
    /// per-frame pool, after the slot's fence wait.
    ///
    /// # Arguments
    ///
    /// * `release_resources` - Also give the pool's memory back to the
    ///   driver
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self, release_resources: bool) -> RhiResult<()> {
        let flags = if release_resources {
            vk::CommandPoolResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandPoolResetFlags::empty()
        };

        unsafe {
            self.device.handle().reset_command_pool(self.pool, flags)?;
        }

        Ok(())
    }

    /// The device this pool was created on.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed (family {})", self.queue_family_index);
    }
}

/// Vulkan command buffer wrapper.
///
/// Commands are recorded between [`CommandBuffer::begin`] and
/// [`CommandBuffer::end`].
///
/// # Note
///
/// The wrapper does not own the underlying handle; the buffer is freed with
/// its pool and returned to the initial state when the pool resets.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a primary command buffer from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_primary()?;
        Ok(Self { device, buffer })
    }

    /// Raw command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Starts recording for a single submission (one-time-submit usage).
    ///
    /// The buffer must be in the initial state: freshly allocated, or its
    /// pool reset since the last recording.
    ///
    /// # Errors
    ///
    /// Returns an error if beginning fails.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }

        Ok(())
    }

    /// Finishes recording; the buffer is then ready to submit.
    ///
    /// # Errors
    ///
    /// Returns an error if ending fails.
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_wrappers_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandPool>();
        assert_send::<CommandBuffer>();
    }
}
