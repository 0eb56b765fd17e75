//! Per-swapchain-image resource sets.
//!
//! Each swapchain image index owns one [`PerframeResources`] bundle that is
//! reused every time that image comes around again:
//!
//! - a submit fence, the sole backpressure bounding how far the CPU runs ahead
//! - a render-finished semaphore presentation waits on
//! - a command pool with a single primary command buffer
//! - a borrowed image-available semaphore slot (absent until the image has
//!   been acquired at least once)
//!
//! The bundle survives swapchain recreation; only the chain, depth image,
//! and framebuffers are rebuilt on resize. Sets are torn down only at
//! shutdown, or during a resize that changes the image count.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use carousel_rhi::RhiResult;
use carousel_rhi::command::{CommandBuffer, CommandPool};
use carousel_rhi::device::Device;
use carousel_rhi::sync::{Fence, Semaphore};

use crate::semaphore_pool::PooledSemaphore;

/// Resources dedicated to one swapchain image slot.
pub struct PerframeResources {
    /// Swapchain image index this set belongs to.
    index: usize,
    /// Fence signaled when this slot's submission finishes on the GPU.
    /// Created signaled so the first gate pass completes immediately.
    submit_fence: Fence,
    /// Semaphore signaled when this slot's rendering is complete.
    render_finished: Semaphore,
    /// Command pool backing this slot's command buffer; reset wholesale
    /// once the fence proves the previous submission done.
    command_pool: CommandPool,
    /// The slot's single primary command buffer.
    command_buffer: CommandBuffer,
    /// Image-available semaphore borrowed from the pool by the most recent
    /// acquisition of this image. None before the first acquisition.
    image_available: Option<PooledSemaphore>,
}

impl PerframeResources {
    /// Creates the resource set for swapchain image `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(device: Arc<Device>, index: usize) -> RhiResult<Self> {
        let graphics_family = device
            .queue_families()
            .graphics_family
            .expect("device was created with a graphics family");

        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let render_finished = Semaphore::new(device.clone())?;
        let submit_fence = Fence::new(device, true)?;

        debug!("Created perframe resources for image {}", index);

        Ok(Self {
            index,
            submit_fence,
            render_finished,
            command_pool,
            command_buffer,
            image_available: None,
        })
    }

    /// Returns the swapchain image index this set belongs to.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the slot's command buffer.
    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Returns the slot's submit fence.
    #[inline]
    pub fn submit_fence(&self) -> &Fence {
        &self.submit_fence
    }

    /// Returns the render-finished semaphore handle.
    #[inline]
    pub fn render_finished_handle(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    /// Returns the currently installed image-available semaphore handle.
    #[inline]
    pub fn image_available_handle(&self) -> Option<vk::Semaphore> {
        self.image_available.as_ref().map(|s| s.handle())
    }

    /// Synchronization gate: makes this slot's resources safe to reuse.
    ///
    /// Waits (without bound) for the slot's previous submission to complete,
    /// resets the fence, then resets the command pool. The pool reset frees
    /// every recording made from it and is only valid after the fence wait.
    ///
    /// A wait failure means the GPU hung; it propagates and is not retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the fence wait/reset or pool reset fails.
    pub fn wait_and_reset(&self) -> RhiResult<()> {
        self.submit_fence.wait(u64::MAX)?;
        self.submit_fence.reset()?;
        self.command_pool.reset(false)?;
        Ok(())
    }

    /// Installs the semaphore the latest acquisition signaled for this slot.
    ///
    /// Returns the previously borrowed semaphore, if any; the caller must
    /// release it back to the pool. Call only after [`Self::wait_and_reset`]
    /// has passed for the current acquisition — that fence gate is what makes
    /// the displaced semaphore safe to recycle.
    #[must_use = "the displaced semaphore must be released back to the pool"]
    pub fn install_image_available(
        &mut self,
        semaphore: PooledSemaphore,
    ) -> Option<PooledSemaphore> {
        self.image_available.replace(semaphore)
    }

    /// Takes the borrowed semaphore out of the slot, if any.
    ///
    /// Used at teardown so the token can be returned (or the pool destroyed)
    /// without the slot holding a dangling reference.
    pub fn take_image_available(&mut self) -> Option<PooledSemaphore> {
        self.image_available.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perframe_resources_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<PerframeResources>();
    }
}
