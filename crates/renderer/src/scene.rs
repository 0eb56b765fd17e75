//! Scene rendering collaborators.
//!
//! The engine knows nothing about pipelines, materials, or geometry; it
//! hands the active command buffer to a [`SceneRender`] implementation at
//! two points in each tick and records everything else itself.

use ash::vk;

/// Per-frame rendering callbacks supplied by the application.
///
/// Both callbacks receive the active command buffer for the frame; neither
/// may begin/end a render pass the engine owns, submit work, or touch the
/// swapchain.
pub trait SceneRender {
    /// Number of objects the shadow pass should account for this frame.
    fn object_count(&self) -> u32;

    /// Invoked once per frame, before the main render pass begins.
    ///
    /// The collaborator owns any shadow-map render pass it records here.
    ///
    /// # Arguments
    ///
    /// * `cmd` - The frame's command buffer, in the recording state
    /// * `extent` - Current swapchain extent
    /// * `frame_index` - Swapchain image index for this frame
    /// * `object_count` - Value reported by [`SceneRender::object_count`]
    fn shadow_pass(
        &mut self,
        cmd: vk::CommandBuffer,
        extent: vk::Extent2D,
        frame_index: usize,
        object_count: u32,
    );

    /// Invoked once per frame, inside the main render pass.
    ///
    /// Viewport and scissor are already set to the full swapchain extent.
    /// Expected to issue draw commands only.
    ///
    /// # Arguments
    ///
    /// * `cmd` - The frame's command buffer, inside the main render pass
    /// * `frame_index` - Swapchain image index for this frame
    /// * `delta` - Seconds elapsed since the previous tick
    fn draw(&mut self, cmd: vk::CommandBuffer, frame_index: usize, delta: f32);
}
