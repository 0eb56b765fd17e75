//! Render context: frame loop and swapchain lifecycle.
//!
//! [`RenderContext`] owns every GPU object the engine uses — device, queues,
//! swapchain, depth buffer, render pass, framebuffers, per-frame sets, and
//! the acquire-semaphore pool — and drives one frame per
//! [`RenderContext::render_frame`] call:
//!
//! 1. **Acquire** — borrow a pool semaphore, acquire the next swapchain
//!    image with an unbounded wait.
//! 2. **Gate** — wait + reset the slot's fence, reset its command pool,
//!    recycle the slot's previous acquire semaphore.
//! 3. **Record/Submit** — shadow-pass collaborator, main color+depth pass
//!    with the scene draw collaborator, then submit waiting on the acquire
//!    semaphore at COLOR_ATTACHMENT_OUTPUT and signaling the slot's
//!    render-finished semaphore and fence.
//! 4. **Present** — on the present queue, waiting on render-finished.
//! 5. **Resize** — if acquire/present reported the surface stale, or the
//!    windowing layer raised the resize signal, rebuild swapchain-dependent
//!    state before the next tick.
//!
//! A stale surface (`SUBOPTIMAL_KHR`, `ERROR_OUT_OF_DATE_KHR`) is absorbed
//! here and never surfaces as an error; any other non-success result fails
//! the tick and the caller is expected to stop the loop.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use carousel_platform::{ResizeSignal, Surface, Window};
use carousel_rhi::device::Device;
use carousel_rhi::instance::Instance;
use carousel_rhi::physical_device::select_physical_device;
use carousel_rhi::render_pass::RenderPass;
use carousel_rhi::swapchain::Swapchain;
use carousel_rhi::{RhiError, RhiResult};

use crate::depth_buffer::DepthBuffer;
use crate::perframe::PerframeResources;
use crate::scene::SceneRender;
use crate::semaphore_pool::SemaphorePool;

/// Top-level owner of all rendering state.
///
/// # Resource Destruction Order
///
/// Vulkan resources must go down in dependency order, after a device-idle
/// wait (in-flight GPU work may still reference any of them):
/// per-frame sets → semaphore pool → framebuffers → render pass → depth
/// buffer → swapchain → surface → device → instance. `ManuallyDrop` pins
/// that order in `Drop`.
pub struct RenderContext {
    /// Vulkan instance (destroyed last).
    instance: ManuallyDrop<Instance>,
    /// Logical device; dropped after everything that borrows it.
    device: ManuallyDrop<Arc<Device>>,
    /// Window surface (destroyed after swapchain, before device).
    surface: ManuallyDrop<Surface>,
    /// Presentable image chain.
    swapchain: ManuallyDrop<Swapchain>,
    /// Depth attachment shared by all framebuffers.
    depth_buffer: ManuallyDrop<DepthBuffer>,
    /// Main color+depth render pass.
    render_pass: ManuallyDrop<RenderPass>,
    /// One framebuffer per swapchain image; rebuilt with the chain.
    framebuffers: Vec<vk::Framebuffer>,
    /// One resource set per swapchain image; survives resizes.
    perframes: Vec<PerframeResources>,
    /// Acquire-semaphore pool, sized image count + 1; survives resizes.
    semaphore_pool: SemaphorePool,
    /// Latch the windowing layer raises on surface size changes.
    resize_signal: ResizeSignal,
    /// Set when acquire/present reported the surface stale.
    needs_rebuild: bool,
}

impl RenderContext {
    /// Creates a render context for the given window.
    ///
    /// Bootstraps instance, surface, device, swapchain, depth buffer, render
    /// pass, framebuffers, per-frame sets, and the semaphore pool.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan resource creation fails.
    pub fn new(window: &Window, resize_signal: ResizeSignal) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing render context ({}x{})", width, height);

        let enable_validation = cfg!(debug_assertions);
        let instance = Instance::new(enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;
        let extent = swapchain.extent();

        let depth_buffer =
            DepthBuffer::with_default_format(device.clone(), extent.width, extent.height)?;

        let render_pass =
            RenderPass::new(device.clone(), swapchain.format(), depth_buffer.format())?;

        let framebuffers = Self::create_framebuffers(&render_pass, &swapchain, &depth_buffer)?;

        let image_count = swapchain.image_count();
        let perframes = Self::create_perframes(&device, image_count as usize)?;
        let semaphore_pool = SemaphorePool::new(&device, image_count)?;

        info!(
            "Render context initialized: {} swapchain images, {} pooled acquire semaphores",
            image_count,
            image_count + 1
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            swapchain: ManuallyDrop::new(swapchain),
            depth_buffer: ManuallyDrop::new(depth_buffer),
            render_pass: ManuallyDrop::new(render_pass),
            framebuffers,
            perframes,
            semaphore_pool,
            resize_signal,
            needs_rebuild: false,
        })
    }

    /// Creates one per-frame resource set per swapchain image.
    fn create_perframes(device: &Arc<Device>, count: usize) -> RhiResult<Vec<PerframeResources>> {
        (0..count)
            .map(|index| PerframeResources::new(device.clone(), index))
            .collect()
    }

    /// Creates one framebuffer per swapchain image view.
    fn create_framebuffers(
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_buffer: &DepthBuffer,
    ) -> RhiResult<Vec<vk::Framebuffer>> {
        swapchain
            .image_views()
            .iter()
            .map(|&color_view| {
                render_pass.create_framebuffer(
                    color_view,
                    depth_buffer.image_view(),
                    swapchain.extent(),
                )
            })
            .collect()
    }

    /// Renders one frame.
    ///
    /// A stale surface is handled by rebuilding and does not fail the tick;
    /// the tick fails only on unhandled result codes from acquisition,
    /// submission, or presentation. On failure the caller should stop
    /// calling and let the context drop.
    ///
    /// # Arguments
    ///
    /// * `scene` - Rendering collaborator invoked for the shadow pass and
    ///   the main-pass draws
    /// * `delta` - Seconds elapsed since the previous tick
    ///
    /// # Errors
    ///
    /// Returns an error for any Vulkan failure that is not a recoverable
    /// surface invalidation.
    pub fn render_frame(&mut self, scene: &mut dyn SceneRender, delta: f32) -> RhiResult<()> {
        // Latch any resize the windowing layer reported since the last tick
        if self.resize_signal.take() {
            self.needs_rebuild = true;
        }

        // Acquire: borrow a pool semaphore for the platform to signal
        let acquire_semaphore = self.semaphore_pool.acquire();

        let image_index = match self.swapchain.acquire_next_image(acquire_semaphore.handle()) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    // The stale image is still usable this frame
                    debug!("Swapchain suboptimal during acquire");
                    self.needs_rebuild = true;
                }
                index as usize
            }
            Err(result) if is_rebuild_result(result) => {
                // No image was handed out and the semaphore stays
                // unsignaled, so it can go straight back to the pool
                debug!("Swapchain out of date during acquire");
                self.semaphore_pool.release(acquire_semaphore);
                self.needs_rebuild = true;
                self.resize()?;
                return Ok(());
            }
            Err(result) => {
                self.semaphore_pool.release(acquire_semaphore);
                return Err(result.into());
            }
        };

        // Gate: the slot's previous submission must be complete before its
        // command pool resets, and before its old acquire semaphore — whose
        // pending wait that submission carried — can recycle
        {
            let perframe = &mut self.perframes[image_index];
            perframe.wait_and_reset()?;
            if let Some(previous) = perframe.install_image_available(acquire_semaphore) {
                self.semaphore_pool.release(previous);
            }
        }

        // Record
        let cmd = self.perframes[image_index].command_buffer().handle();
        self.perframes[image_index].command_buffer().begin()?;

        let extent = self.swapchain.extent();
        scene.shadow_pass(cmd, extent, image_index, scene.object_count());
        self.record_main_pass(cmd, image_index, scene, delta);

        self.perframes[image_index].command_buffer().end()?;

        // Submit: wait for the acquired image, signal render-finished + fence
        let perframe = &self.perframes[image_index];
        let Some(image_available) = perframe.image_available_handle() else {
            return Err(RhiError::InvalidHandle(
                "perframe slot lost its acquire semaphore".to_string(),
            ));
        };

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [perframe.render_finished_handle()];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                perframe.submit_fence().handle(),
            )?;
        }

        // Present: the present queue waits on this slot's render-finished
        match self.swapchain.present(
            self.device.present_queue(),
            image_index as u32,
            perframe.render_finished_handle(),
        ) {
            Ok(false) => {}
            Ok(true) => {
                debug!("Swapchain suboptimal during present");
                self.needs_rebuild = true;
            }
            Err(result) if is_rebuild_result(result) => {
                debug!("Swapchain invalidated during present: {:?}", result);
                self.needs_rebuild = true;
            }
            Err(result) => return Err(result.into()),
        }

        // Conditional resize, after the frame's work is queued
        if self.needs_rebuild {
            self.resize()?;
        }

        Ok(())
    }

    /// Records the main color+depth pass around the scene draw callback.
    fn record_main_pass(
        &self,
        cmd: vk::CommandBuffer,
        image_index: usize,
        scene: &mut dyn SceneRender,
        delta: f32,
    ) {
        let extent = self.swapchain.extent();

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.05, 0.05, 0.08, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(self.framebuffers[image_index])
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device
                .handle()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

            // Full-extent viewport and scissor for the scene draws
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            self.device.handle().cmd_set_viewport(cmd, 0, &[viewport]);

            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            self.device.handle().cmd_set_scissor(cmd, 0, &[scissor]);
        }

        scene.draw(cmd, image_index, delta);

        unsafe {
            self.device.handle().cmd_end_render_pass(cmd);
        }
    }

    /// Rebuilds swapchain-dependent state if the surface actually changed.
    ///
    /// Returns true when a rebuild happened. An unchanged reported extent is
    /// a no-op that clears the rebuild latch — acquire/present can report a
    /// stale surface spuriously. A zero-area extent (minimized window)
    /// defers: nothing is constructed, the latch stays set, and the next
    /// tick retries once the surface has area again.
    ///
    /// # Errors
    ///
    /// Returns an error if the capability query or any recreation step fails.
    pub fn resize(&mut self) -> RhiResult<bool> {
        let capabilities = self
            .surface
            .capabilities(self.device.physical_device())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let reported = reported_extent(&capabilities, self.swapchain.extent());

        if extents_match(reported, self.swapchain.extent()) {
            debug!("Resize requested but extent unchanged; nothing to do");
            self.needs_rebuild = false;
            return Ok(false);
        }

        if is_zero_extent(reported) {
            debug!("Surface has zero area (minimized); deferring swapchain rebuild");
            return Ok(false);
        }

        self.rebuild_swapchain(reported)?;
        self.needs_rebuild = false;
        Ok(true)
    }

    /// Tears down and recreates everything bound to the swapchain.
    fn rebuild_swapchain(&mut self, reported: vk::Extent2D) -> RhiResult<()> {
        // In-flight GPU work may reference any of the objects rebuilt below
        self.device.wait_idle()?;

        self.destroy_framebuffers();

        self.swapchain.recreate(
            &self.instance,
            self.surface.handle(),
            reported.width,
            reported.height,
        )?;
        let extent = self.swapchain.extent();

        // The depth attachment's extent must stay in lockstep with the chain
        if !extents_match(self.depth_buffer.extent(), extent) {
            let new_depth = DepthBuffer::new(
                (*self.device).clone(),
                extent.width,
                extent.height,
                self.depth_buffer.format(),
            )?;
            unsafe {
                ManuallyDrop::drop(&mut self.depth_buffer);
            }
            self.depth_buffer = ManuallyDrop::new(new_depth);
        }

        // Pools, fences, and semaphores survive a same-count recreation
        let image_count = self.swapchain.image_count() as usize;
        if image_count != self.perframes.len() {
            warn!(
                "Swapchain image count changed ({} -> {}); rebuilding per-frame sets",
                self.perframes.len(),
                image_count
            );
            for perframe in &mut self.perframes {
                if let Some(token) = perframe.take_image_available() {
                    self.semaphore_pool.release(token);
                }
            }
            self.perframes.clear();
            self.semaphore_pool.destroy(&self.device);
            self.semaphore_pool = SemaphorePool::new(&self.device, image_count as u32)?;
            self.perframes = Self::create_perframes(&self.device, image_count)?;
        }

        self.framebuffers =
            Self::create_framebuffers(&self.render_pass, &self.swapchain, &self.depth_buffer)?;

        info!("Swapchain rebuilt at {}x{}", extent.width, extent.height);
        Ok(())
    }

    /// Destroys all framebuffers.
    fn destroy_framebuffers(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
    }

    /// Returns the current swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the swapchain color format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    /// Returns the logical device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for RenderContext {
    fn drop(&mut self) {
        // Destroying anything while the GPU still references it is undefined
        // behavior; drain all queues first
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during shutdown: {:?}", e);
        }

        // Per-frame sets first: their tokens reference pool entries
        for perframe in &mut self.perframes {
            let _ = perframe.take_image_available();
        }
        self.perframes.clear();
        self.semaphore_pool.destroy(&self.device);

        self.destroy_framebuffers();

        unsafe {
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.depth_buffer);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Render context destroyed");
    }
}

/// True for the result codes that mean "surface changed, rebuild and carry
/// on" rather than tick failure.
fn is_rebuild_result(result: vk::Result) -> bool {
    matches!(
        result,
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR
    )
}

/// True when either dimension is zero (e.g. a minimized window).
fn is_zero_extent(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// Dimension-wise extent equality.
fn extents_match(a: vk::Extent2D, b: vk::Extent2D) -> bool {
    a.width == b.width && a.height == b.height
}

/// The extent the surface currently reports.
///
/// When the surface does not pin its extent (special value u32::MAX), the
/// active swapchain extent is used instead.
fn reported_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    fallback: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_surface_results_trigger_rebuild_not_failure() {
        assert!(is_rebuild_result(vk::Result::ERROR_OUT_OF_DATE_KHR));
        assert!(is_rebuild_result(vk::Result::SUBOPTIMAL_KHR));
    }

    #[test]
    fn unhandled_results_are_fatal() {
        assert!(!is_rebuild_result(vk::Result::ERROR_DEVICE_LOST));
        assert!(!is_rebuild_result(vk::Result::ERROR_SURFACE_LOST_KHR));
        assert!(!is_rebuild_result(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
        assert!(!is_rebuild_result(vk::Result::TIMEOUT));
    }

    #[test]
    fn zero_extent_detection() {
        assert!(is_zero_extent(vk::Extent2D {
            width: 0,
            height: 720
        }));
        assert!(is_zero_extent(vk::Extent2D {
            width: 1280,
            height: 0
        }));
        assert!(!is_zero_extent(vk::Extent2D {
            width: 1280,
            height: 720
        }));
    }

    #[test]
    fn unchanged_extent_is_a_match() {
        let a = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let b = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let c = vk::Extent2D {
            width: 1920,
            height: 1080,
        };
        assert!(extents_match(a, b));
        assert!(!extents_match(a, c));
    }

    #[test]
    fn reported_extent_prefers_pinned_value() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let fallback = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let reported = reported_extent(&capabilities, fallback);
        assert_eq!(reported.width, 1920);
        assert_eq!(reported.height, 1080);
    }

    #[test]
    fn reported_extent_falls_back_when_unpinned() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            ..Default::default()
        };
        let fallback = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let reported = reported_extent(&capabilities, fallback);
        assert_eq!(reported.width, 800);
        assert_eq!(reported.height, 600);
    }
}
