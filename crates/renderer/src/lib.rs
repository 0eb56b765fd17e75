//! Frame synchronization and resource-rotation engine.
//!
//! This crate orchestrates the per-frame rendering loop:
//! - Swapchain image acquisition gated by a recycled semaphore pool
//! - Per-image resource sets (command pool, fence, semaphores)
//! - Submission and presentation with correct semaphore/fence dependencies
//! - Transparent swapchain recreation when the surface is invalidated

pub mod depth_buffer;
pub mod perframe;
pub mod renderer;
pub mod scene;
pub mod semaphore_pool;

pub use renderer::RenderContext;
pub use scene::SceneRender;
pub use semaphore_pool::{PooledSemaphore, SemaphorePool};
