//! Error type for the Vulkan abstraction layer.

use thiserror::Error;

/// Errors produced by the Vulkan abstraction layer.
#[derive(Error, Debug)]
pub enum RhiError {
    /// A raw Vulkan call returned a non-success code
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan loader could not be found or initialized
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// gpu-allocator failed to service an allocation
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No enumerated GPU satisfies the queue-family requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Creating or querying the window surface failed
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Creating or recreating the swapchain failed
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A handle was missing or used outside its valid lifetime
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

/// Result alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
