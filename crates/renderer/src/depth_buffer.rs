//! Depth attachment for the main render pass.
//!
//! One D32_SFLOAT image + view sized to the swapchain extent, backed by
//! GPU-only memory from gpu-allocator. The render context recreates it
//! whenever a resize changes the swapchain extent so the framebuffer
//! attachments always agree on their dimensions.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, info};

use carousel_rhi::device::Device;
use carousel_rhi::{RhiError, RhiResult};

/// Default depth format (32-bit float, no stencil).
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Depth image, its view, and the allocation backing it.
///
/// Teardown order: view, image, then the allocation.
pub struct DepthBuffer {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a depth buffer of the given size and format.
    ///
    /// # Errors
    ///
    /// Fails on zero dimensions, or when image creation, allocation, or
    /// view creation fails.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
    ) -> RhiResult<Self> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(
                "depth buffer needs non-zero dimensions".to_string(),
            ));
        }

        let extent = vk::Extent2D { width, height };
        let image = create_depth_image(&device, extent, format)?;

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate(&AllocationCreateDesc {
                name: "depth-attachment",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let subresource = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::DEPTH)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(subresource);

        let image_view = unsafe { device.handle().create_image_view(&view_info, None)? };

        info!(
            "Depth buffer created: {}x{} ({:?})",
            width, height, format
        );

        Ok(Self {
            device,
            image,
            image_view,
            allocation: Some(allocation),
            format,
            extent,
        })
    }

    /// Creates a depth buffer using [`DEFAULT_DEPTH_FORMAT`].
    ///
    /// # Errors
    ///
    /// Same failure modes as [`DepthBuffer::new`].
    pub fn with_default_format(device: Arc<Device>, width: u32, height: u32) -> RhiResult<Self> {
        Self::new(device, width, height, DEFAULT_DEPTH_FORMAT)
    }

    /// Raw depth image handle.
    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Raw depth image view handle.
    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Depth format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Dimensions of the depth image.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

/// Builds the depth image itself (no memory bound yet).
fn create_depth_image(
    device: &Device,
    extent: vk::Extent2D,
    format: vk::Format,
) -> RhiResult<vk::Image> {
    let create_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.handle().create_image(&create_info, None)? };
    Ok(image)
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_image_view(self.image_view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free depth allocation: {:?}", e);
            }
        }

        debug!(
            "Depth buffer destroyed ({}x{})",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_d32() {
        assert_eq!(DEFAULT_DEPTH_FORMAT, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn default_format_has_depth_aspect() {
        assert!(matches!(
            DEFAULT_DEPTH_FORMAT,
            vk::Format::D32_SFLOAT
                | vk::Format::D32_SFLOAT_S8_UINT
                | vk::Format::D24_UNORM_S8_UINT
                | vk::Format::D16_UNORM
        ));
    }
}
