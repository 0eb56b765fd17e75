//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition,
//! presentation, and recreation when the surface is invalidated.
//!
//! # Recreation
//!
//! [`Swapchain::recreate`] passes the old chain handle to the creation call
//! so the platform can reuse internal resources and avoid presentation
//! artifacts during a resize. The old handle is destroyed as soon as the new
//! chain exists.

use std::sync::Arc;

use ash::prelude::VkResult;
use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// What the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Min/max image counts, extents, and transforms
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Format and color-space combinations the surface accepts
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Present modes the surface accepts
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries the surface's swapchain support for a physical device.
    ///
    /// # Errors
    ///
    /// Returns an error if any surface query fails.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            "Surface support: {} formats, {} present modes",
            formats.len(),
            present_modes.len()
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True when the surface can host a swapchain at all.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Vulkan swapchain wrapper.
///
/// Manages the presentable image chain and the image views bound to it.
/// Images themselves are owned by the swapchain and go away with it.
///
/// # Thread Safety
///
/// Not thread-safe; acquire/present are issued from the render thread only.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a new swapchain.
    ///
    /// Format preference is B8G8R8A8_SRGB with SRGB_NONLINEAR, present mode
    /// preference MAILBOX with FIFO fallback, image count one above the
    /// surface minimum (clamped to the surface maximum).
    ///
    /// # Errors
    ///
    /// Returns an error if surface queries fail, no format or present mode
    /// is available, or chain/image-view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        Self::build(
            instance,
            device,
            surface,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    /// Shared path for initial creation and recreation.
    fn build(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self, RhiError> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let details =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        if !details.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&details.formats);
        let present_mode = choose_present_mode(&details.present_modes);
        let extent = choose_extent(&details.capabilities, width, height);
        let image_count = choose_image_count(&details.capabilities);

        info!(
            "Creating swapchain: {}x{}, {:?}, {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        // Graphics and present families may differ; share images if they do
        let families = device.queue_families();
        let graphics_family = families.graphics_family.ok_or_else(|| {
            RhiError::SwapchainError("device has no graphics family".to_string())
        })?;
        let present_family = families.present_family.ok_or_else(|| {
            RhiError::SwapchainError("device has no present family".to_string())
        })?;
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_indices_slice) = if graphics_family == present_family {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        } else {
            debug!(
                "Graphics ({}) and present ({}) families differ; CONCURRENT sharing",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        };

        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices_slice)
            .pre_transform(details.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };
        let image_views = create_image_views(&device, &images, surface_format.format)?;

        info!("Swapchain ready with {} images", images.len());

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Recreates the swapchain for a new surface size, reusing the old chain.
    ///
    /// # Safety (caller contract)
    ///
    /// The caller must ensure no GPU work referencing the old chain's images
    /// is still in flight — in practice, a device-idle wait before calling
    /// this.
    ///
    /// # Errors
    ///
    /// Returns an error if recreation fails.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<(), RhiError> {
        info!("Recreating swapchain at {}x{}", width, height);

        // Old image views die first; images belong to the old chain itself
        self.destroy_image_views();

        let retired = self.swapchain;
        let mut replacement = Self::build(
            instance,
            self.device.clone(),
            surface,
            width,
            height,
            retired,
        )?;

        unsafe {
            self.swapchain_loader.destroy_swapchain(retired, None);
        }

        self.swapchain = replacement.swapchain;
        self.images = std::mem::take(&mut replacement.images);
        self.image_views = std::mem::take(&mut replacement.image_views);
        self.format = replacement.format;
        self.extent = replacement.extent;
        self.present_mode = replacement.present_mode;

        // Null out the temporary's handle so its Drop does not double-free
        replacement.swapchain = vk::SwapchainKHR::null();

        Ok(())
    }

    /// Acquires the next swapchain image for rendering.
    ///
    /// Waits without bound and signals `semaphore` once the image is ready.
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)` — `suboptimal` is true when the chain
    /// still works but no longer matches the surface exactly.
    ///
    /// # Errors
    ///
    /// Returns the raw `vk::Result` on failure;
    /// `vk::Result::ERROR_OUT_OF_DATE_KHR` means the caller must recreate
    /// the chain.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents the image at `image_index` on `queue`, waiting on
    /// `wait_semaphore` (signaled by the rendering submission).
    ///
    /// # Returns
    ///
    /// True if the swapchain is suboptimal and should be recreated.
    ///
    /// # Errors
    ///
    /// Returns the raw `vk::Result` on failure, including
    /// `vk::Result::ERROR_OUT_OF_DATE_KHR`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Raw swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Color format of the chain's images.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Current chain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Active present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Number of images in the chain.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Image at `index`; panics when out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Image view at `index`; panics when out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    /// Views for every image in the chain, in index order.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for &view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        // Null handle means recreate() already moved ownership elsewhere
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }

            info!(
                "Swapchain destroyed ({}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Picks the surface format: B8G8R8A8_SRGB, then B8G8R8A8_UNORM (both with
/// SRGB_NONLINEAR), then whatever the surface lists first.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let wanted = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    for candidate in wanted {
        let found = formats.iter().find(|f| {
            f.format == candidate && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        });
        if let Some(&format) = found {
            return format;
        }
    }

    warn!(
        "No preferred surface format; using {:?}",
        formats[0].format
    );
    formats[0]
}

/// Picks the present mode: MAILBOX when offered (no tearing, low latency),
/// otherwise FIFO, which Vulkan guarantees to exist.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        debug!("Present mode: MAILBOX");
        vk::PresentModeKHR::MAILBOX
    } else {
        debug!("Present mode: FIFO");
        vk::PresentModeKHR::FIFO
    }
}

/// Picks the chain extent: the surface-pinned value when set (width !=
/// u32::MAX), otherwise the requested size clamped to the surface limits.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.clamp(min.width, max.width),
        height: height.clamp(min.height, max.height),
    }
}

/// Picks the image count: one above the surface minimum so the driver's
/// internal work never blocks the next acquire, capped by a non-zero
/// surface maximum.
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;

    match capabilities.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}

/// Builds one color view per chain image.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let subresource = vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1);

    let views = images
        .iter()
        .map(|&image| {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(subresource);
            unsafe { device.handle().create_image_view(&view_info, None) }
        })
        .collect::<VkResult<Vec<_>>>()?;

    Ok(views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(fmt: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format: fmt,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn surface_format_prefers_bgra_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
            format(vk::Format::B8G8R8A8_UNORM),
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn surface_format_second_choice_is_bgra_unorm() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_UNORM),
        ];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn surface_format_falls_back_to_first_listed() {
        let formats = [format(vk::Format::R16G16B16A16_SFLOAT)];

        let selected = choose_surface_format(&formats);
        assert_eq!(selected.format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO,
        ];

        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO];

        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_surface_pinned_value() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 2560,
                height: 1440,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 8192,
                height: 8192,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 640, 480);
        assert_eq!((extent.width, extent.height), (2560, 1440));
    }

    #[test]
    fn extent_clamps_requested_size_when_unpinned() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        };

        let too_big = choose_extent(&capabilities, 9000, 9000);
        assert_eq!((too_big.width, too_big.height), (4096, 4096));

        let too_small = choose_extent(&capabilities, 16, 16);
        assert_eq!((too_small.width, too_small.height), (64, 64));

        let in_range = choose_extent(&capabilities, 1024, 768);
        assert_eq!((in_range.width, in_range.height), (1024, 768));
    }

    #[test]
    fn image_count_is_min_plus_one_capped_by_max() {
        let capped = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capped), 3);

        let roomy = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 16,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&roomy), 4);

        // max_image_count == 0 means unbounded
        let unbounded = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&unbounded), 3);
    }

    #[test]
    fn adequacy_needs_formats_and_modes() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(!no_formats.is_adequate());
    }
}
