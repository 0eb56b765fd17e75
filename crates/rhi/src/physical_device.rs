//! Physical device (GPU) selection.
//!
//! Enumerates available GPUs and picks the one best suited for presenting
//! to the given surface. A device qualifies when it has graphics and
//! present queue families; a transfer family is recorded as well (falling
//! back to the graphics family) for upload collaborators.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices for the roles the engine consumes.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    /// Family with graphics support.
    pub graphics_family: Option<u32>,
    /// Family that can present to the surface.
    pub present_family: Option<u32>,
    /// Family used for transfer work.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True when the minimum roles (graphics + present) are covered.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Deduplicated family indices, for device creation.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        let mut push = |family: Option<u32>| {
            if let Some(index) = family {
                if !families.contains(&index) {
                    families.push(index);
                }
            }
        };

        push(self.graphics_family);
        push(self.present_family);
        push(self.transfer_family);

        families
    }
}

/// Everything the engine needs to know about a selected GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Physical device handle.
    pub device: vk::PhysicalDevice,
    /// Properties record (name, limits, API version).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue families for the roles the engine consumes.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Device name as UTF-8, or a placeholder when the driver string is odd.
    pub fn device_name(&self) -> &str {
        device_name_of(&self.properties)
    }

    /// Human-readable device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Sum of device-local heap sizes, in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Picks the most suitable GPU for rendering to `surface`.
///
/// Every device with graphics + present support is rated; the highest
/// rating wins, with discrete GPUs strongly preferred.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs present");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Enumerated {} GPU(s)", devices.len());

    let mut best: Option<(PhysicalDeviceInfo, u32)> = None;

    for device in devices {
        let Some(candidate) = qualify_device(instance, device, surface, surface_loader) else {
            continue;
        };

        let rating = rate_device(&candidate);
        debug!(
            "GPU '{}' ({}): rating {}",
            candidate.device_name(),
            candidate.device_type_name(),
            rating
        );

        if best.as_ref().map_or(true, |(_, r)| rating > *r) {
            best = Some((candidate, rating));
        }
    }

    let (selected, rating) = best.ok_or_else(|| {
        warn!("No GPU offers the required queue families");
        RhiError::NoSuitableGpu
    })?;

    info!(
        "Selected GPU '{}' ({}), rating {}",
        selected.device_name(),
        selected.device_type_name(),
        rating
    );

    Ok(selected)
}

/// Returns the device's info when it meets the minimum requirements.
fn qualify_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

    let queue_families = find_queue_families(instance, device, surface, surface_loader);

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: graphics={}, present={}",
            device_name_of(&properties),
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return None;
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    })
}

/// Locates families for the graphics, present, and transfer roles.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut indices = QueueFamilyIndices::default();
    let mut dedicated_transfer: Option<u32> = None;

    for (index, family) in family_properties.iter().enumerate() {
        let index = index as u32;

        if family.queue_count == 0 {
            continue;
        }

        let graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let compute = family.queue_flags.contains(vk::QueueFlags::COMPUTE);
        let transfer = family.queue_flags.contains(vk::QueueFlags::TRANSFER);

        if graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(index);
        }

        // A transfer-only family is best for async uploads
        if transfer {
            if !graphics && !compute && dedicated_transfer.is_none() {
                dedicated_transfer = Some(index);
            } else if indices.transfer_family.is_none() {
                indices.transfer_family = Some(index);
            }
        }

        if indices.present_family.is_none() {
            let can_present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            };
            if can_present {
                indices.present_family = Some(index);
            }
        }
    }

    if dedicated_transfer.is_some() {
        indices.transfer_family = dedicated_transfer;
    }

    // Graphics families always support transfer
    if indices.transfer_family.is_none() {
        indices.transfer_family = indices.graphics_family;
    }

    indices
}

/// Rates a GPU; higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut rating = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    rating += info.properties.limits.max_image_dimension2_d;

    // VRAM in MB, capped so a workstation card doesn't dwarf the type bonus
    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    rating += vram_mb.min(16000);

    rating
}

/// Device name out of a raw properties record.
fn device_name_of(properties: &vk::PhysicalDeviceProperties) -> &str {
    unsafe {
        CStr::from_ptr(properties.device_name.as_ptr())
            .to_str()
            .unwrap_or("Unknown Device")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(
        graphics: Option<u32>,
        present: Option<u32>,
        transfer: Option<u32>,
    ) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics_family: graphics,
            present_family: present,
            transfer_family: transfer,
        }
    }

    #[test]
    fn default_indices_are_incomplete() {
        assert!(!QueueFamilyIndices::default().is_complete());
    }

    #[test]
    fn graphics_plus_present_is_complete() {
        assert!(indices(Some(0), Some(0), None).is_complete());
        assert!(indices(Some(2), Some(1), Some(3)).is_complete());
    }

    #[test]
    fn single_role_is_incomplete() {
        assert!(!indices(Some(0), None, None).is_complete());
        assert!(!indices(None, Some(0), None).is_complete());
        assert!(!indices(None, None, Some(0)).is_complete());
    }

    #[test]
    fn unique_families_deduplicates() {
        assert_eq!(indices(Some(0), Some(0), Some(0)).unique_families(), vec![0]);
        assert_eq!(
            indices(Some(0), Some(0), Some(1)).unique_families(),
            vec![0, 1]
        );

        let distinct = indices(Some(2), Some(1), Some(0)).unique_families();
        assert_eq!(distinct.len(), 3);
        for family in [0, 1, 2] {
            assert!(distinct.contains(&family));
        }
    }
}
