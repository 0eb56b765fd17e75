//! Window management using winit.
//!
//! Window creation, Vulkan surface creation, and the resize signal that
//! connects the event loop to the render loop.

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use carousel_core::{Error, Result};

/// Resize latch shared between the event loop and the renderer.
///
/// The windowing layer calls [`ResizeSignal::raise`] from its resize
/// handler; the render loop calls [`ResizeSignal::take`] once per tick and
/// rebuilds the swapchain when it returns true. The windowing layer never
/// touches renderer-owned resources directly.
#[derive(Clone, Default)]
pub struct ResizeSignal {
    flag: Arc<AtomicBool>,
}

impl ResizeSignal {
    /// Creates an unraised signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the surface size as changed.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Consumes the signal: true when it was raised since the last take.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }

    /// Peeks without consuming.
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// RAII wrapper for a Vulkan surface.
///
/// Owns a `vk::SurfaceKHR` and the loader needed to query and destroy it.
/// The Vulkan instance must outlive this value.
pub struct Surface {
    handle: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Raw surface handle; valid only while this `Surface` lives.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// The surface extension loader, for capability/format queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    /// Current surface capabilities for `physical_device`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        // SAFETY: handle and loader come from the same instance.
        unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
                .map_err(|e| Error::Surface(format!("capability query failed: {}", e)))
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        // SAFETY: the handle was created by ash_window::create_surface with
        // this loader's instance, and this is the only destroy site.
        unsafe {
            self.surface_loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}

/// Winit window wrapper exposing what surface creation needs.
pub struct Window {
    window: Arc<WinitWindow>,
    width: u32,
    height: u32,
}

impl Window {
    /// Creates a resizable window with the given size and title.
    ///
    /// # Errors
    ///
    /// Returns an error if winit refuses to create the window.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(true);

        let window = event_loop
            .create_window(attrs)
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self {
            window: Arc::new(window),
            width,
            height,
        })
    }

    /// The underlying winit window.
    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Last known width in physical pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Last known height in physical pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Records new dimensions (call from the resize event handler).
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        tracing::debug!("Window resized: {}x{}", width, height);
    }

    /// Asks winit for another redraw.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Creates a Vulkan surface for this window.
    ///
    /// The returned RAII [`Surface`] destroys itself on drop; `instance`
    /// must outlive it.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw handles cannot be obtained or surface
    /// creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let display = self
            .window
            .display_handle()
            .map_err(|e| Error::Window(format!("no display handle: {}", e)))?;
        let window = self
            .window
            .window_handle()
            .map_err(|e| Error::Window(format!("no window handle: {}", e)))?;

        // SAFETY: entry/instance are live, the raw handles come from a live
        // winit window, and Surface::drop is the only destroy site.
        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
                .map_err(|e| Error::Vulkan(format!("surface creation failed: {}", e)))?
        };

        let surface_loader = ash::khr::surface::Instance::new(entry, instance);

        tracing::info!("Vulkan surface created");

        Ok(Surface {
            handle,
            surface_loader,
        })
    }
}

/// Instance extensions the current platform needs for surface creation.
///
/// The returned pointers reference static strings owned by the Vulkan
/// loader and stay valid for the life of the process.
///
/// # Errors
///
/// Returns an error if enumeration fails.
pub fn get_required_extensions(
    display_handle: raw_window_handle::RawDisplayHandle,
) -> Result<Vec<*const i8>> {
    let extensions = ash_window::enumerate_required_extensions(display_handle)
        .map_err(|e| Error::Vulkan(format!("extension enumeration failed: {}", e)))?;

    Ok(extensions.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_signal_take_consumes() {
        let signal = ResizeSignal::new();
        assert!(!signal.take());

        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.take());
        // Consumed: a second take observes nothing
        assert!(!signal.take());
    }

    #[test]
    fn resize_signal_clones_share_state() {
        let signal = ResizeSignal::new();
        let other = signal.clone();

        other.raise();
        assert!(signal.take());
    }
}
