//! Platform abstraction layer for the carousel renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Vulkan surface creation
//! - The resize signal the windowing layer raises for the renderer

mod window;

pub use window::{ResizeSignal, Surface, Window, get_required_extensions};

// Re-export winit types that users might need
pub use winit::event::{Event, WindowEvent};
pub use winit::event_loop::EventLoop;
