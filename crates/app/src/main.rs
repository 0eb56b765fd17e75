//! Carousel - Main Entry Point
//!
//! Drives the frame synchronization engine with a winit event loop and a
//! minimal demo scene. The demo clears the screen each frame; real
//! applications plug in their own [`SceneRender`] collaborator.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use ash::vk;
use carousel_core::FrameClock;
use carousel_platform::{ResizeSignal, Window};
use carousel_renderer::{RenderContext, SceneRender};

/// Demo collaborator: no geometry, no shadow casters.
///
/// The engine still records the full frame around it — shadow pass hook,
/// cleared color+depth pass, viewport/scissor — so the window shows the
/// clear color and exercises the whole synchronization path.
struct DemoScene;

impl SceneRender for DemoScene {
    fn object_count(&self) -> u32 {
        0
    }

    fn shadow_pass(
        &mut self,
        _cmd: vk::CommandBuffer,
        _extent: vk::Extent2D,
        _frame_index: usize,
        _object_count: u32,
    ) {
    }

    fn draw(&mut self, _cmd: vk::CommandBuffer, _frame_index: usize, _delta: f32) {}
}

struct App {
    window: Option<Window>,
    context: Option<RenderContext>,
    resize_signal: ResizeSignal,
    clock: FrameClock,
    scene: DemoScene,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            context: None,
            resize_signal: ResizeSignal::new(),
            clock: FrameClock::new(),
            scene: DemoScene,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, 1280, 720, "carousel") {
                Ok(window) => {
                    match RenderContext::new(&window, self.resize_signal.clone()) {
                        Ok(context) => {
                            info!("Initialization complete, entering main loop");
                            self.context = Some(context);
                            self.window = Some(window);
                        }
                        Err(e) => {
                            error!("Failed to create render context: {:?}", e);
                            event_loop.exit();
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                info!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                // The renderer picks this up at its next tick
                self.resize_signal.raise();
            }
            WindowEvent::RedrawRequested => {
                let delta = self.clock.tick_secs();

                if let Some(ref mut context) = self.context {
                    if let Err(e) = context.render_frame(&mut self.scene, delta) {
                        error!("Render error, stopping: {:?}", e);
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    carousel_core::init_logging();
    info!("Starting carousel");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
