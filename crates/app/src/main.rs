//! Ember - Main Entry Point
//!
//! Opens a window and clears it every frame through the Vulkan backend.
//! Settings are read from `ember.toml` in the working directory.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use ember_core::{EngineConfig, FrameTimer, LoadedConfig};
use ember_platform::Window;
use ember_renderer::{RenderPacket, Renderer, RendererBackendKind, create_backend};

// The renderer is declared first so it drops before the window.
struct App {
    renderer: Option<Renderer>,
    window: Option<Window>,
    config: EngineConfig,
    timer: FrameTimer,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            renderer: None,
            window: None,
            config,
            timer: FrameTimer::new(),
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.shutdown();
        }
        info!(
            "{} frames in {:.1}s ({:.1} fps average)",
            self.timer.frames(),
            self.timer.elapsed().as_secs_f32(),
            self.timer.average_fps()
        );
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(event_loop, &self.config.window) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let backend = create_backend(RendererBackendKind::Vulkan, &self.config.renderer);
        let mut renderer = Renderer::new(backend);

        if let Err(e) = renderer.initialize(&self.config.renderer.application_name, &window) {
            error!("Failed to initialize renderer: {}", e);
            event_loop.exit();
            return;
        }

        info!("Initialization complete, entering main loop");
        self.timer.reset();
        self.renderer = Some(renderer);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                info!("Escape pressed, shutting down");
                self.shutdown(event_loop);
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let packet = RenderPacket {
                    delta_time: self.timer.tick(),
                };

                if let Some(ref mut renderer) = self.renderer
                    && let Err(e) = renderer.draw_frame(&packet)
                {
                    error!("Frame failed, stopping: {}", e);
                    self.shutdown(event_loop);
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
    let LoadedConfig { config, source } = EngineConfig::load();
    ember_core::init_logging(&config.logging);
    info!("Starting Ember");
    source.log();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
