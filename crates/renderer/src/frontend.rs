//! Renderer frontend.
//!
//! The frontend owns a backend and turns a [`RenderPacket`] into one
//! begin/end pair. An error from [`Renderer::draw_frame`] is fatal: the
//! caller is expected to stop its run loop.

use tracing::{error, info, trace};

use ember_rhi::RhiResult;
use ember_rhi::surface::SurfaceSource;

use crate::backend::RendererBackend;

/// Per-frame input to [`Renderer::draw_frame`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RenderPacket {
    /// Seconds since the previous frame.
    pub delta_time: f32,
}

pub struct Renderer {
    backend: Box<dyn RendererBackend>,
    frame_number: u64,
}

impl Renderer {
    pub fn new(backend: Box<dyn RendererBackend>) -> Self {
        Self {
            backend,
            frame_number: 0,
        }
    }

    pub fn initialize(&mut self, app_name: &str, platform: &dyn SurfaceSource) -> RhiResult<()> {
        info!("Initializing renderer for '{}'", app_name);

        self.backend.initialize(app_name, platform).inspect_err(|e| {
            error!("Renderer backend failed to initialize: {}", e);
        })
    }

    pub fn shutdown(&mut self) {
        self.backend.shutdown();
        info!("Renderer shut down after {} frames", self.frame_number);
    }

    pub fn resized(&mut self, width: u32, height: u32) {
        self.backend.resized(width, height);
    }

    /// Draws one frame.
    ///
    /// A frame skipped by the backend (minimized window, swapchain rebuild)
    /// is not an error.
    pub fn draw_frame(&mut self, packet: &RenderPacket) -> RhiResult<()> {
        if !self.backend.begin_frame(packet.delta_time)? {
            trace!("Frame skipped");
            return Ok(());
        }

        self.frame_number += 1;

        self.backend.end_frame(packet.delta_time).inspect_err(|e| {
            error!("Frame {} failed to end: {}", self.frame_number, e);
        })
    }

    /// Frames successfully begun so far.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}
