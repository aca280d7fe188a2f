//! Window management using winit.

use std::sync::Arc;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use renderer_core::{Error, Result};

/// Source of the current framebuffer size.
///
/// The renderer asks for the size whenever it rebuilds the swapchain. While
/// either dimension is zero (a minimized window) it defers the rebuild and
/// asks again on the next frame, so the swapchain never gets a zero extent
/// and the event loop that delivers new sizes is never blocked.
pub trait FramebufferSource {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> (u32, u32);
}

/// Width over height, or 1.0 for a degenerate size.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// Shared handle to a winit window.
///
/// Clones refer to the same window.
#[derive(Clone)]
pub struct Window {
    window: Arc<WinitWindow>,
}

impl Window {
    /// Creates a resizable window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if winit cannot create the window.
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
        })
    }

    pub fn inner(&self) -> &WinitWindow {
        &self.window
    }

    /// Current framebuffer aspect ratio.
    pub fn aspect_ratio(&self) -> f32 {
        let (width, height) = self.framebuffer_size();
        aspect_ratio(width, height)
    }

    /// True while the window has no drawable area.
    pub fn is_minimized(&self) -> bool {
        let (width, height) = self.framebuffer_size();
        width == 0 || height == 0
    }

    /// Raw display handle for instance extension selection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the handle is unavailable.
    pub fn raw_display_handle(&self) -> Result<RawDisplayHandle> {
        self.window
            .display_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| Error::Window(format!("Failed to get display handle: {}", e)))
    }

    /// Raw window handle for surface creation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the handle is unavailable.
    pub fn raw_window_handle(&self) -> Result<RawWindowHandle> {
        self.window
            .window_handle()
            .map(|handle| handle.as_raw())
            .map_err(|e| Error::Window(format!("Failed to get window handle: {}", e)))
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl FramebufferSource for Window {
    fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}
