//! Platform layer for the Vulkan renderer.
//!
//! This crate provides:
//! - Window creation via winit
//! - Raw window handles for Vulkan surface creation
//! - [`FramebufferSource`], the window-side contract the renderer depends on

mod window;

pub use window::{FramebufferSource, Window, aspect_ratio};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
