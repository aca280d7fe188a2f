//! Core utilities for the Vulkan renderer.
//!
//! This crate provides foundational types and utilities used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Renderer configuration
//! - Frame timing statistics

mod config;
mod error;
mod logging;
mod timer;

pub use config::{MAX_FRAMES_IN_FLIGHT, RendererConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameClock;
