//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, surface and device creation behind an explicit [`context::GpuContext`]
//! - Swapchain management with recoverable acquire/present outcomes
//! - Command recording, frame submission and immediate (one-shot) submits
//! - Layout transition barriers and staged uploads
//! - Buffers, images, textures and samplers
//! - Descriptor layout caching, set allocation and writes
//! - Pipelines, shaders and render targets
//! - Synchronization primitives and GPU queries
//!
//! Every device-level object owns an `Arc<Device>` and destroys its handle
//! on drop, so the device outlives everything created from it.

mod error;

pub mod barrier;
pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod query;
pub mod rendering;
pub mod sampler;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
