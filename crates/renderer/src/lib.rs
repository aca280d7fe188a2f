//! Frame lifecycle and resource binding.
//!
//! This crate orchestrates the rendering process:
//! - Frame-in-flight ring and the begin/end frame state machine
//! - Per-frame uniform layout and dynamic offsets
//! - Texture-slot table and per-draw materials
//! - The [`RenderBackend`] seam and its Vulkan implementation

pub mod backend;
pub mod binding;
pub mod frame_ring;
pub mod material;
pub mod renderer;
pub mod ubo;
pub mod vulkan;

pub use backend::{FrameStatistics, RenderBackend, RenderTarget, UniformRegion};
pub use binding::{DynamicOffsets, FrameLayout, TextureSlots};
pub use frame_ring::{FrameRing, FrameState};
pub use material::Material;
pub use renderer::Renderer;
pub use ubo::{CameraUniform, ObjectUniform, SceneUniform};
pub use vulkan::{VulkanBackend, VulkanRenderer, create_renderer};
