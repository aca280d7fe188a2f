//! Vulkan implementation of the render backend.

mod backend;
mod frame;

pub use backend::{MAX_TEXTURES_CONSTANT_ID, PipelineDesc, PipelineTarget, VulkanBackend};
pub use frame::{FrameSlot, SetLayouts};

use renderer_core::RendererConfig;
use renderer_platform::Window;
use renderer_rhi::RhiResult;

use crate::renderer::Renderer;

/// The renderer driving a winit window through Vulkan.
pub type VulkanRenderer = Renderer<VulkanBackend, Window>;

/// Initializes Vulkan for `window` and wraps it in a [`Renderer`].
///
/// # Errors
///
/// Returns an error if device, swapchain or resource creation fails.
pub fn create_renderer(window: Window, config: &RendererConfig) -> RhiResult<VulkanRenderer> {
    let backend = VulkanBackend::new(&window, config)?;
    Ok(Renderer::new(backend, window, config))
}
