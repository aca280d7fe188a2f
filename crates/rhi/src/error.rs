//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// The selected GPU lacks device extensions the renderer cannot run without
    #[error("Missing required device extensions: {}", .0.join(", "))]
    MissingDeviceExtensions(Vec<String>),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Descriptor layout, pool or write error
    #[error("Descriptor error: {0}")]
    DescriptorError(String),

    /// Texture or buffer contents could not be loaded
    #[error("Resource load error: {0}")]
    ResourceLoad(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_extensions_message() {
        let err = RhiError::MissingDeviceExtensions(vec![
            "VK_KHR_swapchain".to_string(),
            "VK_KHR_dynamic_rendering".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required device extensions: VK_KHR_swapchain, VK_KHR_dynamic_rendering"
        );
    }

    #[test]
    fn test_vk_result_conversion() {
        let err: RhiError = ash::vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, RhiError::VulkanError(ash::vk::Result::ERROR_DEVICE_LOST)));
    }
}
