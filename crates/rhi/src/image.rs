//! GPU image management.
//!
//! # Overview
//!
//! [`Image`] wraps a 2D VkImage, its gpu-allocator memory and one image view
//! covering the whole image. Render targets, depth buffers and textures are
//! all built on it.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::image::{DEFAULT_DEPTH_FORMAT, Image, ImageDesc};
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let depth = Image::new(
//!     device,
//!     &ImageDesc::depth(vk::Extent2D { width: 1920, height: 1080 }, DEFAULT_DEPTH_FORMAT),
//! )?;
//! let view = depth.view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::barrier::subresource_range;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Default depth buffer format (32-bit floating point).
pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Parameters for creating an [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub name: &'static str,
}

impl ImageDesc {
    /// Color render target that can also be sampled and copied from.
    pub fn color_target(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC,
            name: "color_target",
        }
    }

    /// Depth attachment.
    pub fn depth(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            name: "depth_buffer",
        }
    }

    /// Sampled texture filled by a transfer.
    pub fn texture(extent: vk::Extent2D, format: vk::Format) -> Self {
        Self {
            extent,
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            name: "texture",
        }
    }
}

/// Aspect covered by views of `format`.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// 2D image with device-local memory and a full view.
///
/// Destroyed in the order view, image, allocation.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    name: &'static str,
}

impl Image {
    /// Creates the image, binds memory and creates its view.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent, or if image creation, memory
    /// allocation or view creation fails.
    pub fn new(device: Arc<Device>, desc: &ImageDesc) -> RhiResult<Self> {
        let vk::Extent2D { width, height } = desc.extent;
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} dimensions must be greater than 0",
                desc.name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocated = device.lock_allocator().and_then(|mut allocator| {
            Ok(allocator.allocate(&AllocationCreateDesc {
                name: desc.name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?)
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut created = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            format: desc.format,
            extent: desc.extent,
            name: desc.name,
        };

        if let Some(allocation) = created.allocation.as_ref() {
            unsafe {
                created.device.handle().bind_image_memory(
                    image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(desc.format)
            .subresource_range(subresource_range(aspect_for_format(desc.format)));
        created.view = unsafe { created.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {}: {}x{} ({:?})",
            desc.name, width, height, desc.format
        );

        Ok(created)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Aspect of the image's view.
    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_for_format(self.format)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free {} allocation: {:?}", self.name, e);
                    }
                }
                Err(e) => error!("Leaking {} allocation: {}", self.name, e),
            }
        }

        debug!(
            "Destroyed {}: {}x{}",
            self.name, self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_aspects() {
        assert_eq!(aspect_for_format(DEFAULT_DEPTH_FORMAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_color_aspects() {
        assert_eq!(aspect_for_format(vk::Format::R8G8B8A8_SRGB), vk::ImageAspectFlags::COLOR);
        assert_eq!(aspect_for_format(vk::Format::R32_SINT), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_desc_usages() {
        let extent = vk::Extent2D {
            width: 4,
            height: 4,
        };
        let target = ImageDesc::color_target(extent, vk::Format::B8G8R8A8_UNORM);
        assert!(target.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(target.usage.contains(vk::ImageUsageFlags::SAMPLED));

        let texture = ImageDesc::texture(extent, vk::Format::R8G8B8A8_SRGB);
        assert!(texture.usage.contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(!texture.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    }
}
