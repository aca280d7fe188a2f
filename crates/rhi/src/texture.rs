//! Sampled textures uploaded from decoded pixels.
//!
//! Decoding image files is left to the caller; this module takes tightly
//! packed RGBA8 pixels. The upload runs as one immediate submit on the
//! graphics queue:
//!
//! ```text
//! UNDEFINED -> TRANSFER_DST_OPTIMAL -> copy from staging -> SHADER_READ_ONLY_OPTIMAL
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::barrier::record_layout_transition;
use crate::buffer::{Buffer, BufferUsage};
use crate::command::CommandBuffer;
use crate::device::{Device, QueueKind};
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc};
use crate::upload::UploadContext;

/// Format of uploaded textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A sampled image in SHADER_READ_ONLY_OPTIMAL layout.
pub struct Texture {
    image: Image,
}

impl Texture {
    /// Uploads `pixels` (RGBA8, row-major, no padding) as a new texture.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceLoad`] when the pixel data does not match
    /// the dimensions, or the Vulkan error if creation or upload fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        upload: &UploadContext,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        validate_rgba8(width, height, pixels.len())?;

        let staging = Buffer::new(device.clone(), BufferUsage::Staging, pixels.len() as u64)?;
        staging.write_data(0, pixels)?;

        let extent = vk::Extent2D { width, height };
        let image = Image::new(device, &ImageDesc::texture(extent, TEXTURE_FORMAT))?;

        let (src, dst) = (staging.handle(), image.handle());
        upload.immediate_submit(QueueKind::Graphics, &|cmd: &CommandBuffer| {
            let color = vk::ImageAspectFlags::COLOR;
            record_layout_transition(
                cmd,
                dst,
                color,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            cmd.copy_buffer_to_image(src, dst, extent);
            record_layout_transition(
                cmd,
                dst,
                color,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        info!("Uploaded {}x{} texture", width, height);
        Ok(Self { image })
    }

    /// A 1x1 opaque white texture.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or upload fails.
    pub fn white(device: Arc<Device>, upload: &UploadContext) -> RhiResult<Self> {
        Self::from_rgba8(device, upload, 1, 1, &[255, 255, 255, 255])
    }

    /// Image view to bind for sampling.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    /// Texture size in pixels.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

fn validate_rgba8(width: u32, height: u32, len: usize) -> RhiResult<()> {
    if width == 0 || height == 0 {
        return Err(RhiError::ResourceLoad(format!(
            "texture dimensions must be nonzero, got {}x{}",
            width, height
        )));
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(RhiError::ResourceLoad(format!(
            "{}x{} RGBA8 texture needs {} bytes, got {}",
            width, height, expected, len
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rgba8_accepts_exact_size() {
        assert!(validate_rgba8(2, 3, 24).is_ok());
    }

    #[test]
    fn test_validate_rgba8_rejects_short_data() {
        let err = validate_rgba8(2, 2, 15).unwrap_err();
        assert!(matches!(err, RhiError::ResourceLoad(_)));
        assert!(err.to_string().contains("needs 16 bytes"));
    }

    #[test]
    fn test_validate_rgba8_rejects_zero_size() {
        assert!(matches!(
            validate_rgba8(0, 4, 0),
            Err(RhiError::ResourceLoad(_))
        ));
    }
}
