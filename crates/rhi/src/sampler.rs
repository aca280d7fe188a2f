//! Texture samplers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan sampler wrapper.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering with repeat addressing.
    ///
    /// `anisotropy` is clamped to the device limit; values of 1.0 or less
    /// disable anisotropic filtering.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn linear_repeat(device: Arc<Device>, anisotropy: f32) -> RhiResult<Self> {
        let max_anisotropy = clamp_anisotropy(anisotropy, device.limits().max_sampler_anisotropy);
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy > 1.0)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_op(vk::CompareOp::ALWAYS)
            .max_lod(vk::LOD_CLAMP_NONE);

        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        debug!("Created linear sampler (anisotropy {})", max_anisotropy);

        Ok(Self { device, sampler })
    }

    /// Returns the Vulkan sampler handle.
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

fn clamp_anisotropy(requested: f32, device_max: f32) -> f32 {
    requested.clamp(1.0, device_max.max(1.0))
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_anisotropy() {
        assert_eq!(clamp_anisotropy(16.0, 8.0), 8.0);
        assert_eq!(clamp_anisotropy(4.0, 16.0), 4.0);
        assert_eq!(clamp_anisotropy(0.0, 16.0), 1.0);
        assert_eq!(clamp_anisotropy(8.0, 0.0), 1.0);
    }
}
