//! Window surface ownership.

use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// RAII wrapper for a Vulkan surface.
///
/// Owns a `vk::SurfaceKHR` together with the surface extension loader used to
/// query capabilities, formats and present modes. The instance must outlive it.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Creates a surface for the given native window.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceError`] if the window system is unsupported or
    /// surface creation fails.
    pub fn new(
        instance: &Instance,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        // SAFETY: the handles come from a live window owned by the caller and
        // the surface is destroyed before the instance in `GpuContext`.
        let handle = unsafe {
            ash_window::create_surface(instance.entry(), instance.handle(), display, window, None)
                .map_err(|e| RhiError::SurfaceError(format!("failed to create surface: {e}")))?
        };
        let loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        info!("Vulkan surface created");

        Ok(Self { handle, loader })
    }

    /// Get the raw Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Get the surface extension loader.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}
