//! GPU context: the explicitly constructed owner of instance, surface and device.
//!
//! # Overview
//!
//! [`GpuContext::new`] runs the device initialization sequence:
//!
//! 1. Instance (plus validation layer and debug messenger when requested)
//! 2. Window surface
//! 3. Physical device selection (queues, features, required extensions)
//! 4. Logical device, queues and memory allocator
//!
//! Components that need device, queue or allocator access hold a clone of
//! [`GpuContext::device`]. Those components must be dropped before the
//! context; the context then tears down device, debug messenger, surface and
//! instance in that order.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::context::GpuContext;
//! # fn example(window: &(impl raw_window_handle::HasDisplayHandle + raw_window_handle::HasWindowHandle)) -> renderer_rhi::RhiResult<()> {
//! let display = window.display_handle().map_err(|e| renderer_rhi::RhiError::SurfaceError(e.to_string()))?;
//! let handle = window.window_handle().map_err(|e| renderer_rhi::RhiError::SurfaceError(e.to_string()))?;
//! let context = GpuContext::new(true, display.as_raw(), handle.as_raw())?;
//! println!("Rendering on {}", context.physical_device().device_name());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{info, warn};

use crate::device::Device;
use crate::error::RhiResult;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, select_physical_device};
use crate::surface::Surface;

/// Owner of the device-level Vulkan objects.
///
/// Field order is drop order.
pub struct GpuContext {
    device: Arc<Device>,
    physical_device: PhysicalDeviceInfo,
    surface: Surface,
    instance: Instance,
}

impl GpuContext {
    /// Initializes Vulkan for the given window.
    ///
    /// # Arguments
    ///
    /// * `enable_validation` - Request the Khronos validation layer
    /// * `display` - Raw display handle of the window system
    /// * `window` - Raw handle of the window to present to
    ///
    /// # Errors
    ///
    /// Fails when Vulkan cannot be loaded, no GPU has the required queues,
    /// features and extensions, or any creation step fails. There is no
    /// degraded mode.
    pub fn new(
        enable_validation: bool,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RhiResult<Self> {
        let instance = Instance::new(enable_validation, Some(display))?;
        let surface = Surface::new(&instance, display, window)?;
        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        info!(
            "GPU context ready on '{}' (uniform alignment {} bytes)",
            physical_device.device_name(),
            physical_device.min_uniform_buffer_offset_alignment()
        );

        Ok(Self {
            device,
            physical_device,
            surface,
            instance,
        })
    }

    /// Shared logical device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The selected GPU.
    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// The window surface.
    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// The Vulkan instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        let holders = Arc::strong_count(&self.device);
        if holders > 1 {
            warn!(
                "GPU context dropped while {} other owner(s) still hold the device",
                holders - 1
            );
        }
        info!("Tearing down GPU context");
    }
}
