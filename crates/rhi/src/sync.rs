//! Synchronization primitives for Vulkan.
//!
//! - [`Semaphore`] orders work between queue operations (acquire, render, present)
//! - [`Fence`] lets the CPU wait for submitted GPU work
//! - [`SlotSync`] groups the acquire semaphore and fence of one frame slot
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::sync::SlotSync;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let sync = SlotSync::new(device)?;
//!
//! // The GPU must be done with this slot before the CPU touches it again.
//! sync.in_flight().wait(u64::MAX)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan semaphore wrapper, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Start signaled, so the first wait returns immediately
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` on timeout, or the driver error.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// Synchronization objects owned by one frame slot.
///
/// ```text
/// wait in_flight -> acquire (signals image_available)
///   -> submit (waits image_available, signals the image's render-finished
///      semaphore and in_flight)
/// ```
///
/// Render-finished semaphores belong to swapchain images rather than slots:
/// a present wait is not covered by any fence, so a semaphore may only be
/// signaled again once its image has been acquired again.
pub struct SlotSync {
    image_available: Semaphore,
    in_flight: Fence,
}

impl SlotSync {
    /// Creates the slot's acquire semaphore and a signaled in-flight fence.
    ///
    /// # Errors
    ///
    /// Returns an error if either object cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Signaled when the acquired swapchain image is ready.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Signaled when the GPU is done with everything this slot submitted.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}
