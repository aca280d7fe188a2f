//! Vulkan logical device and queue management.
//!
//! This module handles VkDevice creation, queue retrieval, and gpu-allocator initialization.
//!
//! # Overview
//!
//! The [`Device`] struct is the shared context every other RHI object holds an
//! `Arc` to. It provides:
//! - Logical device creation with the required extensions and features
//! - Graphics, present and transfer queues (which may coincide)
//! - Memory allocation via gpu-allocator
//! - Device limits used for uniform offset alignment
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::physical_device::select_physical_device;
//! use renderer_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, None)?;
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(&instance, &info)?;
//! let stride = device.pad_uniform_buffer_size(200);
//! # Ok::<(), renderer_rhi::RhiError>(())
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};

/// Queue a one-shot submission runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    /// The graphics queue. Required for layout transitions into shader stages.
    Graphics,
    /// The transfer queue, or graphics when no separate family exists.
    Transfer,
}

/// Serializes every use of the device's queues.
#[derive(Debug, Default)]
struct QueueLock(Mutex<()>);

impl QueueLock {
    fn lock(&self) -> Result<MutexGuard<'_, ()>, RhiError> {
        self.0
            .lock()
            .map_err(|_| RhiError::InvalidHandle("queue mutex poisoned".into()))
    }
}

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across components via `Arc`. The allocator is behind a `Mutex`.
/// Queue access (submit, present, device wait) is serialized by a second
/// `Mutex`, since the graphics, present and transfer queues may be the same
/// `VkQueue` and Vulkan requires queue use to be externally synchronized.
///
/// # Teardown
///
/// The allocator is released before `vkDestroyDevice`, since its memory
/// blocks belong to the device.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
    queue_lock: QueueLock,
    queue_families: QueueFamilyIndices,
    limits: vk::PhysicalDeviceLimits,
    pipeline_statistics: bool,
    timestamps: bool,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// Enables the swapchain and dynamic rendering extensions, the Vulkan 1.3
    /// dynamic rendering and synchronization2 features, sampler anisotropy, and
    /// pipeline statistics queries when the GPU offers them.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - The selected physical device
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails,
    /// or if the physical device has no graphics or present family.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };
        let transfer_family = queue_families.transfer_family.unwrap_or(graphics_family);

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let pipeline_statistics = physical_device_info.supports_pipeline_statistics();

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .pipeline_statistics_query(pipeline_statistics);

        let extension_names: Vec<*const std::ffi::c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            REQUIRED_DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let transfer_queue = unsafe { device.get_device_queue(transfer_family, 0) };
        debug!(
            "Queues retrieved: graphics={}, present={}, transfer={}",
            graphics_family, present_family, transfer_family
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            transfer_queue,
            queue_lock: QueueLock::default(),
            queue_families: QueueFamilyIndices {
                transfer_family: Some(transfer_family),
                ..queue_families
            },
            limits: physical_device_info.properties.limits,
            pipeline_statistics,
            timestamps: physical_device_info.timestamps_supported,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the transfer queue handle (the graphics queue when shared).
    #[inline]
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Returns the queue for a given kind.
    #[inline]
    pub fn queue(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Graphics => self.graphics_queue,
            QueueKind::Transfer => self.transfer_queue,
        }
    }

    /// Returns the queue family index for a given kind.
    pub fn queue_family(&self, kind: QueueKind) -> u32 {
        let family = match kind {
            QueueKind::Graphics => self.queue_families.graphics_family,
            QueueKind::Transfer => self.queue_families.transfer_family,
        };
        family.unwrap_or_default()
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Minimum alignment for dynamic uniform buffer offsets.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.limits.min_uniform_buffer_offset_alignment
    }

    /// Minimum alignment for storage buffer offsets.
    #[inline]
    pub fn min_storage_buffer_offset_alignment(&self) -> u64 {
        self.limits.min_storage_buffer_offset_alignment
    }

    /// Pads `size` up to the dynamic uniform offset alignment.
    pub fn pad_uniform_buffer_size(&self, size: u64) -> u64 {
        pad_to_alignment(size, self.limits.min_uniform_buffer_offset_alignment)
    }

    /// Whether pipeline statistics queries were enabled.
    #[inline]
    pub fn pipeline_statistics_enabled(&self) -> bool {
        self.pipeline_statistics
    }

    /// Whether the graphics queue can write timestamps.
    #[inline]
    pub fn timestamps_supported(&self) -> bool {
        self.timestamps
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Locks the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if another thread panicked while
    /// holding the lock.
    pub fn lock_allocator(&self) -> Result<MutexGuard<'_, Allocator>, RhiError> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::InvalidHandle("allocator mutex poisoned".into()))
    }

    /// Locks the queues for a submit or present.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if another thread panicked while
    /// holding the lock.
    pub fn lock_queues(&self) -> Result<MutexGuard<'_, ()>, RhiError> {
        self.queue_lock.lock()
    }

    /// Blocks until all queues are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        let _queues = self.lock_queues()?;
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits work to the queue of the given kind.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and fully recorded
    /// - The fence (if not null) is unsignaled and not in use
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub unsafe fn submit(
        &self,
        kind: QueueKind,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        let _queues = self.lock_queues()?;
        unsafe {
            self.device
                .queue_submit(self.queue(kind), submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            ManuallyDrop::drop(&mut self.allocator);
            debug!("GPU memory allocator released");

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, handles are plain values and the
// allocator is guarded by a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

/// Rounds `size` up to a multiple of `alignment`. An alignment of 0 leaves
/// the size unchanged.
pub(crate) fn pad_to_alignment(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_queue_lock_is_exclusive() {
        let lock = QueueLock::default();
        let guard = lock.lock().unwrap();
        std::thread::scope(|s| {
            s.spawn(|| assert!(lock.0.try_lock().is_err()));
        });
        drop(guard);
        assert!(lock.lock().is_ok());
    }

    #[test]
    fn test_poisoned_queue_lock_is_an_error() {
        let lock = QueueLock::default();
        let result: std::thread::Result<()> =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                let _guard = lock.lock().unwrap();
                panic!("submit failed");
            }));
        assert!(result.is_err());
        assert!(matches!(lock.lock(), Err(RhiError::InvalidHandle(_))));
    }

    #[test]
    fn test_pad_to_alignment() {
        assert_eq!(pad_to_alignment(200, 256), 256);
        assert_eq!(pad_to_alignment(256, 256), 256);
        assert_eq!(pad_to_alignment(257, 256), 512);
        assert_eq!(pad_to_alignment(0, 64), 0);
        assert_eq!(pad_to_alignment(13, 0), 13);
    }
}
