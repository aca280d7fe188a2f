//! GPU buffer management.
//!
//! # Overview
//!
//! - [`BufferUsage`] picks Vulkan usage flags and the memory location
//! - [`Buffer`] wraps VkBuffer with gpu-allocator managed memory
//!
//! Geometry lives in device-local memory and is filled through a staging
//! buffer and an immediate submit on the transfer queue. Uniform, storage and
//! staging buffers are persistently mapped and written directly.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::buffer::{Buffer, BufferUsage};
//! use renderer_rhi::upload::UploadContext;
//!
//! # fn example(device: Arc<Device>, upload: &UploadContext) -> Result<(), renderer_rhi::RhiError> {
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     upload,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandBuffer;
use crate::device::{Device, QueueKind};
use crate::error::{RhiError, RhiResult};
use crate::upload::UploadContext;

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex data, device-local
    Vertex,
    /// 32-bit index data, device-local
    Index,
    /// Uniform data rewritten by the CPU every frame
    Uniform,
    /// Storage data rewritten by the CPU every draw
    Storage,
    /// CPU-writable source for uploads
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Storage => vk::BufferUsageFlags::STORAGE_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Storage | BufferUsage::Staging => {
                MemoryLocation::CpuToGpu
            }
        }
    }

    /// True for buffers filled on the transfer queue and read on graphics.
    fn crosses_queues(self) -> bool {
        matches!(self, BufferUsage::Vertex | BufferUsage::Index)
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer wrapper with managed memory.
///
/// The allocation is freed before the buffer is destroyed.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// Geometry buffers are shared between the graphics and transfer
    /// families when those differ.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero size or if buffer or memory allocation fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let families = [
            device.queue_family(QueueKind::Graphics),
            device.queue_family(QueueKind::Transfer),
        ];
        let concurrent = usage.crosses_queues() && families[0] != families[1];

        let mut buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage());
        buffer_info = if concurrent {
            buffer_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            buffer_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let allocated = device.lock_allocator().and_then(|mut allocator| {
                Ok(allocator.allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location: usage.memory_location(),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })?)
            });
            match allocated {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.handle().destroy_buffer(buffer, None) };
                    return Err(e);
                }
            }
        };

        let created = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };

        if let Some(allocation) = created.allocation.as_ref() {
            unsafe {
                created.device.handle().bind_buffer_memory(
                    buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);
        Ok(created)
    }

    /// Creates a device-local buffer holding `data`, copied through a
    /// staging buffer on the transfer queue.
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer cannot be created or the copy fails.
    pub fn new_device_local(
        device: Arc<Device>,
        upload: &UploadContext,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new(device.clone(), BufferUsage::Staging, size)?;
        staging.write_data(0, data)?;

        let buffer = Self::new(device, usage, size)?;
        let (src, dst) = (staging.handle(), buffer.handle());
        upload.immediate_submit(QueueKind::Transfer, &|cmd: &CommandBuffer| {
            cmd.copy_buffer(src, dst, size);
        })?;

        Ok(buffer)
    }

    /// Writes `data` at byte `offset`.
    ///
    /// Only host-visible buffers can be written. The caller guarantees the
    /// GPU is not reading the written range.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped or the write would
    /// exceed the buffer size.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let mapped_ptr = self
            .allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer memory is not mapped", self.usage.name()))
            })?;

        // SAFETY: the range was bounds-checked above and the mapping stays
        // valid for the allocation's lifetime.
        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking buffer allocation: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}
