//! Command pool and command buffer management.
//!
//! # Overview
//!
//! - [`CommandPool`] creates VkCommandPool objects and allocates primary buffers
//! - [`CommandBuffer`] wraps VkCommandBuffer with recording helpers
//! - [`FrameSubmit`] describes the per-frame queue submission: wait for the
//!   acquired image at color-attachment output, signal render completion
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::{Device, QueueKind};
//! use renderer_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.queue_family(QueueKind::Graphics))?;
//! let cmd = CommandBuffer::new(device.clone(), &pool)?;
//!
//! cmd.begin()?;
//! // ... record rendering commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan command pool wrapper.
///
/// Not thread-safe; each recording thread needs its own pool.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool whose buffers are recycled by resetting the whole pool.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::with_flags(device, queue_family_index, vk::CommandPoolCreateFlags::empty())
    }

    /// Creates a pool for short-lived one-shot command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new_transient(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        Self::with_flags(
            device,
            queue_family_index,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )
    }

    fn with_flags(
        device: Arc<Device>,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(flags);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!(
            "Command pool created for queue family {} ({:?})",
            queue_family_index, flags
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates a primary command buffer from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidHandle("driver returned no command buffer".into()))
    }

    /// Resets every command buffer allocated from this pool.
    ///
    /// No buffer from this pool may be pending execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())?;
        }
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command buffer wrapper.
///
/// Does not own the handle; it is freed with its [`CommandPool`].
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a primary command buffer from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self { device, buffer })
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins one-time-submit recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is already recording or pending.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Ends recording.
    ///
    /// # Errors
    ///
    /// Returns an error if recording produced an invalid buffer.
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }
        Ok(())
    }

    // =========================================================================
    // Dynamic Rendering
    // =========================================================================

    /// Begins dynamic rendering.
    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    /// Ends dynamic rendering.
    pub fn end_rendering(&self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    // =========================================================================
    // Pipeline State
    // =========================================================================

    /// Binds a graphics pipeline.
    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Binds descriptor sets starting at `first_set`, with dynamic offsets
    /// in binding order.
    pub fn bind_descriptor_sets(
        &self,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                sets,
                dynamic_offsets,
            );
        }
    }

    /// Sets viewport 0.
    pub fn set_viewport(&self, viewport: vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, &[viewport]);
        }
    }

    /// Sets scissor 0.
    pub fn set_scissor(&self, scissor: vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, &[scissor]);
        }
    }

    // =========================================================================
    // Draw Commands
    // =========================================================================

    /// Binds a vertex buffer at binding 0.
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0]);
        }
    }

    /// Binds a 32-bit index buffer.
    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                buffer,
                0,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Draws `index_count` indices as one instance whose instance index is
    /// `first_instance`.
    pub fn draw_indexed(&self, index_count: u32, first_instance: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, first_instance);
        }
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Records an image memory barrier.
    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    // =========================================================================
    // Copy Commands
    // =========================================================================

    /// Copies `size` bytes from the start of `src` to the start of `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, &[region]);
        }
    }

    /// Copies a tightly packed buffer into mip 0 of a color image in
    /// TRANSFER_DST_OPTIMAL.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(color_layers())
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Copies mip 0 of `src` (TRANSFER_SRC_OPTIMAL) into `dst`
    /// (TRANSFER_DST_OPTIMAL).
    pub fn copy_image(&self, src: vk::Image, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::ImageCopy::default()
            .src_subresource(color_layers())
            .dst_subresource(color_layers())
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });
        unsafe {
            self.device.handle().cmd_copy_image(
                self.buffer,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Resets `count` queries starting at `first`.
    pub fn reset_query_pool(&self, pool: vk::QueryPool, first: u32, count: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_reset_query_pool(self.buffer, pool, first, count);
        }
    }

    /// Writes a timestamp once all prior work reaches `stage`.
    pub fn write_timestamp(&self, stage: vk::PipelineStageFlags, pool: vk::QueryPool, query: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_write_timestamp(self.buffer, stage, pool, query);
        }
    }

    /// Begins query `query`.
    pub fn begin_query(&self, pool: vk::QueryPool, query: u32) {
        unsafe {
            self.device.handle().cmd_begin_query(
                self.buffer,
                pool,
                query,
                vk::QueryControlFlags::empty(),
            );
        }
    }

    /// Ends query `query`.
    pub fn end_query(&self, pool: vk::QueryPool, query: u32) {
        unsafe {
            self.device.handle().cmd_end_query(self.buffer, pool, query);
        }
    }
}

fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

/// Stages of a frame submission that wait for the acquired swapchain image:
/// rendering to it and copying into it.
pub const ACQUIRE_WAIT_STAGES: vk::PipelineStageFlags = vk::PipelineStageFlags::from_raw(
    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT.as_raw()
        | vk::PipelineStageFlags::TRANSFER.as_raw(),
);

/// Semaphore wiring of a frame submission.
///
/// The command buffer waits for `image_available` at
/// [`ACQUIRE_WAIT_STAGES`] and signals `render_finished` for presentation.
pub struct FrameSubmit {
    wait_semaphores: [vk::Semaphore; 1],
    wait_stages: [vk::PipelineStageFlags; 1],
    command_buffers: [vk::CommandBuffer; 1],
    signal_semaphores: [vk::Semaphore; 1],
}

impl FrameSubmit {
    /// Describes a frame submission.
    pub fn new(
        command_buffer: vk::CommandBuffer,
        image_available: vk::Semaphore,
        render_finished: vk::Semaphore,
    ) -> Self {
        Self {
            wait_semaphores: [image_available],
            wait_stages: [ACQUIRE_WAIT_STAGES],
            command_buffers: [command_buffer],
            signal_semaphores: [render_finished],
        }
    }

    /// Builds the submit info borrowing this description.
    pub fn info(&self) -> vk::SubmitInfo<'_> {
        vk::SubmitInfo::default()
            .wait_semaphores(&self.wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&self.command_buffers)
            .signal_semaphores(&self.signal_semaphores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_command_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }

    #[test]
    fn test_frame_submit_waits_at_color_output_and_transfer() {
        let cmd = vk::CommandBuffer::from_raw(1);
        let acquired = vk::Semaphore::from_raw(2);
        let finished = vk::Semaphore::from_raw(3);
        let submit = FrameSubmit::new(cmd, acquired, finished);
        let info = submit.info();

        assert_eq!(info.wait_semaphore_count, 1);
        assert_eq!(info.signal_semaphore_count, 1);
        assert_eq!(info.command_buffer_count, 1);
        assert!(submit.wait_stages[0].contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        assert!(submit.wait_stages[0].contains(vk::PipelineStageFlags::TRANSFER));
        assert_eq!(submit.wait_semaphores[0], acquired);
        assert_eq!(submit.signal_semaphores[0], finished);
    }
}
