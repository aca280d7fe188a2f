//! Per-slot Vulkan resources.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use renderer_rhi::RhiResult;
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::descriptor::DescriptorAllocator;
use renderer_rhi::device::{Device, QueueKind};
use renderer_rhi::query::QueryPools;
use renderer_rhi::sync::SlotSync;

/// Descriptor set layouts shared by every slot, in set order.
#[derive(Clone, Copy, Debug)]
pub struct SetLayouts {
    pub global: vk::DescriptorSetLayout,
    pub object: vk::DescriptorSetLayout,
    pub textures: vk::DescriptorSetLayout,
}

impl SetLayouts {
    pub fn to_array(self) -> [vk::DescriptorSetLayout; 3] {
        [self.global, self.object, self.textures]
    }
}

/// Resources owned by one frame in flight.
///
/// # Synchronization Flow
///
/// ```text
/// 1. Wait on the in-flight fence (CPU waits for the previous use of this slot)
/// 2. Reset the command pool
/// 3. Acquire a swapchain image (signals image_available)
/// 4. Reset the fence, record into command_buffer
/// 5. Submit: wait image_available, signal render_finished[image] and the fence
/// ```
///
/// The command buffer is freed together with its pool, so the pool is
/// declared after it.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    command_pool: CommandPool,
    sync: SlotSync,
    queries: QueryPools,
    /// Sets 0 (camera + scene), 1 (objects) and 2 (textures).
    sets: [vk::DescriptorSet; 3],
}

impl FrameSlot {
    /// Creates the slot's command pool, sync objects, query pools and
    /// descriptor sets.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        device: Arc<Device>,
        index: u32,
        allocator: &mut DescriptorAllocator,
        layouts: SetLayouts,
    ) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.queue_family(QueueKind::Graphics))?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let sync = SlotSync::new(device.clone())?;
        let queries = QueryPools::new(device)?;

        let mut sets = [vk::DescriptorSet::null(); 3];
        for (set, layout) in sets.iter_mut().zip(layouts.to_array()) {
            *set = allocator.allocate(layout)?;
        }

        debug!("Created frame slot {}", index);
        Ok(Self {
            command_buffer,
            command_pool,
            sync,
            queries,
            sets,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }

    #[inline]
    pub fn sync(&self) -> &SlotSync {
        &self.sync
    }

    #[inline]
    pub fn queries(&self) -> &QueryPools {
        &self.queries
    }

    /// Command buffer and query pools, borrowed together for recording.
    #[inline]
    pub fn recording_parts(&mut self) -> (&CommandBuffer, &mut QueryPools) {
        (&self.command_buffer, &mut self.queries)
    }

    #[inline]
    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet; 3] {
        &self.sets
    }

    #[inline]
    pub fn texture_set(&self) -> vk::DescriptorSet {
        self.sets[2]
    }
}
