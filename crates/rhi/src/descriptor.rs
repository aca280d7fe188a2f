//! Descriptor set management for shader resource binding.
//!
//! # Overview
//!
//! - [`DescriptorLayoutCache`] creates each distinct descriptor set layout
//!   once, keyed by its sorted binding signature ([`LayoutKey`]).
//! - [`DescriptorAllocator`] hands out sets from a growing list of pools and
//!   recycles every pool at once on [`DescriptorAllocator::reset_pools`].
//! - [`DescriptorWriter`] batches buffer and image writes and applies them to
//!   a set with a single `vkUpdateDescriptorSets` call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::descriptor::{
//!     DescriptorAllocator, DescriptorBindingBuilder, DescriptorLayoutCache, DescriptorWriter,
//!     PoolRatio,
//! };
//!
//! # fn example(device: Arc<Device>, buffer: vk::Buffer) -> Result<(), renderer_rhi::RhiError> {
//! let mut cache = DescriptorLayoutCache::new(device.clone());
//! let layout = cache.get_or_create(&[DescriptorBindingBuilder::uniform_buffer_dynamic(
//!     0,
//!     vk::ShaderStageFlags::VERTEX,
//! )])?;
//!
//! let ratios = [PoolRatio::new(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0)];
//! let mut allocator = DescriptorAllocator::new(device.clone(), 16, &ratios)?;
//! let set = allocator.allocate(layout)?;
//!
//! let mut writer = DescriptorWriter::new();
//! writer.write_buffer(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, buffer, 0, 256);
//! writer.update_set(&device, set);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

// ============================================================================
// Layout cache
// ============================================================================

/// One binding of a layout, reduced to the fields that define compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingSignature {
    pub binding: u32,
    pub descriptor_type: i32,
    pub count: u32,
    pub stages: u32,
}

/// Cache key for a descriptor set layout.
///
/// Bindings are sorted by binding index, so two descriptions that list the
/// same bindings in a different order share a layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    bindings: Vec<BindingSignature>,
}

impl LayoutKey {
    /// Builds the key for `bindings`.
    pub fn new(bindings: &[vk::DescriptorSetLayoutBinding]) -> Self {
        let mut signatures: Vec<BindingSignature> = bindings
            .iter()
            .map(|b| BindingSignature {
                binding: b.binding,
                descriptor_type: b.descriptor_type.as_raw(),
                count: b.descriptor_count,
                stages: b.stage_flags.as_raw(),
            })
            .collect();
        signatures.sort_unstable();
        Self {
            bindings: signatures,
        }
    }

    /// Sorted binding signatures.
    #[inline]
    pub fn bindings(&self) -> &[BindingSignature] {
        &self.bindings
    }
}

/// Deduplicating descriptor set layout cache.
///
/// Layouts live until the cache is dropped, which must happen before the
/// device is destroyed.
pub struct DescriptorLayoutCache {
    device: Arc<Device>,
    layouts: HashMap<LayoutKey, vk::DescriptorSetLayout>,
}

impl DescriptorLayoutCache {
    /// Creates an empty cache.
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            layouts: HashMap::new(),
        }
    }

    /// Returns the layout for `bindings`, creating it on first request.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorError`] for duplicate binding indices,
    /// or the Vulkan error if layout creation fails.
    pub fn get_or_create(
        &mut self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let key = LayoutKey::new(bindings);
        if let Some(layout) = self.layouts.get(&key) {
            return Ok(*layout);
        }

        if key
            .bindings
            .windows(2)
            .any(|pair| pair[0].binding == pair[1].binding)
        {
            return Err(RhiError::DescriptorError(
                "duplicate binding index in descriptor set layout".to_string(),
            ));
        }

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            self.device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        self.layouts.insert(key, layout);
        Ok(layout)
    }

    /// Number of distinct layouts created so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// True if no layout has been created.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Drop for DescriptorLayoutCache {
    fn drop(&mut self) {
        for (_, layout) in self.layouts.drain() {
            unsafe {
                self.device
                    .handle()
                    .destroy_descriptor_set_layout(layout, None);
            }
        }
        debug!("Destroyed descriptor layout cache");
    }
}

// ============================================================================
// Set allocator
// ============================================================================

/// Upper bound on sets per pool as pools grow.
pub const MAX_SETS_PER_POOL: u32 = 4092;

/// Descriptors of one type reserved per set in each pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolRatio {
    pub const fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self {
            descriptor_type,
            ratio,
        }
    }
}

/// Pool sizes for a pool holding `set_count` sets.
///
/// Every type gets at least one descriptor.
pub fn pool_sizes(ratios: &[PoolRatio], set_count: u32) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|r| {
            vk::DescriptorPoolSize::default()
                .ty(r.descriptor_type)
                .descriptor_count(((r.ratio * set_count as f32).ceil() as u32).max(1))
        })
        .collect()
}

/// Set capacity of the pool created after one of `current` sets.
pub fn next_pool_capacity(current: u32) -> u32 {
    current.saturating_add(current / 2).clamp(1, MAX_SETS_PER_POOL)
}

/// Growing descriptor set allocator.
///
/// Sets are not freed individually. When a pool runs out it is moved to the
/// full list and a larger one is created; [`reset_pools`](Self::reset_pools)
/// returns every set at once.
pub struct DescriptorAllocator {
    device: Arc<Device>,
    ratios: Vec<PoolRatio>,
    ready: Vec<vk::DescriptorPool>,
    full: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
}

impl DescriptorAllocator {
    /// Creates the allocator with one pool of `initial_sets` sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the first pool cannot be created.
    pub fn new(device: Arc<Device>, initial_sets: u32, ratios: &[PoolRatio]) -> RhiResult<Self> {
        let mut allocator = Self {
            device,
            ratios: ratios.to_vec(),
            ready: Vec::new(),
            full: Vec::new(),
            sets_per_pool: initial_sets.max(1),
        };
        let pool = allocator.create_pool(allocator.sets_per_pool)?;
        allocator.ready.push(pool);
        allocator.sets_per_pool = next_pool_capacity(allocator.sets_per_pool);
        Ok(allocator)
    }

    /// Allocates one set with `layout`.
    ///
    /// A pool that reports `ERROR_OUT_OF_POOL_MEMORY` or
    /// `ERROR_FRAGMENTED_POOL` is retired and the allocation is retried once
    /// from a fresh pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails on a fresh pool too.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        let pool = self.take_pool()?;
        match self.try_allocate(pool, layout) {
            Ok(set) => {
                self.ready.push(pool);
                Ok(set)
            }
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
                debug!("Descriptor pool exhausted, growing");
                self.full.push(pool);
                let pool = self.take_pool()?;
                let result = self.try_allocate(pool, layout);
                self.ready.push(pool);
                Ok(result?)
            }
            Err(e) => {
                self.ready.push(pool);
                Err(e.into())
            }
        }
    }

    /// Resets every pool, invalidating all sets allocated from them.
    ///
    /// # Errors
    ///
    /// Returns an error if a pool reset fails.
    pub fn reset_pools(&mut self) -> RhiResult<()> {
        self.ready.append(&mut self.full);
        for &pool in &self.ready {
            unsafe {
                self.device
                    .handle()
                    .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())?;
            }
        }
        debug!("Reset {} descriptor pool(s)", self.ready.len());
        Ok(())
    }

    /// Total number of pools owned.
    #[inline]
    pub fn pool_count(&self) -> usize {
        self.ready.len() + self.full.len()
    }

    fn take_pool(&mut self) -> RhiResult<vk::DescriptorPool> {
        if let Some(pool) = self.ready.pop() {
            return Ok(pool);
        }
        let pool = self.create_pool(self.sets_per_pool)?;
        self.sets_per_pool = next_pool_capacity(self.sets_per_pool);
        Ok(pool)
    }

    fn create_pool(&self, max_sets: u32) -> RhiResult<vk::DescriptorPool> {
        let sizes = pool_sizes(&self.ratios, max_sets);
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        let pool = unsafe {
            self.device
                .handle()
                .create_descriptor_pool(&create_info, None)?
        };
        debug!("Created descriptor pool: max_sets={}", max_sets);
        Ok(pool)
    }

    fn try_allocate(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        sets.into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        let count = self.pool_count();
        for pool in self.ready.drain(..).chain(self.full.drain(..)) {
            unsafe {
                self.device.handle().destroy_descriptor_pool(pool, None);
            }
        }
        debug!("Destroyed {} descriptor pool(s)", count);
    }
}

// ============================================================================
// Writer
// ============================================================================

struct BufferWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    info: vk::DescriptorBufferInfo,
}

struct ImageWrite {
    binding: u32,
    descriptor_type: vk::DescriptorType,
    infos: Vec<vk::DescriptorImageInfo>,
}

/// Batches descriptor writes for one set.
#[derive(Default)]
pub struct DescriptorWriter {
    buffers: Vec<BufferWrite>,
    images: Vec<ImageWrite>,
}

impl DescriptorWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a buffer write.
    ///
    /// For dynamic descriptor types `range` is the size visible from each
    /// dynamic offset, not the whole buffer.
    pub fn write_buffer(
        &mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> &mut Self {
        self.buffers.push(BufferWrite {
            binding,
            descriptor_type,
            info: buffer_info(buffer, offset, range),
        });
        self
    }

    /// Queues a sampler-only write.
    pub fn write_sampler(&mut self, binding: u32, sampler: vk::Sampler) -> &mut Self {
        self.images.push(ImageWrite {
            binding,
            descriptor_type: vk::DescriptorType::SAMPLER,
            infos: vec![image_info(
                sampler,
                vk::ImageView::null(),
                vk::ImageLayout::UNDEFINED,
            )],
        });
        self
    }

    /// Queues sampled images for array elements `0..views.len()` of `binding`.
    pub fn write_sampled_images(&mut self, binding: u32, views: &[vk::ImageView]) -> &mut Self {
        self.images.push(ImageWrite {
            binding,
            descriptor_type: vk::DescriptorType::SAMPLED_IMAGE,
            infos: views
                .iter()
                .map(|&view| {
                    image_info(
                        vk::Sampler::null(),
                        view,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    )
                })
                .collect(),
        });
        self
    }

    /// Number of queued writes.
    #[inline]
    pub fn pending(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    /// Drops all queued writes.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.images.clear();
    }

    /// Applies the queued writes to `set`.
    ///
    /// The set must not be in use by a pending command buffer.
    pub fn update_set(&self, device: &Device, set: vk::DescriptorSet) {
        let mut writes = Vec::with_capacity(self.pending());
        for write in &self.buffers {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.descriptor_type)
                    .buffer_info(std::slice::from_ref(&write.info)),
            );
        }
        for write in self.images.iter().filter(|w| !w.infos.is_empty()) {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .descriptor_type(write.descriptor_type)
                    .image_info(&write.infos),
            );
        }

        if writes.is_empty() {
            return;
        }

        unsafe {
            device.handle().update_descriptor_sets(&writes, &[]);
        }
    }
}

/// Creates a buffer info for descriptor set updates.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Creates an image info for descriptor set updates.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

// ============================================================================
// Binding builders
// ============================================================================

/// Builder for descriptor set layout bindings.
///
/// # Example
///
/// ```no_run
/// use ash::vk;
/// use renderer_rhi::descriptor::DescriptorBindingBuilder;
///
/// let bindings = [
///     DescriptorBindingBuilder::sampler(0, vk::ShaderStageFlags::FRAGMENT),
///     DescriptorBindingBuilder::sampled_image_array(1, 32, vk::ShaderStageFlags::FRAGMENT),
/// ];
/// ```
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    fn single(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    /// Uniform buffer addressed with a dynamic offset at bind time.
    #[inline]
    pub fn uniform_buffer_dynamic(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stage_flags)
    }

    /// Storage buffer addressed with a dynamic offset at bind time.
    #[inline]
    pub fn storage_buffer_dynamic(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, stage_flags)
    }

    /// Standalone sampler.
    #[inline]
    pub fn sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::SAMPLER, stage_flags)
    }

    /// Array of `count` sampled images.
    #[inline]
    pub fn sampled_image_array(
        binding: u32,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
            .descriptor_count(count)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_key_ignores_binding_order() {
        let camera = DescriptorBindingBuilder::uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX);
        let scene =
            DescriptorBindingBuilder::uniform_buffer_dynamic(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(LayoutKey::new(&[camera, scene]), LayoutKey::new(&[scene, camera]));
    }

    #[test]
    fn test_layout_key_distinguishes_type_count_and_stage() {
        let base = DescriptorBindingBuilder::sampled_image_array(1, 32, vk::ShaderStageFlags::FRAGMENT);
        let count = DescriptorBindingBuilder::sampled_image_array(1, 16, vk::ShaderStageFlags::FRAGMENT);
        let stage = DescriptorBindingBuilder::sampled_image_array(1, 32, vk::ShaderStageFlags::VERTEX);
        let ty = DescriptorBindingBuilder::storage_buffer_dynamic(1, vk::ShaderStageFlags::FRAGMENT);

        let key = LayoutKey::new(&[base]);
        assert_ne!(key, LayoutKey::new(&[count]));
        assert_ne!(key, LayoutKey::new(&[stage]));
        assert_ne!(key, LayoutKey::new(&[ty]));
    }

    #[test]
    fn test_layout_key_sorted() {
        let key = LayoutKey::new(&[
            DescriptorBindingBuilder::sampler(2, vk::ShaderStageFlags::FRAGMENT),
            DescriptorBindingBuilder::sampler(0, vk::ShaderStageFlags::FRAGMENT),
            DescriptorBindingBuilder::sampler(1, vk::ShaderStageFlags::FRAGMENT),
        ]);
        let order: Vec<u32> = key.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_pool_sizes_scale_with_set_count() {
        let ratios = [
            PoolRatio::new(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 2.0),
            PoolRatio::new(vk::DescriptorType::SAMPLED_IMAGE, 32.0),
            PoolRatio::new(vk::DescriptorType::SAMPLER, 0.01),
        ];
        let sizes = pool_sizes(&ratios, 10);
        assert_eq!(sizes.len(), 3);
        assert_eq!(sizes[0].descriptor_count, 20);
        assert_eq!(sizes[1].descriptor_count, 320);
        assert_eq!(sizes[2].descriptor_count, 1);
        assert_eq!(sizes[1].ty, vk::DescriptorType::SAMPLED_IMAGE);
    }

    #[test]
    fn test_next_pool_capacity_grows_and_caps() {
        assert_eq!(next_pool_capacity(0), 1);
        assert_eq!(next_pool_capacity(1), 1);
        assert_eq!(next_pool_capacity(16), 24);
        assert_eq!(next_pool_capacity(4000), MAX_SETS_PER_POOL);
        assert_eq!(next_pool_capacity(u32::MAX), MAX_SETS_PER_POOL);
    }

    #[test]
    fn test_writer_batches_writes() {
        let mut writer = DescriptorWriter::new();
        writer
            .write_buffer(0, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, vk::Buffer::null(), 0, 256)
            .write_sampler(0, vk::Sampler::null())
            .write_sampled_images(1, &[vk::ImageView::null(); 3]);
        assert_eq!(writer.pending(), 3);
        assert_eq!(writer.images[1].infos.len(), 3);
        assert_eq!(
            writer.images[1].infos[0].image_layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );

        writer.clear();
        assert_eq!(writer.pending(), 0);
    }

    #[test]
    fn test_sampled_image_array_binding() {
        let binding =
            DescriptorBindingBuilder::sampled_image_array(1, 32, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);
        assert_eq!(binding.descriptor_count, 32);
    }

    #[test]
    fn test_buffer_info_helper() {
        let info = buffer_info(vk::Buffer::null(), 64, 128);
        assert_eq!(info.offset, 64);
        assert_eq!(info.range, 128);
    }
}
