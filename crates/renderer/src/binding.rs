//! Offset math for per-frame uniform data and the texture-slot table.
//!
//! # Overview
//!
//! All frame slots share one camera buffer, one scene buffer and one object
//! buffer. Each slot owns a disjoint, aligned region of every buffer, and
//! the region is selected at bind time with a dynamic offset:
//!
//! ```text
//! camera buffer:  | slot 0 | pad | slot 1 | pad | slot 2 | pad |
//! object buffer:  | slot 0: max_objects * 32 B | pad | slot 1 ... |
//! ```
//!
//! A region is only written after its slot's fence has been waited on, so
//! the CPU never touches bytes the GPU may still read.

use std::ops::Range;

use tracing::debug;

use crate::ubo::{CameraUniform, ObjectUniform, SceneUniform};

/// Rounds `size` up to a multiple of `alignment`.
///
/// An alignment of zero leaves `size` unchanged. Non-power-of-two
/// alignments are handled, though Vulkan only reports powers of two.
#[inline]
pub const fn align_up(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/// A block of `element_size` bytes repeated once per frame slot at an
/// aligned stride.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DynamicUniformLayout {
    element_size: u64,
    stride: u64,
    slots: u32,
}

impl DynamicUniformLayout {
    pub const fn new(element_size: u64, alignment: u64, slots: u32) -> Self {
        Self {
            element_size,
            stride: align_up(element_size, alignment),
            slots,
        }
    }

    /// Unpadded size of one element; the descriptor range.
    #[inline]
    pub fn element_size(&self) -> u64 {
        self.element_size
    }

    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    #[inline]
    pub fn slots(&self) -> u32 {
        self.slots
    }

    /// Dynamic offset of `slot`'s region.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not below the slot count.
    #[inline]
    pub fn offset(&self, slot: u32) -> u64 {
        assert!(slot < self.slots, "slot {} out of range ({} slots)", slot, self.slots);
        self.stride * u64::from(slot)
    }

    /// Byte range occupied by `slot`, excluding padding.
    pub fn range(&self, slot: u32) -> Range<u64> {
        let start = self.offset(slot);
        start..start + self.element_size
    }

    /// Buffer size needed for all slots.
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.stride * u64::from(self.slots)
    }
}

/// Dynamic offsets for one frame slot, in descriptor binding order
/// (set 0 binding 0, set 0 binding 1, set 1 binding 0).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DynamicOffsets {
    pub camera: u32,
    pub scene: u32,
    pub objects: u32,
}

impl DynamicOffsets {
    /// Offsets of set 0.
    #[inline]
    pub fn global(&self) -> [u32; 2] {
        [self.camera, self.scene]
    }

    /// Offsets of set 1.
    #[inline]
    pub fn object(&self) -> [u32; 1] {
        [self.objects]
    }
}

/// Per-slot layout of the camera, scene and object buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    camera: DynamicUniformLayout,
    scene: DynamicUniformLayout,
    objects: DynamicUniformLayout,
    max_objects: u32,
}

impl FrameLayout {
    /// Lays out `slots` frames holding up to `max_objects` draws each.
    ///
    /// `uniform_alignment` and `storage_alignment` are the device's
    /// `minUniformBufferOffsetAlignment` and
    /// `minStorageBufferOffsetAlignment`.
    pub fn new(slots: u32, max_objects: u32, uniform_alignment: u64, storage_alignment: u64) -> Self {
        let object_region = ObjectUniform::SIZE as u64 * u64::from(max_objects.max(1));
        let layout = Self {
            camera: DynamicUniformLayout::new(CameraUniform::SIZE as u64, uniform_alignment, slots),
            scene: DynamicUniformLayout::new(SceneUniform::SIZE as u64, uniform_alignment, slots),
            objects: DynamicUniformLayout::new(object_region, storage_alignment, slots),
            max_objects,
        };
        debug!(
            "Frame layout: {} slots, camera stride {}, scene stride {}, object region {}",
            slots,
            layout.camera.stride(),
            layout.scene.stride(),
            layout.objects.stride()
        );
        layout
    }

    #[inline]
    pub fn slots(&self) -> u32 {
        self.camera.slots()
    }

    #[inline]
    pub fn max_objects(&self) -> u32 {
        self.max_objects
    }

    #[inline]
    pub fn camera(&self) -> &DynamicUniformLayout {
        &self.camera
    }

    #[inline]
    pub fn scene(&self) -> &DynamicUniformLayout {
        &self.scene
    }

    #[inline]
    pub fn objects(&self) -> &DynamicUniformLayout {
        &self.objects
    }

    /// Byte offset of draw `index` within the whole object buffer.
    ///
    /// # Panics
    ///
    /// Panics if `index` reaches the per-frame object capacity.
    pub fn object_offset(&self, slot: u32, index: u32) -> u64 {
        assert!(
            index < self.max_objects,
            "object capacity exceeded: draw {} with max_objects = {}",
            index,
            self.max_objects
        );
        self.objects.offset(slot) + u64::from(index) * ObjectUniform::SIZE as u64
    }

    /// Dynamic offsets that select `slot`'s regions.
    pub fn dynamic_offsets(&self, slot: u32) -> DynamicOffsets {
        // Regions are bounded by buffer sizes that Vulkan addresses with
        // 32-bit dynamic offsets.
        DynamicOffsets {
            camera: self.camera.offset(slot) as u32,
            scene: self.scene.offset(slot) as u32,
            objects: self.objects.offset(slot) as u32,
        }
    }
}

/// Textures bound to the texture-array descriptor, indexed by material
/// texture slot.
///
/// Every change bumps a generation counter. A frame slot whose texture set
/// was written at an older generation is rewritten the next time that slot
/// begins, after its fence wait. Draws are checked against the textures the
/// recording slot's set actually holds, so a change made mid-frame only
/// becomes usable in the next frame of that slot.
#[derive(Debug)]
pub struct TextureSlots<T> {
    textures: Vec<T>,
    capacity: u32,
    generation: u64,
    /// Generation and texture count last written to each frame slot's set.
    written: Vec<Option<(u64, u32)>>,
}

impl<T> TextureSlots<T> {
    pub fn new(capacity: u32, frame_slots: u32) -> Self {
        Self {
            textures: Vec::new(),
            capacity,
            generation: 0,
            written: vec![None; frame_slots as usize],
        }
    }

    /// Replaces the active textures.
    ///
    /// # Panics
    ///
    /// Panics if more textures are given than the array holds.
    pub fn set(&mut self, textures: Vec<T>) {
        assert!(
            textures.len() <= self.capacity as usize,
            "{} textures exceed the texture array size {}",
            textures.len(),
            self.capacity
        );
        self.textures = textures;
        self.generation += 1;
    }

    #[inline]
    pub fn active(&self) -> &[T] {
        &self.textures
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of textures in `slot`'s descriptor set.
    pub fn bound_count(&self, slot: u32) -> u32 {
        self.written[slot as usize].map_or(0, |(_, count)| count)
    }

    /// Checks that a material's texture slot refers to a texture bound to
    /// frame slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not below the number of bound textures.
    pub fn check_index(&self, slot: u32, index: u32) {
        let bound = self.bound_count(slot);
        assert!(
            index < bound,
            "texture slot {} out of range ({} active textures)",
            index,
            bound
        );
    }

    /// Whether `slot`'s descriptor set predates the current textures.
    pub fn is_stale(&self, slot: u32) -> bool {
        self.written[slot as usize].map(|(generation, _)| generation) != Some(self.generation)
    }

    /// Records that `slot`'s descriptor set matches the current textures.
    pub fn mark_written(&mut self, slot: u32) {
        self.written[slot as usize] = Some((self.generation, self.textures.len() as u32));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(192, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(48, 0), 48);
        assert_eq!(align_up(10, 12), 12);
    }

    #[test]
    fn test_dynamic_layout_offsets() {
        let layout = DynamicUniformLayout::new(192, 256, 3);
        assert_eq!(layout.stride(), 256);
        assert_eq!(layout.offset(0), 0);
        assert_eq!(layout.offset(2), 512);
        assert_eq!(layout.total_size(), 768);
        assert_eq!(layout.range(1), 256..448);
    }

    #[test]
    #[should_panic(expected = "slot 3 out of range")]
    fn test_dynamic_layout_rejects_slot() {
        DynamicUniformLayout::new(192, 256, 3).offset(3);
    }

    #[test]
    fn test_frame_layout_regions_disjoint() {
        for (uniform_align, storage_align) in [(1, 1), (64, 16), (256, 256), (256, 64)] {
            let layout = FrameLayout::new(3, 100, uniform_align, storage_align);
            for region in [layout.camera(), layout.scene(), layout.objects()] {
                for slot in 0..2 {
                    assert!(region.range(slot).end <= region.range(slot + 1).start);
                    assert_eq!(region.offset(slot) % region.stride(), 0);
                }
                assert!(region.range(2).end <= region.total_size());
            }
            assert_eq!(u64::from(layout.dynamic_offsets(1).camera) % uniform_align, 0);
            assert_eq!(u64::from(layout.dynamic_offsets(1).objects) % storage_align, 0);
        }
    }

    #[test]
    fn test_object_offsets_stay_in_slot_region() {
        let layout = FrameLayout::new(2, 10, 256, 256);
        let region = layout.objects().range(1);
        assert_eq!(layout.object_offset(1, 0), region.start);
        assert_eq!(layout.object_offset(1, 9) + ObjectUniform::SIZE as u64, region.end);
    }

    #[test]
    #[should_panic(expected = "object capacity exceeded")]
    fn test_object_capacity() {
        FrameLayout::new(2, 10, 256, 256).object_offset(0, 10);
    }

    #[test]
    fn test_dynamic_offsets_order() {
        let layout = FrameLayout::new(2, 4, 256, 64);
        let offsets = layout.dynamic_offsets(1);
        assert_eq!(offsets.global(), [256, 256]);
        assert_eq!(offsets.object(), [128]);
    }

    #[test]
    fn test_texture_slots_generation() {
        let mut slots = TextureSlots::new(4, 2);
        assert!(slots.is_stale(0));
        slots.mark_written(0);
        slots.mark_written(1);
        assert!(!slots.is_stale(0));

        slots.set(vec!["a", "b"]);
        assert!(slots.is_stale(0) && slots.is_stale(1));
        slots.mark_written(1);
        assert!(slots.is_stale(0));
        assert!(!slots.is_stale(1));
    }

    #[test]
    #[should_panic(expected = "texture slot 5 out of range (3 active textures)")]
    fn test_texture_index_out_of_range() {
        let mut slots = TextureSlots::new(32, 2);
        slots.set(vec![0, 1, 2]);
        slots.mark_written(0);
        slots.check_index(0, 2);
        slots.check_index(0, 5);
    }

    #[test]
    fn test_texture_index_checked_against_written_set() {
        let mut slots = TextureSlots::new(32, 2);
        slots.set(vec![0]);
        slots.mark_written(0);
        slots.set(vec![0, 1, 2]);

        assert_eq!(slots.bound_count(0), 1);
        assert_eq!(slots.bound_count(1), 0);
        let stale = std::panic::catch_unwind(|| slots.check_index(0, 2));
        assert!(stale.is_err());

        slots.mark_written(0);
        slots.check_index(0, 2);
    }

    #[test]
    #[should_panic(expected = "exceed the texture array size")]
    fn test_texture_slots_capacity() {
        TextureSlots::new(2, 2).set(vec![0, 1, 2]);
    }
}
