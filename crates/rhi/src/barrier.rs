//! Image layout transitions.
//!
//! # Overview
//!
//! Every layout change is an explicit pipeline barrier built from a fixed
//! table of (old layout, new layout) → (access masks, stage masks) tuples.
//! Pairs outside the table fall back to a full ALL_COMMANDS barrier and log a
//! warning, which keeps rendering correct but flags the missing entry.
//!
//! Transitions out of UNDEFINED discard contents but still wait for earlier
//! writers of the same stage. Depth images and offscreen targets are shared
//! by all frames in flight, and the swapchain transitions must start at a
//! stage the acquire semaphore wait covers
//! ([`ACQUIRE_WAIT_STAGES`](crate::command::ACQUIRE_WAIT_STAGES)).
//!
//! The two sequences the renderer relies on most:
//!
//! ```text
//! upload:   UNDEFINED -> TRANSFER_DST_OPTIMAL -> (copy) -> SHADER_READ_ONLY_OPTIMAL
//! display:  COLOR_ATTACHMENT_OPTIMAL -> TRANSFER_SRC_OPTIMAL (copy)
//!           COLOR_ATTACHMENT_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL (sampling)
//! ```

use ash::vk;
use tracing::warn;

use crate::command::CommandBuffer;

/// Access and stage masks for one layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl TransitionMasks {
    const fn new(
        src_access: vk::AccessFlags,
        src_stage: vk::PipelineStageFlags,
        dst_access: vk::AccessFlags,
        dst_stage: vk::PipelineStageFlags,
    ) -> Self {
        Self {
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        }
    }

    /// Full barrier used for pairs missing from the table.
    pub const FALLBACK: Self = Self::new(
        vk::AccessFlags::from_raw(
            vk::AccessFlags::MEMORY_READ.as_raw() | vk::AccessFlags::MEMORY_WRITE.as_raw(),
        ),
        vk::PipelineStageFlags::ALL_COMMANDS,
        vk::AccessFlags::from_raw(
            vk::AccessFlags::MEMORY_READ.as_raw() | vk::AccessFlags::MEMORY_WRITE.as_raw(),
        ),
        vk::PipelineStageFlags::ALL_COMMANDS,
    );
}

/// Looks up the masks for a layout transition.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let color_write = S::COLOR_ATTACHMENT_OUTPUT;
    let depth_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;

    let masks = match (old, new) {
        // Previous frame's color writes and sampling of the same target.
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks::new(
            A::COLOR_ATTACHMENT_WRITE,
            color_write | S::FRAGMENT_SHADER,
            A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
            color_write,
        ),
        (L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL | L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            TransitionMasks::new(
                A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                depth_tests,
                A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                depth_tests,
            )
        }
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            TransitionMasks::new(A::empty(), S::TRANSFER, A::TRANSFER_WRITE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks::new(
            A::TRANSFER_WRITE,
            S::TRANSFER,
            A::SHADER_READ,
            S::FRAGMENT_SHADER,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR) => TransitionMasks::new(
            A::TRANSFER_WRITE,
            S::TRANSFER,
            A::empty(),
            S::BOTTOM_OF_PIPE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => TransitionMasks::new(
            A::COLOR_ATTACHMENT_WRITE,
            color_write,
            A::empty(),
            S::BOTTOM_OF_PIPE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => TransitionMasks::new(
            A::COLOR_ATTACHMENT_WRITE,
            color_write,
            A::TRANSFER_READ,
            S::TRANSFER,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks::new(
            A::COLOR_ATTACHMENT_WRITE,
            color_write,
            A::SHADER_READ,
            S::FRAGMENT_SHADER,
        ),
        (L::TRANSFER_SRC_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks::new(
            A::TRANSFER_READ,
            S::TRANSFER,
            A::COLOR_ATTACHMENT_WRITE,
            color_write,
        ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks::new(
            A::SHADER_READ,
            S::FRAGMENT_SHADER,
            A::COLOR_ATTACHMENT_WRITE,
            color_write,
        ),
        _ => return None,
    };
    Some(masks)
}

/// Whole-image range (mip 0, layer 0) for `aspect`.
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Builds the barrier and stage pair for a transition.
pub fn layout_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> (vk::ImageMemoryBarrier<'static>, TransitionMasks) {
    let masks = transition_masks(old, new).unwrap_or_else(|| {
        warn!("Unhandled layout transition: {:?} -> {:?}", old, new);
        TransitionMasks::FALLBACK
    });

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(aspect))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    (barrier, masks)
}

/// Records a layout transition into `cmd`.
pub fn record_layout_transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) {
    let (barrier, masks) = layout_barrier(image, aspect, old, new);
    cmd.image_barrier(masks.src_stage, masks.dst_stage, barrier);
}

/// Copies a rendered color attachment into a swapchain image and leaves both
/// images ready for their next use (source back to COLOR_ATTACHMENT, swapchain
/// image in PRESENT_SRC).
pub fn record_copy_to_swapchain(
    cmd: &CommandBuffer,
    source: vk::Image,
    swapchain_image: vk::Image,
    extent: vk::Extent2D,
) {
    use vk::ImageLayout as L;
    let color = vk::ImageAspectFlags::COLOR;

    record_layout_transition(cmd, source, color, L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_SRC_OPTIMAL);
    record_layout_transition(cmd, swapchain_image, color, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL);
    cmd.copy_image(source, swapchain_image, extent);
    record_layout_transition(cmd, swapchain_image, color, L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR);
    record_layout_transition(cmd, source, color, L::TRANSFER_SRC_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_upload_sequence() {
        let to_dst =
            transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .unwrap();
        assert_eq!(to_dst.src_access, vk::AccessFlags::empty());
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_dst.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_read = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(to_read.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_render_target_to_copy_source() {
        let masks = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(masks.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_render_target_to_sampled() {
        let masks = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(masks.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_present_transition() {
        let masks = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )
        .unwrap();
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(masks.dst_access, vk::AccessFlags::empty());
    }

    #[test]
    fn test_depth_transitions_cover_both_test_stages() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert!(masks.dst_stage.contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(masks.dst_stage.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
    }

    #[test]
    fn test_swapchain_transitions_chain_with_acquire_wait() {
        use crate::command::ACQUIRE_WAIT_STAGES;
        use vk::ImageLayout as L;

        for new in [L::COLOR_ATTACHMENT_OPTIMAL, L::TRANSFER_DST_OPTIMAL] {
            let masks = transition_masks(L::UNDEFINED, new).unwrap();
            assert!(
                masks.src_stage.intersects(ACQUIRE_WAIT_STAGES),
                "{:?} starts at {:?}, outside the acquire wait",
                new,
                masks.src_stage
            );
            assert!(!masks.src_stage.contains(vk::PipelineStageFlags::TOP_OF_PIPE));
        }

        let to_color = transition_masks(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
        assert!(to_color.src_stage.contains(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT));
        let to_copy = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_copy.src_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_reused_attachments_wait_for_previous_frame() {
        use vk::AccessFlags as A;
        use vk::ImageLayout as L;
        use vk::PipelineStageFlags as S;

        let depth = transition_masks(L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(depth.src_stage, S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS);
        assert_eq!(depth.src_access, A::DEPTH_STENCIL_ATTACHMENT_WRITE);

        let color = transition_masks(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(color.src_stage, S::COLOR_ATTACHMENT_OUTPUT | S::FRAGMENT_SHADER);
        assert_eq!(color.src_access, A::COLOR_ATTACHMENT_WRITE);
        assert!(color.dst_access.contains(A::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_unknown_transition_falls_back() {
        assert!(
            transition_masks(vk::ImageLayout::GENERAL, vk::ImageLayout::PREINITIALIZED).is_none()
        );
        let (barrier, masks) = layout_barrier(
            vk::Image::from_raw(7),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::PREINITIALIZED,
        );
        assert_eq!(masks, TransitionMasks::FALLBACK);
        assert_eq!(masks.src_stage, vk::PipelineStageFlags::ALL_COMMANDS);
        assert_eq!(barrier.old_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_layout_barrier_fields() {
        let (barrier, _) = layout_barrier(
            vk::Image::from_raw(9),
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(barrier.image, vk::Image::from_raw(9));
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }
}
