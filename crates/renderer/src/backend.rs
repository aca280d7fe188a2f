//! The seam between the renderer facade and a graphics API.
//!
//! The facade owns the frame state machine, the offset math and every
//! contract check. A [`RenderBackend`] only executes the individual steps
//! it is asked to perform, in the order the facade calls them. The backend
//! is chosen once, as the facade's type parameter.

use ash::vk;

use renderer_rhi::RhiResult;
use renderer_rhi::query::PipelineStatistics;
use renderer_rhi::rendering::ClearValues;
use renderer_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::binding::{DynamicOffsets, FrameLayout};

/// Where a render pass draws.
#[derive(Debug)]
pub enum RenderTarget<'a, F> {
    /// The swapchain image acquired for the current frame.
    Swapchain,
    /// An offscreen framebuffer.
    Framebuffer(&'a F),
}

// Manual impls: `F` itself need not be Clone.
impl<F> Clone for RenderTarget<'_, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for RenderTarget<'_, F> {}

/// Per-frame buffer a uniform write goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformRegion {
    Camera,
    Scene,
    Objects,
}

/// GPU counters of a completed frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStatistics {
    pub pipeline: Option<PipelineStatistics>,
    /// Time between the first and last timestamp of the frame.
    pub gpu_time_ms: Option<f64>,
}

/// Graphics API operations driven by [`Renderer`](crate::Renderer).
///
/// `slot` arguments are frame-slot indices below
/// `frame_layout().slots()`; `image_index` is the value returned by the
/// last successful [`acquire_image`](Self::acquire_image).
pub trait RenderBackend {
    type Buffer;
    /// Shared handle to a sampled texture.
    type Texture: Clone;
    type Pipeline;
    type Framebuffer;

    /// Region layout of the per-frame buffers, fixed at creation.
    fn frame_layout(&self) -> &FrameLayout;

    fn swapchain_extent(&self) -> vk::Extent2D;

    // ------------------------------------------------------------------
    // Frame sequence
    // ------------------------------------------------------------------

    /// Blocks until the GPU has finished the last submission of `slot`.
    fn wait_for_slot(&mut self, slot: u32) -> RhiResult<()>;

    /// Counters recorded by `slot`'s previous frame. Called after
    /// [`wait_for_slot`](Self::wait_for_slot).
    fn frame_statistics(&self, slot: u32) -> RhiResult<FrameStatistics>;

    /// Resets `slot`'s command pool. The slot's fence has signaled.
    fn reset_commands(&mut self, slot: u32) -> RhiResult<()>;

    /// Acquires the next swapchain image, signaling `slot`'s
    /// image-available semaphore.
    fn acquire_image(&mut self, slot: u32) -> RhiResult<AcquireOutcome>;

    /// Unsignals `slot`'s fence ahead of its next submission.
    fn reset_fence(&mut self, slot: u32) -> RhiResult<()>;

    /// Begins `slot`'s command buffer.
    fn begin_commands(&mut self, slot: u32, image_index: u32) -> RhiResult<()>;

    /// Ends `slot`'s command buffer and submits it, waiting on the
    /// image-available semaphore and signaling the image's render-finished
    /// semaphore and the slot fence.
    fn submit(&mut self, slot: u32, image_index: u32) -> RhiResult<()>;

    /// Presents `image_index` once rendering has finished.
    fn present(&mut self, slot: u32, image_index: u32) -> RhiResult<PresentOutcome>;

    // ------------------------------------------------------------------
    // Binding
    // ------------------------------------------------------------------

    /// Copies `bytes` into a per-frame buffer at an absolute offset.
    fn write_uniform(&mut self, region: UniformRegion, offset: u64, bytes: &[u8]) -> RhiResult<()>;

    /// Rewrites `slot`'s texture-array set with `textures`, filling unused
    /// array elements with a fallback texture.
    fn write_textures(&mut self, slot: u32, textures: &[Self::Texture]);

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Transitions the target's attachments and begins rendering.
    /// Returns the render area extent.
    fn begin_render_pass(
        &mut self,
        slot: u32,
        image_index: u32,
        target: RenderTarget<'_, Self::Framebuffer>,
        clear: &ClearValues,
    ) -> RhiResult<vk::Extent2D>;

    fn end_render_pass(&mut self, slot: u32);

    /// Binds `pipeline` and the slot's descriptor sets at `offsets`.
    fn bind_pipeline(&mut self, slot: u32, pipeline: &Self::Pipeline, offsets: &DynamicOffsets);

    /// Whether `pipeline` expects viewport and scissor to be set per pass.
    fn has_dynamic_viewport(pipeline: &Self::Pipeline) -> bool;

    /// Sets a positive-height viewport and a scissor covering `extent`.
    fn set_viewport(&mut self, slot: u32, extent: vk::Extent2D);

    /// Records an indexed draw reading object entry `object_index`.
    fn draw_indexed(
        &mut self,
        slot: u32,
        vertex_buffer: &Self::Buffer,
        index_buffer: &Self::Buffer,
        index_count: u32,
        object_index: u32,
    );

    /// Copies `framebuffer`'s color attachment into the acquired image.
    fn present_framebuffer(
        &mut self,
        slot: u32,
        image_index: u32,
        framebuffer: &Self::Framebuffer,
    ) -> RhiResult<()>;

    /// Transitions `framebuffer`'s color attachment for shader reads.
    fn prepare_for_sampling(&mut self, slot: u32, framebuffer: &Self::Framebuffer);

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Destroys everything sized by the swapchain (depth image, per-image
    /// semaphores).
    fn destroy_swapchain_resources(&mut self);

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()>;

    fn create_swapchain_resources(&mut self) -> RhiResult<()>;
}
