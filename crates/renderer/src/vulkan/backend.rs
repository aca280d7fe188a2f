//! [`RenderBackend`] implementation on Vulkan 1.3.
//!
//! # Resource Destruction Order
//!
//! Fields are declared in destruction order:
//! 1. Wait for all GPU work to complete (in `Drop`)
//! 2. Swapchain-sized resources (render-finished semaphores, depth image)
//! 3. Textures and the sampler
//! 4. The shared camera, scene and object buffers
//! 5. Descriptor pools, then the pipeline layout and set layouts
//! 6. Per-slot resources (command pools, semaphores, fences, query pools);
//!    their descriptor sets were freed with the pools
//! 7. Upload context and swapchain
//! 8. Device, surface and instance (in [`GpuContext`])

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use renderer_core::RendererConfig;
use renderer_platform::{FramebufferSource, Window};
use renderer_rhi::barrier::{record_copy_to_swapchain, record_layout_transition};
use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::command::{CommandBuffer, FrameSubmit};
use renderer_rhi::context::GpuContext;
use renderer_rhi::descriptor::{
    DescriptorAllocator, DescriptorBindingBuilder, DescriptorLayoutCache, DescriptorWriter,
    PoolRatio,
};
use renderer_rhi::device::{Device, QueueKind};
use renderer_rhi::image::{DEFAULT_DEPTH_FORMAT, Image, ImageDesc};
use renderer_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use renderer_rhi::rendering::{ClearValues, Framebuffer, FramebufferSpec, RenderPassDesc};
use renderer_rhi::sampler::Sampler;
use renderer_rhi::shader::{Shader, ShaderStage};
use renderer_rhi::swapchain::{AcquireOutcome, PresentOutcome, Swapchain};
use renderer_rhi::sync::Semaphore;
use renderer_rhi::texture::Texture;
use renderer_rhi::upload::UploadContext;
use renderer_rhi::vertex::Vertex;
use renderer_rhi::{RhiError, RhiResult};

use crate::backend::{FrameStatistics, RenderBackend, RenderTarget, UniformRegion};
use crate::binding::{DynamicOffsets, FrameLayout};
use crate::vulkan::frame::{FrameSlot, SetLayouts};

/// Anisotropy requested for the shared sampler; clamped to the device limit.
const SAMPLER_ANISOTROPY: f32 = 16.0;

/// Specialization constant sizing the fragment shader's texture array. It
/// must match the texture set layout's descriptor count.
pub const MAX_TEXTURES_CONSTANT_ID: u32 = 0;

/// What a pipeline renders into.
#[derive(Clone, Copy, Debug)]
pub enum PipelineTarget {
    /// Swapchain color format plus the swapchain depth image.
    Swapchain,
    /// The attachments of framebuffers built from this spec.
    Framebuffer(FramebufferSpec),
}

/// Description of a graphics pipeline using the renderer's binding layout.
#[derive(Clone, Copy, Debug)]
pub struct PipelineDesc<'a> {
    pub vertex_shader: &'a Path,
    pub fragment_shader: &'a Path,
    pub target: PipelineTarget,
    pub alpha_blend: bool,
    pub cull_mode: CullMode,
}

impl<'a> PipelineDesc<'a> {
    /// Opaque, back-face culled pipeline for `target`.
    pub fn new(vertex_shader: &'a Path, fragment_shader: &'a Path, target: PipelineTarget) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
            target,
            alpha_blend: false,
            cull_mode: CullMode::Back,
        }
    }
}

/// Vulkan backend owning the device, the swapchain and all per-frame
/// resources.
pub struct VulkanBackend {
    /// One per swapchain image.
    render_finished: Vec<Semaphore>,
    depth: Option<Image>,
    /// Layout of the acquired swapchain image in the recording frame.
    swapchain_layout: vk::ImageLayout,

    /// Textures referenced by each slot's texture set, kept alive until the
    /// slot's next rewrite.
    bound_textures: Vec<Vec<Arc<Texture>>>,
    white_texture: Arc<Texture>,
    sampler: Sampler,

    camera_buffer: Buffer,
    scene_buffer: Buffer,
    object_buffer: Buffer,

    descriptor_allocator: DescriptorAllocator,
    pipeline_layout: Arc<PipelineLayout>,
    layout_cache: DescriptorLayoutCache,

    frames: Vec<FrameSlot>,
    upload: UploadContext,
    swapchain: Swapchain,
    layout: FrameLayout,
    max_texture_slots: u32,
    clear_color: [f32; 4],
    context: GpuContext,
}

impl VulkanBackend {
    /// Initializes Vulkan for `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails; there is no degraded mode.
    pub fn new(window: &Window, config: &RendererConfig) -> RhiResult<Self> {
        let display = window
            .raw_display_handle()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let window_handle = window
            .raw_window_handle()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let context = GpuContext::new(config.enable_validation, display, window_handle)?;
        let device = context.device().clone();

        let (width, height) = window.framebuffer_size();
        let extent = vk::Extent2D {
            width: if width == 0 { config.window_width } else { width },
            height: if height == 0 { config.window_height } else { height },
        };
        let swapchain = Swapchain::new(&context, extent, config.vsync)?;
        let upload = UploadContext::new(device.clone())?;

        let layout = FrameLayout::new(
            config.frames_in_flight,
            config.max_objects,
            device.min_uniform_buffer_offset_alignment(),
            device.min_storage_buffer_offset_alignment(),
        );

        let mut layout_cache = DescriptorLayoutCache::new(device.clone());
        let set_layouts = create_set_layouts(&mut layout_cache, config.max_texture_slots)?;
        let pipeline_layout = Arc::new(PipelineLayout::new(
            device.clone(),
            &set_layouts.to_array(),
            &[],
        )?);

        let ratios = [
            PoolRatio::new(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1.0),
            PoolRatio::new(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, 1.0),
            PoolRatio::new(vk::DescriptorType::SAMPLER, 1.0),
            PoolRatio::new(vk::DescriptorType::SAMPLED_IMAGE, config.max_texture_slots as f32),
        ];
        let mut descriptor_allocator =
            DescriptorAllocator::new(device.clone(), layout.slots() * 3, &ratios)?;

        let camera_buffer = Buffer::new(device.clone(), BufferUsage::Uniform, layout.camera().total_size())?;
        let scene_buffer = Buffer::new(device.clone(), BufferUsage::Uniform, layout.scene().total_size())?;
        let object_buffer = Buffer::new(device.clone(), BufferUsage::Storage, layout.objects().total_size())?;

        let sampler = Sampler::linear_repeat(device.clone(), SAMPLER_ANISOTROPY)?;
        let white_texture = Arc::new(Texture::white(device.clone(), &upload)?);

        let frames = (0..layout.slots())
            .map(|i| FrameSlot::new(device.clone(), i, &mut descriptor_allocator, set_layouts))
            .collect::<RhiResult<Vec<_>>>()?;

        let mut backend = Self {
            bound_textures: vec![Vec::new(); frames.len()],
            frames,
            render_finished: Vec::new(),
            depth: None,
            swapchain_layout: vk::ImageLayout::UNDEFINED,
            white_texture,
            sampler,
            camera_buffer,
            scene_buffer,
            object_buffer,
            descriptor_allocator,
            pipeline_layout,
            layout_cache,
            upload,
            swapchain,
            layout,
            max_texture_slots: config.max_texture_slots,
            clear_color: config.clear_color,
            context,
        };

        for slot in 0..backend.layout.slots() {
            backend.write_buffer_sets(slot);
            backend.write_textures(slot, &[]);
        }
        backend.create_swapchain_resources()?;

        info!(
            "Vulkan backend initialized: {} frame slots, {} descriptor layouts, {} descriptor pool(s)",
            backend.frames.len(),
            backend.layout_cache.len(),
            backend.descriptor_allocator.pool_count()
        );
        Ok(backend)
    }

    /// Points `slot`'s global and object sets at the shared buffers. The
    /// slot's region is selected by dynamic offsets at bind time.
    fn write_buffer_sets(&self, slot: u32) {
        let sets = self.frames[slot as usize].descriptor_sets();

        let mut writer = DescriptorWriter::new();
        writer
            .write_buffer(
                0,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                self.camera_buffer.handle(),
                0,
                self.layout.camera().element_size(),
            )
            .write_buffer(
                1,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                self.scene_buffer.handle(),
                0,
                self.layout.scene().element_size(),
            );
        writer.update_set(self.device(), sets[0]);

        writer.clear();
        writer.write_buffer(
            0,
            vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            self.object_buffer.handle(),
            0,
            self.layout.objects().element_size(),
        );
        writer.update_set(self.device(), sets[1]);
    }

    // ========================================================================
    // Resource creation
    // ========================================================================

    #[inline]
    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        self.context.device()
    }

    #[inline]
    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    #[inline]
    pub fn pipeline_layout(&self) -> &Arc<PipelineLayout> {
        &self.pipeline_layout
    }

    /// The 1x1 white texture bound to unused texture slots.
    #[inline]
    pub fn white_texture(&self) -> Arc<Texture> {
        self.white_texture.clone()
    }

    /// Uploads vertices into a device-local buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or the upload fails.
    pub fn create_vertex_buffer(&self, vertices: &[Vertex]) -> RhiResult<Buffer> {
        Buffer::new_device_local(
            self.device().clone(),
            &self.upload,
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )
    }

    /// Uploads 32-bit indices into a device-local buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or the upload fails.
    pub fn create_index_buffer(&self, indices: &[u32]) -> RhiResult<Buffer> {
        Buffer::new_device_local(
            self.device().clone(),
            &self.upload,
            BufferUsage::Index,
            bytemuck::cast_slice(indices),
        )
    }

    /// Uploads an RGBA8 image as a sampled texture.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceLoad`] for mismatched pixel data; the
    /// renderer stays usable.
    pub fn create_texture(&self, width: u32, height: u32, pixels: &[u8]) -> RhiResult<Arc<Texture>> {
        Texture::from_rgba8(self.device().clone(), &self.upload, width, height, pixels).map(Arc::new)
    }

    /// Creates an offscreen framebuffer.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid size or if an attachment cannot be
    /// created.
    pub fn create_framebuffer(&self, spec: FramebufferSpec) -> RhiResult<Framebuffer> {
        Framebuffer::new(self.device().clone(), spec)
    }

    /// Resizes an offscreen framebuffer once the GPU no longer uses it.
    ///
    /// Returns whether the attachments were recreated.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait or attachment creation fails.
    pub fn resize_framebuffer(
        &self,
        framebuffer: &mut Framebuffer,
        width: u32,
        height: u32,
    ) -> RhiResult<bool> {
        if framebuffer.extent() == (vk::Extent2D { width, height }) {
            return Ok(false);
        }
        self.device().wait_idle()?;
        framebuffer.resize(width, height)
    }

    /// Compiles a pipeline from SPIR-V files against the renderer's
    /// descriptor layout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if a shader file is missing or
    /// invalid, or a pipeline error if creation fails.
    pub fn create_pipeline(&self, desc: &PipelineDesc<'_>) -> RhiResult<Pipeline> {
        let device = self.device().clone();
        let vertex_shader =
            Shader::from_spirv_file(device.clone(), desc.vertex_shader, ShaderStage::Vertex, "main")?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            desc.fragment_shader,
            ShaderStage::Fragment,
            "main",
        )?;

        let mut builder = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(desc.cull_mode)
            .alpha_blend(desc.alpha_blend)
            .specialization_constant(MAX_TEXTURES_CONSTANT_ID, self.max_texture_slots);

        match desc.target {
            PipelineTarget::Swapchain => {
                builder = builder
                    .color_attachment_format(self.swapchain.format())
                    .depth_attachment_format(DEFAULT_DEPTH_FORMAT);
            }
            PipelineTarget::Framebuffer(spec) => {
                for format in spec.color_formats() {
                    builder = builder.color_attachment_format(format);
                }
                if let Some(depth) = spec.depth_format {
                    builder = builder.depth_attachment_format(depth);
                }
            }
        }

        builder.build(device, self.pipeline_layout.clone())
    }

    // ========================================================================
    // Recording helpers
    // ========================================================================

    #[inline]
    fn frame(&self, slot: u32) -> &FrameSlot {
        &self.frames[slot as usize]
    }

    fn swapchain_target(&self, image_index: u32) -> RhiResult<(vk::Image, vk::ImageView)> {
        let image = self.swapchain.image(image_index);
        let view = self.swapchain.image_view(image_index);
        image.zip(view).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No swapchain image with index {}", image_index))
        })
    }

    fn render_finished(&self, image_index: u32) -> RhiResult<&Semaphore> {
        self.render_finished.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "No render-finished semaphore for image {}",
                image_index
            ))
        })
    }

    /// Leaves the acquired image in PRESENT_SRC. An image nothing was drawn
    /// to is cleared first so it never presents undefined contents.
    fn finish_swapchain_image(&self, cmd: &CommandBuffer, image_index: u32) -> RhiResult<()> {
        use vk::ImageLayout as L;
        let color = vk::ImageAspectFlags::COLOR;
        let (image, view) = self.swapchain_target(image_index)?;

        match self.swapchain_layout {
            L::PRESENT_SRC_KHR => {}
            L::COLOR_ATTACHMENT_OPTIMAL => {
                record_layout_transition(cmd, image, color, L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR);
            }
            _ => {
                record_layout_transition(cmd, image, color, L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL);
                let pass = RenderPassDesc::new(self.swapchain.extent(), view)
                    .build(&ClearValues::with_color(self.clear_color));
                cmd.begin_rendering(&pass.info());
                cmd.end_rendering();
                record_layout_transition(cmd, image, color, L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR);
            }
        }
        Ok(())
    }
}

fn create_set_layouts(cache: &mut DescriptorLayoutCache, max_texture_slots: u32) -> RhiResult<SetLayouts> {
    let all = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    let fragment = vk::ShaderStageFlags::FRAGMENT;

    Ok(SetLayouts {
        global: cache.get_or_create(&[
            DescriptorBindingBuilder::uniform_buffer_dynamic(0, all),
            DescriptorBindingBuilder::uniform_buffer_dynamic(1, all),
        ])?,
        object: cache.get_or_create(&[DescriptorBindingBuilder::storage_buffer_dynamic(0, all)])?,
        textures: cache.get_or_create(&[
            DescriptorBindingBuilder::sampler(0, fragment),
            DescriptorBindingBuilder::sampled_image_array(1, max_texture_slots, fragment),
        ])?,
    })
}

fn min_extent(a: vk::Extent2D, b: vk::Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: a.width.min(b.width),
        height: a.height.min(b.height),
    }
}

impl RenderBackend for VulkanBackend {
    type Buffer = Buffer;
    type Texture = Arc<Texture>;
    type Pipeline = Pipeline;
    type Framebuffer = Framebuffer;

    #[inline]
    fn frame_layout(&self) -> &FrameLayout {
        &self.layout
    }

    #[inline]
    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn wait_for_slot(&mut self, slot: u32) -> RhiResult<()> {
        self.frame(slot).sync().in_flight().wait(u64::MAX)
    }

    fn frame_statistics(&self, slot: u32) -> RhiResult<FrameStatistics> {
        let queries = self.frame(slot).queries();
        let timestamps = queries.read_timestamps_ms()?;
        Ok(FrameStatistics {
            pipeline: queries.read_statistics()?,
            gpu_time_ms: timestamps.last().copied().filter(|_| timestamps.len() > 1),
        })
    }

    fn reset_commands(&mut self, slot: u32) -> RhiResult<()> {
        self.frame(slot).command_pool().reset()
    }

    fn acquire_image(&mut self, slot: u32) -> RhiResult<AcquireOutcome> {
        let semaphore = self.frame(slot).sync().image_available().handle();
        self.swapchain.acquire_next_image(semaphore)
    }

    fn reset_fence(&mut self, slot: u32) -> RhiResult<()> {
        self.frame(slot).sync().in_flight().reset()
    }

    fn begin_commands(&mut self, slot: u32, image_index: u32) -> RhiResult<()> {
        self.swapchain_layout = vk::ImageLayout::UNDEFINED;
        let (cmd, queries) = self.frames[slot as usize].recording_parts();
        cmd.begin()?;
        queries.reset(cmd);
        queries.write_timestamp(cmd, vk::PipelineStageFlags::TOP_OF_PIPE);
        queries.begin_statistics(cmd);
        debug!("Recording slot {} for image {}", slot, image_index);
        Ok(())
    }

    fn submit(&mut self, slot: u32, image_index: u32) -> RhiResult<()> {
        let frame = self.frame(slot);
        self.finish_swapchain_image(frame.command_buffer(), image_index)?;

        let (cmd, queries) = self.frames[slot as usize].recording_parts();
        queries.end_statistics(cmd);
        queries.write_timestamp(cmd, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        cmd.end()?;

        let frame = self.frame(slot);
        let submit = FrameSubmit::new(
            frame.command_buffer().handle(),
            frame.sync().image_available().handle(),
            self.render_finished(image_index)?.handle(),
        );
        // SAFETY: the command buffer was fully recorded above and the slot
        // fence was reset in reset_fence.
        unsafe {
            self.device().submit(
                QueueKind::Graphics,
                &[submit.info()],
                frame.sync().in_flight().handle(),
            )?;
        }
        Ok(())
    }

    fn present(&mut self, _slot: u32, image_index: u32) -> RhiResult<PresentOutcome> {
        let wait = self.render_finished(image_index)?.handle();
        self.swapchain
            .present(self.device().present_queue(), image_index, wait)
    }

    fn write_uniform(&mut self, region: UniformRegion, offset: u64, bytes: &[u8]) -> RhiResult<()> {
        let buffer = match region {
            UniformRegion::Camera => &self.camera_buffer,
            UniformRegion::Scene => &self.scene_buffer,
            UniformRegion::Objects => &self.object_buffer,
        };
        buffer.write_data(offset, bytes)
    }

    fn write_textures(&mut self, slot: u32, textures: &[Arc<Texture>]) {
        let mut views: Vec<vk::ImageView> = textures.iter().map(|t| t.view()).collect();
        views.resize(self.max_texture_slots as usize, self.white_texture.view());

        let mut writer = DescriptorWriter::new();
        writer
            .write_sampler(0, self.sampler.handle())
            .write_sampled_images(1, &views);
        writer.update_set(self.device(), self.frame(slot).texture_set());

        let previous = std::mem::replace(&mut self.bound_textures[slot as usize], textures.to_vec());
        debug!(
            "Slot {} texture set rewritten: {} textures (was {})",
            slot,
            textures.len(),
            previous.len()
        );
    }

    fn begin_render_pass(
        &mut self,
        slot: u32,
        image_index: u32,
        target: RenderTarget<'_, Framebuffer>,
        clear: &ClearValues,
    ) -> RhiResult<vk::Extent2D> {
        use vk::ImageLayout as L;
        let cmd = self.frame(slot).command_buffer();
        let on_swapchain = matches!(target, RenderTarget::Swapchain);

        let desc = match target {
            RenderTarget::Swapchain => {
                let (image, view) = self.swapchain_target(image_index)?;
                let depth = self.depth.as_ref().ok_or_else(|| {
                    RhiError::InvalidHandle("Swapchain depth image missing".to_string())
                })?;
                record_layout_transition(cmd, image, vk::ImageAspectFlags::COLOR, L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL);
                record_layout_transition(cmd, depth.handle(), depth.aspect(), L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL);
                RenderPassDesc::new(self.swapchain.extent(), view).with_depth(depth.view())
            }
            RenderTarget::Framebuffer(framebuffer) => {
                let colors = std::iter::once(framebuffer.color()).chain(framebuffer.entity_id());
                for image in colors {
                    record_layout_transition(cmd, image.handle(), image.aspect(), L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL);
                }
                if let Some(depth) = framebuffer.depth() {
                    record_layout_transition(cmd, depth.handle(), depth.aspect(), L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL);
                }
                framebuffer.render_pass_desc()
            }
        };

        let rendering = desc.build(clear);
        cmd.begin_rendering(&rendering.info());
        if on_swapchain {
            self.swapchain_layout = L::COLOR_ATTACHMENT_OPTIMAL;
        }
        Ok(desc.extent)
    }

    fn end_render_pass(&mut self, slot: u32) {
        self.frame(slot).command_buffer().end_rendering();
    }

    fn bind_pipeline(&mut self, slot: u32, pipeline: &Pipeline, offsets: &DynamicOffsets) {
        let frame = self.frame(slot);
        let cmd = frame.command_buffer();
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.bind_descriptor_sets(
            pipeline.layout().handle(),
            0,
            frame.descriptor_sets(),
            &[offsets.camera, offsets.scene, offsets.objects],
        );
    }

    #[inline]
    fn has_dynamic_viewport(pipeline: &Pipeline) -> bool {
        pipeline.has_dynamic_viewport()
    }

    fn set_viewport(&mut self, slot: u32, extent: vk::Extent2D) {
        let cmd = self.frame(slot).command_buffer();
        cmd.set_viewport(vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        });
        cmd.set_scissor(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
    }

    fn draw_indexed(
        &mut self,
        slot: u32,
        vertex_buffer: &Buffer,
        index_buffer: &Buffer,
        index_count: u32,
        object_index: u32,
    ) {
        let cmd = self.frame(slot).command_buffer();
        cmd.bind_vertex_buffer(vertex_buffer.handle());
        cmd.bind_index_buffer(index_buffer.handle());
        cmd.draw_indexed(index_count, object_index);
    }

    fn present_framebuffer(
        &mut self,
        slot: u32,
        image_index: u32,
        framebuffer: &Framebuffer,
    ) -> RhiResult<()> {
        let (image, _) = self.swapchain_target(image_index)?;
        let extent = min_extent(framebuffer.extent(), self.swapchain.extent());
        record_copy_to_swapchain(
            self.frame(slot).command_buffer(),
            framebuffer.color().handle(),
            image,
            extent,
        );
        self.swapchain_layout = vk::ImageLayout::PRESENT_SRC_KHR;
        Ok(())
    }

    fn prepare_for_sampling(&mut self, slot: u32, framebuffer: &Framebuffer) {
        let color = framebuffer.color();
        record_layout_transition(
            self.frame(slot).command_buffer(),
            color.handle(),
            color.aspect(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device().wait_idle()
    }

    fn destroy_swapchain_resources(&mut self) {
        let count = self.render_finished.len();
        self.render_finished.clear();
        self.depth = None;
        debug!("Destroyed {} render-finished semaphores and the depth image", count);
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        self.swapchain.recreate(&self.context, extent)
    }

    fn create_swapchain_resources(&mut self) -> RhiResult<()> {
        let device = self.device().clone();
        self.render_finished = (0..self.swapchain.image_count())
            .map(|_| Semaphore::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        self.depth = Some(Image::new(
            device,
            &ImageDesc::depth(self.swapchain.extent(), DEFAULT_DEPTH_FORMAT),
        )?);
        debug!(
            "Created {} render-finished semaphores and a {}x{} depth image",
            self.render_finished.len(),
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device().wait_idle() {
            error!("Failed to wait for device idle during backend drop: {:?}", e);
        }
        info!("Vulkan backend destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_extent() {
        let a = vk::Extent2D { width: 1920, height: 600 };
        let b = vk::Extent2D { width: 800, height: 1080 };
        assert_eq!(min_extent(a, b), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_pipeline_desc_defaults() {
        let desc = PipelineDesc::new(
            Path::new("a.vert.spv"),
            Path::new("a.frag.spv"),
            PipelineTarget::Swapchain,
        );
        assert!(!desc.alpha_blend);
        assert_eq!(desc.cull_mode, CullMode::Back);
    }
}
