//! Graphics pipeline management.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout built from cached descriptor
//!   set layouts
//! - [`Pipeline`] wraps a graphics VkPipeline and remembers whether it takes
//!   viewport and scissor as dynamic state
//! - [`GraphicsPipelineBuilder`] configures pipelines for dynamic rendering
//!
//! A pipeline with dynamic viewport and scissor can draw into targets of any
//! size; the renderer re-issues both commands sized to the active target each
//! time such a pipeline is bound.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::shader::{Shader, ShaderStage};
//! use renderer_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use renderer_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/textured.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let fragment_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/textured.frag.spv"),
//!     ShaderStage::Fragment,
//!     "main",
//! )?;
//!
//! let layout = Arc::new(PipelineLayout::new(device.clone(), &[], &[])?);
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vertex_shader)
//!     .fragment_shader(&fragment_shader)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .color_attachment_format(vk::Format::B8G8R8A8_SRGB)
//!     .build(device, layout)?;
//! assert!(pipeline.has_dynamic_viewport());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// Vulkan pipeline layout wrapper.
///
/// The descriptor set layouts it references are owned by the layout cache
/// and must outlive it.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
    set_count: u32,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts in set-index order
    /// * `push_constant_ranges` - Push constant ranges
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self {
            device,
            layout,
            set_count: descriptor_set_layouts.len() as u32,
        })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Number of descriptor sets in the layout.
    #[inline]
    pub fn set_count(&self) -> u32 {
        self.set_count
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed pipeline layout");
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: Arc<PipelineLayout>,
    dynamic_viewport: bool,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Layout used to bind descriptor sets for this pipeline.
    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    /// True if viewport and scissor are set at record time.
    #[inline]
    pub fn has_dynamic_viewport(&self) -> bool {
        self.dynamic_viewport
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// True if `states` contains both viewport and scissor.
pub fn declares_dynamic_viewport(states: &[vk::DynamicState]) -> bool {
    states.contains(&vk::DynamicState::VIEWPORT) && states.contains(&vk::DynamicState::SCISSOR)
}

/// True for formats whose attachments cannot be blended.
pub fn is_integer_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::R8_UINT
            | vk::Format::R8_SINT
            | vk::Format::R16_UINT
            | vk::Format::R16_SINT
            | vk::Format::R32_UINT
            | vk::Format::R32_SINT
            | vk::Format::R32G32_UINT
            | vk::Format::R32G32_SINT
            | vk::Format::R32G32B32A32_UINT
            | vk::Format::R32G32B32A32_SINT
    )
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    /// Do not cull any faces.
    None,
    /// Cull back-facing triangles.
    #[default]
    Back,
    /// Cull front-facing triangles.
    Front,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::Front => vk::CullModeFlags::FRONT,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    /// Passes if less than.
    #[default]
    Less,
    /// Passes if less than or equal.
    LessOrEqual,
    /// Always passes.
    Always,
}

impl CompareOp {
    /// Converts to Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Blend state for one color attachment.
///
/// Integer attachments never blend regardless of the requested mode.
pub fn blend_attachment(format: vk::Format, alpha_blend: bool) -> vk::PipelineColorBlendAttachmentState {
    let state =
        vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
    if !alpha_blend || is_integer_format(format) {
        return state.blend_enable(false);
    }
    state
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// `u32` specialization constants applied to every stage of a pipeline.
///
/// Stages that do not declare a constant ignore its entry.
#[derive(Clone, Debug, Default)]
pub struct SpecializationConstants {
    entries: Vec<vk::SpecializationMapEntry>,
    data: Vec<u8>,
}

impl SpecializationConstants {
    /// Sets constant `id` to `value`, replacing an earlier value.
    pub fn set(&mut self, id: u32, value: u32) {
        let bytes = value.to_ne_bytes();
        if let Some(entry) = self.entries.iter().find(|e| e.constant_id == id) {
            let start = entry.offset as usize;
            self.data[start..start + bytes.len()].copy_from_slice(&bytes);
            return;
        }
        self.entries.push(
            vk::SpecializationMapEntry::default()
                .constant_id(id)
                .offset(self.data.len() as u32)
                .size(bytes.len()),
        );
        self.data.extend_from_slice(&bytes);
    }

    /// Value of constant `id`, if set.
    pub fn get(&self, id: u32) -> Option<u32> {
        let entry = self.entries.iter().find(|e| e.constant_id == id)?;
        let start = entry.offset as usize;
        let bytes = self.data.get(start..start + entry.size)?;
        bytes.try_into().ok().map(u32::from_ne_bytes)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Specialization info borrowing these constants.
    pub fn info(&self) -> vk::SpecializationInfo<'_> {
        vk::SpecializationInfo::default()
            .map_entries(&self.entries)
            .data(&self.data)
    }
}

/// Builder for graphics pipelines targeting dynamic rendering.
///
/// Defaults: triangle list, back-face culling, counter-clockwise front face,
/// depth test and write with `Less` when a depth format is set, alpha
/// blending on float color attachments, dynamic viewport and scissor.
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: CullMode,
    front_face: vk::FrontFace,
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,
    alpha_blend: bool,
    color_attachment_formats: Vec<vk::Format>,
    depth_attachment_format: Option<vk::Format>,
    dynamic_states: Vec<vk::DynamicState>,
    specialization: SpecializationConstants,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            cull_mode: CullMode::Back,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,
            alpha_blend: true,
            color_attachment_formats: Vec::new(),
            depth_attachment_format: None,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
            specialization: SpecializationConstants::default(),
        }
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Adds a vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Adds vertex input attribute descriptions.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: vk::FrontFace) -> Self {
        self.front_face = face;
        self
    }

    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// Enables or disables alpha blending on float color attachments.
    pub fn alpha_blend(mut self, enable: bool) -> Self {
        self.alpha_blend = enable;
        self
    }

    /// Adds a color attachment format, in attachment order.
    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_formats.push(format);
        self
    }

    /// Sets the depth attachment format.
    pub fn depth_attachment_format(mut self, format: vk::Format) -> Self {
        self.depth_attachment_format = Some(format);
        self
    }

    /// Specializes constant `id` to `value` in both shader stages.
    pub fn specialization_constant(mut self, id: u32, value: u32) -> Self {
        self.specialization.set(id, value);
        self
    }

    /// Bakes viewport and scissor into the pipeline instead of setting them
    /// at record time.
    ///
    /// The baked values come from `extent`, so the pipeline only fits
    /// targets of that size.
    pub fn fixed_viewport(mut self) -> Self {
        self.dynamic_states
            .retain(|s| *s != vk::DynamicState::VIEWPORT && *s != vk::DynamicState::SCISSOR);
        self
    }

    /// Builds the pipeline.
    ///
    /// `fixed_extent` is only read when the pipeline has no dynamic
    /// viewport; pass `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a shader stage or color format
    /// is missing, or if a fixed-viewport pipeline has no extent.
    pub fn build(self, device: Arc<Device>, layout: Arc<PipelineLayout>) -> RhiResult<Pipeline> {
        self.build_with_extent(device, layout, None)
    }

    /// Builds the pipeline with a baked viewport of `fixed_extent`.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_with_extent(
        self,
        device: Arc<Device>,
        layout: Arc<PipelineLayout>,
        fixed_extent: Option<vk::Extent2D>,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;
        if self.color_attachment_formats.is_empty() {
            return Err(RhiError::PipelineError(
                "At least one color attachment format is required".to_string(),
            ));
        }

        let dynamic_viewport = declares_dynamic_viewport(&self.dynamic_states);
        let baked = match (dynamic_viewport, fixed_extent) {
            (true, _) => None,
            (false, Some(extent)) => Some(extent),
            (false, None) => {
                return Err(RhiError::PipelineError(
                    "Fixed-viewport pipeline needs an extent".to_string(),
                ));
            }
        };

        let specialization = self.specialization.info();
        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ]
        .map(|stage| {
            if self.specialization.is_empty() {
                stage
            } else {
                stage.specialization_info(&specialization)
            }
        });

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewports = baked.map(|extent| {
            [vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }]
        });
        let scissors = baked.map(|extent| {
            [vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            }]
        });
        let viewport_state = match (&viewports, &scissors) {
            (Some(viewports), Some(scissors)) => vk::PipelineViewportStateCreateInfo::default()
                .viewports(viewports)
                .scissors(scissors),
            _ => vk::PipelineViewportStateCreateInfo::default()
                .viewport_count(1)
                .scissor_count(1),
        };

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let has_depth = self.depth_attachment_format.is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && self.depth_test_enable)
            .depth_write_enable(has_depth && self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .max_depth_bounds(1.0);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = self
            .color_attachment_formats
            .iter()
            .map(|&format| blend_attachment(format, self.alpha_blend))
            .collect();
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.color_attachment_formats);
        if let Some(depth_format) = self.depth_attachment_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("No pipeline returned".to_string()))?;

        info!(
            "Graphics pipeline created ({} color attachment(s), dynamic viewport: {})",
            self.color_attachment_formats.len(),
            dynamic_viewport
        );

        Ok(Pipeline {
            device,
            pipeline,
            layout,
            dynamic_viewport,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declares_dynamic_viewport() {
        assert!(declares_dynamic_viewport(&[
            vk::DynamicState::SCISSOR,
            vk::DynamicState::VIEWPORT
        ]));
        assert!(!declares_dynamic_viewport(&[vk::DynamicState::VIEWPORT]));
        assert!(!declares_dynamic_viewport(&[]));
    }

    #[test]
    fn test_builder_defaults_to_dynamic_viewport() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(declares_dynamic_viewport(&builder.dynamic_states));
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert!(builder.depth_test_enable);
    }

    #[test]
    fn test_fixed_viewport_removes_dynamic_states() {
        let builder = GraphicsPipelineBuilder::new().fixed_viewport();
        assert!(!declares_dynamic_viewport(&builder.dynamic_states));
        assert!(builder.dynamic_states.is_empty());
    }

    #[test]
    fn test_specialization_constants() {
        let mut constants = SpecializationConstants::default();
        assert!(constants.is_empty());
        constants.set(0, 32);
        constants.set(3, 7);
        constants.set(0, 8);

        assert_eq!(constants.get(0), Some(8));
        assert_eq!(constants.get(3), Some(7));
        assert_eq!(constants.get(1), None);

        let info = constants.info();
        assert_eq!(info.map_entry_count, 2);
        assert_eq!(info.data_size, 8);
        assert_eq!(constants.entries[1].offset, 4);
        assert_eq!(constants.entries[1].size, 4);
    }

    #[test]
    fn test_builder_collects_specialization() {
        let builder = GraphicsPipelineBuilder::new()
            .specialization_constant(0, 16)
            .specialization_constant(0, 24);
        assert_eq!(builder.specialization.get(0), Some(24));
        assert_eq!(builder.specialization.info().map_entry_count, 1);
    }

    #[test]
    fn test_integer_attachment_never_blends() {
        let entity = blend_attachment(vk::Format::R32_SINT, true);
        assert_eq!(entity.blend_enable, vk::FALSE);

        let color = blend_attachment(vk::Format::R8G8B8A8_UNORM, true);
        assert_eq!(color.blend_enable, vk::TRUE);
        assert_eq!(color.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);

        let opaque = blend_attachment(vk::Format::R8G8B8A8_UNORM, false);
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(opaque.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_is_integer_format() {
        assert!(is_integer_format(vk::Format::R32_SINT));
        assert!(!is_integer_format(vk::Format::B8G8R8A8_SRGB));
        assert!(!is_integer_format(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn test_cull_and_compare_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
        assert_eq!(CompareOp::LessOrEqual.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(CompareOp::default(), CompareOp::Less);
    }
}
