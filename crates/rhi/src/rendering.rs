//! Render targets and dynamic rendering setup (Vulkan 1.3).
//!
//! # Overview
//!
//! There are no VkRenderPass or VkFramebuffer objects. A render pass is a
//! [`RenderPassDesc`] (extent plus attachment views) combined with
//! [`ClearValues`] at begin time:
//!
//! - attachment 0 is the color target, cleared to transparent black
//! - an optional entity-id attachment (R32_SINT) is cleared to -1 so that
//!   picking reads "no entity" where nothing was drawn
//! - the depth attachment is cleared to 1.0 with stencil 0
//!
//! [`Framebuffer`] owns a set of offscreen attachments and can be resized.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use renderer_rhi::command::CommandBuffer;
//! use renderer_rhi::rendering::{ClearValues, RenderPassDesc};
//!
//! # fn example(color_view: vk::ImageView, depth_view: vk::ImageView, cmd: &CommandBuffer) {
//! let pass = RenderPassDesc::new(vk::Extent2D { width: 800, height: 600 }, color_view)
//!     .with_depth(depth_view);
//! let bundle = pass.build(&ClearValues::default());
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{DEFAULT_DEPTH_FORMAT, Image, ImageDesc};

/// Format of the entity-id picking attachment.
pub const ENTITY_ID_FORMAT: vk::Format = vk::Format::R32_SINT;

/// Largest framebuffer dimension accepted by [`Framebuffer::resize`].
pub const MAX_FRAMEBUFFER_SIZE: u32 = 8192;

// ============================================================================
// Clear values
// ============================================================================

/// Clear values applied at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub entity_id: i32,
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 0.0],
            entity_id: -1,
            depth: 1.0,
            stencil: 0,
        }
    }
}

impl ClearValues {
    /// Defaults with a different color clear.
    pub fn with_color(color: [f32; 4]) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }
}

// ============================================================================
// Render pass description
// ============================================================================

/// Attachments and extent of one render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassDesc {
    pub extent: vk::Extent2D,
    pub color: vk::ImageView,
    pub entity_id: Option<vk::ImageView>,
    pub depth: Option<vk::ImageView>,
}

impl RenderPassDesc {
    /// Pass rendering into `color` only.
    #[inline]
    pub fn new(extent: vk::Extent2D, color: vk::ImageView) -> Self {
        Self {
            extent,
            color,
            entity_id: None,
            depth: None,
        }
    }

    /// Adds an entity-id attachment after the color attachment.
    #[inline]
    pub fn with_entity_id(mut self, view: vk::ImageView) -> Self {
        self.entity_id = Some(view);
        self
    }

    /// Adds a depth attachment.
    #[inline]
    pub fn with_depth(mut self, view: vk::ImageView) -> Self {
        self.depth = Some(view);
        self
    }

    /// Number of color attachments, counting the entity-id attachment.
    #[inline]
    pub fn color_attachment_count(&self) -> usize {
        1 + usize::from(self.entity_id.is_some())
    }

    /// Resolves the attachments and clear values into rendering info.
    pub fn build(&self, clear: &ClearValues) -> RenderingInfoBundle {
        let mut color_attachments = vec![color_attachment(
            self.color,
            vk::ClearColorValue {
                float32: clear.color,
            },
        )];
        if let Some(view) = self.entity_id {
            color_attachments.push(color_attachment(
                view,
                vk::ClearColorValue {
                    int32: [clear.entity_id, 0, 0, 0],
                },
            ));
        }

        let depth_attachment = self.depth.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: clear.depth,
                        stencil: clear.stencil,
                    },
                })
        });

        RenderingInfoBundle {
            color_attachments,
            depth_attachment,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.extent,
            },
        }
    }
}

fn color_attachment(
    view: vk::ImageView,
    clear: vk::ClearColorValue,
) -> vk::RenderingAttachmentInfo<'static> {
    vk::RenderingAttachmentInfo::default()
        .image_view(view)
        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue { color: clear })
}

/// Owned attachment infos that a `vk::RenderingInfo` can borrow.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    /// Rendering info borrowing this bundle.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }

    #[inline]
    pub fn color_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.color_attachments
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref()
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

// ============================================================================
// Offscreen framebuffer
// ============================================================================

/// Attachment configuration of a [`Framebuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferSpec {
    pub width: u32,
    pub height: u32,
    pub color_format: vk::Format,
    /// Adds an R32_SINT entity-id attachment.
    pub entity_id: bool,
    pub depth_format: Option<vk::Format>,
}

impl FramebufferSpec {
    /// Color plus depth at the given size.
    pub fn new(width: u32, height: u32, color_format: vk::Format) -> Self {
        Self {
            width,
            height,
            color_format,
            entity_id: false,
            depth_format: Some(DEFAULT_DEPTH_FORMAT),
        }
    }

    /// Color formats in attachment order, for pipeline creation.
    pub fn color_formats(&self) -> Vec<vk::Format> {
        let mut formats = vec![self.color_format];
        if self.entity_id {
            formats.push(ENTITY_ID_FORMAT);
        }
        formats
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width,
            height: self.height,
        }
    }
}

/// True if `width`x`height` is a usable framebuffer size.
pub fn valid_framebuffer_size(width: u32, height: u32) -> bool {
    (1..=MAX_FRAMEBUFFER_SIZE).contains(&width) && (1..=MAX_FRAMEBUFFER_SIZE).contains(&height)
}

/// Offscreen render target with its own attachments.
///
/// After rendering, the color attachment can be copied into a swapchain
/// image or transitioned for sampling by a GUI.
pub struct Framebuffer {
    device: Arc<Device>,
    spec: FramebufferSpec,
    color: Image,
    entity_id: Option<Image>,
    depth: Option<Image>,
}

impl Framebuffer {
    /// Creates the attachments described by `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] for an out-of-range size, or an
    /// error if an attachment cannot be created.
    pub fn new(device: Arc<Device>, spec: FramebufferSpec) -> RhiResult<Self> {
        if !valid_framebuffer_size(spec.width, spec.height) {
            return Err(RhiError::InvalidHandle(format!(
                "Invalid framebuffer size {}x{}",
                spec.width, spec.height
            )));
        }
        let (color, entity_id, depth) = create_attachments(&device, &spec)?;
        info!(
            "Framebuffer created: {}x{} (entity id: {}, depth: {})",
            spec.width,
            spec.height,
            spec.entity_id,
            spec.depth_format.is_some()
        );
        Ok(Self {
            device,
            spec,
            color,
            entity_id,
            depth,
        })
    }

    /// Recreates the attachments at a new size.
    ///
    /// Sizes of zero or above [`MAX_FRAMEBUFFER_SIZE`] are ignored with a
    /// warning. The caller must ensure the old attachments are no longer in
    /// use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if an attachment cannot be created; the old
    /// attachments are kept in that case.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        if !valid_framebuffer_size(width, height) {
            warn!("Attempted to resize framebuffer to {}x{}", width, height);
            return Ok(false);
        }
        if width == self.spec.width && height == self.spec.height {
            return Ok(false);
        }

        let spec = FramebufferSpec {
            width,
            height,
            ..self.spec
        };
        let (color, entity_id, depth) = create_attachments(&self.device, &spec)?;
        self.color = color;
        self.entity_id = entity_id;
        self.depth = depth;
        self.spec = spec;
        info!("Framebuffer resized to {}x{}", width, height);
        Ok(true)
    }

    /// Render pass description covering every attachment.
    pub fn render_pass_desc(&self) -> RenderPassDesc {
        let mut desc = RenderPassDesc::new(self.spec.extent(), self.color.view());
        if let Some(ref entity) = self.entity_id {
            desc = desc.with_entity_id(entity.view());
        }
        if let Some(ref depth) = self.depth {
            desc = desc.with_depth(depth.view());
        }
        desc
    }

    #[inline]
    pub fn spec(&self) -> &FramebufferSpec {
        &self.spec
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.spec.extent()
    }

    /// Color attachment image.
    #[inline]
    pub fn color(&self) -> &Image {
        &self.color
    }

    /// Entity-id attachment image, if configured.
    #[inline]
    pub fn entity_id(&self) -> Option<&Image> {
        self.entity_id.as_ref()
    }

    /// Depth attachment image, if configured.
    #[inline]
    pub fn depth(&self) -> Option<&Image> {
        self.depth.as_ref()
    }
}

fn create_attachments(
    device: &Arc<Device>,
    spec: &FramebufferSpec,
) -> RhiResult<(Image, Option<Image>, Option<Image>)> {
    let extent = spec.extent();
    let color = Image::new(
        device.clone(),
        &ImageDesc::color_target(extent, spec.color_format),
    )?;
    let entity_id = if spec.entity_id {
        Some(Image::new(
            device.clone(),
            &ImageDesc {
                name: "entity_id_target",
                ..ImageDesc::color_target(extent, ENTITY_ID_FORMAT)
            },
        )?)
    } else {
        None
    };
    let depth = spec
        .depth_format
        .map(|format| Image::new(device.clone(), &ImageDesc::depth(extent, format)))
        .transpose()?;
    Ok((color, entity_id, depth))
}
