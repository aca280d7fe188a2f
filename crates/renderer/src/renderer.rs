//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] facade that drives the frame
//! lifecycle on top of a [`RenderBackend`].
//!
//! # Overview
//!
//! A frame is a `begin_frame` / `end_frame` pair. In between, the caller
//! opens render passes, binds pipelines and records draws:
//!
//! ```text
//! begin_frame ──► begin_render_pass ──► bind_pipeline ──► draw* ──► end_render_pass
//!      ▲                                                                  │
//!      └──────────────────────────────── end_frame ◄──────────────────────┘
//! ```
//!
//! Misuse of this sequence (nested frames, draws outside a pass, unknown
//! texture slots, exceeding the object capacity) is a programming error and
//! panics. Swapchain invalidation is not an error: `begin_frame` returns
//! `Ok(false)` and the frame is simply skipped.
//!
//! # Example
//!
//! ```no_run
//! use glam::{Mat4, Vec3};
//! use renderer_renderer::{Material, RenderBackend, RenderTarget, Renderer};
//! use renderer_platform::FramebufferSource;
//!
//! # fn frame<B: RenderBackend, W: FramebufferSource>(
//! #     renderer: &mut Renderer<B, W>,
//! #     pipeline: &B::Pipeline,
//! #     vertices: &B::Buffer,
//! #     indices: &B::Buffer,
//! # ) -> Result<(), renderer_rhi::RhiError> {
//! if renderer.begin_frame()? {
//!     renderer.update_camera(
//!         Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y),
//!         Mat4::perspective_rh(45f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
//!     )?;
//!     let clear = renderer.clear_values();
//!     renderer.begin_render_pass(RenderTarget::Swapchain, &clear)?;
//!     renderer.bind_pipeline(pipeline);
//!     renderer.draw(vertices, &Material::default(), indices, 6)?;
//!     renderer.end_render_pass();
//!     renderer.end_frame()?;
//! }
//! # Ok(())
//! # }
//! ```

use ash::vk;
use glam::Mat4;
use tracing::{debug, info, trace};

use renderer_core::{FrameClock, RendererConfig};
use renderer_platform::FramebufferSource;
use renderer_rhi::RhiResult;
use renderer_rhi::rendering::ClearValues;
use renderer_rhi::swapchain::AcquireOutcome;

use crate::backend::{FrameStatistics, RenderBackend, RenderTarget, UniformRegion};
use crate::binding::{FrameLayout, TextureSlots};
use crate::frame_ring::FrameRing;
use crate::material::Material;
use crate::ubo::{CameraUniform, SceneUniform};

/// State of the open render pass.
#[derive(Clone, Copy, Debug)]
struct PassState {
    extent: vk::Extent2D,
    pipeline_bound: bool,
}

/// Frame lifecycle facade.
///
/// `B` is the graphics backend and `W` reports the window's framebuffer
/// size. Both are fixed at construction.
///
/// # Thread Safety
///
/// The renderer is driven from a single thread. Only the immediate-submit
/// path of the backend may be used from other threads.
pub struct Renderer<B: RenderBackend, W: FramebufferSource> {
    backend: B,
    window: W,
    ring: FrameRing,
    layout: FrameLayout,
    textures: TextureSlots<B::Texture>,
    camera: CameraUniform,
    scene: SceneUniform,
    pass: Option<PassState>,
    objects_drawn: u32,
    /// Set by `framebuffer_resized`; honored before the next acquire.
    resize_pending: bool,
    /// Set by a suboptimal acquire; honored after the next present.
    recreate_after_present: bool,
    clear: ClearValues,
    statistics: FrameStatistics,
    clock: FrameClock,
}

impl<B: RenderBackend, W: FramebufferSource> Renderer<B, W> {
    /// Wraps an initialized backend.
    pub fn new(backend: B, window: W, config: &RendererConfig) -> Self {
        let layout = *backend.frame_layout();
        info!(
            "Renderer ready: {} frames in flight, {} objects per frame, {} texture slots",
            layout.slots(),
            layout.max_objects(),
            config.max_texture_slots
        );
        Self {
            ring: FrameRing::new(layout.slots()),
            textures: TextureSlots::new(config.max_texture_slots, layout.slots()),
            layout,
            backend,
            window,
            camera: CameraUniform::new(Mat4::IDENTITY, Mat4::IDENTITY),
            scene: SceneUniform::default(),
            pass: None,
            objects_drawn: 0,
            resize_pending: false,
            recreate_after_present: false,
            clear: ClearValues::with_color(config.clear_color),
            statistics: FrameStatistics::default(),
            clock: FrameClock::new(),
        }
    }

    /// Waits for the GPU and releases the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the final device wait fails; the backend is
    /// dropped either way.
    ///
    /// # Panics
    ///
    /// Panics if a frame is still being recorded.
    pub fn shutdown(mut self) -> RhiResult<()> {
        assert!(
            !self.ring.is_recording(),
            "shutdown called while frame {} is recording",
            self.ring.counter()
        );
        info!("Shutting down renderer after {} frames", self.ring.counter());
        self.backend.wait_idle()
    }

    // ========================================================================
    // Frame lifecycle
    // ========================================================================

    /// Starts a frame.
    ///
    /// Returns `Ok(false)` when the swapchain was out of date or the window
    /// is minimized. The caller must skip this frame without calling
    /// [`end_frame`](Self::end_frame); a minimized window is polled again on
    /// every call until it has a drawable size.
    ///
    /// # Errors
    ///
    /// Returns an error on an unrecoverable device failure.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not ended.
    pub fn begin_frame(&mut self) -> RhiResult<bool> {
        assert!(
            !self.ring.is_recording(),
            "begin_frame called while frame {} is still recording",
            self.ring.counter()
        );

        if self.resize_pending {
            debug!("Resize requested, recreating swapchain before acquire");
            if !self.recreate_swapchain()? {
                return Ok(false);
            }
        }

        let slot = self.ring.current_slot();
        self.backend.wait_for_slot(slot)?;
        self.statistics = self.backend.frame_statistics(slot)?;
        self.backend.reset_commands(slot)?;

        let image_index = match self.backend.acquire_image(slot)? {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if suboptimal {
                    debug!("Acquire returned a suboptimal image, recreating after present");
                    self.recreate_after_present = true;
                }
                index
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date, recreating");
                self.recreate_swapchain()?;
                return Ok(false);
            }
        };

        // Only now is a submission guaranteed, so only now may the fence
        // become unsignaled.
        self.backend.reset_fence(slot)?;
        self.backend.begin_commands(slot, image_index)?;
        self.ring.begin(image_index);
        self.objects_drawn = 0;

        self.write_global_uniforms(slot)?;
        if self.textures.is_stale(slot) {
            self.backend.write_textures(slot, self.textures.active());
            self.textures.mark_written(slot);
            trace!("Rewrote texture set of slot {}", slot);
        }
        Ok(true)
    }

    /// Submits and presents the current frame.
    ///
    /// The frame counter advances even when presentation reports the
    /// swapchain out of date; the swapchain is then recreated immediately.
    ///
    /// # Errors
    ///
    /// Returns an error on an unrecoverable device failure.
    ///
    /// # Panics
    ///
    /// Panics without a matching [`begin_frame`](Self::begin_frame) or
    /// inside a render pass.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        let (slot, image_index) = self.recording("end_frame");
        assert!(self.pass.is_none(), "end_frame called inside a render pass");

        self.backend.submit(slot, image_index)?;
        let outcome = self.backend.present(slot, image_index)?;
        self.ring.finish();
        self.clock.tick();

        if outcome.needs_recreation() {
            debug!("Present reported {:?}, recreating swapchain", outcome);
            self.recreate_swapchain()?;
        } else if self.recreate_after_present || self.resize_pending {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Records a pending window resize; handled by the next
    /// [`begin_frame`](Self::begin_frame).
    pub fn framebuffer_resized(&mut self, width: u32, height: u32) {
        debug!("Framebuffer resized to {}x{}", width, height);
        self.resize_pending = true;
    }

    /// Rebuilds the swapchain and everything sized by it.
    ///
    /// Returns `Ok(false)` without touching the swapchain while the
    /// framebuffer has a zero dimension (minimized window). The resize stays
    /// pending and the next [`begin_frame`](Self::begin_frame) tries again,
    /// so the host's event loop keeps running while the window is hidden.
    ///
    /// # Errors
    ///
    /// Returns an error if the device wait or swapchain creation fails.
    ///
    /// # Panics
    ///
    /// Panics while a frame is being recorded.
    pub fn recreate_swapchain(&mut self) -> RhiResult<bool> {
        assert!(
            !self.ring.is_recording(),
            "swapchain recreation requested while frame {} is recording",
            self.ring.counter()
        );

        let (width, height) = self.window.framebuffer_size();
        if width == 0 || height == 0 {
            if !self.resize_pending {
                debug!("Framebuffer is {}x{}, deferring swapchain recreation", width, height);
            }
            self.resize_pending = true;
            return Ok(false);
        }

        self.backend.wait_idle()?;
        self.backend.destroy_swapchain_resources();
        self.backend.recreate_swapchain(vk::Extent2D { width, height })?;
        self.backend.create_swapchain_resources()?;

        self.resize_pending = false;
        self.recreate_after_present = false;
        info!("Swapchain recreated at {}x{}", width, height);
        Ok(true)
    }

    // ========================================================================
    // Render passes and draws
    // ========================================================================

    /// Opens a render pass on `target`, clearing its attachments.
    ///
    /// # Errors
    ///
    /// Returns an error if the target's attachments cannot be resolved.
    ///
    /// # Panics
    ///
    /// Panics outside a frame or inside another render pass.
    pub fn begin_render_pass(
        &mut self,
        target: RenderTarget<'_, B::Framebuffer>,
        clear: &ClearValues,
    ) -> RhiResult<()> {
        let (slot, image_index) = self.recording("begin_render_pass");
        assert!(self.pass.is_none(), "begin_render_pass called inside a render pass");

        let extent = self.backend.begin_render_pass(slot, image_index, target, clear)?;
        self.pass = Some(PassState {
            extent,
            pipeline_bound: false,
        });
        Ok(())
    }

    /// Closes the open render pass.
    ///
    /// # Panics
    ///
    /// Panics without an open render pass.
    pub fn end_render_pass(&mut self) {
        let (slot, _) = self.recording("end_render_pass");
        assert!(self.pass.take().is_some(), "end_render_pass called without a render pass");
        self.backend.end_render_pass(slot);
    }

    /// Binds a graphics pipeline and the frame's descriptor sets.
    ///
    /// Pipelines with dynamic viewport state get a viewport and scissor
    /// covering the render pass.
    ///
    /// # Panics
    ///
    /// Panics outside a render pass.
    pub fn bind_pipeline(&mut self, pipeline: &B::Pipeline) {
        let (slot, _) = self.recording("bind_pipeline");
        let pass = self
            .pass
            .as_mut()
            .unwrap_or_else(|| panic!("bind_pipeline called outside a render pass"));

        let offsets = self.layout.dynamic_offsets(slot);
        self.backend.bind_pipeline(slot, pipeline, &offsets);
        if B::has_dynamic_viewport(pipeline) {
            self.backend.set_viewport(slot, pass.extent);
        }
        pass.pipeline_bound = true;
    }

    /// Records an indexed draw of `index_count` indices with `material`.
    ///
    /// # Errors
    ///
    /// Returns an error if the object entry cannot be written.
    ///
    /// # Panics
    ///
    /// Panics without a bound pipeline, for a texture slot that is not
    /// active, or once `max_objects` draws were recorded this frame.
    pub fn draw(
        &mut self,
        vertex_buffer: &B::Buffer,
        material: &Material,
        index_buffer: &B::Buffer,
        index_count: u32,
    ) -> RhiResult<()> {
        let (slot, _) = self.recording("draw");
        assert!(
            self.pass.is_some_and(|pass| pass.pipeline_bound),
            "draw called without a bound pipeline"
        );
        if let Some(index) = material.texture {
            self.textures.check_index(slot, index);
        }

        let object_index = self.objects_drawn;
        let offset = self.layout.object_offset(slot, object_index);
        let object = material.object_uniform();
        self.backend
            .write_uniform(UniformRegion::Objects, offset, bytemuck::bytes_of(&object))?;
        self.backend
            .draw_indexed(slot, vertex_buffer, index_buffer, index_count, object_index);
        self.objects_drawn += 1;
        Ok(())
    }

    /// Copies an offscreen framebuffer's color attachment to the swapchain
    /// image of this frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the acquired image cannot be resolved.
    ///
    /// # Panics
    ///
    /// Panics outside a frame or inside a render pass.
    pub fn present_framebuffer(&mut self, framebuffer: &B::Framebuffer) -> RhiResult<()> {
        let (slot, image_index) = self.recording("present_framebuffer");
        assert!(self.pass.is_none(), "present_framebuffer called inside a render pass");
        self.backend.present_framebuffer(slot, image_index, framebuffer)
    }

    /// Makes a framebuffer's color attachment readable by shaders, e.g. to
    /// show it in a GUI viewport.
    ///
    /// # Panics
    ///
    /// Panics outside a frame or inside a render pass.
    pub fn prepare_for_sampling(&mut self, framebuffer: &B::Framebuffer) {
        let (slot, _) = self.recording("prepare_for_sampling");
        assert!(self.pass.is_none(), "prepare_for_sampling called inside a render pass");
        self.backend.prepare_for_sampling(slot, framebuffer);
    }

    // ========================================================================
    // Per-frame data
    // ========================================================================

    /// Sets the camera. Inside a frame the current slot's camera region is
    /// written immediately; otherwise at the next `begin_frame`.
    ///
    /// # Errors
    ///
    /// Returns an error if the uniform write fails.
    pub fn update_camera(&mut self, view: Mat4, projection: Mat4) -> RhiResult<()> {
        self.camera = CameraUniform::new(view, projection);
        if let Some((slot, _)) = self.ring.recording() {
            self.backend.write_uniform(
                UniformRegion::Camera,
                self.layout.camera().offset(slot),
                bytemuck::bytes_of(&self.camera),
            )?;
        }
        Ok(())
    }

    /// Sets the scene lighting, with the same timing as
    /// [`update_camera`](Self::update_camera).
    ///
    /// # Errors
    ///
    /// Returns an error if the uniform write fails.
    pub fn update_scene(&mut self, scene: SceneUniform) -> RhiResult<()> {
        self.scene = scene;
        if let Some((slot, _)) = self.ring.recording() {
            self.backend.write_uniform(
                UniformRegion::Scene,
                self.layout.scene().offset(slot),
                bytemuck::bytes_of(&self.scene),
            )?;
        }
        Ok(())
    }

    /// Replaces the textures bound to the texture array.
    ///
    /// Each frame slot picks up the change at its next `begin_frame`, after
    /// its fence wait, so in-flight frames keep their textures. Called during
    /// a frame, the new textures are not drawable until the next frame.
    ///
    /// # Panics
    ///
    /// Panics if more textures are given than the configured array size.
    pub fn set_textures(&mut self, textures: Vec<B::Texture>) {
        debug!("Texture array set to {} textures", textures.len());
        self.textures.set(textures);
    }

    fn write_global_uniforms(&mut self, slot: u32) -> RhiResult<()> {
        self.backend.write_uniform(
            UniformRegion::Camera,
            self.layout.camera().offset(slot),
            bytemuck::bytes_of(&self.camera),
        )?;
        self.backend.write_uniform(
            UniformRegion::Scene,
            self.layout.scene().offset(slot),
            bytemuck::bytes_of(&self.scene),
        )
    }

    /// `(slot, image_index)` of the recording frame.
    fn recording(&self, operation: &str) -> (u32, u32) {
        self.ring
            .recording()
            .unwrap_or_else(|| panic!("{} called outside begin_frame/end_frame", operation))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Frames ended so far; frame `n` used slot `n % frames_in_flight`.
    #[inline]
    pub fn frame_counter(&self) -> u64 {
        self.ring.counter()
    }

    /// Frames presented, as counted by the frame clock.
    #[inline]
    pub fn total_frames(&self) -> u64 {
        self.clock.total_frames()
    }

    #[inline]
    pub fn frames_in_flight(&self) -> u32 {
        self.ring.size()
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.ring.is_recording()
    }

    /// Draws recorded in the current frame.
    #[inline]
    pub fn objects_drawn(&self) -> u32 {
        self.objects_drawn
    }

    #[inline]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Counters of the last completed use of the current slot.
    #[inline]
    pub fn statistics(&self) -> &FrameStatistics {
        &self.statistics
    }

    /// Clear values built from the configured clear color.
    #[inline]
    pub fn clear_values(&self) -> ClearValues {
        self.clear
    }

    #[inline]
    pub fn frame_layout(&self) -> &FrameLayout {
        &self.layout
    }

    #[inline]
    pub fn swapchain_extent(&self) -> vk::Extent2D {
        self.backend.swapchain_extent()
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Backend access for resource creation. Recording through it bypasses
    /// the frame checks.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn window(&self) -> &W {
        &self.window
    }
}
