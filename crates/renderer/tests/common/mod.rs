//! Recording backend and scripted window for driving the renderer without
//! a GPU.
//!
//! The mock models each slot fence as signaled, unsignaled or pending
//! (submitted, GPU not yet done) and panics on any step that real hardware
//! would turn into a hazard or a deadlock.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;

use ash::vk;

use renderer_core::RendererConfig;
use renderer_platform::FramebufferSource;
use renderer_renderer::{
    DynamicOffsets, FrameLayout, FrameStatistics, RenderBackend, RenderTarget, Renderer,
    UniformRegion,
};
use renderer_rhi::RhiResult;
use renderer_rhi::rendering::ClearValues;
use renderer_rhi::swapchain::{AcquireOutcome, PresentOutcome};

pub const UNIFORM_ALIGNMENT: u64 = 256;
pub const STORAGE_ALIGNMENT: u64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Target {
    Swapchain,
    Framebuffer,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    WaitForSlot(u32),
    ResetCommands(u32),
    Acquire(u32),
    ResetFence(u32),
    BeginCommands { slot: u32, image: u32 },
    Submit { slot: u32, image: u32 },
    Present { slot: u32, image: u32 },
    WriteUniform { region: UniformRegion, offset: u64, bytes: Vec<u8> },
    WriteTextures { slot: u32, textures: Vec<u32> },
    BeginRenderPass { slot: u32, target: Target },
    EndRenderPass(u32),
    BindPipeline { slot: u32, offsets: DynamicOffsets },
    SetViewport { slot: u32, extent: vk::Extent2D },
    Draw { slot: u32, index_count: u32, object_index: u32 },
    PresentFramebuffer { slot: u32, image: u32 },
    PrepareForSampling(u32),
    WaitIdle,
    DestroySwapchainResources,
    RecreateSwapchain(vk::Extent2D),
    CreateSwapchainResources,
}

/// Scripted result of one acquire.
#[derive(Clone, Copy, Debug)]
pub enum AcquireScript {
    OutOfDate,
    Suboptimal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockBuffer(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockPipeline {
    pub dynamic_viewport: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MockFramebuffer {
    pub extent: vk::Extent2D,
}

pub struct MockBackend {
    pub calls: Vec<Call>,
    pub layout: FrameLayout,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub fences: Vec<FenceState>,
    pub acquire_script: VecDeque<AcquireScript>,
    pub present_script: VecDeque<PresentOutcome>,
    pub live_swapchain_resources: u32,
    next_image: u32,
    recording: Vec<bool>,
}

impl MockBackend {
    pub fn new(frames_in_flight: u32, max_objects: u32, extent: vk::Extent2D) -> Self {
        Self {
            calls: Vec::new(),
            layout: FrameLayout::new(frames_in_flight, max_objects, UNIFORM_ALIGNMENT, STORAGE_ALIGNMENT),
            extent,
            image_count: 3,
            fences: vec![FenceState::Signaled; frames_in_flight as usize],
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            live_swapchain_resources: 1,
            next_image: 0,
            recording: vec![false; frames_in_flight as usize],
        }
    }

    /// Slot whose region of `region` contains `offset`.
    fn slot_of(&self, region: UniformRegion, offset: u64) -> u32 {
        let layout = match region {
            UniformRegion::Camera => self.layout.camera(),
            UniformRegion::Scene => self.layout.scene(),
            UniformRegion::Objects => self.layout.objects(),
        };
        (offset / layout.stride()) as u32
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.iter().position(predicate)
    }

    pub fn begun_slots(&self) -> Vec<u32> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::BeginCommands { slot, .. } => Some(*slot),
                _ => None,
            })
            .collect()
    }

    pub fn uniform_writes(&self, wanted: UniformRegion) -> Vec<(u64, Vec<u8>)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::WriteUniform { region, offset, bytes } if *region == wanted => {
                    Some((*offset, bytes.clone()))
                }
                _ => None,
            })
            .collect()
    }

    fn assert_recording(&self, slot: u32, what: &str) {
        assert!(self.recording[slot as usize], "{} recorded while slot {} is not recording", what, slot);
    }
}

impl RenderBackend for MockBackend {
    type Buffer = MockBuffer;
    type Texture = u32;
    type Pipeline = MockPipeline;
    type Framebuffer = MockFramebuffer;

    fn frame_layout(&self) -> &FrameLayout {
        &self.layout
    }

    fn swapchain_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn wait_for_slot(&mut self, slot: u32) -> RhiResult<()> {
        let fence = &mut self.fences[slot as usize];
        assert_ne!(*fence, FenceState::Unsignaled, "waiting on slot {} fence that will never signal", slot);
        *fence = FenceState::Signaled;
        self.calls.push(Call::WaitForSlot(slot));
        Ok(())
    }

    fn frame_statistics(&self, _slot: u32) -> RhiResult<FrameStatistics> {
        Ok(FrameStatistics::default())
    }

    fn reset_commands(&mut self, slot: u32) -> RhiResult<()> {
        assert_eq!(
            self.fences[slot as usize],
            FenceState::Signaled,
            "command pool of slot {} reset while the GPU may use it",
            slot
        );
        self.calls.push(Call::ResetCommands(slot));
        Ok(())
    }

    fn acquire_image(&mut self, slot: u32) -> RhiResult<AcquireOutcome> {
        self.calls.push(Call::Acquire(slot));
        let index = self.next_image % self.image_count;
        match self.acquire_script.pop_front() {
            Some(AcquireScript::OutOfDate) => Ok(AcquireOutcome::OutOfDate),
            Some(AcquireScript::Suboptimal) => {
                self.next_image += 1;
                Ok(AcquireOutcome::Acquired { index, suboptimal: true })
            }
            None => {
                self.next_image += 1;
                Ok(AcquireOutcome::Acquired { index, suboptimal: false })
            }
        }
    }

    fn reset_fence(&mut self, slot: u32) -> RhiResult<()> {
        let fence = &mut self.fences[slot as usize];
        assert_eq!(*fence, FenceState::Signaled, "slot {} fence reset while pending", slot);
        *fence = FenceState::Unsignaled;
        self.calls.push(Call::ResetFence(slot));
        Ok(())
    }

    fn begin_commands(&mut self, slot: u32, image_index: u32) -> RhiResult<()> {
        assert_eq!(self.fences[slot as usize], FenceState::Unsignaled);
        self.recording[slot as usize] = true;
        self.calls.push(Call::BeginCommands { slot, image: image_index });
        Ok(())
    }

    fn submit(&mut self, slot: u32, image_index: u32) -> RhiResult<()> {
        self.assert_recording(slot, "submit");
        assert_eq!(self.fences[slot as usize], FenceState::Unsignaled);
        self.recording[slot as usize] = false;
        self.fences[slot as usize] = FenceState::Pending;
        self.calls.push(Call::Submit { slot, image: image_index });
        Ok(())
    }

    fn present(&mut self, slot: u32, image_index: u32) -> RhiResult<PresentOutcome> {
        self.calls.push(Call::Present { slot, image: image_index });
        Ok(self.present_script.pop_front().unwrap_or(PresentOutcome::Presented))
    }

    fn write_uniform(&mut self, region: UniformRegion, offset: u64, bytes: &[u8]) -> RhiResult<()> {
        let slot = self.slot_of(region, offset);
        assert_ne!(
            self.fences[slot as usize],
            FenceState::Pending,
            "{:?} region of slot {} written while the GPU may read it",
            region,
            slot
        );
        self.calls.push(Call::WriteUniform {
            region,
            offset,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn write_textures(&mut self, slot: u32, textures: &[u32]) {
        assert_ne!(self.fences[slot as usize], FenceState::Pending);
        self.calls.push(Call::WriteTextures {
            slot,
            textures: textures.to_vec(),
        });
    }

    fn begin_render_pass(
        &mut self,
        slot: u32,
        _image_index: u32,
        target: RenderTarget<'_, MockFramebuffer>,
        _clear: &ClearValues,
    ) -> RhiResult<vk::Extent2D> {
        self.assert_recording(slot, "begin_render_pass");
        let (target, extent) = match target {
            RenderTarget::Swapchain => (Target::Swapchain, self.extent),
            RenderTarget::Framebuffer(fb) => (Target::Framebuffer, fb.extent),
        };
        self.calls.push(Call::BeginRenderPass { slot, target });
        Ok(extent)
    }

    fn end_render_pass(&mut self, slot: u32) {
        self.calls.push(Call::EndRenderPass(slot));
    }

    fn bind_pipeline(&mut self, slot: u32, _pipeline: &MockPipeline, offsets: &DynamicOffsets) {
        self.assert_recording(slot, "bind_pipeline");
        self.calls.push(Call::BindPipeline { slot, offsets: *offsets });
    }

    fn has_dynamic_viewport(pipeline: &MockPipeline) -> bool {
        pipeline.dynamic_viewport
    }

    fn set_viewport(&mut self, slot: u32, extent: vk::Extent2D) {
        self.calls.push(Call::SetViewport { slot, extent });
    }

    fn draw_indexed(
        &mut self,
        slot: u32,
        _vertex_buffer: &MockBuffer,
        _index_buffer: &MockBuffer,
        index_count: u32,
        object_index: u32,
    ) {
        self.assert_recording(slot, "draw");
        self.calls.push(Call::Draw {
            slot,
            index_count,
            object_index,
        });
    }

    fn present_framebuffer(
        &mut self,
        slot: u32,
        image_index: u32,
        _framebuffer: &MockFramebuffer,
    ) -> RhiResult<()> {
        self.calls.push(Call::PresentFramebuffer { slot, image: image_index });
        Ok(())
    }

    fn prepare_for_sampling(&mut self, slot: u32, _framebuffer: &MockFramebuffer) {
        self.calls.push(Call::PrepareForSampling(slot));
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        for fence in &mut self.fences {
            if *fence == FenceState::Pending {
                *fence = FenceState::Signaled;
            }
        }
        self.calls.push(Call::WaitIdle);
        Ok(())
    }

    fn destroy_swapchain_resources(&mut self) {
        assert!(
            self.fences.iter().all(|f| *f != FenceState::Pending),
            "swapchain resources destroyed while frames are in flight"
        );
        assert_eq!(self.live_swapchain_resources, 1, "swapchain resources destroyed twice");
        self.live_swapchain_resources -= 1;
        self.calls.push(Call::DestroySwapchainResources);
    }

    fn recreate_swapchain(&mut self, extent: vk::Extent2D) -> RhiResult<()> {
        assert!(extent.width > 0 && extent.height > 0, "zero-extent swapchain requested");
        self.extent = extent;
        self.next_image = 0;
        self.calls.push(Call::RecreateSwapchain(extent));
        Ok(())
    }

    fn create_swapchain_resources(&mut self) -> RhiResult<()> {
        assert_eq!(self.live_swapchain_resources, 0, "swapchain resources leaked");
        self.live_swapchain_resources += 1;
        self.calls.push(Call::CreateSwapchainResources);
        Ok(())
    }
}

/// Window whose framebuffer size follows a script.
pub struct MockWindow {
    size: Cell<(u32, u32)>,
    pub queries: Cell<u32>,
}

impl MockWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Cell::new((width, height)),
            queries: Cell::new(0),
        }
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.size.set((width, height));
    }
}

impl FramebufferSource for MockWindow {
    fn framebuffer_size(&self) -> (u32, u32) {
        self.queries.set(self.queries.get() + 1);
        self.size.get()
    }
}

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 1280,
    height: 720,
};

pub type MockRenderer = Renderer<MockBackend, MockWindow>;

pub fn config(frames_in_flight: u32, max_objects: u32) -> RendererConfig {
    RendererConfig {
        frames_in_flight,
        max_objects,
        ..RendererConfig::default()
    }
}

pub fn renderer(frames_in_flight: u32) -> MockRenderer {
    renderer_with(frames_in_flight, 100)
}

pub fn renderer_with(frames_in_flight: u32, max_objects: u32) -> MockRenderer {
    let backend = MockBackend::new(frames_in_flight, max_objects, EXTENT);
    let window = MockWindow::new(EXTENT.width, EXTENT.height);
    Renderer::new(backend, window, &config(frames_in_flight, max_objects))
}

pub const DYNAMIC: MockPipeline = MockPipeline {
    dynamic_viewport: true,
};

/// Runs one complete frame with `draws` untextured draws on the swapchain.
pub fn run_frame(renderer: &mut MockRenderer, draws: u32) {
    assert!(renderer.begin_frame().unwrap(), "frame unexpectedly skipped");
    let clear = renderer.clear_values();
    renderer.begin_render_pass(RenderTarget::Swapchain, &clear).unwrap();
    renderer.bind_pipeline(&DYNAMIC);
    for _ in 0..draws {
        renderer
            .draw(&MockBuffer(0), &Default::default(), &MockBuffer(1), 6)
            .unwrap();
    }
    renderer.end_render_pass();
    renderer.end_frame().unwrap();
}
