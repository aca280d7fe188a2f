//! Sandbox - Main Entry Point
//!
//! Opens a window and draws a grid of quads, some sampling a checkerboard
//! texture, into an offscreen framebuffer that is then copied to the
//! swapchain, to exercise the frame lifecycle end to end.
//! Settings are read from `renderer.toml` in the working directory.

use std::path::Path;

use anyhow::{Context, Result};
use glam::{Mat4, Vec3, Vec4};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use renderer_core::RendererConfig;
use renderer_platform::{Window, aspect_ratio};
use renderer_renderer::vulkan::{PipelineDesc, PipelineTarget};
use renderer_renderer::{Material, RenderTarget, SceneUniform, VulkanRenderer, create_renderer};
use renderer_rhi::buffer::Buffer;
use renderer_rhi::pipeline::Pipeline;
use renderer_rhi::rendering::{Framebuffer, FramebufferSpec};
use renderer_rhi::vertex::unit_quad;

const CONFIG_PATH: &str = "renderer.toml";
const VERTEX_SHADER: &str = concat!(env!("OUT_DIR"), "/quad.vert.spv");
const FRAGMENT_SHADER: &str = concat!(env!("OUT_DIR"), "/quad.frag.spv");

const GRID: i32 = 4;
const CHECKER_SIZE: u32 = 64;

/// GPU resources of the demo scene. Each quad has its own vertex buffer,
/// already placed in its grid cell.
struct QuadScene {
    target: Framebuffer,
    pipeline: Pipeline,
    quads: Vec<(Buffer, Material)>,
    indices: Buffer,
    index_count: u32,
}

impl QuadScene {
    fn new(renderer: &mut VulkanRenderer) -> Result<Self> {
        let extent = renderer.swapchain_extent();
        let backend = renderer.backend();
        let target = backend.create_framebuffer(FramebufferSpec::new(
            extent.width,
            extent.height,
            backend.swapchain_format(),
        ))?;
        let desc = PipelineDesc::new(
            Path::new(VERTEX_SHADER),
            Path::new(FRAGMENT_SHADER),
            PipelineTarget::Framebuffer(*target.spec()),
        );
        let pipeline = backend
            .create_pipeline(&desc)
            .context("failed to create quad pipeline (are the shaders compiled?)")?;

        let (quad_vertices, quad_indices) = unit_quad(Vec4::ONE);
        let indices = backend.create_index_buffer(&quad_indices)?;

        let mut quads = Vec::with_capacity((GRID * GRID) as usize);
        for i in 0..GRID * GRID {
            let half = (GRID - 1) as f32 / 2.0;
            let center = Vec3::new((i % GRID) as f32 - half, (i / GRID) as f32 - half, 0.0) * 1.2;
            let mut vertices = quad_vertices;
            for vertex in &mut vertices {
                vertex.position += center;
            }

            let hue = i as f32 / (GRID * GRID) as f32;
            let tint = Vec4::new(1.0 - hue, 0.5, hue, 1.0);
            let material = if i % 2 == 0 {
                Material::textured(0).with_tint(tint).with_tiling(2.0)
            } else {
                Material::tinted(tint)
            };
            quads.push((backend.create_vertex_buffer(&vertices)?, material));
        }

        let checker = backend.create_texture(CHECKER_SIZE, CHECKER_SIZE, &checkerboard(CHECKER_SIZE))?;
        renderer.set_textures(vec![checker]);
        renderer.update_scene(SceneUniform::new(
            Vec4::new(1.0, 1.0, 1.0, 0.2),
            Vec3::new(-0.3, -0.5, -1.0),
            Vec4::ONE,
        ))?;

        Ok(Self {
            target,
            pipeline,
            quads,
            indices,
            index_count: quad_indices.len() as u32,
        })
    }
}

/// RGBA8 checkerboard with 8x8 pixel cells.
fn checkerboard(size: u32) -> Vec<u8> {
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            let value = if (x / 8 + y / 8) % 2 == 0 { 255 } else { 64 };
            [value, value, value, 255]
        })
        .collect()
}

struct App {
    config: RendererConfig,
    window: Option<Window>,
    renderer: Option<VulkanRenderer>,
    scene: Option<QuadScene>,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
            scene: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(
            event_loop,
            self.config.window_width,
            self.config.window_height,
            &self.config.window_title,
        )?;
        let mut renderer = create_renderer(window.clone(), &self.config)?;
        let scene = QuadScene::new(&mut renderer)?;

        info!("Initialization complete, entering main loop");
        self.window = Some(window);
        self.scene = Some(scene);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(renderer), Some(scene)) = (self.renderer.as_mut(), self.scene.as_mut()) else {
            return Ok(());
        };

        // Follows the swapchain one frame late; the copy is clipped meanwhile.
        let swapchain = renderer.swapchain_extent();
        renderer
            .backend()
            .resize_framebuffer(&mut scene.target, swapchain.width, swapchain.height)?;

        if !renderer.begin_frame()? {
            return Ok(());
        }

        let extent = scene.target.extent();
        let aspect = aspect_ratio(extent.width, extent.height);
        let sway = renderer.clock().elapsed().as_secs_f32().sin() * 0.4;
        let eye = Vec3::new(sway.sin(), 0.0, sway.cos()) * 7.0;
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 100.0);
        renderer.update_camera(view, projection)?;

        let clear = renderer.clear_values();
        renderer.begin_render_pass(RenderTarget::Framebuffer(&scene.target), &clear)?;
        renderer.bind_pipeline(&scene.pipeline);
        for (vertices, material) in &scene.quads {
            renderer.draw(vertices, material, &scene.indices, scene.index_count)?;
        }
        renderer.end_render_pass();
        renderer.present_framebuffer(&scene.target)?;
        renderer.end_frame()?;

        if renderer.total_frames() % 600 == 0 {
            let stats = renderer.statistics();
            info!(
                "{:.1} fps, gpu {:?} ms, {} objects",
                renderer.clock().fps(),
                stats.gpu_time_ms,
                scene.quads.len()
            );
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take()
            && let Err(e) = renderer.shutdown()
        {
            error!("Renderer shutdown failed: {:?}", e);
        }
        // The device is idle now; scene buffers keep it alive until dropped.
        self.scene = None;
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init(event_loop)
        {
            error!("Failed to initialize: {:?}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.framebuffer_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if self.window.as_ref().is_some_and(Window::is_minimized) {
                    return;
                }
                if let Err(e) = self.render() {
                    error!("Render error: {:?}", e);
                    self.shutdown();
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting sandbox");

    let config = RendererConfig::load(CONFIG_PATH)?;
    if !config.enable_validation {
        warn!("Validation layers disabled");
    }

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    app.shutdown();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer_renderer::vulkan::MAX_TEXTURES_CONSTANT_ID;

    #[test]
    fn test_texture_array_size_is_specialized() {
        let source = include_str!("../shaders/quad.frag");
        let declaration = format!(
            "layout(constant_id = {}) const uint MAX_TEXTURES",
            MAX_TEXTURES_CONSTANT_ID
        );
        assert!(source.contains(&declaration));
    }

    #[test]
    fn test_vertex_inputs_match_vertex_layout() {
        let source = include_str!("../shaders/quad.vert");
        assert!(source.contains("layout(location = 2) in vec2 inTexCoord"));
        assert!(source.contains("layout(location = 3) in vec4 inColor"));
    }

    #[test]
    fn test_checkerboard_size() {
        let pixels = checkerboard(CHECKER_SIZE);
        assert_eq!(pixels.len(), (CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
        assert_eq!(&pixels[..4], &[255, 255, 255, 255]);
        assert_eq!(&pixels[8 * 4..9 * 4], &[64, 64, 64, 255]);
    }
}
