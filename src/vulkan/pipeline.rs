//! Render pass, framebuffers and graphics-pipeline construction.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use vulkano::device::Device;
use vulkano::format::Format;
use vulkano::image::view::ImageView;
use vulkano::image::{AttachmentImage, SwapchainImage};
use vulkano::memory::allocator::StandardMemoryAllocator;
use vulkano::pipeline::graphics::color_blend::ColorBlendState;
use vulkano::pipeline::graphics::depth_stencil::DepthStencilState;
use vulkano::pipeline::graphics::input_assembly::InputAssemblyState;
use vulkano::pipeline::graphics::multisample::MultisampleState;
use vulkano::pipeline::graphics::rasterization::RasterizationState;
use vulkano::pipeline::graphics::viewport::{Viewport, ViewportState};
use vulkano::pipeline::GraphicsPipeline;
use vulkano::render_pass::{Framebuffer, FramebufferCreateInfo, RenderPass, Subpass};

use super::shader::ShaderProgram;

const DEPTH_FORMAT: Format = Format::D16_UNORM;

/// One color attachment plus a depth attachment so the depth test can be
/// toggled per renderer.
pub fn create_render_pass(device: Arc<Device>, format: Format) -> Result<Arc<RenderPass>> {
    let render_pass = vulkano::single_pass_renderpass!(
        device,
        attachments: {
            color: {
                load: Clear,
                store: Store,
                format: format,
                samples: 1,
            },
            depth: {
                load: Clear,
                store: DontCare,
                format: DEPTH_FORMAT,
                samples: 1,
            }
        },
        pass: {
            color: [color],
            depth_stencil: {depth}
        }
    )?;

    info!("Render pass created");
    Ok(render_pass)
}

/// One framebuffer per swapchain image, all sharing a transient depth
/// buffer sized to the swapchain extent.
pub fn create_framebuffers(
    allocator: &StandardMemoryAllocator,
    images: &[Arc<SwapchainImage>],
    render_pass: Arc<RenderPass>,
    extent: (u32, u32),
) -> Result<Vec<Arc<Framebuffer>>> {
    let depth_image = AttachmentImage::transient(allocator, [extent.0, extent.1], DEPTH_FORMAT)?;
    let depth_view = ImageView::new_default(depth_image)?;

    let framebuffers = images
        .iter()
        .map(|image| {
            let view = ImageView::new_default(image.clone())?;
            Ok(Framebuffer::new(
                render_pass.clone(),
                FramebufferCreateInfo {
                    attachments: vec![view, depth_view.clone()],
                    ..Default::default()
                },
            )?)
        })
        .collect::<Result<Vec<_>>>()?;

    info!("Created {} framebuffers", framebuffers.len());
    Ok(framebuffers)
}

/// Builds the graphics pipeline for a shader program. The pipeline layout
/// is inferred from the shader interfaces; the depth test is fixed at
/// build time, so toggling it rebuilds the pipeline.
pub fn create_graphics_pipeline(
    device: Arc<Device>,
    program: &ShaderProgram,
    render_pass: Arc<RenderPass>,
    viewport: Viewport,
    depth_test: bool,
) -> Result<Arc<GraphicsPipeline>> {
    let vs = program
        .vertex_module()
        .ok_or_else(|| anyhow!("Vertex shader module is missing"))?;
    let fs = program
        .fragment_module()
        .ok_or_else(|| anyhow!("Fragment shader module is missing"))?;

    let vs_entry = vs
        .entry_point("main")
        .ok_or_else(|| anyhow!("Vertex shader has no main entry point"))?;
    let fs_entry = fs
        .entry_point("main")
        .ok_or_else(|| anyhow!("Fragment shader has no main entry point"))?;

    let depth_stencil_state = if depth_test {
        DepthStencilState::simple_depth_test()
    } else {
        DepthStencilState::disabled()
    };

    let pipeline = GraphicsPipeline::start()
        .vertex_input_state(program.vertex_input())
        .vertex_shader(vs_entry, ())
        .input_assembly_state(InputAssemblyState::new())
        .viewport_state(ViewportState::viewport_fixed_scissor_irrelevant([viewport]))
        .fragment_shader(fs_entry, ())
        .rasterization_state(RasterizationState::new())
        .multisample_state(MultisampleState::new())
        .depth_stencil_state(depth_stencil_state)
        .color_blend_state(ColorBlendState::new(1).blend_alpha())
        .render_pass(
            Subpass::from(render_pass, 0).ok_or_else(|| anyhow!("Render pass has no subpass"))?,
        )
        .build(device)?;

    info!("Graphics pipeline created (depth test: {})", depth_test);
    Ok(pipeline)
}
