//! The Vulkan renderer bound to one window: swapchain, pipeline, shader
//! program, GPU mesh residency and the per-frame render loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use log::{error, info};
use vulkano::buffer::allocator::{SubbufferAllocator, SubbufferAllocatorCreateInfo};
use vulkano::buffer::{Buffer, BufferContents, BufferCreateInfo, BufferUsage, Subbuffer};
use vulkano::command_buffer::allocator::{
    StandardCommandBufferAllocator, StandardCommandBufferAllocatorCreateInfo,
};
use vulkano::command_buffer::{
    AutoCommandBufferBuilder, CommandBufferUsage, RenderPassBeginInfo, SubpassContents,
};
use vulkano::descriptor_set::allocator::StandardDescriptorSetAllocator;
use vulkano::descriptor_set::{PersistentDescriptorSet, WriteDescriptorSet};
use vulkano::device::{Device, Queue};
use vulkano::instance::Instance;
use vulkano::memory::allocator::{AllocationCreateInfo, MemoryUsage, StandardMemoryAllocator};
use vulkano::pipeline::graphics::viewport::Viewport;
use vulkano::pipeline::{GraphicsPipeline, Pipeline, PipelineBindPoint};
use vulkano::render_pass::{Framebuffer, RenderPass};
use vulkano::swapchain::{
    acquire_next_image, AcquireError, Swapchain, SwapchainPresentInfo,
};
use vulkano::sync::{self, FlushError, GpuFuture};
use winit::window::Window;

use crate::assets::AssetStorage;
use crate::camera::SharedCamera;
use crate::mesh::{Mesh, Vertex};
use crate::renderer::Renderer;
use crate::signal::Subscription;
use crate::window::WindowId;

use super::device::{create_logical_device, select_physical_device};
use super::pipeline::{create_framebuffers, create_graphics_pipeline, create_render_pass};
use super::shader::ShaderProgram;
use super::swapchain::{create_swapchain, recreate_swapchain, SwapchainBundle};

const VERTEX_SHADER_ASSET: &str = "shaders/mesh.vert";
const FRAGMENT_SHADER_ASSET: &str = "shaders/mesh.frag";

/// Per-mesh uniform data, std140-compatible.
#[derive(BufferContents, Clone, Copy)]
#[repr(C)]
struct MeshUniform {
    model: [[f32; 4]; 4],
    view: [[f32; 4]; 4],
    proj: [[f32; 4]; 4],
    color: [f32; 4],
}

struct MeshBuffers {
    vertex: Subbuffer<[Vertex]>,
    index: Subbuffer<[u16]>,
    index_count: u32,
}

/// A registered mesh and its GPU residency. `dirty` is set from the mesh's
/// change signal; the buffers are rebuilt on the next frame.
struct GpuMesh {
    mesh: Rc<RefCell<Mesh>>,
    dirty: Rc<Cell<bool>>,
    subscription: Subscription,
    buffers: Option<MeshBuffers>,
}

/// Renderer for a single window. Owns every GPU resource scoped to that
/// window and reads view/projection from the shared camera each frame.
pub struct VulkanRenderer {
    window: Arc<Window>,
    window_id: WindowId,
    camera: SharedCamera,
    device: Arc<Device>,
    queue: Arc<Queue>,
    swapchain: Arc<Swapchain>,
    render_pass: Arc<RenderPass>,
    framebuffers: Vec<Arc<Framebuffer>>,
    pipeline: Arc<GraphicsPipeline>,
    shader_program: ShaderProgram,
    memory_allocator: Arc<StandardMemoryAllocator>,
    command_buffer_allocator: StandardCommandBufferAllocator,
    descriptor_set_allocator: StandardDescriptorSetAllocator,
    uniform_allocator: SubbufferAllocator,
    meshes: Vec<GpuMesh>,
    background_color: [f32; 4],
    depth_test: bool,
    pipeline_dirty: bool,
    recreate_swapchain: bool,
    previous_frame_end: Option<Box<dyn GpuFuture>>,
}

impl VulkanRenderer {
    /// Brings up every GPU resource for `window`. On failure everything
    /// acquired so far is released before the error is returned.
    pub fn new(
        instance: Arc<Instance>,
        window: Arc<Window>,
        window_id: WindowId,
        camera: SharedCamera,
        assets: &AssetStorage,
    ) -> Result<Self> {
        let surface = vulkano_win::create_surface_from_winit(window.clone(), instance.clone())?;

        let (physical_device, queue_family_index) = select_physical_device(&instance, &surface)?;
        let (device, queue) = create_logical_device(physical_device, queue_family_index)?;

        let memory_allocator = Arc::new(StandardMemoryAllocator::new_default(device.clone()));
        let command_buffer_allocator = StandardCommandBufferAllocator::new(
            device.clone(),
            StandardCommandBufferAllocatorCreateInfo::default(),
        );
        let descriptor_set_allocator = StandardDescriptorSetAllocator::new(device.clone());
        let uniform_allocator = SubbufferAllocator::new(
            memory_allocator.clone(),
            SubbufferAllocatorCreateInfo {
                buffer_usage: BufferUsage::UNIFORM_BUFFER,
                memory_usage: MemoryUsage::Upload,
                ..Default::default()
            },
        );

        let size = window.inner_size();
        let SwapchainBundle { swapchain, images } =
            create_swapchain(device.clone(), surface, (size.width, size.height))?;
        let render_pass = create_render_pass(device.clone(), swapchain.image_format())?;

        let mut shader_program =
            ShaderProgram::new(device.clone(), assets, VERTEX_SHADER_ASSET, FRAGMENT_SHADER_ASSET);
        if !shader_program.is_created() {
            // A partially created program may hold one valid module.
            shader_program.destroy_shader_modules();
            bail!("Shader program creation failed");
        }

        let pipeline = create_graphics_pipeline(
            device.clone(),
            &shader_program,
            render_pass.clone(),
            viewport_for(size.width, size.height),
            false,
        )?;
        let framebuffers = create_framebuffers(
            memory_allocator.as_ref(),
            &images,
            render_pass.clone(),
            (size.width, size.height),
        )?;

        let previous_frame_end = Some(sync::now(device.clone()).boxed());

        info!("Vulkan renderer created for window {:?}", window_id);

        Ok(Self {
            window,
            window_id,
            camera,
            device,
            queue,
            swapchain,
            render_pass,
            framebuffers,
            pipeline,
            shader_program,
            memory_allocator,
            command_buffer_allocator,
            descriptor_set_allocator,
            uniform_allocator,
            meshes: Vec::new(),
            background_color: [0.0, 0.0, 0.2, 1.0],
            depth_test: false,
            pipeline_dirty: false,
            recreate_swapchain: false,
            previous_frame_end,
        })
    }

    fn rebuild_pipeline(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        self.pipeline = create_graphics_pipeline(
            self.device.clone(),
            &self.shader_program,
            self.render_pass.clone(),
            viewport_for(size.width, size.height),
            self.depth_test,
        )?;
        self.pipeline_dirty = false;
        Ok(())
    }

    fn rebuild_surface_resources(&mut self) -> Result<()> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        unsafe {
            self.device.wait_idle()?;
        }

        let SwapchainBundle { swapchain, images } =
            recreate_swapchain(self.swapchain.clone(), (size.width, size.height))?;
        self.swapchain = swapchain;
        self.framebuffers = create_framebuffers(
            self.memory_allocator.as_ref(),
            &images,
            self.render_pass.clone(),
            (size.width, size.height),
        )?;
        self.rebuild_pipeline()?;
        self.recreate_swapchain = false;

        info!("Swapchain and dependent resources recreated");
        Ok(())
    }

    fn upload_dirty_meshes(&mut self) -> Result<()> {
        for gpu in &mut self.meshes {
            if !gpu.dirty.get() {
                continue;
            }
            let mesh = gpu.mesh.borrow();
            gpu.buffers = upload_mesh_buffers(&self.memory_allocator, &mesh)?;
            gpu.dirty.set(false);
        }
        Ok(())
    }
}

impl Renderer for VulkanRenderer {
    fn render(&mut self) -> Result<()> {
        let dimensions = self.window.inner_size();
        // A minimized window has nothing to present to.
        if dimensions.width == 0 || dimensions.height == 0 {
            return Ok(());
        }

        let mut previous_frame_end = self
            .previous_frame_end
            .take()
            .unwrap_or_else(|| sync::now(self.device.clone()).boxed());
        previous_frame_end.cleanup_finished();

        if self.recreate_swapchain
            || [dimensions.width, dimensions.height] != self.swapchain.image_extent()
        {
            self.rebuild_surface_resources()?;
        }
        if self.pipeline_dirty {
            self.rebuild_pipeline()?;
        }
        self.upload_dirty_meshes()?;

        let (image_index, suboptimal, acquire_future) =
            match acquire_next_image(self.swapchain.clone(), None) {
                Ok(r) => r,
                Err(AcquireError::OutOfDate) => {
                    self.recreate_swapchain = true;
                    self.previous_frame_end = Some(previous_frame_end);
                    return Ok(());
                }
                Err(e) => {
                    self.previous_frame_end = Some(previous_frame_end);
                    return Err(anyhow!("Failed to acquire next image: {}", e));
                }
            };
        if suboptimal {
            self.recreate_swapchain = true;
        }

        let mut builder = AutoCommandBufferBuilder::primary(
            &self.command_buffer_allocator,
            self.queue.queue_family_index(),
            CommandBufferUsage::OneTimeSubmit,
        )?;

        builder.begin_render_pass(
            RenderPassBeginInfo {
                clear_values: vec![
                    Some(self.background_color.into()),
                    Some(1.0f32.into()),
                ],
                ..RenderPassBeginInfo::framebuffer(
                    self.framebuffers[image_index as usize].clone(),
                )
            },
            SubpassContents::Inline,
        )?;
        builder.bind_pipeline_graphics(self.pipeline.clone());

        let camera = *self.camera.borrow();
        for gpu in &self.meshes {
            let Some(buffers) = &gpu.buffers else {
                continue;
            };

            let uniform = {
                let mesh = gpu.mesh.borrow();
                MeshUniform {
                    model: mesh.model_matrix.into(),
                    view: camera.view.into(),
                    proj: camera.projection.into(),
                    color: mesh.material().color,
                }
            };

            let subbuffer = self.uniform_allocator.allocate_sized()?;
            *subbuffer.write()? = uniform;

            let layout = self
                .pipeline
                .layout()
                .set_layouts()
                .get(0)
                .ok_or_else(|| anyhow!("Pipeline has no descriptor set layout"))?;
            let set = PersistentDescriptorSet::new(
                &self.descriptor_set_allocator,
                layout.clone(),
                [WriteDescriptorSet::buffer(0, subbuffer)],
            )?;

            builder
                .bind_descriptor_sets(
                    PipelineBindPoint::Graphics,
                    self.pipeline.layout().clone(),
                    0,
                    set,
                )
                .bind_vertex_buffers(0, buffers.vertex.clone())
                .bind_index_buffer(buffers.index.clone())
                .draw_indexed(buffers.index_count, 1, 0, 0, 0)?;
        }

        builder.end_render_pass()?;
        let command_buffer = builder.build()?;

        let future = previous_frame_end
            .join(acquire_future)
            .then_execute(self.queue.clone(), command_buffer)?
            .then_swapchain_present(
                self.queue.clone(),
                SwapchainPresentInfo::swapchain_image_index(self.swapchain.clone(), image_index),
            )
            .then_signal_fence_and_flush();

        match future {
            Ok(future) => {
                self.previous_frame_end = Some(future.boxed());
            }
            Err(FlushError::OutOfDate) => {
                self.recreate_swapchain = true;
                self.previous_frame_end = Some(sync::now(self.device.clone()).boxed());
            }
            Err(e) => {
                self.previous_frame_end = Some(sync::now(self.device.clone()).boxed());
                return Err(anyhow!("Failed to flush frame: {}", e));
            }
        }

        Ok(())
    }

    fn set_depth_test(&mut self, enabled: bool) {
        if self.depth_test != enabled {
            self.depth_test = enabled;
            self.pipeline_dirty = true;
        }
    }

    fn set_background_color(&mut self, color: [f32; 4]) {
        self.background_color = color;
    }

    fn add_mesh(&mut self, mesh: Rc<RefCell<Mesh>>) -> bool {
        if self.meshes.iter().any(|g| Rc::ptr_eq(&g.mesh, &mesh)) {
            return false;
        }

        let dirty = Rc::new(Cell::new(true));
        let flag = dirty.clone();
        let subscription = mesh
            .borrow_mut()
            .on_vertices_updated(move |_| flag.set(true));

        self.meshes.push(GpuMesh {
            mesh,
            dirty,
            subscription,
            buffers: None,
        });
        true
    }

    fn delete_mesh(&mut self, mesh: &Rc<RefCell<Mesh>>) -> bool {
        let Some(position) = self.meshes.iter().position(|g| Rc::ptr_eq(&g.mesh, mesh)) else {
            return false;
        };
        let gpu = self.meshes.remove(position);
        gpu.mesh
            .borrow_mut()
            .cancel_vertices_updated(gpu.subscription);
        true
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // In-flight frames must finish before their resources go away.
        unsafe {
            if let Err(e) = self.device.wait_idle() {
                error!(
                    "Device wait failed while destroying renderer for window {:?}: {}",
                    self.window_id, e
                );
            }
        }
        info!("Vulkan renderer for window {:?} destroyed", self.window_id);
    }
}

fn viewport_for(width: u32, height: u32) -> Viewport {
    Viewport {
        origin: [0.0, 0.0],
        dimensions: [width as f32, height as f32],
        depth_range: 0.0..1.0,
    }
}

/// Builds GPU buffers for a mesh, or `None` when there is nothing valid to
/// draw. Out-of-range indices are rejected here — the mesh is skipped with
/// an error log rather than reaching the GPU.
fn upload_mesh_buffers(
    allocator: &Arc<StandardMemoryAllocator>,
    mesh: &Mesh,
) -> Result<Option<MeshBuffers>> {
    if mesh.vertices().is_empty() || mesh.indices().is_empty() {
        return Ok(None);
    }
    if !mesh.indices_in_bounds() {
        error!(
            "Mesh has indices out of range of its {} vertices, skipping upload",
            mesh.vertices().len()
        );
        return Ok(None);
    }

    let vertex = Buffer::from_iter(
        allocator,
        BufferCreateInfo {
            usage: BufferUsage::VERTEX_BUFFER,
            ..Default::default()
        },
        AllocationCreateInfo {
            usage: MemoryUsage::Upload,
            ..Default::default()
        },
        mesh.vertices().iter().copied(),
    )?;
    let index = Buffer::from_iter(
        allocator,
        BufferCreateInfo {
            usage: BufferUsage::INDEX_BUFFER,
            ..Default::default()
        },
        AllocationCreateInfo {
            usage: MemoryUsage::Upload,
            ..Default::default()
        },
        mesh.indices().iter().copied(),
    )?;

    Ok(Some(MeshBuffers {
        index_count: mesh.indices().len() as u32,
        vertex,
        index,
    }))
}
