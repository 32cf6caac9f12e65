//! Shader program: a matched vertex/fragment module pair plus the
//! vertex-input layout derived from the fixed [`Vertex`] struct.

use std::mem;
use std::sync::Arc;

use log::error;
use vulkano::device::Device;
use vulkano::format::Format;
use vulkano::pipeline::graphics::vertex_input::{
    VertexInputAttributeDescription, VertexInputBindingDescription, VertexInputRate,
    VertexInputState,
};
use vulkano::shader::ShaderModule;

use crate::assets::AssetStorage;
use crate::mesh::Vertex;

enum ShaderStage {
    Vertex,
    Fragment,
}

/// True when `code` can be passed to the driver as SPIR-V: the API requires
/// word-aligned byte code.
pub fn spirv_word_aligned(code: &[u8]) -> bool {
    code.len() % mem::size_of::<u32>() == 0
}

/// Builds the single-binding vertex-input description for [`Vertex`]:
/// position at location 0, texture coordinate at location 1, both three
/// 32-bit floats. Purely derived; no failure mode.
pub fn vertex_input_state() -> VertexInputState {
    VertexInputState::new()
        .binding(
            0,
            VertexInputBindingDescription {
                stride: mem::size_of::<Vertex>() as u32,
                input_rate: VertexInputRate::Vertex,
            },
        )
        .attribute(
            0,
            VertexInputAttributeDescription {
                binding: 0,
                format: Format::R32G32B32_SFLOAT,
                offset: mem::offset_of!(Vertex, pos) as u32,
            },
        )
        .attribute(
            1,
            VertexInputAttributeDescription {
                binding: 0,
                format: Format::R32G32B32_SFLOAT,
                offset: mem::offset_of!(Vertex, tc) as u32,
            },
        )
}

/// Owns a vertex+fragment shader module pair. Either both modules were
/// created and [`ShaderProgram::is_created`] is true, or the program is
/// unusable; a partially created program is never acted upon, though its
/// surviving module is still released by [`ShaderProgram::destroy_shader_modules`]
/// or drop.
pub struct ShaderProgram {
    device: Arc<Device>,
    vert_module: Option<Arc<ShaderModule>>,
    frag_module: Option<Arc<ShaderModule>>,
    vertex_input: VertexInputState,
    is_created: bool,
}

impl ShaderProgram {
    /// Resolves both shader identifiers through `storage` and creates the
    /// modules. Any invalid lookup aborts before module creation; any
    /// module failure leaves `is_created()` false.
    pub fn new(
        device: Arc<Device>,
        storage: &AssetStorage,
        vert_shader: &str,
        frag_shader: &str,
    ) -> Self {
        let mut program = Self {
            device,
            vert_module: None,
            frag_module: None,
            vertex_input: VertexInputState::new(),
            is_created: false,
        };

        let vert_handle = storage.get(vert_shader);
        let frag_handle = storage.get(frag_shader);
        if !vert_handle.is_valid() || !frag_handle.is_valid() {
            error!("Can't find shaders {} / {}", vert_shader, frag_shader);
            return program;
        }

        let created = program.create_shader_module(vert_handle.content(), ShaderStage::Vertex)
            && program.create_shader_module(frag_handle.content(), ShaderStage::Fragment);
        if !created {
            error!("Can't create shader module");
            return program;
        }

        program.vertex_input = vertex_input_state();
        program.is_created = true;
        program
    }

    /// Creates one shader module. Fails, without touching the stored
    /// handle, when the byte code is not word-aligned or the device
    /// rejects it.
    fn create_shader_module(&mut self, code: &[u8], stage: ShaderStage) -> bool {
        if !spirv_word_aligned(code) {
            error!(
                "Shader code size {} is not a multiple of four; \
                 see the VkShaderModuleCreateInfo manual page",
                code.len()
            );
            return false;
        }

        // Alignment was checked above; the byte content itself is trusted
        // the same way the C API trusts pCode.
        let module = match unsafe { ShaderModule::from_bytes(self.device.clone(), code) } {
            Ok(module) => module,
            Err(e) => {
                error!("Failed to create shader module: {}", e);
                return false;
            }
        };

        match stage {
            ShaderStage::Vertex => self.vert_module = Some(module),
            ShaderStage::Fragment => self.frag_module = Some(module),
        }
        true
    }

    /// All-or-nothing success flag.
    pub fn is_created(&self) -> bool {
        self.is_created
    }

    pub fn vertex_module(&self) -> Option<&Arc<ShaderModule>> {
        self.vert_module.as_ref()
    }

    pub fn fragment_module(&self) -> Option<&Arc<ShaderModule>> {
        self.frag_module.as_ref()
    }

    pub fn vertex_input(&self) -> VertexInputState {
        self.vertex_input.clone()
    }

    /// Releases both module handles. Idempotent; a second call finds them
    /// already gone.
    pub fn destroy_shader_modules(&mut self) {
        self.vert_module = None;
        self.frag_module = None;
    }
}
