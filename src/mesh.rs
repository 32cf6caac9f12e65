//! CPU-side mesh and material data.

use nalgebra::Matrix4;

use crate::signal::{Signal, Subscription};

/// Vertex layout shared with the shader pipeline. The vertex-input
/// description is derived from this struct, so its layout is fixed.
#[derive(Default, Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub tc: [f32; 3],
}

unsafe impl bytemuck::Pod for Vertex {}
unsafe impl bytemuck::Zeroable for Vertex {}

/// Material properties, owned by value and cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: [f32; 4],
    pub wireframe: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            wireframe: false,
        }
    }
}

/// Vertex/index data plus a material. Mutations replace the owned data
/// wholesale and notify subscribers after the change is visible; there is
/// no partial update.
pub struct Mesh {
    pub model_matrix: Matrix4<f32>,
    vertices: Vec<Vertex>,
    indices: Vec<u16>,
    material: Material,
    vertices_updated: Signal<()>,
    material_updated: Signal<()>,
}

impl Mesh {
    pub fn new(material: Material) -> Self {
        Self {
            model_matrix: Matrix4::identity(),
            vertices: Vec::new(),
            indices: Vec::new(),
            material,
            vertices_updated: Signal::new(),
            material_updated: Signal::new(),
        }
    }

    /// Replaces both sequences together, then emits one "vertices updated"
    /// notification. Index bounds are not validated here; the GPU upload
    /// path rejects out-of-range indices (see [`Mesh::indices_in_bounds`]).
    pub fn set_mesh_data(&mut self, vertices: Vec<Vertex>, indices: Vec<u16>) {
        self.vertices = vertices;
        self.indices = indices;

        self.vertices_updated.emit(&());
    }

    pub fn set_material(&mut self, material: Material) {
        self.material = material;

        self.material_updated.emit(&());
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    /// True when every index references a valid vertex slot.
    pub fn indices_in_bounds(&self) -> bool {
        let count = self.vertices.len();
        self.indices.iter().all(|&i| (i as usize) < count)
    }

    pub fn on_vertices_updated(
        &mut self,
        callback: impl FnMut(&()) + 'static,
    ) -> Subscription {
        self.vertices_updated.connect(callback)
    }

    pub fn cancel_vertices_updated(&mut self, subscription: Subscription) -> bool {
        self.vertices_updated.disconnect(subscription)
    }

    pub fn on_material_updated(
        &mut self,
        callback: impl FnMut(&()) + 'static,
    ) -> Subscription {
        self.material_updated.connect(callback)
    }

    pub fn cancel_material_updated(&mut self, subscription: Subscription) -> bool {
        self.material_updated.disconnect(subscription)
    }
}

/// Axis-aligned cube centered at the origin, one face per quad.
pub fn cube(size: f32) -> (Vec<Vertex>, Vec<u16>) {
    let h = size / 2.0;
    let vertices = vec![
        // Front
        Vertex { pos: [-h, -h, h], tc: [0.0, 0.0, 0.0] },
        Vertex { pos: [h, -h, h], tc: [1.0, 0.0, 0.0] },
        Vertex { pos: [h, h, h], tc: [1.0, 1.0, 0.0] },
        Vertex { pos: [-h, h, h], tc: [0.0, 1.0, 0.0] },
        // Back
        Vertex { pos: [-h, -h, -h], tc: [1.0, 0.0, 0.0] },
        Vertex { pos: [-h, h, -h], tc: [1.0, 1.0, 0.0] },
        Vertex { pos: [h, h, -h], tc: [0.0, 1.0, 0.0] },
        Vertex { pos: [h, -h, -h], tc: [0.0, 0.0, 0.0] },
        // Top
        Vertex { pos: [-h, h, -h], tc: [0.0, 1.0, 0.0] },
        Vertex { pos: [-h, h, h], tc: [0.0, 0.0, 0.0] },
        Vertex { pos: [h, h, h], tc: [1.0, 0.0, 0.0] },
        Vertex { pos: [h, h, -h], tc: [1.0, 1.0, 0.0] },
        // Bottom
        Vertex { pos: [-h, -h, -h], tc: [1.0, 1.0, 0.0] },
        Vertex { pos: [h, -h, -h], tc: [0.0, 1.0, 0.0] },
        Vertex { pos: [h, -h, h], tc: [0.0, 0.0, 0.0] },
        Vertex { pos: [-h, -h, h], tc: [1.0, 0.0, 0.0] },
        // Right
        Vertex { pos: [h, -h, -h], tc: [1.0, 0.0, 0.0] },
        Vertex { pos: [h, h, -h], tc: [1.0, 1.0, 0.0] },
        Vertex { pos: [h, h, h], tc: [0.0, 1.0, 0.0] },
        Vertex { pos: [h, -h, h], tc: [0.0, 0.0, 0.0] },
        // Left
        Vertex { pos: [-h, -h, -h], tc: [0.0, 0.0, 0.0] },
        Vertex { pos: [-h, -h, h], tc: [1.0, 0.0, 0.0] },
        Vertex { pos: [-h, h, h], tc: [1.0, 1.0, 0.0] },
        Vertex { pos: [-h, h, -h], tc: [0.0, 1.0, 0.0] },
    ];

    let indices = vec![
        0, 1, 2, 2, 3, 0, // Front
        4, 5, 6, 6, 7, 4, // Back
        8, 9, 10, 10, 11, 8, // Top
        12, 13, 14, 14, 15, 12, // Bottom
        16, 17, 18, 18, 19, 16, // Right
        20, 21, 22, 22, 23, 20, // Left
    ];

    (vertices, indices)
}
