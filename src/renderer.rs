//! Per-window renderer contract consumed by the [`Graphics`]
//! orchestrator.
//!
//! [`Graphics`]: crate::graphics::Graphics

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;

use crate::mesh::Mesh;

/// A renderer bound to exactly one window. It owns every GPU resource
/// scoped to that window and is destroyed (dropped) exactly once, by the
/// orchestrator, after its binding expires. Dropping the renderer must
/// release all of its GPU resources.
pub trait Renderer {
    /// Renders one frame. An error expires the binding but never affects
    /// other windows.
    fn render(&mut self) -> Result<()>;

    /// Enables or disables depth testing for subsequent frames.
    fn set_depth_test(&mut self, enabled: bool);

    /// Clear color applied from the next frame on.
    fn set_background_color(&mut self, color: [f32; 4]);

    /// Registers a mesh for drawing. Returns `false` when the mesh is
    /// already registered.
    fn add_mesh(&mut self, mesh: Rc<RefCell<Mesh>>) -> bool;

    /// Unregisters a mesh and releases its GPU buffers. Returns `false`
    /// when the mesh was not registered.
    fn delete_mesh(&mut self, mesh: &Rc<RefCell<Mesh>>) -> bool;
}
