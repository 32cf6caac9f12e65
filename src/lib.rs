//! Glimmer: a small Vulkan rendering core.
//!
//! [`graphics::Graphics`] owns the window system, the GPU backend and the
//! renderer/window bindings; meshes and cameras are shared into renderers
//! by handle. The demo binary in `main.rs` shows the intended wiring.

pub mod assets;
pub mod camera;
pub mod graphics;
pub mod mesh;
pub mod renderer;
pub mod signal;
pub mod vulkan;
pub mod window;

pub use camera::{
    shared_camera, Camera, Camera2dController, CameraFpsController, Projection,
    ProjectionController, SharedCamera,
};
pub use graphics::{DriverKind, Graphics, RendererId};
pub use mesh::{Material, Mesh, Vertex};
pub use renderer::Renderer;
pub use window::{MonitorId, WindowHint, WindowId, WindowSystem, WindowSystemEvent, WinitWindowSystem};
