//! Demo binary: one window, one renderer, a spinning cube and an FPS
//! camera driven by cursor and scroll events.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use log::info;
use nalgebra::{Matrix4, Vector3};

use glimmer::camera::CameraFpsController;
use glimmer::mesh::{cube, Material, Mesh};
use glimmer::{
    shared_camera, DriverKind, Graphics, Projection, ProjectionController, WindowSystemEvent,
    WinitWindowSystem,
};

fn main() -> Result<()> {
    env_logger::init();

    let mut graphics = Graphics::new(Box::new(WinitWindowSystem::new()));
    if !graphics.init(DriverKind::Vulkan) {
        return Err(anyhow!("Graphics initialization failed"));
    }

    let window = graphics
        .spawn_window(800, 600, "Glimmer", None, None)
        .ok_or_else(|| anyhow!("Window creation failed"))?;
    let window_size = graphics
        .window_size(window)
        .ok_or_else(|| anyhow!("Window vanished right after creation"))?;

    let camera = shared_camera();
    let mut projection =
        ProjectionController::new(camera.clone(), Projection::perspective(), window_size);
    let mut fps = CameraFpsController::new(
        camera.clone(),
        window_size.0 as f64 / 2.0,
        window_size.1 as f64 / 2.0,
    );

    let renderer = graphics
        .spawn_renderer(window, camera)
        .ok_or_else(|| anyhow!("Renderer creation failed"))?;

    let mesh = Rc::new(RefCell::new(Mesh::new(Material {
        color: [0.9, 0.5, 0.2, 1.0],
        wireframe: false,
    })));
    let (vertices, indices) = cube(1.0);
    mesh.borrow_mut().set_mesh_data(vertices, indices);

    {
        let renderer = graphics
            .renderer_mut(renderer)
            .ok_or_else(|| anyhow!("Renderer binding missing"))?;
        renderer.set_depth_test(true);
        renderer.set_background_color([0.05, 0.05, 0.1, 1.0]);
        renderer.add_mesh(mesh.clone());
    }

    info!("Entering the render loop");

    let start = Instant::now();
    loop {
        graphics.poll_events();
        for event in graphics.drain_events() {
            match event {
                WindowSystemEvent::Resized { size, .. } => projection.on_window_resized(size),
                WindowSystemEvent::Scroll { delta, .. } => projection.scroll(delta),
                WindowSystemEvent::CursorMoved { x, y, .. } => fps.update_view(x, y),
                WindowSystemEvent::CloseRequested { window } => {
                    info!("Window {:?} requested close", window)
                }
                WindowSystemEvent::Focused { .. } => {}
            }
        }

        projection.recalculate();
        fps.recalculate();

        let angle = start.elapsed().as_secs_f32();
        mesh.borrow_mut().model_matrix =
            Matrix4::from_axis_angle(&Vector3::y_axis(), angle * 0.8);

        if !graphics.render() {
            break;
        }
    }

    graphics.deinit();
    info!("Shut down cleanly");
    Ok(())
}
