//! Camera state, projection policies and motion controllers.
//!
//! Matrices are recomputed lazily: controllers mark themselves dirty and
//! `recalculate` performs the rebuild only when something changed.

use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::{Matrix4, Orthographic3, Perspective3, Point3, Vector3};

const FOV_MIN_DEG: f32 = 20.0;
const FOV_MAX_DEG: f32 = 90.0;
const ORTHO_SCALE_MIN: f32 = 0.1;
const ORTHO_SCALE_MAX: f32 = 50.0;
const PITCH_LIMIT_DEG: f64 = 89.0;

/// View and projection matrices consumed by a renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
        }
    }
}

/// Cameras are shared between controllers and the renderer bound to the
/// same window; everything runs on one control thread.
pub type SharedCamera = Rc<RefCell<Camera>>;

pub fn shared_camera() -> SharedCamera {
    Rc::new(RefCell::new(Camera::default()))
}

/// Projection policy. The variant set is closed and matched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    Perspective { fov_deg: f32, znear: f32, zfar: f32 },
    Orthographic { scale: f32, znear: f32, zfar: f32 },
}

impl Projection {
    pub fn perspective() -> Self {
        Self::Perspective {
            fov_deg: 45.0,
            znear: 0.1,
            zfar: 100.0,
        }
    }

    pub fn orthographic() -> Self {
        Self::Orthographic {
            scale: 1.0,
            znear: -100.0,
            zfar: 100.0,
        }
    }

    /// Scroll input adjusts the variant's own zoom parameter within
    /// clamped bounds.
    pub fn scroll(&mut self, delta: f32) {
        match self {
            Self::Perspective { fov_deg, .. } => {
                *fov_deg = (*fov_deg - delta).clamp(FOV_MIN_DEG, FOV_MAX_DEG);
            }
            Self::Orthographic { scale, .. } => {
                *scale = (*scale - delta * 0.1).clamp(ORTHO_SCALE_MIN, ORTHO_SCALE_MAX);
            }
        }
    }

    /// Pure recompute of the projection matrix for the given aspect ratio.
    pub fn matrix(&self, aspect: f32) -> Matrix4<f32> {
        match *self {
            Self::Perspective { fov_deg, znear, zfar } => {
                Perspective3::new(aspect, fov_deg.to_radians(), znear, zfar).to_homogeneous()
            }
            Self::Orthographic { scale, znear, zfar } => {
                let right = scale * aspect;
                let top = scale;
                Orthographic3::new(-right, right, -top, top, znear, zfar).to_homogeneous()
            }
        }
    }
}

/// Keeps a camera's projection matrix in sync with a projection policy and
/// the aspect ratio of the window it renders into.
pub struct ProjectionController {
    camera: SharedCamera,
    projection: Projection,
    aspect: f32,
    dirty: bool,
}

impl ProjectionController {
    pub fn new(camera: SharedCamera, projection: Projection, window_size: (u32, u32)) -> Self {
        let mut controller = Self {
            camera,
            projection,
            aspect: 1.0,
            dirty: true,
        };
        controller.on_window_resized(window_size);
        controller.recalculate();
        controller
    }

    /// Window-resize notification; recomputes the aspect ratio.
    pub fn on_window_resized(&mut self, (width, height): (u32, u32)) {
        if height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
        self.dirty = true;
    }

    pub fn scroll(&mut self, delta: f32) {
        self.projection.scroll(delta);
        self.dirty = true;
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.dirty = true;
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Rebuilds the camera's projection matrix if anything changed.
    pub fn recalculate(&mut self) {
        if !self.dirty {
            return;
        }
        self.camera.borrow_mut().projection = self.projection.matrix(self.aspect);
        self.dirty = false;
    }
}

/// Position/orientation state shared by the motion controllers.
struct LookAt {
    position: Point3<f32>,
    direction: Vector3<f32>,
    up: Vector3<f32>,
}

impl LookAt {
    fn view(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(&self.position, &(self.position + self.direction), &self.up)
    }
}

/// Free 2D pan controller.
pub struct Camera2dController {
    camera: SharedCamera,
    look: LookAt,
    pub speed: f32,
    dirty: bool,
}

impl Camera2dController {
    pub fn new(camera: SharedCamera) -> Self {
        let mut controller = Self {
            camera,
            look: LookAt {
                position: Point3::new(0.0, 0.0, 5.0),
                direction: Vector3::new(0.0, 0.0, -1.0),
                up: Vector3::new(0.0, 1.0, 0.0),
            },
            speed: 5.0,
            dirty: true,
        };
        controller.recalculate();
        controller
    }

    pub fn move_up(&mut self, delta_time: f32) {
        self.look.position.y += self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_down(&mut self, delta_time: f32) {
        self.look.position.y -= self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_left(&mut self, delta_time: f32) {
        self.look.position.x -= self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_right(&mut self, delta_time: f32) {
        self.look.position.x += self.speed * delta_time;
        self.dirty = true;
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.look.position = position;
        self.dirty = true;
    }

    pub fn position(&self) -> Point3<f32> {
        self.look.position
    }

    /// Rebuilds the view matrix only if the controller moved.
    pub fn recalculate(&mut self) {
        if !self.dirty {
            return;
        }
        self.camera.borrow_mut().view = self.look.view();
        self.dirty = false;
    }
}

/// First-person fly controller; yaw/pitch are derived from cursor deltas.
pub struct CameraFpsController {
    camera: SharedCamera,
    look: LookAt,
    yaw: f64,
    pitch: f64,
    last_x: f64,
    last_y: f64,
    pub sensitivity: f32,
    pub speed: f32,
    dirty: bool,
}

impl CameraFpsController {
    pub fn new(camera: SharedCamera, cursor_x: f64, cursor_y: f64) -> Self {
        let mut controller = Self {
            camera,
            look: LookAt {
                position: Point3::new(0.0, 0.0, 5.0),
                direction: Vector3::new(0.0, 0.0, -1.0),
                up: Vector3::new(0.0, 1.0, 0.0),
            },
            yaw: -90.0,
            pitch: 0.0,
            last_x: cursor_x,
            last_y: cursor_y,
            sensitivity: 0.1,
            speed: 5.0,
            dirty: true,
        };
        controller.recalculate();
        controller
    }

    /// Applies the cursor delta since the last update to yaw and pitch.
    pub fn update_view(&mut self, cursor_x: f64, cursor_y: f64) {
        let dx = cursor_x - self.last_x;
        let dy = self.last_y - cursor_y;
        self.last_x = cursor_x;
        self.last_y = cursor_y;

        self.yaw += dx * self.sensitivity as f64;
        self.pitch = (self.pitch + dy * self.sensitivity as f64)
            .clamp(-PITCH_LIMIT_DEG, PITCH_LIMIT_DEG);

        let yaw = self.yaw.to_radians();
        let pitch = self.pitch.to_radians();
        self.look.direction = Vector3::new(
            (yaw.cos() * pitch.cos()) as f32,
            pitch.sin() as f32,
            (yaw.sin() * pitch.cos()) as f32,
        )
        .normalize();
        self.dirty = true;
    }

    /// Moves the tracked cursor position without touching the view.
    pub fn set_cursor_position(&mut self, cursor_x: f64, cursor_y: f64) {
        self.last_x = cursor_x;
        self.last_y = cursor_y;
    }

    pub fn move_forward(&mut self, delta_time: f32) {
        self.look.position += self.look.direction * self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_backward(&mut self, delta_time: f32) {
        self.look.position -= self.look.direction * self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_left(&mut self, delta_time: f32) {
        let right = self.look.direction.cross(&self.look.up).normalize();
        self.look.position -= right * self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_right(&mut self, delta_time: f32) {
        let right = self.look.direction.cross(&self.look.up).normalize();
        self.look.position += right * self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_up(&mut self, delta_time: f32) {
        self.look.position += self.look.up * self.speed * delta_time;
        self.dirty = true;
    }

    pub fn move_down(&mut self, delta_time: f32) {
        self.look.position -= self.look.up * self.speed * delta_time;
        self.dirty = true;
    }

    pub fn position(&self) -> Point3<f32> {
        self.look.position
    }

    /// Rebuilds the view matrix only if orientation or position changed.
    pub fn recalculate(&mut self) {
        if !self.dirty {
            return;
        }
        self.camera.borrow_mut().view = self.look.view();
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perspective_scroll_clamps_fov() {
        let mut projection = Projection::perspective();

        projection.scroll(1000.0);
        match projection {
            Projection::Perspective { fov_deg, .. } => assert_eq!(fov_deg, FOV_MIN_DEG),
            _ => unreachable!(),
        }

        projection.scroll(-1000.0);
        match projection {
            Projection::Perspective { fov_deg, .. } => assert_eq!(fov_deg, FOV_MAX_DEG),
            _ => unreachable!(),
        }
    }

    #[test]
    fn orthographic_scroll_clamps_scale() {
        let mut projection = Projection::orthographic();

        projection.scroll(1000.0);
        match projection {
            Projection::Orthographic { scale, .. } => assert_eq!(scale, ORTHO_SCALE_MIN),
            _ => unreachable!(),
        }

        projection.scroll(-10000.0);
        match projection {
            Projection::Orthographic { scale, .. } => assert_eq!(scale, ORTHO_SCALE_MAX),
            _ => unreachable!(),
        }
    }

    #[test]
    fn resize_recomputes_projection_lazily() {
        let camera = shared_camera();
        let mut controller =
            ProjectionController::new(camera.clone(), Projection::perspective(), (800, 600));

        let before = camera.borrow().projection;
        controller.on_window_resized((1600, 600));

        // Nothing visible until recalculate runs.
        assert_eq!(camera.borrow().projection, before);

        controller.recalculate();
        let after = camera.borrow().projection;
        assert_ne!(after, before);
        assert_eq!(after, Projection::perspective().matrix(1600.0 / 600.0));
    }

    #[test]
    fn zero_height_resize_is_ignored() {
        let camera = shared_camera();
        let mut controller =
            ProjectionController::new(camera.clone(), Projection::perspective(), (800, 600));

        let before = camera.borrow().projection;
        controller.on_window_resized((800, 0));
        controller.recalculate();
        assert_eq!(camera.borrow().projection, before);
    }

    #[test]
    fn pan_controller_moves_view() {
        let camera = shared_camera();
        let mut controller = Camera2dController::new(camera.clone());

        let before = camera.borrow().view;
        controller.move_right(1.0);
        controller.move_up(0.5);
        controller.recalculate();

        assert_ne!(camera.borrow().view, before);
        let position = controller.position();
        assert_eq!(position.x, 5.0);
        assert_eq!(position.y, 2.5);
    }

    #[test]
    fn fps_pitch_is_clamped() {
        let camera = shared_camera();
        let mut controller = CameraFpsController::new(camera, 0.0, 0.0);
        controller.sensitivity = 1.0;

        // Drag the cursor far beyond the pitch limit.
        controller.update_view(0.0, -10000.0);
        let up_dir = controller.look.direction;
        assert!(up_dir.y < 1.0 && up_dir.y > 0.99);

        controller.update_view(0.0, 10000.0);
        let down_dir = controller.look.direction;
        assert!(down_dir.y > -1.0 && down_dir.y < -0.99);
    }

    #[test]
    fn set_cursor_position_does_not_rotate() {
        let camera = shared_camera();
        let mut controller = CameraFpsController::new(camera.clone(), 0.0, 0.0);
        controller.recalculate();

        let before = camera.borrow().view;
        controller.set_cursor_position(500.0, 500.0);
        controller.recalculate();
        assert_eq!(camera.borrow().view, before);

        // The next delta is measured from the new position.
        controller.update_view(500.0, 500.0);
        controller.recalculate();
        assert_eq!(camera.borrow().view, before);
    }

    #[test]
    fn recalculate_is_lazy() {
        let camera = shared_camera();
        let mut controller = Camera2dController::new(camera.clone());

        controller.recalculate();
        let view = camera.borrow().view;

        // Poke the camera behind the controller's back; a clean controller
        // must not overwrite it.
        camera.borrow_mut().view = Matrix4::identity();
        controller.recalculate();
        assert_eq!(camera.borrow().view, Matrix4::identity());

        controller.move_left(1.0);
        controller.recalculate();
        assert_ne!(camera.borrow().view, view);
    }
}
