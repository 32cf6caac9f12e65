//! Top-level orchestrator: owns the GPU backend and the set of
//! (renderer, window) bindings, and drives the per-frame render pass.

use log::{error, info, warn};

use crate::camera::SharedCamera;
use crate::renderer::Renderer;
use crate::window::{MonitorId, WindowHint, WindowId, WindowSystem, WindowSystemEvent};

/// Graphics drivers the orchestrator can initialize. Vulkan is the only
/// recognized value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Vulkan,
}

/// Stable handle to a renderer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RendererId(u64);

/// Driver-specific half of the orchestrator: context lifecycle plus
/// renderer construction. Kept behind a trait so the binding lifecycle is
/// testable without a GPU.
pub trait GraphicsBackend {
    /// Whether the host can run this backend at all.
    fn is_supported(&self, system: &dyn WindowSystem) -> bool;

    /// Brings up the GPU context. At most one context may be live per
    /// process.
    fn initialize(&mut self) -> bool;

    /// Tears the GPU context down. Must be safe to call repeatedly.
    fn deinitialize(&mut self);

    /// Builds a renderer bound to `window` and `camera`. On failure every
    /// partially acquired resource is released and `None` is returned.
    fn create_renderer(
        &self,
        system: &dyn WindowSystem,
        window: WindowId,
        camera: SharedCamera,
    ) -> Option<Box<dyn Renderer>>;
}

struct Binding {
    id: RendererId,
    renderer: Box<dyn Renderer>,
    window: WindowId,
}

/// Owns the window system, the GPU backend and all renderer/window
/// bindings. Bindings live in one of two disjoint sets: *active* (rendered
/// every frame) and *expired* (queued for destruction). An expired binding
/// is destroyed only after the active-set pass for the frame completes,
/// never during it.
pub struct Graphics {
    system: Box<dyn WindowSystem>,
    backend: Option<Box<dyn GraphicsBackend>>,
    is_initialized: bool,
    active: Vec<Binding>,
    expired: Vec<Binding>,
    next_renderer_id: u64,
}

impl Graphics {
    pub fn new(system: Box<dyn WindowSystem>) -> Self {
        Self {
            system,
            backend: None,
            is_initialized: false,
            active: Vec::new(),
            expired: Vec::new(),
            next_renderer_id: 0,
        }
    }

    /// Brings the requested driver up. Returns `false` without
    /// reinitializing when already initialized, when the driver is
    /// unsupported on this host, or when context creation fails; in the
    /// failure cases the pre-call uninitialized state is preserved.
    pub fn init(&mut self, driver: DriverKind) -> bool {
        match driver {
            DriverKind::Vulkan => {
                self.init_with_backend(Box::new(crate::vulkan::VulkanBackend::new()))
            }
        }
    }

    /// Backend-injection seam used by [`Graphics::init`] and by tests.
    pub fn init_with_backend(&mut self, mut backend: Box<dyn GraphicsBackend>) -> bool {
        if self.is_initialized {
            return false;
        }

        info!("Graphics initialization started");

        if !backend.is_supported(self.system.as_ref()) {
            error!("Requested graphics driver is not supported on this host");
            return false;
        }
        if !backend.initialize() {
            error!("Graphics context initialization failed");
            return false;
        }

        self.backend = Some(backend);
        self.is_initialized = true;

        info!("Graphics initialized correctly");

        true
    }

    /// Expires and destroys every binding, then tears the context down.
    /// Safe to call when not initialized; also runs from `Drop`.
    pub fn deinit(&mut self) {
        self.expired.append(&mut self.active);
        self.process_expired_renderers();

        if let Some(mut backend) = self.backend.take() {
            backend.deinitialize();
        }

        if self.is_initialized {
            info!("Graphics shut down correctly");
        }
        self.is_initialized = false;
    }

    /// Renders one frame into every active binding. A binding whose window
    /// requested close, or whose render call failed, is reclassified as
    /// expired and destroyed after the pass. Returns `true` iff at least
    /// one active binding remains.
    pub fn render(&mut self) -> bool {
        if !self.is_initialized {
            return false;
        }

        let bindings = std::mem::take(&mut self.active);
        for mut binding in bindings {
            if self.system.should_close(binding.window) {
                self.expired.push(binding);
                continue;
            }
            match binding.renderer.render() {
                Ok(()) => self.active.push(binding),
                Err(e) => {
                    error!("Renderer for window {:?} failed: {:#}", binding.window, e);
                    self.expired.push(binding);
                }
            }
        }

        self.process_expired_renderers();

        !self.active.is_empty()
    }

    /// Destroys every expired binding: renderer first, then its window.
    /// A window the system refuses to destroy is force-destroyed with a
    /// warning so expiry processing always completes.
    fn process_expired_renderers(&mut self) {
        for binding in self.expired.drain(..) {
            let window = binding.window;
            drop(binding.renderer);

            if !self.system.destroy_window(window) {
                warn!("Failed to destroy window {:?}, forcing destruction", window);
                self.system.force_destroy_window(window);
            }
        }
    }

    /// Builds a driver-specific renderer bound to `window` and registers
    /// the binding. Returns `None`, registering nothing, when the system
    /// is uninitialized or renderer initialization fails. Binding two
    /// renderers to one window is caller error and is not checked here.
    pub fn spawn_renderer(&mut self, window: WindowId, camera: SharedCamera) -> Option<RendererId> {
        let Some(backend) = self.backend.as_ref() else {
            error!("Cannot spawn a renderer before graphics initialization");
            return None;
        };

        match backend.create_renderer(self.system.as_ref(), window, camera) {
            Some(renderer) => Some(self.bind_window_renderer(window, renderer)),
            None => {
                error!("Can't create renderer for window {:?}", window);
                None
            }
        }
    }

    /// Registers an already-built renderer for `window`.
    pub fn bind_window_renderer(
        &mut self,
        window: WindowId,
        renderer: Box<dyn Renderer>,
    ) -> RendererId {
        let id = RendererId(self.next_renderer_id);
        self.next_renderer_id += 1;
        self.active.push(Binding {
            id,
            renderer,
            window,
        });
        id
    }

    pub fn renderer_mut(&mut self, id: RendererId) -> Option<&mut dyn Renderer> {
        match self.active.iter_mut().find(|b| b.id == id) {
            Some(b) => Some(b.renderer.as_mut()),
            None => None,
        }
    }

    /// Broadcasts the depth-test setting to every active renderer.
    pub fn set_depth_test(&mut self, enabled: bool) {
        for binding in &mut self.active {
            binding.renderer.set_depth_test(enabled);
        }
    }

    pub fn spawn_window(
        &mut self,
        width: u32,
        height: u32,
        name: &str,
        monitor: Option<MonitorId>,
        shared: Option<WindowId>,
    ) -> Option<WindowId> {
        self.system.create_window(width, height, name, monitor, shared)
    }

    pub fn focused_window(&self) -> Option<WindowId> {
        self.system.focused_window()
    }

    pub fn monitors(&self) -> Vec<MonitorId> {
        self.system.monitors()
    }

    pub fn window_monitor(&self, window: WindowId) -> Option<MonitorId> {
        self.system.window_monitor(window)
    }

    pub fn set_window_monitor(
        &mut self,
        window: WindowId,
        monitor: Option<MonitorId>,
        position: (i32, i32),
        size: (u32, u32),
        refresh_rate: i32,
    ) {
        self.system
            .set_window_monitor(window, monitor, position, size, refresh_rate)
    }

    pub fn set_window_creation_hint(&mut self, hint: WindowHint, value: i32) {
        self.system.set_window_creation_hint(hint, value)
    }

    pub fn window_size(&self, window: WindowId) -> Option<(u32, u32)> {
        self.system.window_size(window)
    }

    pub fn poll_events(&mut self) {
        self.system.poll_events()
    }

    pub fn drain_events(&mut self) -> Vec<WindowSystemEvent> {
        self.system.drain_events()
    }
}

impl Drop for Graphics {
    fn drop(&mut self) {
        self.deinit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Mesh;
    use anyhow::anyhow;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeWindowState {
        vulkan_supported: bool,
        next_id: u64,
        windows: HashMap<WindowId, bool>, // id -> should_close
        destroy_refusals: Vec<WindowId>,
        destroyed: Vec<WindowId>,
        force_destroyed: Vec<WindowId>,
    }

    #[derive(Clone)]
    struct FakeWindowSystem {
        state: Rc<RefCell<FakeWindowState>>,
    }

    impl FakeWindowSystem {
        fn new(vulkan_supported: bool) -> (Self, Rc<RefCell<FakeWindowState>>) {
            let state = Rc::new(RefCell::new(FakeWindowState {
                vulkan_supported,
                ..Default::default()
            }));
            (
                Self {
                    state: state.clone(),
                },
                state,
            )
        }
    }

    impl WindowSystem for FakeWindowSystem {
        fn is_vulkan_supported(&self) -> bool {
            self.state.borrow().vulkan_supported
        }

        fn create_window(
            &mut self,
            _width: u32,
            _height: u32,
            _name: &str,
            _monitor: Option<MonitorId>,
            _shared: Option<WindowId>,
        ) -> Option<WindowId> {
            let mut state = self.state.borrow_mut();
            let id = WindowId(state.next_id);
            state.next_id += 1;
            state.windows.insert(id, false);
            Some(id)
        }

        fn destroy_window(&mut self, window: WindowId) -> bool {
            let mut state = self.state.borrow_mut();
            if state.destroy_refusals.contains(&window) {
                return false;
            }
            let existed = state.windows.remove(&window).is_some();
            if existed {
                state.destroyed.push(window);
            }
            existed
        }

        fn force_destroy_window(&mut self, window: WindowId) {
            let mut state = self.state.borrow_mut();
            state.windows.remove(&window);
            state.force_destroyed.push(window);
        }

        fn should_close(&self, window: WindowId) -> bool {
            self.state.borrow().windows.get(&window).copied().unwrap_or(true)
        }
    }

    #[derive(Default)]
    struct BackendCalls {
        initialized: Cell<u32>,
        deinitialized: Cell<u32>,
    }

    struct FakeBackend {
        supported: bool,
        init_succeeds: bool,
        renderer_succeeds: bool,
        calls: Rc<BackendCalls>,
        renderer_probe: Rc<RendererProbe>,
    }

    impl FakeBackend {
        fn working() -> Self {
            Self {
                supported: true,
                init_succeeds: true,
                renderer_succeeds: true,
                calls: Rc::new(BackendCalls::default()),
                renderer_probe: Rc::new(RendererProbe::default()),
            }
        }
    }

    impl GraphicsBackend for FakeBackend {
        fn is_supported(&self, system: &dyn WindowSystem) -> bool {
            self.supported && system.is_vulkan_supported()
        }

        fn initialize(&mut self) -> bool {
            if self.init_succeeds {
                self.calls.initialized.set(self.calls.initialized.get() + 1);
            }
            self.init_succeeds
        }

        fn deinitialize(&mut self) {
            self.calls.deinitialized.set(self.calls.deinitialized.get() + 1);
        }

        fn create_renderer(
            &self,
            _system: &dyn WindowSystem,
            _window: WindowId,
            _camera: SharedCamera,
        ) -> Option<Box<dyn Renderer>> {
            if self.renderer_succeeds {
                Some(Box::new(FakeRenderer::new(self.renderer_probe.clone())))
            } else {
                None
            }
        }
    }

    #[derive(Default)]
    struct RendererProbe {
        render_calls: Cell<u32>,
        drops: Cell<u32>,
        fail_render: Cell<bool>,
        depth_test: Cell<Option<bool>>,
    }

    struct FakeRenderer {
        probe: Rc<RendererProbe>,
    }

    impl FakeRenderer {
        fn new(probe: Rc<RendererProbe>) -> Self {
            Self { probe }
        }
    }

    impl Renderer for FakeRenderer {
        fn render(&mut self) -> anyhow::Result<()> {
            self.probe.render_calls.set(self.probe.render_calls.get() + 1);
            if self.probe.fail_render.get() {
                Err(anyhow!("simulated render failure"))
            } else {
                Ok(())
            }
        }

        fn set_depth_test(&mut self, enabled: bool) {
            self.probe.depth_test.set(Some(enabled));
        }

        fn set_background_color(&mut self, _color: [f32; 4]) {}

        fn add_mesh(&mut self, _mesh: Rc<RefCell<Mesh>>) -> bool {
            true
        }

        fn delete_mesh(&mut self, _mesh: &Rc<RefCell<Mesh>>) -> bool {
            true
        }
    }

    impl Drop for FakeRenderer {
        fn drop(&mut self) {
            self.probe.drops.set(self.probe.drops.get() + 1);
        }
    }

    fn initialized_graphics() -> (Graphics, Rc<RefCell<FakeWindowState>>, Rc<BackendCalls>, Rc<RendererProbe>)
    {
        let (system, state) = FakeWindowSystem::new(true);
        let backend = FakeBackend::working();
        let calls = backend.calls.clone();
        let probe = backend.renderer_probe.clone();

        let mut graphics = Graphics::new(Box::new(system));
        assert!(graphics.init_with_backend(Box::new(backend)));
        (graphics, state, calls, probe)
    }

    #[test]
    fn second_init_fails_without_reinitializing() {
        let (mut graphics, _state, calls, _probe) = initialized_graphics();

        let second = FakeBackend::working();
        let second_calls = second.calls.clone();
        assert!(!graphics.init_with_backend(Box::new(second)));

        assert_eq!(calls.initialized.get(), 1);
        assert_eq!(second_calls.initialized.get(), 0);
    }

    #[test]
    fn init_fails_on_unsupported_host() {
        let (system, _state) = FakeWindowSystem::new(false);
        let mut graphics = Graphics::new(Box::new(system));

        let backend = FakeBackend::working();
        let calls = backend.calls.clone();
        assert!(!graphics.init_with_backend(Box::new(backend)));

        assert_eq!(calls.initialized.get(), 0);
        // Still uninitialized: render refuses to run.
        assert!(!graphics.render());
    }

    #[test]
    fn failed_context_init_leaves_precall_state() {
        let (system, _state) = FakeWindowSystem::new(true);
        let mut graphics = Graphics::new(Box::new(system));

        let mut failing = FakeBackend::working();
        failing.init_succeeds = false;
        assert!(!graphics.init_with_backend(Box::new(failing)));

        // A later init attempt is allowed to succeed.
        assert!(graphics.init_with_backend(Box::new(FakeBackend::working())));
    }

    #[test]
    fn render_without_init_returns_false() {
        let (system, _state) = FakeWindowSystem::new(true);
        let mut graphics = Graphics::new(Box::new(system));
        assert!(!graphics.render());
    }

    #[test]
    fn spawn_renderer_registers_binding() {
        let (mut graphics, _state, _calls, probe) = initialized_graphics();

        let window = graphics.spawn_window(800, 600, "main", None, None).unwrap();
        let camera = crate::camera::shared_camera();
        let id = graphics.spawn_renderer(window, camera).unwrap();

        assert!(graphics.renderer_mut(id).is_some());
        assert!(graphics.render());
        assert_eq!(probe.render_calls.get(), 1);
    }

    #[test]
    fn failed_spawn_leaves_no_binding() {
        let (system, _state) = FakeWindowSystem::new(true);
        let mut backend = FakeBackend::working();
        backend.renderer_succeeds = false;

        let mut graphics = Graphics::new(Box::new(system));
        assert!(graphics.init_with_backend(Box::new(backend)));

        let window = graphics.spawn_window(800, 600, "main", None, None).unwrap();
        let camera = crate::camera::shared_camera();
        assert!(graphics.spawn_renderer(window, camera).is_none());

        // No binding registered: a render pass finds nothing active.
        assert!(!graphics.render());
    }

    #[test]
    fn spawn_renderer_before_init_fails() {
        let (system, _state) = FakeWindowSystem::new(true);
        let mut graphics = Graphics::new(Box::new(system));
        let camera = crate::camera::shared_camera();
        assert!(graphics.spawn_renderer(WindowId(0), camera).is_none());
    }

    #[test]
    fn closed_window_expires_binding_between_frames() {
        let (mut graphics, state, _calls, probe) = initialized_graphics();

        let window = graphics.spawn_window(800, 600, "main", None, None).unwrap();
        let camera = crate::camera::shared_camera();
        graphics.spawn_renderer(window, camera).unwrap();

        // First frame: window open, binding stays active.
        assert!(graphics.render());
        assert_eq!(probe.render_calls.get(), 1);
        assert_eq!(probe.drops.get(), 0);

        // Window closes between the calls.
        state.borrow_mut().windows.insert(window, true);

        // Second frame: expired, destroyed, no bindings remain. The render
        // call is not invoked for a closing window.
        assert!(!graphics.render());
        assert_eq!(probe.render_calls.get(), 1);
        assert_eq!(probe.drops.get(), 1);
        assert_eq!(state.borrow().destroyed, vec![window]);

        // Destroyed exactly once: a further frame must not touch it again.
        assert!(!graphics.render());
        assert_eq!(probe.drops.get(), 1);
    }

    #[test]
    fn render_failure_is_isolated_per_binding() {
        let (mut graphics, state, _calls, _probe) = initialized_graphics();

        let camera = crate::camera::shared_camera();
        let healthy_window = graphics.spawn_window(800, 600, "a", None, None).unwrap();
        let failing_window = graphics.spawn_window(800, 600, "b", None, None).unwrap();

        let healthy_probe = Rc::new(RendererProbe::default());
        let failing_probe = Rc::new(RendererProbe::default());
        failing_probe.fail_render.set(true);

        graphics.bind_window_renderer(
            healthy_window,
            Box::new(FakeRenderer::new(healthy_probe.clone())),
        );
        graphics.bind_window_renderer(
            failing_window,
            Box::new(FakeRenderer::new(failing_probe.clone())),
        );
        let _ = camera;

        // The failing binding expires; the healthy one keeps rendering.
        assert!(graphics.render());
        assert_eq!(healthy_probe.render_calls.get(), 1);
        assert_eq!(failing_probe.drops.get(), 1);
        assert_eq!(healthy_probe.drops.get(), 0);
        assert_eq!(state.borrow().destroyed, vec![failing_window]);

        assert!(graphics.render());
        assert_eq!(healthy_probe.render_calls.get(), 2);
    }

    #[test]
    fn refused_window_destroy_falls_back_to_force() {
        let (mut graphics, state, _calls, probe) = initialized_graphics();

        let window = graphics.spawn_window(800, 600, "stuck", None, None).unwrap();
        let camera = crate::camera::shared_camera();
        graphics.spawn_renderer(window, camera).unwrap();

        state.borrow_mut().destroy_refusals.push(window);
        state.borrow_mut().windows.insert(window, true);

        assert!(!graphics.render());
        assert_eq!(probe.drops.get(), 1);
        assert_eq!(state.borrow().force_destroyed, vec![window]);
        assert!(state.borrow().destroyed.is_empty());
    }

    #[test]
    fn deinit_destroys_active_bindings_and_is_idempotent() {
        let (mut graphics, state, calls, probe) = initialized_graphics();

        let window = graphics.spawn_window(800, 600, "main", None, None).unwrap();
        let camera = crate::camera::shared_camera();
        graphics.spawn_renderer(window, camera).unwrap();

        graphics.deinit();
        assert_eq!(probe.drops.get(), 1);
        assert_eq!(state.borrow().destroyed, vec![window]);
        assert_eq!(calls.deinitialized.get(), 1);
        assert!(!graphics.render());

        // Second deinit: no additional destroy side effects.
        graphics.deinit();
        assert_eq!(probe.drops.get(), 1);
        assert_eq!(state.borrow().destroyed, vec![window]);
        assert_eq!(calls.deinitialized.get(), 1);
    }

    #[test]
    fn drop_runs_deinit() {
        let (graphics, state, calls, probe) = {
            let (mut graphics, state, calls, probe) = initialized_graphics();
            let window = graphics.spawn_window(800, 600, "main", None, None).unwrap();
            let camera = crate::camera::shared_camera();
            graphics.spawn_renderer(window, camera).unwrap();
            (graphics, state, calls, probe)
        };

        drop(graphics);
        assert_eq!(probe.drops.get(), 1);
        assert_eq!(calls.deinitialized.get(), 1);
        assert_eq!(state.borrow().destroyed.len(), 1);
    }

    #[test]
    fn depth_test_broadcasts_to_active_renderers() {
        let (mut graphics, _state, _calls, probe) = initialized_graphics();

        let window = graphics.spawn_window(800, 600, "main", None, None).unwrap();
        let camera = crate::camera::shared_camera();
        graphics.spawn_renderer(window, camera).unwrap();

        graphics.set_depth_test(true);
        assert_eq!(probe.depth_test.get(), Some(true));

        graphics.set_depth_test(false);
        assert_eq!(probe.depth_test.get(), Some(false));
    }
}
