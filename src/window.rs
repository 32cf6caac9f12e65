//! Windowing collaborator: a narrow interface over window/monitor
//! management plus a winit-backed implementation.

use std::sync::Arc;

use log::{error, info, warn};
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{Event, MouseScrollDelta, WindowEvent as WinitWindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::monitor::MonitorHandle;
use winit::platform::run_return::EventLoopExtRunReturn;
use winit::window::{Fullscreen, Window, WindowBuilder};

/// Stable handle to a window owned by the window system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u64);

/// Handle to a monitor known to the window system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(pub usize);

/// Creation hints applied to windows spawned afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowHint {
    Resizable,
    Decorated,
    Visible,
    Maximized,
}

/// Events drained by the owner once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowSystemEvent {
    Resized { window: WindowId, size: (u32, u32) },
    CloseRequested { window: WindowId },
    Scroll { window: WindowId, delta: f32 },
    CursorMoved { window: WindowId, x: f64, y: f64 },
    Focused { window: WindowId, focused: bool },
}

/// Window/monitor management as the renderer core consumes it. Methods a
/// test double rarely cares about have no-op defaults.
pub trait WindowSystem {
    fn is_vulkan_supported(&self) -> bool;

    fn create_window(
        &mut self,
        width: u32,
        height: u32,
        name: &str,
        monitor: Option<MonitorId>,
        shared: Option<WindowId>,
    ) -> Option<WindowId>;

    /// Returns `false` when the window is unknown to the system.
    fn destroy_window(&mut self, window: WindowId) -> bool;

    /// Unconditional teardown, used when `destroy_window` failed.
    fn force_destroy_window(&mut self, window: WindowId);

    fn should_close(&self, window: WindowId) -> bool;

    fn window_size(&self, window: WindowId) -> Option<(u32, u32)> {
        let _ = window;
        None
    }

    fn window_name(&self, window: WindowId) -> Option<String> {
        let _ = window;
        None
    }

    fn focused_window(&self) -> Option<WindowId> {
        None
    }

    fn monitors(&self) -> Vec<MonitorId> {
        Vec::new()
    }

    fn window_monitor(&self, window: WindowId) -> Option<MonitorId> {
        let _ = window;
        None
    }

    fn set_window_monitor(
        &mut self,
        window: WindowId,
        monitor: Option<MonitorId>,
        position: (i32, i32),
        size: (u32, u32),
        refresh_rate: i32,
    ) {
        let _ = (window, monitor, position, size, refresh_rate);
    }

    fn set_window_creation_hint(&mut self, hint: WindowHint, value: i32) {
        let _ = (hint, value);
    }

    /// Pumps the underlying event source; flags and the event queue are
    /// updated as a side effect.
    fn poll_events(&mut self) {}

    fn drain_events(&mut self) -> Vec<WindowSystemEvent> {
        Vec::new()
    }

    /// Native window handle for GPU surface creation. Test doubles leave
    /// this at the default so they never touch windowing internals.
    fn native_window(&self, window: WindowId) -> Option<Arc<Window>> {
        let _ = window;
        None
    }
}

struct WindowEntry {
    id: WindowId,
    winit_id: winit::window::WindowId,
    window: Arc<Window>,
    name: String,
    should_close: bool,
    focused: bool,
}

/// The winit-backed window system used by the demo binary. Owns the event
/// loop and every spawned window; events are pumped with `run_return` and
/// queued for the owner to drain.
pub struct WinitWindowSystem {
    event_loop: EventLoop<()>,
    windows: Vec<WindowEntry>,
    monitors: Vec<MonitorHandle>,
    events: Vec<WindowSystemEvent>,
    hints: Vec<(WindowHint, i32)>,
    next_id: u64,
}

impl WinitWindowSystem {
    pub fn new() -> Self {
        let event_loop = EventLoop::new();
        let monitors: Vec<MonitorHandle> = event_loop.available_monitors().collect();
        info!("Window system started with {} monitor(s)", monitors.len());

        Self {
            event_loop,
            windows: Vec::new(),
            monitors,
            events: Vec::new(),
            hints: Vec::new(),
            next_id: 0,
        }
    }

    fn entry(&self, id: WindowId) -> Option<&WindowEntry> {
        self.windows.iter().find(|e| e.id == id)
    }

    fn hint_flag(&self, hint: WindowHint, default: bool) -> bool {
        self.hints
            .iter()
            .rev()
            .find(|(h, _)| *h == hint)
            .map(|(_, v)| *v != 0)
            .unwrap_or(default)
    }
}

impl Default for WinitWindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowSystem for WinitWindowSystem {
    fn is_vulkan_supported(&self) -> bool {
        vulkano::VulkanLibrary::new().is_ok()
    }

    fn create_window(
        &mut self,
        width: u32,
        height: u32,
        name: &str,
        monitor: Option<MonitorId>,
        shared: Option<WindowId>,
    ) -> Option<WindowId> {
        if shared.is_some() {
            // Context sharing is a GL concept; Vulkan resources are shared
            // through the instance instead.
            warn!("Shared windows are not supported, ignoring the parameter");
        }

        let fullscreen = monitor.and_then(|MonitorId(index)| {
            self.monitors
                .get(index)
                .cloned()
                .map(|handle| Fullscreen::Borderless(Some(handle)))
        });

        let built = WindowBuilder::new()
            .with_title(name)
            .with_inner_size(LogicalSize::new(width, height))
            .with_resizable(self.hint_flag(WindowHint::Resizable, true))
            .with_decorations(self.hint_flag(WindowHint::Decorated, true))
            .with_visible(self.hint_flag(WindowHint::Visible, true))
            .with_maximized(self.hint_flag(WindowHint::Maximized, false))
            .with_fullscreen(fullscreen)
            .build(&self.event_loop);

        let window = match built {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window {}: {}", name, e);
                return None;
            }
        };

        let id = WindowId(self.next_id);
        self.next_id += 1;

        info!("Window {} created ({}x{})", name, width, height);
        self.windows.push(WindowEntry {
            id,
            winit_id: window.id(),
            window: Arc::new(window),
            name: name.to_owned(),
            should_close: false,
            focused: false,
        });

        Some(id)
    }

    fn destroy_window(&mut self, window: WindowId) -> bool {
        let before = self.windows.len();
        self.windows.retain(|e| e.id != window);
        let destroyed = self.windows.len() != before;
        if destroyed {
            info!("Window {:?} destroyed", window);
        }
        destroyed
    }

    fn force_destroy_window(&mut self, window: WindowId) {
        self.windows.retain(|e| e.id != window);
    }

    fn should_close(&self, window: WindowId) -> bool {
        self.entry(window).map_or(true, |e| e.should_close)
    }

    fn window_size(&self, window: WindowId) -> Option<(u32, u32)> {
        self.entry(window).map(|e| {
            let size = e.window.inner_size();
            (size.width, size.height)
        })
    }

    fn window_name(&self, window: WindowId) -> Option<String> {
        self.entry(window).map(|e| e.name.clone())
    }

    fn focused_window(&self) -> Option<WindowId> {
        self.windows.iter().find(|e| e.focused).map(|e| e.id)
    }

    fn monitors(&self) -> Vec<MonitorId> {
        (0..self.monitors.len()).map(MonitorId).collect()
    }

    fn window_monitor(&self, window: WindowId) -> Option<MonitorId> {
        let entry = self.entry(window)?;
        let current = entry.window.current_monitor()?;
        self.monitors
            .iter()
            .position(|m| *m == current)
            .map(MonitorId)
    }

    fn set_window_monitor(
        &mut self,
        window: WindowId,
        monitor: Option<MonitorId>,
        position: (i32, i32),
        size: (u32, u32),
        refresh_rate: i32,
    ) {
        // Refresh rate only applies to exclusive fullscreen modes, which
        // borderless fullscreen does not use.
        let _ = refresh_rate;

        let handle = monitor.and_then(|MonitorId(index)| self.monitors.get(index).cloned());
        let Some(entry) = self.windows.iter().find(|e| e.id == window) else {
            warn!("set_window_monitor: unknown window {:?}", window);
            return;
        };

        match handle {
            Some(handle) => {
                entry
                    .window
                    .set_fullscreen(Some(Fullscreen::Borderless(Some(handle))));
            }
            None => {
                entry.window.set_fullscreen(None);
                entry
                    .window
                    .set_outer_position(PhysicalPosition::new(position.0, position.1));
                entry.window.set_inner_size(PhysicalSize::new(size.0, size.1));
            }
        }
    }

    fn set_window_creation_hint(&mut self, hint: WindowHint, value: i32) {
        self.hints.push((hint, value));
    }

    fn poll_events(&mut self) {
        let Self {
            event_loop,
            windows,
            events,
            ..
        } = self;

        event_loop.run_return(|event, _, control_flow| {
            // Pump pending events once, then hand control back.
            *control_flow = ControlFlow::Exit;

            let Event::WindowEvent { window_id, event } = event else {
                return;
            };
            let Some(entry) = windows.iter_mut().find(|e| e.winit_id == window_id) else {
                return;
            };

            match event {
                WinitWindowEvent::CloseRequested => {
                    entry.should_close = true;
                    events.push(WindowSystemEvent::CloseRequested { window: entry.id });
                }
                WinitWindowEvent::Resized(size) => {
                    events.push(WindowSystemEvent::Resized {
                        window: entry.id,
                        size: (size.width, size.height),
                    });
                }
                WinitWindowEvent::MouseWheel { delta, .. } => {
                    let delta = match delta {
                        MouseScrollDelta::LineDelta(_, y) => y,
                        MouseScrollDelta::PixelDelta(position) => position.y as f32 / 20.0,
                    };
                    events.push(WindowSystemEvent::Scroll {
                        window: entry.id,
                        delta,
                    });
                }
                WinitWindowEvent::CursorMoved { position, .. } => {
                    events.push(WindowSystemEvent::CursorMoved {
                        window: entry.id,
                        x: position.x,
                        y: position.y,
                    });
                }
                WinitWindowEvent::Focused(focused) => {
                    entry.focused = focused;
                    events.push(WindowSystemEvent::Focused {
                        window: entry.id,
                        focused,
                    });
                }
                _ => {}
            }
        });
    }

    fn drain_events(&mut self) -> Vec<WindowSystemEvent> {
        std::mem::take(&mut self.events)
    }

    fn native_window(&self, window: WindowId) -> Option<Arc<Window>> {
        self.entry(window).map(|e| e.window.clone())
    }
}
