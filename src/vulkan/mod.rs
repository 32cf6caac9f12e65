//! Vulkan backend: context lifecycle and renderer construction on top of
//! the windowing layer.

pub mod context;
pub mod device;
pub mod pipeline;
pub mod renderer;
pub mod shader;
pub mod swapchain;

pub use context::VulkanContext;
pub use renderer::VulkanRenderer;
pub use shader::ShaderProgram;

use log::error;

use crate::assets::AssetStorage;
use crate::camera::SharedCamera;
use crate::graphics::GraphicsBackend;
use crate::renderer::Renderer;
use crate::window::{WindowId, WindowSystem};

/// Default asset root for the binary; shader identifiers are resolved
/// relative to it.
const ASSET_ROOT: &str = "data";

/// The Vulkan half of the orchestrator. Holds the process context while
/// initialized and builds a [`VulkanRenderer`] per bound window.
pub struct VulkanBackend {
    context: Option<VulkanContext>,
    assets: AssetStorage,
}

impl VulkanBackend {
    pub fn new() -> Self {
        Self::with_assets(AssetStorage::new(ASSET_ROOT))
    }

    /// Backend with a caller-provided asset storage, letting shaders come
    /// from memory instead of disk.
    pub fn with_assets(assets: AssetStorage) -> Self {
        Self {
            context: None,
            assets,
        }
    }
}

impl Default for VulkanBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for VulkanBackend {
    fn is_supported(&self, system: &dyn WindowSystem) -> bool {
        system.is_vulkan_supported()
    }

    fn initialize(&mut self) -> bool {
        match VulkanContext::initialize() {
            Some(context) => {
                self.context = Some(context);
                true
            }
            None => false,
        }
    }

    fn deinitialize(&mut self) {
        self.context = None;
    }

    fn create_renderer(
        &self,
        system: &dyn WindowSystem,
        window: WindowId,
        camera: SharedCamera,
    ) -> Option<Box<dyn Renderer>> {
        let Some(context) = self.context.as_ref() else {
            error!("Vulkan context is not initialized");
            return None;
        };
        let Some(native) = system.native_window(window) else {
            error!("Window {:?} has no native handle", window);
            return None;
        };

        match VulkanRenderer::new(
            context.instance().clone(),
            native,
            window,
            camera,
            &self.assets,
        ) {
            Ok(renderer) => Some(Box::new(renderer)),
            Err(e) => {
                error!("Can't create Vulkan renderer for window {:?}: {:#}", window, e);
                None
            }
        }
    }
}
