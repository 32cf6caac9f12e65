//! Process-wide Vulkan context: the loaded library plus the instance every
//! renderer is created from.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info};
use vulkano::instance::{Instance, InstanceCreateInfo};
use vulkano::VulkanLibrary;

// At most one context may be live per process; all renderers depend on it
// for their entire lifetime.
static CONTEXT_LIVE: AtomicBool = AtomicBool::new(false);

/// The initialized GPU driver context. Created once, passed by handle into
/// every component that needs the instance; dropping it releases the
/// process-wide slot.
pub struct VulkanContext {
    instance: Arc<Instance>,
}

impl VulkanContext {
    /// Loads the Vulkan library and creates an instance with the
    /// extensions the windowing layer requires. Returns `None`, with the
    /// process-wide slot released, on any failure.
    pub fn initialize() -> Option<Self> {
        if CONTEXT_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            error!("A graphics context is already active in this process");
            return None;
        }

        let library = match VulkanLibrary::new() {
            Ok(library) => library,
            Err(e) => {
                error!("No local Vulkan library: {}", e);
                CONTEXT_LIVE.store(false, Ordering::SeqCst);
                return None;
            }
        };

        let enabled_extensions = vulkano_win::required_extensions(&library);
        let instance = match Instance::new(
            library,
            InstanceCreateInfo {
                enabled_extensions,
                ..Default::default()
            },
        ) {
            Ok(instance) => instance,
            Err(e) => {
                error!("Vulkan instance creation failed: {}", e);
                CONTEXT_LIVE.store(false, Ordering::SeqCst);
                return None;
            }
        };

        info!("Vulkan context initialized");
        Some(Self { instance })
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        CONTEXT_LIVE.store(false, Ordering::SeqCst);
        info!("Vulkan context deinitialized");
    }
}
