//! Physical-device selection and logical-device creation.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use vulkano::device::physical::{PhysicalDevice, PhysicalDeviceType};
use vulkano::device::{Device, DeviceCreateInfo, DeviceExtensions, Queue, QueueCreateInfo, QueueFlags};
use vulkano::instance::Instance;
use vulkano::swapchain::Surface;

fn required_extensions() -> DeviceExtensions {
    DeviceExtensions {
        khr_swapchain: true,
        ..DeviceExtensions::empty()
    }
}

/// Picks the most suitable GPU that can render to `surface`: it must carry
/// the swapchain extension and a queue family doing both graphics and
/// presentation; discrete GPUs win over integrated ones.
pub fn select_physical_device(
    instance: &Arc<Instance>,
    surface: &Arc<Surface>,
) -> Result<(Arc<PhysicalDevice>, u32)> {
    let device_extensions = required_extensions();

    let (physical_device, queue_family_index) = instance
        .enumerate_physical_devices()?
        .filter(|p| p.supported_extensions().contains(&device_extensions))
        .filter_map(|p| {
            p.queue_family_properties()
                .iter()
                .enumerate()
                .position(|(i, q)| {
                    q.queue_flags.contains(QueueFlags::GRAPHICS)
                        && p.surface_support(i as u32, surface).unwrap_or(false)
                })
                .map(|i| (p, i as u32))
        })
        .min_by_key(|(p, _)| match p.properties().device_type {
            PhysicalDeviceType::DiscreteGpu => 0,
            PhysicalDeviceType::IntegratedGpu => 1,
            PhysicalDeviceType::VirtualGpu => 2,
            PhysicalDeviceType::Cpu => 3,
            PhysicalDeviceType::Other => 4,
            _ => 5,
        })
        .ok_or_else(|| anyhow!("No suitable physical device found"))?;

    info!(
        "Selected physical device: {} (type: {:?})",
        physical_device.properties().device_name,
        physical_device.properties().device_type
    );

    Ok((physical_device, queue_family_index))
}

/// Creates the logical device and its single graphics/present queue.
pub fn create_logical_device(
    physical_device: Arc<PhysicalDevice>,
    queue_family_index: u32,
) -> Result<(Arc<Device>, Arc<Queue>)> {
    let (device, mut queues) = Device::new(
        physical_device,
        DeviceCreateInfo {
            queue_create_infos: vec![QueueCreateInfo {
                queue_family_index,
                ..Default::default()
            }],
            enabled_extensions: required_extensions(),
            ..Default::default()
        },
    )?;

    let queue = queues
        .next()
        .ok_or_else(|| anyhow!("Failed to get device queue"))?;

    info!("Logical device created");
    Ok((device, queue))
}
