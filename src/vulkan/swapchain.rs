//! Swapchain creation and recreation for one window surface.

use std::sync::Arc;

use anyhow::Result;
use log::info;
use vulkano::device::Device;
use vulkano::format::Format;
use vulkano::image::{ImageUsage, SwapchainImage};
use vulkano::swapchain::{ColorSpace, CompositeAlpha, Surface, Swapchain, SwapchainCreateInfo};

pub struct SwapchainBundle {
    pub swapchain: Arc<Swapchain>,
    pub images: Vec<Arc<SwapchainImage>>,
}

/// Creates the swapchain, preferring an sRGB BGRA format when the surface
/// offers one.
pub fn create_swapchain(
    device: Arc<Device>,
    surface: Arc<Surface>,
    extent: (u32, u32),
) -> Result<SwapchainBundle> {
    let capabilities = device
        .physical_device()
        .surface_capabilities(&surface, Default::default())?;
    let formats = device
        .physical_device()
        .surface_formats(&surface, Default::default())?;

    let (format, color_space) = formats
        .iter()
        .copied()
        .find(|&(format, color_space)| {
            format == Format::B8G8R8A8_SRGB && color_space == ColorSpace::SrgbNonLinear
        })
        .unwrap_or(formats[0]);

    let (swapchain, images) = Swapchain::new(
        device,
        surface,
        SwapchainCreateInfo {
            min_image_count: capabilities.min_image_count.max(2),
            image_format: Some(format),
            image_color_space: color_space,
            image_extent: [extent.0, extent.1],
            image_usage: ImageUsage::COLOR_ATTACHMENT,
            composite_alpha: CompositeAlpha::Opaque,
            ..Default::default()
        },
    )?;

    info!(
        "Swapchain created with format {:?} and {} images",
        format,
        images.len()
    );

    Ok(SwapchainBundle { swapchain, images })
}

/// Rebuilds the swapchain for a new extent, keeping the remaining
/// parameters from the old one.
pub fn recreate_swapchain(
    old_swapchain: Arc<Swapchain>,
    extent: (u32, u32),
) -> Result<SwapchainBundle> {
    let (swapchain, images) = old_swapchain.recreate(SwapchainCreateInfo {
        image_extent: [extent.0, extent.1],
        ..old_swapchain.create_info()
    })?;

    info!("Swapchain recreated with {} images", images.len());

    Ok(SwapchainBundle { swapchain, images })
}
