use ash::khr::swapchain;
use ash::vk;
use log::info;
use winit::window::Window;

use crate::renderer::device::VulkanDevice;
use crate::renderer::surface::VulkanSurface;
use crate::renderer::{RendererError, VulkanInstance};

pub const PREFERRED_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;
pub const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// Snapshot of what the surface supports on one device: limits, the ordered
/// format list and the set of present modes. Captured fresh on every query;
/// never cached across calls.
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        vulkan_surface: &VulkanSurface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, RendererError> {
        Ok(Self {
            capabilities: unsafe {
                vulkan_surface
                    .surface_loader
                    .get_physical_device_surface_capabilities(
                        physical_device,
                        vulkan_surface.surface,
                    )?
            },
            formats: unsafe {
                vulkan_surface
                    .surface_loader
                    .get_physical_device_surface_formats(physical_device, vulkan_surface.surface)?
            },
            present_modes: unsafe {
                vulkan_surface
                    .surface_loader
                    .get_physical_device_surface_present_modes(
                        physical_device,
                        vulkan_surface.surface,
                    )?
            },
        })
    }

    /// A surface is usable only with at least one format and one present mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// First entry matching the preferred 8-bit BGRA + sRGB nonlinear pair, in
/// list order. When nothing matches, the first advertised entry is used as
/// is; a deliberate simplification rather than a ranking of runners-up.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|surface_format| {
            surface_format.format == PREFERRED_FORMAT
                && surface_format.color_space == PREFERRED_COLOR_SPACE
        })
        .unwrap_or(formats[0])
}

/// Mailbox when available, for low latency triple buffering. Otherwise FIFO,
/// the one mode every driver must provide.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|present_mode| *present_mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface either dictates an exact extent, or reports the u32::MAX
/// sentinel meaning the window decides; in that case the preferred size is
/// clamped componentwise into the supported range.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    preferred: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min_extent = capabilities.min_image_extent;
    let max_extent = capabilities.max_image_extent;

    vk::Extent2D::default()
        .width(preferred.width.clamp(min_extent.width, max_extent.width))
        .height(preferred.height.clamp(min_extent.height, max_extent.height))
}

/// One image above the driver minimum so acquisition never waits on the
/// driver, clamped to the maximum when the surface has one (0 means none).
fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut image_count = capabilities.min_image_count + 1;

    if capabilities.max_image_count > 0 && image_count > capabilities.max_image_count {
        image_count = capabilities.max_image_count;
    }

    image_count
}

/// Final swapchain parameters, derived once from a support snapshot and
/// consumed verbatim by exactly one swapchain creation call.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    pub fn derive(
        support: &SwapchainSupport,
        preferred_extent: vk::Extent2D,
    ) -> Result<Self, RendererError> {
        // Selection already rejected devices with an empty snapshot, but this
        // is a fresh query; re-check instead of indexing into an empty list.
        if !support.is_adequate() {
            return Err(RendererError::InadequateSwapchain);
        }

        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, preferred_extent),
            image_count: choose_image_count(&support.capabilities),
        })
    }
}

pub struct VulkanSwapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub config: SwapchainConfig,
    pub swapchain_loader: swapchain::Device,
}

impl VulkanSwapchain {
    pub fn new(
        vk_instance: &VulkanInstance,
        vk_device: &VulkanDevice,
        vulkan_surface: &VulkanSurface,
        window: &Window,
    ) -> Result<Self, RendererError> {
        let support = SwapchainSupport::query(vulkan_surface, vk_device.p_device)?;

        let window_size = window.inner_size();
        let preferred_extent = vk::Extent2D::default()
            .width(window_size.width)
            .height(window_size.height);

        let config = SwapchainConfig::derive(&support, preferred_extent)?;

        info!(
            "Swapchain: {:?} {:?} {}x{}, {} images",
            config.surface_format.format,
            config.present_mode,
            config.extent.width,
            config.extent.height,
            config.image_count
        );

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(vulkan_surface.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1) // always 1 for non stereoscopic displays
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            // graphics and present share a family on the hardware we target
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform) // don't rotate the image
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE) // ignore the alpha channel
            .present_mode(config.present_mode)
            .clipped(true); // ignore pixels covered by other windows

        let swapchain_loader =
            swapchain::Device::new(&vk_instance.instance, &vk_device.device);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&swapchain_create_info, None)? };

        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

        let image_views = match Self::create_image_views(&images, config.surface_format.format, vk_device)
        {
            Ok(image_views) => image_views,
            Err(error) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(error.into());
            }
        };

        Ok(Self {
            swapchain,
            images,
            image_views,
            config,
            swapchain_loader,
        })
    }

    fn create_image_views(
        swapchain_images: &[vk::Image],
        image_format: vk::Format,
        vk_device: &VulkanDevice,
    ) -> Result<Vec<vk::ImageView>, vk::Result> {
        swapchain_images
            .iter()
            .map(|image| {
                let image_view_create_info = vk::ImageViewCreateInfo::default()
                    .image(*image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(image_format) // matches the swapchain format
                    .components(vk::ComponentMapping::default()) // identity swizzle
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .base_mip_level(0)
                            .level_count(1)
                            .base_array_layer(0)
                            .layer_count(1),
                    ); // one colour resource spanning the whole image
                unsafe {
                    vk_device
                        .device
                        .create_image_view(&image_view_create_info, None)
                }
            })
            .collect()
    }

    /// # Safety
    /// Destroy Before Vulkan Device
    /// Read VK Docs For Destruction Order
    pub unsafe fn destroy(&mut self, vk_device: &VulkanDevice) {
        unsafe {
            self.image_views
                .iter()
                .for_each(|iv| vk_device.device.destroy_image_view(*iv, None));
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(
        min_count: u32,
        max_count: u32,
        current: vk::Extent2D,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR::default()
            .min_image_count(min_count)
            .max_image_count(max_count)
            .current_extent(current)
            .min_image_extent(vk::Extent2D {
                width: 1,
                height: 1,
            })
            .max_image_extent(vk::Extent2D {
                width: 4096,
                height: 4096,
            })
    }

    const UNDECIDED: vk::Extent2D = vk::Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    };

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn format_prefers_bgra_srgb_pair() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            // right format, wrong colour space; must not match
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let chosen = choose_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn format_falls_back_to_first_entry() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R5G6B5_UNORM_PACK16,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        assert_eq!(
            choose_surface_format(&formats).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn format_selection_is_idempotent() {
        let formats = vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let first = choose_surface_format(&formats);
        let second = choose_surface_format(&formats);
        assert_eq!(first.format, second.format);
        assert_eq!(first.color_space, second.color_space);
    }

    #[test]
    fn present_mode_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];

        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = vec![vk::PresentModeKHR::FIFO];

        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_uses_preferred_size_when_window_decides() {
        let caps = capabilities(2, 0, UNDECIDED);

        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!(chosen.width, 800);
        assert_eq!(chosen.height, 600);
    }

    #[test]
    fn extent_clamps_preferred_size_to_bounds() {
        let caps = capabilities(2, 0, UNDECIDED);

        let too_big = choose_extent(&caps, extent(10_000, 5_000));
        assert_eq!(too_big.width, 4096);
        assert_eq!(too_big.height, 4096);

        let too_small = choose_extent(&caps, extent(0, 0));
        assert_eq!(too_small.width, 1);
        assert_eq!(too_small.height, 1);
    }

    #[test]
    fn extent_ignores_preference_when_surface_dictates() {
        let caps = capabilities(2, 0, extent(1920, 1080));

        let chosen = choose_extent(&caps, extent(800, 600));
        assert_eq!(chosen.width, 1920);
        assert_eq!(chosen.height, 1080);
    }

    #[test]
    fn image_count_is_one_above_minimum_when_unbounded() {
        let caps = capabilities(2, 0, UNDECIDED);

        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn image_count_clamps_to_maximum() {
        let caps = capabilities(2, 2, UNDECIDED);

        assert_eq!(choose_image_count(&caps), 2);
    }

    #[test]
    fn image_count_fits_under_roomy_maximum() {
        let caps = capabilities(2, 4, UNDECIDED);

        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn derive_rejects_empty_snapshot() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 0, UNDECIDED),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let result = SwapchainConfig::derive(&support, extent(800, 600));
        assert!(matches!(result, Err(RendererError::InadequateSwapchain)));
    }

    #[test]
    fn derive_produces_consistent_config() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 3, UNDECIDED),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        let config = SwapchainConfig::derive(&support, extent(800, 600)).unwrap();
        assert_eq!(config.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.extent.width, 800);
        assert_eq!(config.extent.height, 600);
        assert_eq!(config.image_count, 3);
    }
}
