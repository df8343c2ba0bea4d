pub mod device;
pub mod surface;
pub mod swapchain;

use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use log::{error, info, warn};
use std::borrow::Cow;
use std::error;
use std::ffi::{c_char, c_void, CStr};
use thiserror::Error;
use winit::raw_window_handle::HasDisplayHandle;
use winit::window::Window;

use crate::renderer::device::VulkanDevice;
use crate::renderer::surface::VulkanSurface;
use crate::renderer::swapchain::VulkanSwapchain;
use crate::utils::GameInfo;

pub const ENGINE_MAJOR: &str = env!("CARGO_PKG_VERSION_MAJOR");
pub const ENGINE_MINOR: &str = env!("CARGO_PKG_VERSION_MINOR");
pub const ENGINE_PATCH: &str = env!("CARGO_PKG_VERSION_PATCH");

/// Validation diagnostics are compiled in for debug builds only.
pub const ENABLE_VALIDATION: bool = cfg!(debug_assertions);

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Failures during renderer setup. Nothing here is recovered locally; every
/// variant aborts the whole initialisation sequence.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no compatible GPU found")]
    NoCompatibleHardware,
    #[error("validation layer requested but not available")]
    MissingValidationLayer,
    #[error("surface reports no formats or no present modes")]
    InadequateSwapchain,
    #[error("queue family role missing on the selected device")]
    MissingQueue,
    #[error("vulkan call failed: {0}")]
    Vk(#[from] vk::Result),
}

pub struct VulkanInstance {
    pub entry: Entry,
    pub instance: Instance,
    debug_messenger: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    pub fn new(
        game_info: &GameInfo,
        window_extensions: &[*const c_char],
    ) -> Result<Self, Box<dyn error::Error>> {
        // Load Vulkan Library
        let entry = unsafe { Entry::load()? };

        if ENABLE_VALIDATION && !validation_layer_available(&entry)? {
            return Err(RendererError::MissingValidationLayer.into());
        }

        let engine_version = vk::make_api_version(
            0,
            ENGINE_MAJOR.parse()?,
            ENGINE_MINOR.parse()?,
            ENGINE_PATCH.parse()?,
        );

        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::make_api_version(0, 1, 3, 0))
            .application_name(game_info.app_name)
            .application_version(vk::make_api_version(
                0,
                game_info.major,
                game_info.minor,
                game_info.patch,
            ))
            .engine_name(c"Boreal")
            .engine_version(engine_version);

        let mut extension_names = window_extensions.to_vec();
        if ENABLE_VALIDATION {
            extension_names.push(debug_utils::NAME.as_ptr());
        }

        let validation_layers = [VALIDATION_LAYER.as_ptr()];
        let layer_names: &[*const c_char] = if ENABLE_VALIDATION {
            &validation_layers
        } else {
            &[]
        };

        // chained into instance creation so messages during create/destroy of
        // the instance itself are also captured
        let mut debug_create_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(layer_names);
        if ENABLE_VALIDATION {
            create_info = create_info.push_next(&mut debug_create_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug_messenger = if ENABLE_VALIDATION {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let messenger = unsafe {
                loader.create_debug_utils_messenger(&debug_messenger_create_info(), None)?
            };
            Some((loader, messenger))
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_messenger,
        })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_messenger.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn validation_layer_available(entry: &Entry) -> Result<bool, RendererError> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };

    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().unwrap_or_default() == VALIDATION_LAYER))
}

fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

/// Forwards validation layer messages into the application log.
unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if p_callback_data.is_null() {
        Cow::Borrowed("")
    } else {
        let p_message = unsafe { (*p_callback_data).p_message };
        if p_message.is_null() {
            Cow::Borrowed("")
        } else {
            unsafe { CStr::from_ptr(p_message) }.to_string_lossy()
        }
    };

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("Validation: {message}");
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("Validation: {message}");
    } else {
        info!("Validation: {message}");
    }

    vk::FALSE
}

/// Owns the whole Vulkan session. Fields are populated in dependency order
/// (instance, surface, device, swapchain) and declared in teardown order: the
/// swapchain is destroyed first against the still-live device, then device,
/// surface and instance drop themselves.
pub struct VulkanContext {
    pub vulkan_swapchain: VulkanSwapchain,
    pub vulkan_device: VulkanDevice,
    pub vulkan_surface: VulkanSurface,
    pub vulkan_instance: VulkanInstance,
}

impl VulkanContext {
    pub fn new(game_info: &GameInfo, window: &Window) -> Result<Self, Box<dyn error::Error>> {
        let window_extensions =
            ash_window::enumerate_required_extensions(window.display_handle()?.as_raw())?;

        let vulkan_instance = VulkanInstance::new(game_info, window_extensions)?;
        let vulkan_surface = VulkanSurface::new(&vulkan_instance, window)?;
        let vulkan_device = VulkanDevice::new(&vulkan_instance, &vulkan_surface)?;
        let vulkan_swapchain =
            VulkanSwapchain::new(&vulkan_instance, &vulkan_device, &vulkan_surface, window)?;

        Ok(Self {
            vulkan_swapchain,
            vulkan_device,
            vulkan_surface,
            vulkan_instance,
        })
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe { self.vulkan_swapchain.destroy(&self.vulkan_device) };
    }
}
