use ash::{khr, vk, Device, Instance};
use log::info;
use std::collections::HashSet;
use std::ffi::{c_char, CStr};

use crate::renderer::surface::VulkanSurface;
use crate::renderer::swapchain::SwapchainSupport;
use crate::renderer::{RendererError, VulkanInstance};

/// Device extensions the renderer cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [khr::swapchain::NAME];

/// Queue family indices for the two roles the renderer needs. Drawing and
/// presenting are separate capabilities; one family often provides both, but
/// the roles are tracked independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyRoles {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyRoles {
    pub fn complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// Scans the queue families of a device in index order. The first family with
/// graphics support takes the graphics role and the first family that can
/// present to the surface takes the present role; the scan stops once both
/// roles are filled. Lowest matching index wins per role, even when a later
/// family could cover both roles at once.
pub fn find_queue_family_roles(
    vulkan_surface: &VulkanSurface,
    physical_device: vk::PhysicalDevice,
    instance: &Instance,
) -> Result<QueueFamilyRoles, RendererError> {
    let queue_family_properties =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

    let mut roles = QueueFamilyRoles::default();

    for (index, queue_family) in queue_family_properties.iter().enumerate() {
        let index = index as u32;

        if roles.graphics.is_none() && queue_family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            roles.graphics = Some(index);
        }

        if roles.present.is_none()
            && vulkan_surface.queue_supports_surface(physical_device, index)?
        {
            roles.present = Some(index);
        }

        if roles.complete() {
            break;
        }
    }

    Ok(roles)
}

/// Extension support is decided by set difference: start from the full
/// required set and cross off everything the device advertises. Support holds
/// iff nothing is left over.
fn supports_required_extensions(
    physical_device: vk::PhysicalDevice,
    instance: &Instance,
) -> Result<bool, RendererError> {
    let available = unsafe { instance.enumerate_device_extension_properties(physical_device)? };

    let mut missing: HashSet<&CStr> = REQUIRED_DEVICE_EXTENSIONS.iter().copied().collect();
    for extension in &available {
        missing.remove(extension.extension_name_as_c_str().unwrap_or_default());
    }

    Ok(missing.is_empty())
}

/// Everything selection needs to know about one candidate, captured in a
/// single probing pass. Recomputed for every candidate on every selection
/// run; nothing is cached between passes.
#[derive(Debug, Clone, Copy)]
pub struct DeviceAssessment {
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    pub queue_roles: QueueFamilyRoles,
    pub extensions_supported: bool,
    pub swapchain_adequate: bool,
}

fn assess_device(
    vulkan_surface: &VulkanSurface,
    physical_device: vk::PhysicalDevice,
    instance: &Instance,
) -> Result<DeviceAssessment, RendererError> {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    let features = unsafe { instance.get_physical_device_features(physical_device) };

    let queue_roles = find_queue_family_roles(vulkan_surface, physical_device, instance)?;
    let extensions_supported = supports_required_extensions(physical_device, instance)?;

    // Surface queries are meaningless on a device without the swapchain
    // extension, so adequacy is only probed once extension support is known.
    let swapchain_adequate = if extensions_supported {
        SwapchainSupport::query(vulkan_surface, physical_device)?.is_adequate()
    } else {
        false
    };

    Ok(DeviceAssessment {
        device_type: properties.device_type,
        max_image_dimension_2d: properties.limits.max_image_dimension2_d,
        geometry_shader: features.geometry_shader == vk::TRUE,
        queue_roles,
        extensions_supported,
        swapchain_adequate,
    })
}

/// The one authoritative suitability check. Scoring uses it as its veto, and
/// any caller wanting a plain yes/no answer must use it too rather than
/// restating individual constraints.
pub fn is_eligible(assessment: &DeviceAssessment) -> bool {
    assessment.geometry_shader
        && assessment.queue_roles.complete()
        && assessment.extensions_supported
        && assessment.swapchain_adequate
}

/// Weighted capability heuristic. Discrete cards dominate, complete queue
/// roles add a little, and the maximum 2D image dimension stands in for
/// texture quality. An ineligible device always scores zero. Note that a
/// discrete GPU is a preference, not a gate: an integrated card that passes
/// the veto is still selectable.
pub fn score_device(assessment: &DeviceAssessment) -> u64 {
    if !is_eligible(assessment) {
        return 0;
    }

    let mut score: u64 = 0;

    if assessment.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += 1000;
    }

    if assessment.queue_roles.complete() {
        score += 10;
    }

    score + u64::from(assessment.max_image_dimension_2d)
}

/// Keeps the highest strictly positive score; on ties the earliest candidate
/// wins, so selection is deterministic in enumeration order.
fn select_best<T>(candidates: impl IntoIterator<Item = (u64, T)>) -> Option<T> {
    let mut best: Option<(u64, T)> = None;

    for (score, candidate) in candidates {
        let beats_best = best
            .as_ref()
            .map_or(true, |(best_score, _)| score > *best_score);
        if score > 0 && beats_best {
            best = Some((score, candidate));
        }
    }

    best.map(|(_, candidate)| candidate)
}

/// Enumerates every physical device once, scores each, and returns the best
/// scoring one together with its queue roles. Fails when nothing scores above
/// zero, including when no device is present at all.
pub fn pick_physical_device(
    vulkan_surface: &VulkanSurface,
    instance: &Instance,
) -> Result<(vk::PhysicalDevice, QueueFamilyRoles), RendererError> {
    let physical_devices = unsafe { instance.enumerate_physical_devices()? };

    let mut candidates = Vec::with_capacity(physical_devices.len());
    for physical_device in physical_devices {
        let assessment = assess_device(vulkan_surface, physical_device, instance)?;
        candidates.push((
            score_device(&assessment),
            (physical_device, assessment.queue_roles),
        ));
    }

    select_best(candidates).ok_or(RendererError::NoCompatibleHardware)
}

pub struct VulkanDevice {
    pub p_device: vk::PhysicalDevice,
    pub device: Device,
    pub queue_roles: QueueFamilyRoles,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl VulkanDevice {
    pub fn new(
        instance: &VulkanInstance,
        vulkan_surface: &VulkanSurface,
    ) -> Result<Self, RendererError> {
        let instance = &instance.instance;

        let (p_device, queue_roles) = pick_physical_device(vulkan_surface, instance)?;

        let properties = unsafe { instance.get_physical_device_properties(p_device) };

        let api_version = properties.api_version;
        info!(
            "VK Device Version: {}.{}.{}",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version)
        );

        if let Ok(device_name) = properties.device_name_as_c_str() {
            info!("VK Device Name: {}", device_name.to_string_lossy());
        }

        info!(
            "VK Device Memory: {}MiB",
            physical_device_memory_size(p_device, instance)
        );

        let graphics_family = queue_roles.graphics.ok_or(RendererError::MissingQueue)?;
        let present_family = queue_roles.present.ok_or(RendererError::MissingQueue)?;

        // one create info per unique family; both roles usually share one
        let mut unique_families = vec![graphics_family];
        if present_family != graphics_family {
            unique_families.push(present_family);
        }

        let priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(*family)
                    .queue_priorities(&priorities)
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures::default().geometry_shader(true);

        let device_extension_names: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extension_names)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(p_device, &device_create_info, None)? };

        // queues come into existence with the device; just fetch the handles
        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0u32) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0u32) };

        Ok(Self {
            p_device,
            device,
            queue_roles,
            graphics_queue,
            present_queue,
        })
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            //must be dropped before instance
            self.device.device_wait_idle().unwrap();
            self.device.destroy_device(None);
        };
    }
}

// total device local memory in MiB, for the selection log
pub fn physical_device_memory_size(physical_device: vk::PhysicalDevice, instance: &Instance) -> u64 {
    let memory_properties =
        unsafe { instance.get_physical_device_memory_properties(physical_device) };

    memory_properties
        .memory_heaps
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size / (1024 * 1024))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible_assessment(device_type: vk::PhysicalDeviceType, max_dim: u32) -> DeviceAssessment {
        DeviceAssessment {
            device_type,
            max_image_dimension_2d: max_dim,
            geometry_shader: true,
            queue_roles: QueueFamilyRoles {
                graphics: Some(0),
                present: Some(0),
            },
            extensions_supported: true,
            swapchain_adequate: true,
        }
    }

    #[test]
    fn discrete_gpu_outscores_integrated() {
        let integrated = eligible_assessment(vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);
        let discrete = eligible_assessment(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);

        assert_eq!(score_device(&integrated), 10 + 4096);
        assert_eq!(score_device(&discrete), 1000 + 10 + 8192);

        let picked = select_best(vec![
            (score_device(&integrated), "integrated"),
            (score_device(&discrete), "discrete"),
        ]);
        assert_eq!(picked, Some("discrete"));
    }

    #[test]
    fn integrated_gpu_is_selectable_on_its_own() {
        let integrated = eligible_assessment(vk::PhysicalDeviceType::INTEGRATED_GPU, 4096);

        assert!(is_eligible(&integrated));
        assert_eq!(
            select_best(vec![(score_device(&integrated), "integrated")]),
            Some("integrated")
        );
    }

    #[test]
    fn missing_geometry_shader_vetoes_score() {
        let mut assessment = eligible_assessment(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        assessment.geometry_shader = false;

        assert!(!is_eligible(&assessment));
        assert_eq!(score_device(&assessment), 0);
    }

    #[test]
    fn incomplete_queue_roles_veto_score() {
        let mut assessment = eligible_assessment(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        assessment.queue_roles.present = None;

        assert_eq!(score_device(&assessment), 0);
    }

    #[test]
    fn unsupported_extensions_veto_score() {
        let mut assessment = eligible_assessment(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        assessment.extensions_supported = false;
        // adequacy is never probed without extension support
        assessment.swapchain_adequate = false;

        assert_eq!(score_device(&assessment), 0);
    }

    #[test]
    fn inadequate_swapchain_vetoes_score() {
        let mut assessment = eligible_assessment(vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        assessment.swapchain_adequate = false;

        assert_eq!(score_device(&assessment), 0);
    }

    #[test]
    fn all_vetoed_candidates_select_nothing() {
        let picked: Option<&str> = select_best(vec![(0, "a"), (0, "b"), (0, "c")]);
        assert_eq!(picked, None);
    }

    #[test]
    fn empty_candidate_list_selects_nothing() {
        let picked: Option<&str> = select_best(vec![]);
        assert_eq!(picked, None);
    }

    #[test]
    fn equal_scores_pick_first_enumerated() {
        let picked = select_best(vec![(5, "first"), (5, "second")]);
        assert_eq!(picked, Some("first"));
    }

    #[test]
    fn queue_roles_complete_requires_both() {
        let graphics_only = QueueFamilyRoles {
            graphics: Some(1),
            present: None,
        };
        let both = QueueFamilyRoles {
            graphics: Some(1),
            present: Some(2),
        };

        assert!(!QueueFamilyRoles::default().complete());
        assert!(!graphics_only.complete());
        assert!(both.complete());
    }
}
