//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! The physical device selection process involves:
//! 1. Enumerating all available GPUs
//! 2. Checking each GPU for the graphics and present queue families
//! 3. Verifying the required device extensions, features and API version
//! 4. Selecting the highest rated GPU (discrete GPUs first)
//!
//! A GPU missing a required extension is never selected; if no GPU qualifies
//! initialization fails, since there is no fallback path.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new(false, None)?;
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! println!("Selected GPU: {}", device_info.device_name());
//! # Ok::<(), renderer_rhi::RhiError>(())
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Device extensions the renderer cannot run without.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 2] =
    [ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Queue family indices for the queues the renderer uses.
///
/// Graphics, present and transfer may all name the same family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics operations.
    pub graphics_family: Option<u32>,
    /// Family supporting presentation to the surface.
    pub present_family: Option<u32>,
    /// Family used for uploads. Falls back to graphics.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if the graphics and present families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns true when uploads run on a family other than graphics.
    #[inline]
    pub fn has_dedicated_transfer(&self) -> bool {
        self.transfer_family.is_some() && self.transfer_family != self.graphics_family
    }

    /// Returns the unique queue family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        if let Some(transfer) = self.transfer_family
            && !families.contains(&transfer)
        {
            families.push(transfer);
        }

        families
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
    /// Whether the graphics family can write timestamps.
    pub timestamps_supported: bool,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }

    /// Minimum alignment for dynamic uniform buffer offsets.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Minimum alignment for storage buffer offsets.
    #[inline]
    pub fn min_storage_buffer_offset_alignment(&self) -> u64 {
        self.properties.limits.min_storage_buffer_offset_alignment
    }

    /// Nanoseconds per timestamp tick.
    #[inline]
    pub fn timestamp_period(&self) -> f32 {
        self.properties.limits.timestamp_period
    }

    /// Whether pipeline statistics queries may be enabled.
    #[inline]
    pub fn supports_pipeline_statistics(&self) -> bool {
        self.features.pipeline_statistics_query == vk::TRUE
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for rendering.
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `surface` - The window surface for present support checking
/// * `surface_loader` - The surface extension loader
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU has the required queues and
/// features, or [`RhiError::MissingDeviceExtensions`] if the only otherwise
/// usable GPUs lack required extensions.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut suitable_devices: Vec<(PhysicalDeviceInfo, u32)> = Vec::new();
    let mut missing: Option<Vec<String>> = None;

    for device in devices {
        match check_device_suitability(instance, device, surface, surface_loader) {
            Ok(Some(info)) => {
                let score = rate_device(&info);
                debug!(
                    "GPU '{}' ({}) - Score: {}",
                    info.device_name(),
                    info.device_type_name(),
                    score
                );
                suitable_devices.push((info, score));
            }
            Ok(None) => {}
            Err(RhiError::MissingDeviceExtensions(names)) => {
                missing.get_or_insert(names);
            }
            Err(e) => return Err(e),
        }
    }

    suitable_devices.sort_by(|a, b| b.1.cmp(&a.1));
    let Some((selected_device, score)) = suitable_devices.into_iter().next() else {
        warn!("No suitable GPU found with required capabilities");
        return Err(match missing {
            Some(names) => RhiError::MissingDeviceExtensions(names),
            None => RhiError::NoSuitableGpu,
        });
    };

    let (major, minor, patch) = selected_device.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected_device.device_name(),
        selected_device.device_type_name(),
        major,
        minor,
        patch,
        score
    );

    Ok(selected_device)
}

/// Returns `Ok(None)` when the device lacks queues or features, and an error
/// naming the missing extensions when only extensions are lacking.
fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<Option<PhysicalDeviceInfo>, RhiError> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown");

    let queue_families = pick_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing required queue families (graphics={}, present={})",
            device_name,
            queue_families.graphics_family.is_some(),
            queue_families.present_family.is_some()
        );
        return Ok(None);
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!("GPU '{}' skipped: sampler anisotropy not supported", device_name);
        return Ok(None);
    }

    if properties.api_version < vk::API_VERSION_1_3 {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return Ok(None);
    }

    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let available: Vec<&CStr> = available
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .collect();
    let missing = missing_extensions(&available, &REQUIRED_DEVICE_EXTENSIONS);
    if !missing.is_empty() {
        debug!("GPU '{}' skipped: missing extensions {:?}", device_name, missing);
        return Err(RhiError::MissingDeviceExtensions(missing));
    }

    let timestamps_supported = queue_families
        .graphics_family
        .and_then(|index| families.get(index as usize))
        .is_some_and(|family| family.timestamp_valid_bits > 0);

    Ok(Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        timestamps_supported,
    }))
}

/// Names of the `required` extensions absent from `available`.
pub fn missing_extensions(available: &[&CStr], required: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Chooses graphics, present and transfer families.
///
/// The first graphics family wins. Present prefers the graphics family when it
/// can present. Transfer prefers a family with neither graphics nor compute,
/// then any other transfer-capable family, then graphics.
pub fn pick_queue_families(
    families: &[vk::QueueFamilyProperties],
    present_support: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();
    let mut dedicated_transfer: Option<u32> = None;
    let mut other_transfer: Option<u32> = None;

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        let has_graphics = family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let has_compute = family.queue_flags.contains(vk::QueueFlags::COMPUTE);
        let has_transfer = family.queue_flags.contains(vk::QueueFlags::TRANSFER);

        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }

        if has_transfer && !has_graphics {
            if !has_compute && dedicated_transfer.is_none() {
                dedicated_transfer = Some(i);
            } else if other_transfer.is_none() {
                other_transfer = Some(i);
            }
        }
    }

    indices.present_family = match indices.graphics_family {
        Some(graphics) if present_support(graphics) => Some(graphics),
        _ => (0..families.len() as u32)
            .find(|&i| families[i as usize].queue_count > 0 && present_support(i)),
    };

    indices.transfer_family = dedicated_transfer
        .or(other_transfer)
        .or(indices.graphics_family);

    indices
}

fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.queue_families.has_dedicated_transfer() {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(!indices.has_dedicated_transfer());
    }

    #[test]
    fn test_unique_families_with_duplicates() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            transfer_family: Some(1),
        };
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_unique_families_all_same() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
            transfer_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_single_family_serves_everything() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.transfer_family, Some(0));
        assert!(!indices.has_dedicated_transfer());
    }

    #[test]
    fn test_prefers_dedicated_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.transfer_family, Some(2));
        assert!(indices.has_dedicated_transfer());
    }

    #[test]
    fn test_async_compute_family_used_for_transfer() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.transfer_family, Some(1));
    }

    #[test]
    fn test_present_on_separate_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = pick_queue_families(&families, |i| i == 2);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(2));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_no_present_support() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_empty_families_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_missing_extensions() {
        let available = [ash::khr::swapchain::NAME];
        let missing = missing_extensions(&available, &REQUIRED_DEVICE_EXTENSIONS);
        assert_eq!(missing, vec!["VK_KHR_dynamic_rendering".to_string()]);
    }

    #[test]
    fn test_no_missing_extensions() {
        let available = [
            ash::khr::dynamic_rendering::NAME,
            ash::ext::debug_utils::NAME,
            ash::khr::swapchain::NAME,
        ];
        assert!(missing_extensions(&available, &REQUIRED_DEVICE_EXTENSIONS).is_empty());
    }
}
