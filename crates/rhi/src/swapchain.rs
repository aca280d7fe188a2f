//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] owns the presentable images' views, the chosen surface
//! format, present mode and extent. Acquire and present report
//! out-of-date and suboptimal results as values ([`AcquireOutcome`],
//! [`PresentOutcome`]) rather than errors, so the caller can run the
//! recreation protocol without unwinding.
//!
//! A zero-sized extent is rejected: a minimized window must be waited out
//! before creating or recreating.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::context::GpuContext;
//! use renderer_rhi::swapchain::{AcquireOutcome, Swapchain};
//! use renderer_rhi::vk;
//!
//! # fn example(context: &GpuContext, semaphore: vk::Semaphore) -> renderer_rhi::RhiResult<()> {
//! let mut swapchain = Swapchain::new(context, vk::Extent2D { width: 800, height: 600 }, true)?;
//!
//! match swapchain.acquire_next_image(semaphore)? {
//!     AcquireOutcome::Acquired { index, .. } => { /* record into image `index` */ }
//!     AcquireOutcome::OutOfDate => swapchain.recreate(context, vk::Extent2D { width: 1024, height: 768 })?,
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::context::GpuContext;
use crate::device::Device;
use crate::error::RhiError;

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (image counts, extents, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format and color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, min images {}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True if at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Result of acquiring a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. When `suboptimal` is set the frame may still be
    /// rendered, but the swapchain should be recreated after presenting.
    Acquired { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Result of presenting a swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally.
    Presented,
    /// Presented, but the swapchain should be recreated.
    Suboptimal,
    /// Not presented. The swapchain must be recreated.
    OutOfDate,
}

impl PresentOutcome {
    /// True when the swapchain should be recreated.
    #[inline]
    pub fn needs_recreation(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Vulkan swapchain wrapper.
///
/// Not thread-safe; one thread drives acquire and present.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    vsync: bool,
}

impl Swapchain {
    /// Creates a new swapchain.
    ///
    /// Images are usable as color attachments and as transfer destinations,
    /// so an offscreen target can be copied straight into them.
    ///
    /// # Arguments
    ///
    /// * `context` - The GPU context owning the surface and device
    /// * `extent` - Desired size, normally the window's framebuffer size
    /// * `vsync` - Use FIFO. Otherwise MAILBOX is preferred when available
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] for a zero extent or an
    /// inadequate surface, or the driver error if creation fails.
    pub fn new(context: &GpuContext, extent: vk::Extent2D, vsync: bool) -> Result<Self, RhiError> {
        let loader = ash::khr::swapchain::Device::new(context.instance().handle(), context.device().handle());
        let mut swapchain = Self {
            device: context.device().clone(),
            swapchain_loader: loader,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent,
            present_mode: vk::PresentModeKHR::FIFO,
            vsync,
        };
        swapchain.create_internal(context, extent, vk::SwapchainKHR::null())?;
        Ok(swapchain)
    }

    fn create_internal(
        &mut self,
        context: &GpuContext,
        requested: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<(), RhiError> {
        if requested.width == 0 || requested.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "refusing to create a {}x{} swapchain",
                requested.width, requested.height
            )));
        }

        let surface = context.surface();
        let support = SwapchainSupportDetails::query(
            self.device.physical_device(),
            surface.handle(),
            surface.loader(),
        )?;

        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, self.vsync);
        let extent = choose_extent(&support.capabilities, requested.width, requested.height);
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(
                "surface reports a zero extent".to_string(),
            ));
        }
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let queue_families = self.device.queue_families();
        let graphics_family = queue_families.graphics_family.unwrap_or_default();
        let present_family = queue_families.present_family.unwrap_or(graphics_family);
        let family_indices = [graphics_family, present_family];

        let (sharing_mode, family_slice) = if graphics_family != present_family {
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_slice)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };
        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };
        let image_views = match create_image_views(&self.device, &images, surface_format.format) {
            Ok(views) => views,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        self.swapchain = swapchain;
        self.images = images;
        self.image_views = image_views;
        self.format = surface_format.format;
        self.color_space = surface_format.color_space;
        self.extent = extent;
        self.present_mode = present_mode;

        info!("Swapchain created with {} images", self.images.len());
        Ok(())
    }

    /// Recreates the swapchain at a new size.
    ///
    /// Waits for the device to go idle, destroys the image views, creates the
    /// replacement from the old handle and then destroys the old swapchain.
    /// Anything else referencing the old views or extent must already be gone.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero extent or a failed creation. On failure the
    /// swapchain has no images and must be recreated again before use.
    pub fn recreate(&mut self, context: &GpuContext, extent: vk::Extent2D) -> Result<(), RhiError> {
        self.device.wait_idle()?;

        info!("Recreating swapchain for {}x{}", extent.width, extent.height);

        self.destroy_image_views();
        self.images.clear();

        let old_swapchain = std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null());
        let result = self.create_internal(context, extent, old_swapchain);

        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }

        result
    }

    /// Acquires the next image, signaling `semaphore` when it is ready.
    ///
    /// # Errors
    ///
    /// Returns driver errors other than out-of-date, which is reported as
    /// [`AcquireOutcome::OutOfDate`].
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome, RhiError> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Presents `image_index` on `queue` after `wait_semaphore` signals.
    ///
    /// # Errors
    ///
    /// Returns driver errors other than out-of-date.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome, RhiError> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let _queues = self.device.lock_queues()?;
            unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
        };
        classify_present(result)
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain color space.
    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    /// Returns the swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image at `index`, if any.
    #[inline]
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    /// Returns the image view at `index`, if any.
    #[inline]
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> Result<AcquireOutcome, RhiError> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

fn classify_present(result: Result<bool, vk::Result>) -> Result<PresentOutcome, RhiError> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(e.into()),
    }
}

/// Prefers B8G8R8A8_SRGB, then B8G8R8A8_UNORM (both SRGB_NONLINEAR), then the
/// first reported format.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM");
        return format;
    }

    let first = formats.first().copied().unwrap_or_default();
    warn!("Using first available surface format: {:?}", first.format);
    first
}

/// FIFO when vsync is requested (always available). Otherwise MAILBOX, then
/// IMMEDIATE, then FIFO.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Uses the surface's current extent when defined, otherwise clamps the
/// requested size to the surface limits.
fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum when there is one.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> Result<Vec<vk::ImageView>, RhiError> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(crate::barrier::subresource_range(vk::ImageAspectFlags::COLOR));

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create image view {}: {:?}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}
