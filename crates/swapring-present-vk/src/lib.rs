// SPDX-License-Identifier: CEPL-1.0
//! Vulkan implementation of [`PresentBackend`] on top of `ash`.

#![deny(unsafe_op_in_unsafe_fn)]

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Entry, Instance};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use swapring_present::{
    select_queue_family, AcquireStatus, BackendError, BackendResult, CapabilityError, ColorFormat,
    Configuration, PresentBackend, PresentMode, PresentStatus, QueueFamilyInfo,
    SurfaceCapabilities, SurfaceFormat,
};

pub mod clear;
pub mod convert;
mod validation;

pub use clear::ClearPass;

use convert::{cs_name, fmt_name, pm_name};
use validation::DebugState;

/// Surface + logical device. Destroyed in reverse creation order on drop;
/// the engine owning this backend must have released its swapchains first.
pub struct VkBackend {
    _entry: Entry,
    instance: Instance,
    debug: DebugState,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    device: ash::Device,
    queue_family: u32,
    queue: vk::Queue,

    swapchain_loader: swapchain::Device,

    // one-shot layout transitions at ring creation
    transition_pool: vk::CommandPool,
    transition_fence: vk::Fence,
}

fn vk_err(call: &'static str) -> impl Fn(vk::Result) -> BackendError {
    move |e| BackendError::new(call, e)
}

unsafe fn create_instance(
    entry: &Entry,
    display: raw_window_handle::RawDisplayHandle,
    dbg: &validation::DebugRequest,
) -> Result<Instance> {
    let app = c"swapring";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let wsi = ash_window::enumerate_required_extensions(display)
        .context("enumerate_required_extensions")?;
    let mut exts = wsi.to_vec();
    exts.extend_from_slice(&dbg.extensions);

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: exts.len() as u32,
        pp_enabled_extension_names: exts.as_ptr(),
        enabled_layer_count: dbg.layers.len() as u32,
        pp_enabled_layer_names: dbg.layers.as_ptr(),
        ..Default::default()
    };

    Ok(unsafe { entry.create_instance(&create_info, None) }?)
}

unsafe fn queue_family_infos(
    instance: &Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> BackendResult<Vec<QueueFamilyInfo>> {
    let props = unsafe { instance.get_physical_device_queue_family_properties(phys) };
    let mut out = Vec::with_capacity(props.len());
    for (i, q) in props.iter().enumerate() {
        let index = i as u32;
        let supports_present = unsafe {
            surface_loader.get_physical_device_surface_support(phys, index, surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfaceSupportKHR"))?;
        out.push(QueueFamilyInfo {
            index,
            flags: convert::queue_flags_from_vk(q.queue_flags),
            supports_present,
        });
    }
    Ok(out)
}

/// First physical device with one queue family that both renders and
/// presents. The last rejection reason is reported when none qualifies.
unsafe fn pick_device_and_queue(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, u32)> {
    let mut last: Option<CapabilityError> = None;
    for phys in unsafe { instance.enumerate_physical_devices() }? {
        let families = unsafe { queue_family_infos(instance, surface_loader, phys, surface) }
            .map_err(CapabilityError::from);
        match families.and_then(|f| select_queue_family(&f)) {
            Ok(family) => return Ok((phys, family)),
            Err(e) => {
                let props = unsafe { instance.get_physical_device_properties(phys) };
                let name = props
                    .device_name_as_c_str()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                debug!("vk: skipping device {name}: {e}");
                last = Some(e);
            }
        }
    }
    Err(match last {
        Some(e) => anyhow!(e).context("no suitable physical device/queue family"),
        None => anyhow!("no Vulkan physical devices"),
    })
}

impl VkBackend {
    pub fn new(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        unsafe { Self::build(window, display) }
    }

    // STRICT ORDER:
    // 1) instance (WSI + optional debug ext)
    // 2) surface from this instance
    // 3) physical device/queue chosen against this surface
    // 4) device, then per-device loaders and objects
    unsafe fn build(window: &dyn HasWindowHandle, display: &dyn HasDisplayHandle) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("{e}"))?
            .as_raw();
        let wh = window.window_handle().map_err(|e| anyhow!("{e}"))?.as_raw();

        let entry = Entry::linked();
        let dbg = unsafe { validation::request(&entry) };
        let instance = unsafe { create_instance(&entry, dh, &dbg) }
            .context("create_instance (WSI + optional debug ext)")?;
        let debug = unsafe { validation::create_messenger(&entry, &instance, &dbg) }?;

        let surface_loader = surface::Instance::new(&entry, &instance);
        let surface = unsafe { ash_window::create_surface(&entry, &instance, dh, wh, None) }
            .context("ash_window::create_surface")?;

        let (phys, queue_family) =
            unsafe { pick_device_and_queue(&instance, &surface_loader, surface) }?;

        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let device_exts = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            ..Default::default()
        };
        let device =
            unsafe { instance.create_device(phys, &dinfo, None) }.context("create_device")?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::TRANSIENT,
            ..Default::default()
        };
        let transition_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .context("create_command_pool(transition)")?;
        let transition_fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .context("create_fence(transition)")?;

        let props = unsafe { instance.get_physical_device_properties(phys) };
        info!(
            "vk: device {:?}, queue family {}",
            props.device_name_as_c_str().unwrap_or(c"?"),
            queue_family
        );

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            surface_loader,
            surface,
            phys,
            device,
            queue_family,
            queue,
            swapchain_loader,
            transition_pool,
            transition_fence,
        })
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    unsafe fn record_transitions(&self, cmd: vk::CommandBuffer, images: &[vk::Image]) -> BackendResult<()> {
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        unsafe {
            self.device
                .begin_command_buffer(cmd, &begin)
                .map_err(vk_err("vkBeginCommandBuffer"))?;
        }

        let barriers: Vec<vk::ImageMemoryBarrier> = images
            .iter()
            .map(|&image| vk::ImageMemoryBarrier {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
                src_access_mask: vk::AccessFlags::empty(),
                dst_access_mask: vk::AccessFlags::empty(),
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image,
                subresource_range: color_subresource(),
                ..Default::default()
            })
            .collect();
        unsafe {
            self.device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &barriers,
            );
            self.device
                .end_command_buffer(cmd)
                .map_err(vk_err("vkEndCommandBuffer"))
        }
    }
}

pub(crate) fn color_subresource() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

impl PresentBackend for VkBackend {
    type Image = vk::Image;
    type View = vk::ImageView;
    type Swapchain = vk::SwapchainKHR;
    type Semaphore = vk::Semaphore;

    fn queue_families(&self) -> BackendResult<Vec<QueueFamilyInfo>> {
        unsafe { queue_family_infos(&self.instance, &self.surface_loader, self.phys, self.surface) }
    }

    fn surface_capabilities(&self) -> BackendResult<SurfaceCapabilities> {
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.phys, self.surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfaceCapabilitiesKHR"))?;
        Ok(convert::caps_from_vk(&caps))
    }

    fn surface_formats(&self) -> BackendResult<Vec<SurfaceFormat>> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.phys, self.surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfaceFormatsKHR"))?;
        for f in &formats {
            debug!("vk: surface format {} / {}", fmt_name(f.format), cs_name(f.color_space));
        }
        Ok(formats.iter().map(convert::surface_format_from_vk).collect())
    }

    fn present_modes(&self) -> BackendResult<Vec<PresentMode>> {
        let modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(self.phys, self.surface)
        }
        .map_err(vk_err("vkGetPhysicalDeviceSurfacePresentModesKHR"))?;
        debug!(
            "vk: present modes [{}]",
            modes.iter().map(|&m| pm_name(m)).collect::<Vec<_>>().join(", ")
        );
        Ok(modes.into_iter().filter_map(convert::present_mode_from_vk).collect())
    }

    fn create_swapchain(
        &mut self,
        config: &Configuration,
        predecessor: Option<vk::SwapchainKHR>,
    ) -> BackendResult<vk::SwapchainKHR> {
        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: self.surface,
            min_image_count: config.image_count,
            image_format: convert::format_to_vk(config.color_format),
            image_color_space: convert::color_space_to_vk(config.color_space),
            image_extent: convert::extent_to_vk(config.extent),
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform: convert::transform_to_vk(config.transform),
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: convert::present_mode_to_vk(config.present_mode),
            clipped: vk::TRUE,
            old_swapchain: predecessor.unwrap_or_else(vk::SwapchainKHR::null),
            ..Default::default()
        };
        let sc = unsafe { self.swapchain_loader.create_swapchain(&info, None) }
            .map_err(vk_err("vkCreateSwapchainKHR"))?;
        debug!(
            "vk: swapchain {:?} created (old {:?})",
            sc, info.old_swapchain
        );
        Ok(sc)
    }

    fn swapchain_images(&mut self, swapchain: vk::SwapchainKHR) -> BackendResult<Vec<vk::Image>> {
        unsafe {
            self.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(vk_err("vkGetSwapchainImagesKHR"))
        }
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn create_view(&mut self, image: vk::Image, format: ColorFormat) -> BackendResult<vk::ImageView> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: convert::format_to_vk(format),
            subresource_range: color_subresource(),
            ..Default::default()
        };
        unsafe {
            self.device
                .create_image_view(&info, None)
                .map_err(vk_err("vkCreateImageView"))
        }
    }

    fn destroy_view(&mut self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn transition_to_present(&mut self, images: &[vk::Image]) -> BackendResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.transition_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmds = unsafe { self.device.allocate_command_buffers(&alloc_info) }
            .map_err(vk_err("vkAllocateCommandBuffers"))?;

        let result = unsafe {
            self.record_transitions(cmds[0], images)
                .and_then(|()| {
                    let submit = vk::SubmitInfo {
                        s_type: vk::StructureType::SUBMIT_INFO,
                        command_buffer_count: 1,
                        p_command_buffers: cmds.as_ptr(),
                        ..Default::default()
                    };
                    self.device
                        .queue_submit(self.queue, std::slice::from_ref(&submit), self.transition_fence)
                        .map_err(vk_err("vkQueueSubmit"))
                })
                .and_then(|()| {
                    self.device
                        .wait_for_fences(&[self.transition_fence], true, u64::MAX)
                        .map_err(vk_err("vkWaitForFences"))
                })
                .and_then(|()| {
                    self.device
                        .reset_fences(&[self.transition_fence])
                        .map_err(vk_err("vkResetFences"))
                })
        };

        unsafe { self.device.free_command_buffers(self.transition_pool, &cmds) };
        result
    }

    fn create_semaphore(&mut self) -> BackendResult<vk::Semaphore> {
        unsafe {
            self.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(vk_err("vkCreateSemaphore"))
        }
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        timeout: Option<Duration>,
        signal: vk::Semaphore,
    ) -> BackendResult<AcquireStatus> {
        let ns = timeout.map_or(u64::MAX, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        match unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, ns, signal, vk::Fence::null())
        } {
            Ok((index, suboptimal)) => Ok(AcquireStatus::Acquired { index, suboptimal }),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireStatus::Timeout),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireStatus::OutOfDate),
            Err(e) => Err(BackendError::new("vkAcquireNextImageKHR", e)),
        }
    }

    fn queue_present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        index: u32,
        wait: &[vk::Semaphore],
    ) -> BackendResult<PresentStatus> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: wait.len() as u32,
            p_wait_semaphores: wait.as_ptr(),
            swapchain_count: 1,
            p_swapchains: &swapchain,
            p_image_indices: &index,
            ..Default::default()
        };
        match unsafe { self.swapchain_loader.queue_present(self.queue, &present) } {
            Ok(false) => Ok(PresentStatus::Presented),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(BackendError::new("vkQueuePresentKHR", e)),
        }
    }

    fn wait_idle(&mut self) -> BackendResult<()> {
        unsafe { self.device.device_wait_idle().map_err(vk_err("vkDeviceWaitIdle")) }
    }
}

// STRICT TEARDOWN ORDER:
// - device idle
// - device-owned objects, then device
// - debug messenger and surface, instance last
impl Drop for VkBackend {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();
            self.device.destroy_fence(self.transition_fence, None);
            self.device.destroy_command_pool(self.transition_pool, None);
            self.device.destroy_device(None);

            validation::destroy_messenger(&mut self.debug);
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}
