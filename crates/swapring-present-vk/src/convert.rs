// SPDX-License-Identifier: CEPL-1.0
//! Mapping between Vulkan enums and the engine's platform-neutral types.

use ash::vk;
use swapring_present::{
    ColorFormat, ColorSpace, Extent2D, PresentMode, QueueFlags, SurfaceCapabilities,
    SurfaceFormat, SurfaceTransforms,
};

pub fn format_from_vk(f: vk::Format) -> ColorFormat {
    match f {
        vk::Format::UNDEFINED => ColorFormat::Undefined,
        vk::Format::B8G8R8A8_SRGB => ColorFormat::B8G8R8A8Srgb,
        vk::Format::R8G8B8A8_SRGB => ColorFormat::R8G8B8A8Srgb,
        vk::Format::B8G8R8A8_UNORM => ColorFormat::B8G8R8A8Unorm,
        vk::Format::R8G8B8A8_UNORM => ColorFormat::R8G8B8A8Unorm,
        vk::Format::A2B10G10R10_UNORM_PACK32 => ColorFormat::A2B10G10R10Unorm,
        vk::Format::R16G16B16A16_SFLOAT => ColorFormat::R16G16B16A16Sfloat,
        other => ColorFormat::Other(other.as_raw()),
    }
}

pub fn format_to_vk(f: ColorFormat) -> vk::Format {
    match f {
        ColorFormat::Undefined => vk::Format::UNDEFINED,
        ColorFormat::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
        ColorFormat::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
        ColorFormat::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
        ColorFormat::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
        ColorFormat::A2B10G10R10Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        ColorFormat::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
        ColorFormat::Other(raw) => vk::Format::from_raw(raw),
    }
}

pub fn color_space_from_vk(cs: vk::ColorSpaceKHR) -> ColorSpace {
    match cs {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => ColorSpace::SrgbNonlinear,
        other => ColorSpace::Other(other.as_raw()),
    }
}

pub fn color_space_to_vk(cs: ColorSpace) -> vk::ColorSpaceKHR {
    match cs {
        ColorSpace::SrgbNonlinear => vk::ColorSpaceKHR::SRGB_NONLINEAR,
        ColorSpace::Other(raw) => vk::ColorSpaceKHR::from_raw(raw),
    }
}

pub fn surface_format_from_vk(f: &vk::SurfaceFormatKHR) -> SurfaceFormat {
    SurfaceFormat::new(format_from_vk(f.format), color_space_from_vk(f.color_space))
}

/// `None` for modes the engine does not drive (shared-refresh variants).
pub fn present_mode_from_vk(m: vk::PresentModeKHR) -> Option<PresentMode> {
    match m {
        vk::PresentModeKHR::IMMEDIATE => Some(PresentMode::Immediate),
        vk::PresentModeKHR::MAILBOX => Some(PresentMode::Mailbox),
        vk::PresentModeKHR::FIFO => Some(PresentMode::Fifo),
        vk::PresentModeKHR::FIFO_RELAXED => Some(PresentMode::FifoRelaxed),
        _ => None,
    }
}

pub fn present_mode_to_vk(m: PresentMode) -> vk::PresentModeKHR {
    match m {
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
        PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
    }
}

// bit positions match VkSurfaceTransformFlagBitsKHR
pub fn transforms_from_vk(t: vk::SurfaceTransformFlagsKHR) -> SurfaceTransforms {
    SurfaceTransforms::from_bits_truncate(t.as_raw())
}

pub fn transform_to_vk(t: SurfaceTransforms) -> vk::SurfaceTransformFlagsKHR {
    vk::SurfaceTransformFlagsKHR::from_raw(t.bits())
}

pub fn queue_flags_from_vk(f: vk::QueueFlags) -> QueueFlags {
    let mut out = QueueFlags::empty();
    out.set(QueueFlags::GRAPHICS, f.contains(vk::QueueFlags::GRAPHICS));
    out.set(QueueFlags::COMPUTE, f.contains(vk::QueueFlags::COMPUTE));
    out.set(QueueFlags::TRANSFER, f.contains(vk::QueueFlags::TRANSFER));
    out
}

pub fn extent_from_vk(e: vk::Extent2D) -> Extent2D {
    Extent2D::new(e.width, e.height)
}

pub fn extent_to_vk(e: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: e.width,
        height: e.height,
    }
}

pub fn caps_from_vk(caps: &vk::SurfaceCapabilitiesKHR) -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: caps.min_image_count,
        max_image_count: caps.max_image_count,
        current_extent: extent_from_vk(caps.current_extent),
        min_image_extent: extent_from_vk(caps.min_image_extent),
        max_image_extent: extent_from_vk(caps.max_image_extent),
        current_transform: transforms_from_vk(caps.current_transform),
        supported_transforms: transforms_from_vk(caps.supported_transforms),
    }
}

// Info only
pub fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        _ => "OTHER",
    }
}

pub fn cs_name(cs: vk::ColorSpaceKHR) -> &'static str {
    match cs {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => "SRGB_NONLINEAR",
        vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT => "EXTENDED_SRGB_LINEAR",
        vk::ColorSpaceKHR::HDR10_ST2084_EXT => "HDR10_ST2084",
        _ => "OTHER",
    }
}

pub fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}
