// SPDX-License-Identifier: CEPL-1.0
//! Platform-neutral vocabulary for surfaces, formats and queues.

use bitflags::bitflags;
use serde::Deserialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    /// Reported by surfaces whose size is decided by the swapchain.
    pub const UNDEFINED: Extent2D = Extent2D {
        width: u32::MAX,
        height: u32::MAX,
    };

    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when the extent names a real, drawable size.
    pub fn is_usable(self) -> bool {
        self != Self::UNDEFINED && self.width != 0 && self.height != 0
    }

    /// Clamp into `[min, max]` per axis. A zero `max` means the surface gave no
    /// bounds, in which case the extent is returned untouched.
    pub fn clamp_to(self, min: Extent2D, max: Extent2D) -> Self {
        if max.width == 0 || max.height == 0 {
            return self;
        }
        Extent2D {
            width: self.width.clamp(min.width.min(max.width), max.width),
            height: self.height.clamp(min.height.min(max.height), max.height),
        }
    }
}

impl fmt::Display for Extent2D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorFormat {
    /// A lone `Undefined` entry in a surface's format list means "anything goes".
    Undefined,
    B8G8R8A8Srgb,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    R8G8B8A8Unorm,
    A2B10G10R10Unorm,
    R16G16B16A16Sfloat,
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    Other(i32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: ColorFormat,
    pub color_space: ColorSpace,
}

impl SurfaceFormat {
    pub const fn new(format: ColorFormat, color_space: ColorSpace) -> Self {
        Self {
            format,
            color_space,
        }
    }
}

/// Whether the renderer wants the display to apply the sRGB transfer curve on
/// write (perceptual) or to receive values untouched (linear).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorEncoding {
    #[default]
    Perceptual,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,   // no vsync, may tear
    Mailbox,     // vsync, newest frame replaces the queued one
    Fifo,        // vsync, always available
    FifoRelaxed, // vsync unless a frame is late
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct SurfaceTransforms: u32 {
        const IDENTITY = 1 << 0;
        const ROTATE_90 = 1 << 1;
        const ROTATE_180 = 1 << 2;
        const ROTATE_270 = 1 << 3;
        const HORIZONTAL_MIRROR = 1 << 4;
        const INHERIT = 1 << 8;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct QueueFlags: u32 {
        const GRAPHICS = 1 << 0;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub flags: QueueFlags,
    /// Whether this family can present to the engine's surface.
    pub supports_present: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// Zero means the surface imposes no upper bound.
    pub max_image_count: u32,
    pub current_extent: Extent2D,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
    pub current_transform: SurfaceTransforms,
    pub supported_transforms: SurfaceTransforms,
}

impl Default for SurfaceCapabilities {
    fn default() -> Self {
        Self {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: Extent2D::UNDEFINED,
            min_image_extent: Extent2D::new(1, 1),
            max_image_extent: Extent2D::new(0, 0),
            current_transform: SurfaceTransforms::IDENTITY,
            supported_transforms: SurfaceTransforms::IDENTITY,
        }
    }
}
