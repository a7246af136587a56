// SPDX-License-Identifier: CEPL-1.0
//! The seam between the engine and a concrete display platform.

use std::fmt::Debug;
use std::time::Duration;

use crate::error::BackendError;
use crate::negotiate::Configuration;
use crate::types::{
    ColorFormat, PresentMode, QueueFamilyInfo, SurfaceCapabilities, SurfaceFormat,
};

pub type BackendResult<T> = Result<T, BackendError>;

/// Outcome of asking the platform for the next writable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireStatus {
    /// `suboptimal` images are still safe to render and present.
    Acquired { index: u32, suboptimal: bool },
    /// Nothing became available before the timeout; try again later.
    Timeout,
    /// The swapchain no longer matches the surface; no image was handed out.
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Presented, but the swapchain should be rebuilt.
    Suboptimal,
    /// Not presented; the swapchain must be rebuilt.
    OutOfDate,
}

/// One surface on one device.
///
/// Implementations hold both the display surface and the logical device; every
/// call is made from the rendering thread. Handles are plain copyable ids, the
/// engine decides when they are destroyed.
pub trait PresentBackend {
    type Image: Copy + Eq + Debug;
    type View: Copy + Eq + Debug;
    type Swapchain: Copy + Eq + Debug;
    type Semaphore: Copy + Eq + Debug;

    fn queue_families(&self) -> BackendResult<Vec<QueueFamilyInfo>>;
    fn surface_capabilities(&self) -> BackendResult<SurfaceCapabilities>;
    fn surface_formats(&self) -> BackendResult<Vec<SurfaceFormat>>;
    fn present_modes(&self) -> BackendResult<Vec<PresentMode>>;

    /// Create a swapchain for `config`. `predecessor` is the swapchain being
    /// replaced; the platform may recycle its resources but the caller still
    /// destroys it afterwards.
    fn create_swapchain(
        &mut self,
        config: &Configuration,
        predecessor: Option<Self::Swapchain>,
    ) -> BackendResult<Self::Swapchain>;
    fn swapchain_images(&mut self, swapchain: Self::Swapchain) -> BackendResult<Vec<Self::Image>>;
    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain);

    /// Color aspect, mip 0, layer 0.
    fn create_view(&mut self, image: Self::Image, format: ColorFormat) -> BackendResult<Self::View>;
    fn destroy_view(&mut self, view: Self::View);

    /// Move every image from undefined to present-ready layout in a single
    /// submission and wait for it to finish.
    fn transition_to_present(&mut self, images: &[Self::Image]) -> BackendResult<()>;

    fn create_semaphore(&mut self) -> BackendResult<Self::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);

    /// `timeout` of `None` waits forever. `signal` is signaled once the image
    /// may be written.
    fn acquire_next_image(
        &mut self,
        swapchain: Self::Swapchain,
        timeout: Option<Duration>,
        signal: Self::Semaphore,
    ) -> BackendResult<AcquireStatus>;

    /// Queue image `index` for display once every `wait` semaphore is signaled.
    fn queue_present(
        &mut self,
        swapchain: Self::Swapchain,
        index: u32,
        wait: &[Self::Semaphore],
    ) -> BackendResult<PresentStatus>;

    fn wait_idle(&mut self) -> BackendResult<()>;
}
