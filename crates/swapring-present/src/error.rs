// SPDX-License-Identifier: CEPL-1.0
//! Error taxonomy.
//!
//! Capability and allocation failures are fatal for the ring they were building
//! and are surfaced to the application. Acquire and present failures only cost
//! the current frame. A changed surface is never an error; it travels as the
//! `surface_changed` flag.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A platform call that failed for a reason the engine does not model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed: {detail}")]
pub struct BackendError {
    pub call: &'static str,
    pub detail: String,
}

impl BackendError {
    pub fn new(call: &'static str, detail: impl std::fmt::Display) -> Self {
        Self {
            call,
            detail: detail.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("no queue family supports graphics commands")]
    NoGraphicsQueue,
    #[error("no queue family can present to the surface")]
    NoPresentQueue,
    #[error(
        "graphics family {graphics} cannot present and presentation lives on family {present}; \
         separate present queues are not supported"
    )]
    SeparatePresentQueue { graphics: u32, present: u32 },
    #[error("surface reports no color formats")]
    NoSurfaceFormats,
    #[error("surface reports no present modes")]
    NoPresentModes,
    #[error("capability query failed: {0}")]
    Query(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("display queue creation failed: {0}")]
    CreateSwapchain(#[source] BackendError),
    #[error("display queue images could not be listed: {0}")]
    QueryImages(#[source] BackendError),
    #[error("display queue came back with no images")]
    NoImages,
    #[error("view for image {index} failed to bind: {source}")]
    CreateView {
        index: u32,
        #[source]
        source: BackendError,
    },
    #[error("initial layout transition failed: {0}")]
    Transition(#[source] BackendError),
    #[error("acquire semaphore creation failed: {0}")]
    Semaphore(#[source] BackendError),
    #[error("device did not drain before recreation: {0}")]
    Drain(#[source] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcquireError {
    #[error("image {index} is still acquired; present it before acquiring again")]
    FrameInFlight { index: u32 },
    #[error("surface stayed out of date after recreation")]
    OutOfDate,
    #[error("image acquisition failed: {0}")]
    Backend(#[source] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentError {
    #[error("no image is acquired")]
    NotAcquired,
    #[error("presenting image {index} failed: {source}")]
    Backend {
        index: u32,
        #[source]
        source: BackendError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Present(#[from] PresentError),
}

impl Error {
    /// Frame-scoped errors drop the current frame only; the engine stays usable.
    pub fn is_frame_scoped(&self) -> bool {
        matches!(self, Error::Acquire(_) | Error::Present(_))
    }
}
