// SPDX-License-Identifier: CEPL-1.0
//! Platform-agnostic presentation engine.
//!
//! Negotiates a swapchain configuration with a [`PresentBackend`], keeps a
//! ring of present-ready images, lends one image per frame to the renderer
//! and rebuilds the ring when the surface changes.
//!
//! ```ignore
//! let mut engine = PresentEngine::new(backend, EngineSettings::default())?;
//! loop {
//!     if let Acquire::Ready(img) = engine.acquire(engine.default_timeout())? {
//!         let done = renderer.draw(img.view, img.wait_semaphore);
//!         engine.present(&[done])?;
//!     }
//! }
//! ```

pub mod backend;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod negotiate;
pub mod recreate;
pub mod ring;
pub mod settings;
pub mod types;

#[cfg(test)]
mod mock;

pub use backend::{AcquireStatus, BackendResult, PresentBackend, PresentStatus};
pub use cycle::CycleState;
pub use engine::{Acquire, AcquiredImage, PresentEngine, PresentReport};
pub use error::{
    AcquireError, AllocationError, BackendError, CapabilityError, Error, PresentError, Result,
};
pub use negotiate::{negotiate, select_queue_family, Configuration};
pub use ring::{ImageLayout, PresentableImage, Ring};
pub use settings::EngineSettings;
pub use types::{
    ColorEncoding, ColorFormat, ColorSpace, Extent2D, PresentMode, QueueFamilyInfo, QueueFlags,
    SurfaceCapabilities, SurfaceFormat, SurfaceTransforms,
};
