// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backend::{AcquireStatus, PresentBackend, PresentStatus};
use crate::cycle::{CycleController, CycleState};
use crate::error::{AcquireError, BackendError, Error, PresentError, Result};
use crate::negotiate::Configuration;
use crate::recreate::RecreationSupervisor;
use crate::ring::Ring;
use crate::settings::EngineSettings;
use crate::types::{ColorFormat, Extent2D};

/// One image lent to the renderer for a single frame.
///
/// Write into `view` only after `wait_semaphore` is signaled, then hand the
/// semaphore your own work signals to [`PresentEngine::present`].
pub struct AcquiredImage<B: PresentBackend> {
    pub index: u32,
    pub image: B::Image,
    pub view: B::View,
    pub extent: Extent2D,
    pub format: ColorFormat,
    pub wait_semaphore: B::Semaphore,
    /// The image is usable but the surface no longer matches; the ring is
    /// rebuilt before the next acquire.
    pub surface_changed: bool,
    /// Ring generation the image belongs to. Changes after every rebuild.
    pub generation: u64,
}

impl<B: PresentBackend> Clone for AcquiredImage<B> {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            image: self.image,
            view: self.view,
            extent: self.extent,
            format: self.format,
            wait_semaphore: self.wait_semaphore,
            surface_changed: self.surface_changed,
            generation: self.generation,
        }
    }
}

impl<B: PresentBackend> fmt::Debug for AcquiredImage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredImage")
            .field("index", &self.index)
            .field("image", &self.image)
            .field("view", &self.view)
            .field("extent", &self.extent)
            .field("format", &self.format)
            .field("wait_semaphore", &self.wait_semaphore)
            .field("surface_changed", &self.surface_changed)
            .field("generation", &self.generation)
            .finish()
    }
}

pub enum Acquire<B: PresentBackend> {
    Ready(AcquiredImage<B>),
    /// Nothing was available in time. Not an error; try again later.
    TimedOut,
    /// The surface has zero area; nothing can be presented until it grows.
    Suspended,
}

impl<B: PresentBackend> Acquire<B> {
    pub fn ready(self) -> Option<AcquiredImage<B>> {
        match self {
            Acquire::Ready(img) => Some(img),
            _ => None,
        }
    }
}

impl<B: PresentBackend> fmt::Debug for Acquire<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Acquire::Ready(img) => f.debug_tuple("Ready").field(img).finish(),
            Acquire::TimedOut => f.write_str("TimedOut"),
            Acquire::Suspended => f.write_str("Suspended"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentReport {
    pub index: u32,
    /// False when the platform dropped the image because the surface went
    /// out of date.
    pub presented: bool,
    /// The ring is rebuilt before the next acquire.
    pub surface_changed: bool,
}

/// Presentation engine for one surface.
///
/// Owns the backend, the current ring and the acquire semaphores. Drive it
/// from a single thread: `acquire`, render, `present`, repeat. Resize
/// notifications may arrive at any point between calls.
pub struct PresentEngine<B: PresentBackend> {
    backend: B,
    settings: EngineSettings,
    ring: Option<Ring<B>>,
    cycle: CycleController<B>,
    supervisor: RecreationSupervisor,
}

impl<B: PresentBackend> PresentEngine<B> {
    /// Negotiate and build the first ring.
    pub fn new(backend: B, settings: EngineSettings) -> Result<Self> {
        Self::with_extent(backend, settings, None)
    }

    /// Like [`new`](Self::new), with the window's size as a hint for surfaces
    /// that cannot report their own.
    pub fn with_extent(
        backend: B,
        settings: EngineSettings,
        window_extent: Option<Extent2D>,
    ) -> Result<Self> {
        let mut engine = Self {
            backend,
            settings,
            ring: None,
            cycle: CycleController::new(),
            supervisor: RecreationSupervisor::new(),
        };
        if let Some(size) = window_extent {
            engine.supervisor.note_resize(size);
        }
        engine.rebuild()?;
        if let Some(config) = engine.configuration() {
            info!(
                "present: engine ready, {:?} {:?} at {}",
                config.present_mode, config.color_format, config.extent
            );
        }
        Ok(engine)
    }

    /// Timeout from the settings, for callers that do not pick their own.
    pub fn default_timeout(&self) -> Option<Duration> {
        self.settings.acquire_timeout()
    }

    pub fn acquire(&mut self, timeout: Option<Duration>) -> Result<Acquire<B>> {
        if let CycleState::Acquired { index, .. } = self.cycle.state() {
            return Err(AcquireError::FrameInFlight { index }.into());
        }
        if self.supervisor.is_suspended() {
            return Ok(Acquire::Suspended);
        }
        if self.supervisor.is_pending() || self.ring.is_none() {
            self.rebuild()?;
        } else {
            self.refill_semaphores()?;
        }

        let mut retried = false;
        loop {
            let Some(swapchain) = self.ring.as_ref().map(Ring::swapchain) else {
                return Err(AcquireError::OutOfDate.into());
            };

            match self.cycle.acquire(&mut self.backend, swapchain, timeout)? {
                AcquireStatus::Acquired { index, suboptimal } => {
                    if suboptimal {
                        warn!("present: image {index} acquired from a suboptimal surface");
                        self.supervisor.mark_surface_changed();
                    }
                    return self.lend(index, suboptimal).map(Acquire::Ready);
                }
                AcquireStatus::Timeout => {
                    debug!("present: acquire timed out");
                    return Ok(Acquire::TimedOut);
                }
                AcquireStatus::OutOfDate if !retried => {
                    warn!("present: surface out of date on acquire, rebuilding");
                    retried = true;
                    self.supervisor.mark_surface_changed();
                    self.rebuild()?;
                }
                AcquireStatus::OutOfDate => {
                    self.supervisor.mark_surface_changed();
                    return Err(AcquireError::OutOfDate.into());
                }
            }
        }
    }

    fn lend(&mut self, index: u32, surface_changed: bool) -> Result<AcquiredImage<B>> {
        let CycleState::Acquired { semaphore, .. } = self.cycle.state() else {
            return Err(AcquireError::OutOfDate.into());
        };
        let Some(ring) = self.ring.as_ref() else {
            self.cycle.abandon();
            return Err(AcquireError::OutOfDate.into());
        };
        let Some(img) = ring.image(index) else {
            let count = ring.image_count();
            self.cycle.abandon();
            return Err(AcquireError::Backend(BackendError::new(
                "acquire_next_image",
                format!("index {index} outside ring of {count}"),
            ))
            .into());
        };

        let config = ring.configuration();
        Ok(AcquiredImage {
            index,
            image: img.handle,
            view: img.view,
            extent: config.extent,
            format: config.color_format,
            wait_semaphore: semaphore,
            surface_changed,
            generation: ring.generation(),
        })
    }

    /// Present the acquired image once every semaphore in `wait` is signaled.
    pub fn present(&mut self, wait: &[B::Semaphore]) -> Result<PresentReport> {
        let Some(swapchain) = self.ring.as_ref().map(Ring::swapchain) else {
            return Err(PresentError::NotAcquired.into());
        };
        let (index, status) = self.cycle.present(&mut self.backend, swapchain, wait)?;

        let report = match status {
            PresentStatus::Presented => PresentReport {
                index,
                presented: true,
                surface_changed: false,
            },
            PresentStatus::Suboptimal => PresentReport {
                index,
                presented: true,
                surface_changed: true,
            },
            PresentStatus::OutOfDate => PresentReport {
                index,
                presented: false,
                surface_changed: true,
            },
        };
        if report.surface_changed {
            warn!("present: {:?} on image {index}, ring will be rebuilt", status);
            self.supervisor.mark_surface_changed();
        }
        Ok(report)
    }

    /// Window size changed. Cheap; the rebuild happens at the next cycle
    /// boundary.
    pub fn notify_resize(&mut self, width: u32, height: u32) {
        self.supervisor.note_resize(Extent2D::new(width, height));
    }

    /// Rebuild now if `surface_changed` or a rebuild is already pending.
    ///
    /// Returns `Ok(true)` when a new ring was built. Deferred (and `Ok(false)`)
    /// while an image is acquired or the engine is suspended.
    pub fn maybe_recreate(&mut self, surface_changed: bool) -> Result<bool> {
        if surface_changed {
            self.supervisor.mark_surface_changed();
        }
        if !self.supervisor.is_pending() {
            return Ok(false);
        }
        if !self.cycle.state().is_idle() {
            debug!("present: rebuild deferred until the acquired image is presented");
            return Ok(false);
        }
        if self.supervisor.is_suspended() {
            return Ok(false);
        }
        self.rebuild()?;
        Ok(true)
    }

    /// Force a rebuild at the next opportunity, which is now when idle.
    pub fn recreate(&mut self) -> Result<bool> {
        self.maybe_recreate(true)
    }

    fn rebuild(&mut self) -> Result<(), Error> {
        self.supervisor
            .rebuild(&mut self.backend, &self.settings, &mut self.ring)?;
        self.refill_semaphores()
    }

    fn refill_semaphores(&mut self) -> Result<(), Error> {
        let wanted = self.ring.as_ref().map_or(0, |r| r.image_count() as usize + 1);
        self.cycle.ensure_semaphores(&mut self.backend, wanted)?;
        Ok(())
    }

    pub fn configuration(&self) -> Option<&Configuration> {
        self.ring.as_ref().map(Ring::configuration)
    }

    pub fn ring(&self) -> Option<&Ring<B>> {
        self.ring.as_ref()
    }

    pub fn state(&self) -> CycleState<B::Semaphore> {
        self.cycle.state()
    }

    pub fn is_suspended(&self) -> bool {
        self.supervisor.is_suspended()
    }

    pub fn is_recreation_pending(&self) -> bool {
        self.supervisor.is_pending()
    }

    pub fn recreation_count(&self) -> u64 {
        self.supervisor.recreation_count()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: PresentBackend> Drop for PresentEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            warn!("present: device did not drain on shutdown: {e}");
        }
        self.cycle.release(&mut self.backend);
        if let Some(ring) = self.ring.take() {
            ring.release(&mut self.backend);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
