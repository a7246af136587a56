// SPDX-License-Identifier: CEPL-1.0
//! Recreation supervisor: decides when the ring has to be rebuilt and does it.

use std::thread;

use tracing::{debug, info, warn};

use crate::backend::PresentBackend;
use crate::error::{AllocationError, Error};
use crate::negotiate::negotiate;
use crate::ring::Ring;
use crate::settings::EngineSettings;
use crate::types::Extent2D;

#[derive(Debug)]
pub struct RecreationSupervisor {
    pending: bool,
    suspended: bool,
    extent_hint: Option<Extent2D>,
    built: u64,
}

impl Default for RecreationSupervisor {
    fn default() -> Self {
        Self {
            // nothing has been built yet
            pending: true,
            suspended: false,
            extent_hint: None,
            built: 0,
        }
    }
}

impl RecreationSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn extent_hint(&self) -> Option<Extent2D> {
        self.extent_hint
    }

    /// Rings built after the first one.
    pub fn recreation_count(&self) -> u64 {
        self.built.saturating_sub(1)
    }

    pub fn mark_surface_changed(&mut self) {
        if !self.pending {
            debug!("recreate: surface changed, rebuild scheduled");
        }
        self.pending = true;
    }

    /// Record a window size. Returns true when this notification scheduled a
    /// rebuild that was not already pending.
    ///
    /// A zero dimension suspends presentation until a drawable size arrives.
    pub fn note_resize(&mut self, size: Extent2D) -> bool {
        if size.width == 0 || size.height == 0 {
            if !self.suspended {
                info!("recreate: surface has zero area ({size}), presentation suspended");
            }
            self.suspended = true;
            return false;
        }

        let resumed = std::mem::replace(&mut self.suspended, false);
        if resumed {
            info!("recreate: resumed at {size}");
        }

        let previous_hint = self.extent_hint.replace(size);
        if self.pending {
            if previous_hint != Some(size) {
                debug!("recreate: pending rebuild now targets {size}");
            }
            return false;
        }

        self.pending = true;
        true
    }

    /// Drain the device, re-negotiate and allocate a replacement for `ring`.
    ///
    /// On failure `ring` still holds a usable ring when one survived, and the
    /// rebuild stays pending.
    pub fn rebuild<B: PresentBackend>(
        &mut self,
        backend: &mut B,
        settings: &EngineSettings,
        ring: &mut Option<Ring<B>>,
    ) -> Result<(), Error> {
        self.pending = true;

        if ring.is_some() {
            backend.wait_idle().map_err(AllocationError::Drain)?;
        }

        let previous_config = ring.as_ref().map(|r| r.configuration().clone());
        let config = negotiate(backend, settings, self.extent_hint, previous_config.as_ref())?;
        if let Some(prev) = &previous_config {
            if prev.extent != config.extent || prev.transform != config.transform {
                debug!(
                    "recreate: {} {:?} -> {} {:?}",
                    prev.extent, prev.transform, config.extent, config.transform
                );
            }
        }

        let generation = self.built + 1;
        let mut previous = ring.take();
        let mut retried = false;
        loop {
            match Ring::allocate(backend, config.clone(), previous, generation) {
                Ok(new_ring) => {
                    info!(
                        "recreate: ring generation {} live ({} images, {:?})",
                        generation,
                        new_ring.image_count(),
                        config.present_mode
                    );
                    *ring = Some(new_ring);
                    self.built = generation;
                    self.pending = false;
                    return Ok(());
                }
                Err(failure) => {
                    previous = failure.previous;
                    match settings.allocation_retry_delay() {
                        Some(delay) if !retried => {
                            warn!(
                                "recreate: allocation failed ({}), retrying in {:?}",
                                failure.error, delay
                            );
                            retried = true;
                            thread::sleep(delay);
                        }
                        _ => {
                            *ring = previous;
                            return Err(failure.error.into());
                        }
                    }
                }
            }
        }
    }
}
