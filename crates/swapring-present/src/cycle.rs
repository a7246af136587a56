// SPDX-License-Identifier: CEPL-1.0
//! Acquire/present state machine.
//!
//! `Idle -> Acquired -> Presenting -> Idle`. Only one image is ever lent out;
//! a second acquire before the matching present is refused.

use std::time::Duration;

use tracing::{debug, error};

use crate::backend::{AcquireStatus, PresentBackend, PresentStatus};
use crate::error::{AcquireError, AllocationError, BackendError, PresentError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleState<S> {
    Idle,
    /// `semaphore` is signaled once the image may be written.
    Acquired { index: u32, semaphore: S },
    /// Only observable while the present call is in progress.
    Presenting { index: u32 },
}

impl<S> CycleState<S> {
    pub fn is_idle(&self) -> bool {
        matches!(self, CycleState::Idle)
    }

    pub fn acquired_index(&self) -> Option<u32> {
        match self {
            CycleState::Acquired { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Drives the platform's acquire and present calls and owns the acquire
/// semaphores. A pool of `image_count + 1` is rotated so a semaphore is never
/// handed to the platform while a frame may still be waiting on it.
pub struct CycleController<B: PresentBackend> {
    state: CycleState<B::Semaphore>,
    semaphores: Vec<B::Semaphore>,
    next: usize,
    // signaled but never waited on; unsafe to hand back to the platform
    retired: Vec<B::Semaphore>,
}

impl<B: PresentBackend> Default for CycleController<B> {
    fn default() -> Self {
        Self {
            state: CycleState::Idle,
            semaphores: Vec::new(),
            next: 0,
            retired: Vec::new(),
        }
    }
}

impl<B: PresentBackend> CycleController<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CycleState<B::Semaphore> {
        self.state
    }

    pub fn semaphore_count(&self) -> usize {
        self.semaphores.len()
    }

    /// Grow the acquire semaphore pool to at least `count`.
    pub fn ensure_semaphores(&mut self, backend: &mut B, count: usize) -> Result<(), AllocationError> {
        while self.semaphores.len() < count {
            let s = backend.create_semaphore().map_err(AllocationError::Semaphore)?;
            self.semaphores.push(s);
        }
        Ok(())
    }

    /// Ask the platform for the next image of `swapchain`.
    ///
    /// Only an `Acquired` status moves the state; timeouts and out-of-date
    /// results leave the controller idle.
    pub fn acquire(
        &mut self,
        backend: &mut B,
        swapchain: B::Swapchain,
        timeout: Option<Duration>,
    ) -> Result<AcquireStatus, AcquireError> {
        if let CycleState::Acquired { index, .. } = self.state {
            return Err(AcquireError::FrameInFlight { index });
        }

        let Some(&semaphore) = self.semaphores.get(self.next) else {
            return Err(AcquireError::Backend(BackendError::new(
                "acquire_next_image",
                "no acquire semaphores allocated",
            )));
        };

        match backend.acquire_next_image(swapchain, timeout, semaphore) {
            Ok(AcquireStatus::Acquired { index, suboptimal }) => {
                self.next = (self.next + 1) % self.semaphores.len();
                self.state = CycleState::Acquired { index, semaphore };
                Ok(AcquireStatus::Acquired { index, suboptimal })
            }
            Ok(status) => {
                debug!("cycle: acquire returned {:?}", status);
                self.state = CycleState::Idle;
                Ok(status)
            }
            Err(e) => {
                error!("cycle: acquire failed: {e}");
                self.state = CycleState::Idle;
                Err(AcquireError::Backend(e))
            }
        }
    }

    /// Return the acquired image to the display once `wait` is signaled.
    /// The controller is idle afterwards whatever the outcome.
    pub fn present(
        &mut self,
        backend: &mut B,
        swapchain: B::Swapchain,
        wait: &[B::Semaphore],
    ) -> Result<(u32, PresentStatus), PresentError> {
        let CycleState::Acquired { index, .. } = self.state else {
            return Err(PresentError::NotAcquired);
        };

        self.state = CycleState::Presenting { index };
        let result = backend.queue_present(swapchain, index, wait);
        self.state = CycleState::Idle;

        match result {
            Ok(status) => Ok((index, status)),
            Err(source) => {
                error!("cycle: present of image {index} failed: {source}");
                Err(PresentError::Backend { index, source })
            }
        }
    }

    /// Give back an image that can no longer be presented, e.g. one whose
    /// index falls outside the ring.
    ///
    /// Its acquire semaphore stays signaled with nobody waiting, so it leaves
    /// the rotation until `release`. Refill with `ensure_semaphores`.
    pub(crate) fn abandon(&mut self) {
        if let CycleState::Acquired { semaphore, .. } = self.state {
            if let Some(pos) = self.semaphores.iter().position(|&s| s == semaphore) {
                self.semaphores.remove(pos);
                self.retired.push(semaphore);
                self.next = if self.semaphores.is_empty() {
                    0
                } else {
                    pos % self.semaphores.len()
                };
                debug!("cycle: acquire semaphore retired, {} left", self.semaphores.len());
            }
        }
        self.state = CycleState::Idle;
    }

    /// Destroy the semaphore pool. The device must be idle.
    pub fn release(&mut self, backend: &mut B) {
        for s in self.semaphores.drain(..).chain(self.retired.drain(..)) {
            backend.destroy_semaphore(s);
        }
        self.next = 0;
        self.state = CycleState::Idle;
    }
}
