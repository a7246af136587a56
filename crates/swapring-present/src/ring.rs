// SPDX-License-Identifier: CEPL-1.0
//! The image ring: one swapchain plus a view per image, all present-ready.

use std::fmt;

use tracing::{debug, info, warn};

use crate::backend::PresentBackend;
use crate::error::AllocationError;
use crate::negotiate::Configuration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageLayout {
    Undefined,
    PresentReady,
}

pub struct PresentableImage<B: PresentBackend> {
    pub handle: B::Image,
    pub view: B::View,
    pub index: u32,
    pub layout: ImageLayout,
}

impl<B: PresentBackend> Clone for PresentableImage<B> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle,
            view: self.view,
            index: self.index,
            layout: self.layout,
        }
    }
}

impl<B: PresentBackend> fmt::Debug for PresentableImage<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresentableImage")
            .field("handle", &self.handle)
            .field("view", &self.view)
            .field("index", &self.index)
            .field("layout", &self.layout)
            .finish()
    }
}

/// Replaced as a whole on recreation, never edited in place.
pub struct Ring<B: PresentBackend> {
    swapchain: B::Swapchain,
    images: Vec<PresentableImage<B>>,
    config: Configuration,
    generation: u64,
}

impl<B: PresentBackend> fmt::Debug for Ring<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ring")
            .field("swapchain", &self.swapchain)
            .field("images", &self.images)
            .field("config", &self.config)
            .field("generation", &self.generation)
            .finish()
    }
}

/// A failed allocation. `previous` is still alive when the failure happened
/// before the new swapchain existed; otherwise it has already been released.
pub struct AllocationFailure<B: PresentBackend> {
    pub error: AllocationError,
    pub previous: Option<Ring<B>>,
}

impl<B: PresentBackend> fmt::Debug for AllocationFailure<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocationFailure")
            .field("error", &self.error)
            .field("previous", &self.previous)
            .finish()
    }
}

impl<B: PresentBackend> From<AllocationFailure<B>> for AllocationError {
    fn from(f: AllocationFailure<B>) -> Self {
        f.error
    }
}

impl<B: PresentBackend> Ring<B> {
    /// Build a ring for `config`.
    ///
    /// `previous` is consumed: its swapchain is passed to the platform as the
    /// predecessor and the whole ring is released only once the replacement
    /// swapchain has been created.
    pub fn allocate(
        backend: &mut B,
        config: Configuration,
        previous: Option<Ring<B>>,
        generation: u64,
    ) -> Result<Ring<B>, AllocationFailure<B>> {
        let predecessor = previous.as_ref().map(|r| r.swapchain);
        let swapchain = match backend.create_swapchain(&config, predecessor) {
            Ok(sc) => sc,
            Err(e) => {
                return Err(AllocationFailure {
                    error: AllocationError::CreateSwapchain(e),
                    previous,
                })
            }
        };

        if let Some(old) = previous {
            debug!("ring: releasing generation {}", old.generation);
            old.release(backend);
        }

        Self::populate(backend, swapchain, config, generation).map_err(|error| {
            AllocationFailure {
                error,
                previous: None,
            }
        })
    }

    fn populate(
        backend: &mut B,
        swapchain: B::Swapchain,
        config: Configuration,
        generation: u64,
    ) -> Result<Ring<B>, AllocationError> {
        let handles = match backend.swapchain_images(swapchain) {
            Ok(h) if h.is_empty() => {
                backend.destroy_swapchain(swapchain);
                return Err(AllocationError::NoImages);
            }
            Ok(h) => h,
            Err(e) => {
                backend.destroy_swapchain(swapchain);
                return Err(AllocationError::QueryImages(e));
            }
        };
        if handles.len() as u32 != config.image_count {
            warn!(
                "ring: requested {} images, platform created {}",
                config.image_count,
                handles.len()
            );
        }

        let mut images: Vec<PresentableImage<B>> = Vec::with_capacity(handles.len());
        for (i, &handle) in handles.iter().enumerate() {
            let index = i as u32;
            match backend.create_view(handle, config.color_format) {
                Ok(view) => images.push(PresentableImage {
                    handle,
                    view,
                    index,
                    layout: ImageLayout::Undefined,
                }),
                Err(source) => {
                    destroy_partial(backend, swapchain, &images);
                    return Err(AllocationError::CreateView { index, source });
                }
            }
        }

        if let Err(e) = backend.transition_to_present(&handles) {
            destroy_partial(backend, swapchain, &images);
            return Err(AllocationError::Transition(e));
        }
        for img in &mut images {
            img.layout = ImageLayout::PresentReady;
        }

        info!(
            "ring: generation {} ready, {} images at {}",
            generation,
            images.len(),
            config.extent
        );

        Ok(Ring {
            swapchain,
            images,
            config,
            generation,
        })
    }

    /// Destroy views, then the swapchain. The device must be idle.
    pub fn release(self, backend: &mut B) {
        destroy_partial(backend, self.swapchain, &self.images);
    }

    pub fn swapchain(&self) -> B::Swapchain {
        self.swapchain
    }

    pub fn images(&self) -> &[PresentableImage<B>] {
        &self.images
    }

    pub fn image(&self, index: u32) -> Option<&PresentableImage<B>> {
        self.images.get(index as usize)
    }

    /// Actual count, which can differ from `configuration().image_count`.
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

fn destroy_partial<B: PresentBackend>(
    backend: &mut B,
    swapchain: B::Swapchain,
    images: &[PresentableImage<B>],
) {
    for img in images {
        backend.destroy_view(img.view);
    }
    backend.destroy_swapchain(swapchain);
}
