// SPDX-License-Identifier: CEPL-1.0
//! Window and event-loop layer. The app reaches winit through this crate so
//! the windowing version is pinned in one place.
pub use winit;
