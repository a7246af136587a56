// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;
use std::time::Duration;

use crate::types::{ColorEncoding, Extent2D, PresentMode};

/// Used when the surface cannot report its size and no resize has been seen.
pub const DEFAULT_FALLBACK_EXTENT: Extent2D = Extent2D::new(1920, 1200);

/// Application-supplied knobs. Every field has a default, so an empty TOML
/// table deserialises to `EngineSettings::default()`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub color: ColorEncoding,
    /// Highest priority first. FIFO is used when nothing here is supported.
    pub present_priority: Vec<PresentMode>,
    /// Overrides the `min + 1` heuristic; still clamped to the surface limits.
    pub image_count: Option<u32>,
    pub fallback_extent: Extent2D,
    /// Absent means acquire waits forever.
    pub acquire_timeout_ms: Option<u64>,
    /// Retry a failed ring allocation once before surfacing the error.
    pub allocation_retry: bool,
    pub allocation_retry_delay_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            color: ColorEncoding::Perceptual,
            present_priority: default_present_priority(),
            image_count: None,
            fallback_extent: DEFAULT_FALLBACK_EXTENT,
            acquire_timeout_ms: None,
            allocation_retry: true,
            allocation_retry_delay_ms: 16,
        }
    }
}

impl EngineSettings {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Delay before the single allocation retry, `None` when retrying is off.
    pub fn allocation_retry_delay(&self) -> Option<Duration> {
        self.allocation_retry
            .then(|| Duration::from_millis(self.allocation_retry_delay_ms))
    }

    /// Priority list for a vsync-locked display: low latency without tearing,
    /// then plain FIFO.
    pub fn vsync_priority() -> Vec<PresentMode> {
        vec![PresentMode::Mailbox, PresentMode::Fifo]
    }
}

pub fn default_present_priority() -> Vec<PresentMode> {
    vec![
        PresentMode::Mailbox,
        PresentMode::Immediate,
        PresentMode::Fifo,
    ]
}
