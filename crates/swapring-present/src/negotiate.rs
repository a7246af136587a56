// SPDX-License-Identifier: CEPL-1.0
//! Capability negotiation: turn what the device and surface support into one
//! consistent swapchain [`Configuration`].

use tracing::{debug, info, warn};

use crate::backend::PresentBackend;
use crate::error::CapabilityError;
use crate::settings::EngineSettings;
use crate::types::{
    ColorEncoding, ColorFormat, ColorSpace, Extent2D, PresentMode, QueueFamilyInfo, QueueFlags,
    SurfaceCapabilities, SurfaceFormat, SurfaceTransforms,
};

/// The resolved swapchain parameters. Only [`negotiate`] produces these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Configuration {
    pub queue_family: u32,
    pub color_format: ColorFormat,
    pub color_space: ColorSpace,
    pub present_mode: PresentMode,
    /// Requested count; the ring reports what the platform actually created.
    pub image_count: u32,
    pub transform: SurfaceTransforms,
    pub extent: Extent2D,
}

impl Configuration {
    pub fn surface_format(&self) -> SurfaceFormat {
        SurfaceFormat::new(self.color_format, self.color_space)
    }
}

/// Query the backend and resolve a configuration.
///
/// `extent_hint` is the last size the window layer reported; it is used only
/// when the surface cannot report its own size. `previous` is the configuration
/// being replaced, if any: its color format is kept while the surface still
/// offers it.
pub fn negotiate<B: PresentBackend>(
    backend: &B,
    settings: &EngineSettings,
    extent_hint: Option<Extent2D>,
    previous: Option<&Configuration>,
) -> Result<Configuration, CapabilityError> {
    let families = backend.queue_families()?;
    let queue_family = select_queue_family(&families)?;

    // capabilities: image counts, transforms, current extent (or UNDEFINED)
    let caps = backend.surface_capabilities()?;
    // (format, colorspace) pairs; must choose one
    let formats = backend.surface_formats()?;
    // FIFO is always supported by conforming platforms, others are optional
    let modes = backend.present_modes()?;

    let surface_format = match previous {
        Some(prev) if formats.contains(&prev.surface_format()) => prev.surface_format(),
        _ => choose_surface_format(&formats, settings.color)?,
    };
    let present_mode = choose_present_mode(&modes, &settings.present_priority)?;
    let image_count = choose_image_count(&caps, settings.image_count);
    let extent = choose_extent(&caps, extent_hint, settings.fallback_extent);
    let transform = choose_transform(&caps);

    let config = Configuration {
        queue_family,
        color_format: surface_format.format,
        color_space: surface_format.color_space,
        present_mode,
        image_count,
        transform,
        extent,
    };

    info!(
        "present: queue family {}, format {:?} / {:?}, mode {:?}, extent {}, images(min={} max={} → picked={})",
        config.queue_family,
        config.color_format,
        config.color_space,
        config.present_mode,
        config.extent,
        caps.min_image_count,
        caps.max_image_count,
        config.image_count,
    );

    Ok(config)
}

/// Pick the single queue family used for both rendering and presentation.
pub fn select_queue_family(families: &[QueueFamilyInfo]) -> Result<u32, CapabilityError> {
    if let Some(f) = families
        .iter()
        .find(|f| f.flags.contains(QueueFlags::GRAPHICS) && f.supports_present)
    {
        return Ok(f.index);
    }

    let graphics = families
        .iter()
        .find(|f| f.flags.contains(QueueFlags::GRAPHICS))
        .ok_or(CapabilityError::NoGraphicsQueue)?;
    match families.iter().find(|f| f.supports_present) {
        Some(present) => Err(CapabilityError::SeparatePresentQueue {
            graphics: graphics.index,
            present: present.index,
        }),
        None => Err(CapabilityError::NoPresentQueue),
    }
}

/// First mode of `priority` the surface supports, otherwise FIFO.
pub fn choose_present_mode(
    supported: &[PresentMode],
    priority: &[PresentMode],
) -> Result<PresentMode, CapabilityError> {
    if supported.is_empty() {
        return Err(CapabilityError::NoPresentModes);
    }

    let best = supported
        .iter()
        .filter_map(|m| priority.iter().position(|p| p == m).map(|rank| (rank, *m)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, m)| m);

    Ok(best.unwrap_or_else(|| {
        debug!("present: no preferred mode supported, using FIFO");
        PresentMode::Fifo
    }))
}

/// One more than the minimum for better overlap, capped by the maximum
/// (0 == "no max"). An explicit `desired` count is clamped to the same range.
pub fn choose_image_count(caps: &SurfaceCapabilities, desired: Option<u32>) -> u32 {
    let want = desired.unwrap_or(caps.min_image_count.saturating_add(1));
    let count = want.max(caps.min_image_count);
    if caps.max_image_count == 0 {
        count
    } else {
        count.min(caps.max_image_count)
    }
}

/// The surface's own extent when it reports one; otherwise the window hint or
/// the fallback, clamped to whatever bounds the surface gives.
pub fn choose_extent(
    caps: &SurfaceCapabilities,
    hint: Option<Extent2D>,
    fallback: Extent2D,
) -> Extent2D {
    if caps.current_extent.is_usable() {
        return caps.current_extent;
    }

    let want = hint.filter(|h| h.is_usable()).unwrap_or(fallback);
    let extent = want.clamp_to(caps.min_image_extent, caps.max_image_extent);
    debug!(
        "present: surface extent undefined ({}), using {} (hint {:?})",
        caps.current_extent, extent, hint
    );
    extent
}

/// Engine's preferred format for an encoding, used when the surface accepts
/// anything.
pub fn preferred_format(encoding: ColorEncoding) -> SurfaceFormat {
    match encoding {
        ColorEncoding::Perceptual => {
            SurfaceFormat::new(ColorFormat::B8G8R8A8Srgb, ColorSpace::SrgbNonlinear)
        }
        ColorEncoding::Linear => {
            SurfaceFormat::new(ColorFormat::B8G8R8A8Unorm, ColorSpace::SrgbNonlinear)
        }
    }
}

pub fn choose_surface_format(
    formats: &[SurfaceFormat],
    encoding: ColorEncoding,
) -> Result<SurfaceFormat, CapabilityError> {
    let first = *formats.first().ok_or(CapabilityError::NoSurfaceFormats)?;

    if formats.len() == 1 && first.format == ColorFormat::Undefined {
        return Ok(preferred_format(encoding));
    }

    let ladder: &[ColorFormat] = match encoding {
        ColorEncoding::Perceptual => &[ColorFormat::B8G8R8A8Srgb, ColorFormat::R8G8B8A8Srgb],
        ColorEncoding::Linear => &[ColorFormat::B8G8R8A8Unorm, ColorFormat::R8G8B8A8Unorm],
    };
    for want in ladder {
        if let Some(f) = formats
            .iter()
            .find(|f| f.format == *want && f.color_space == ColorSpace::SrgbNonlinear)
        {
            return Ok(*f);
        }
    }

    warn!(
        "present: no {:?} format offered, using driver default {:?} / {:?}",
        encoding, first.format, first.color_space
    );
    Ok(first)
}

/// Prefer IDENTITY if supported (common), otherwise keep the current transform
/// to avoid an extra compositor pass.
pub fn choose_transform(caps: &SurfaceCapabilities) -> SurfaceTransforms {
    if caps
        .supported_transforms
        .contains(SurfaceTransforms::IDENTITY)
    {
        SurfaceTransforms::IDENTITY
    } else {
        caps.current_transform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockSurface};

    fn family(index: u32, flags: QueueFlags, supports_present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            index,
            flags,
            supports_present,
        }
    }

    fn caps(min: u32, max: u32, current: Extent2D) -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            ..SurfaceCapabilities::default()
        }
    }

    fn srgb(format: ColorFormat) -> SurfaceFormat {
        SurfaceFormat::new(format, ColorSpace::SrgbNonlinear)
    }

    #[test]
    fn combined_queue_family_wins() {
        let families = [
            family(0, QueueFlags::TRANSFER, false),
            family(1, QueueFlags::GRAPHICS | QueueFlags::COMPUTE, true),
            family(2, QueueFlags::GRAPHICS, true),
        ];
        assert_eq!(select_queue_family(&families), Ok(1));
    }

    #[test]
    fn separate_present_family_is_a_hard_error() {
        let families = [
            family(0, QueueFlags::GRAPHICS, false),
            family(1, QueueFlags::TRANSFER, true),
        ];
        assert_eq!(
            select_queue_family(&families),
            Err(CapabilityError::SeparatePresentQueue {
                graphics: 0,
                present: 1
            })
        );
    }

    #[test]
    fn missing_graphics_or_present_is_reported() {
        let no_graphics = [family(0, QueueFlags::COMPUTE, true)];
        assert_eq!(
            select_queue_family(&no_graphics),
            Err(CapabilityError::NoGraphicsQueue)
        );

        let no_present = [family(0, QueueFlags::GRAPHICS, false)];
        assert_eq!(
            select_queue_family(&no_present),
            Err(CapabilityError::NoPresentQueue)
        );

        assert_eq!(select_queue_family(&[]), Err(CapabilityError::NoGraphicsQueue));
    }

    #[test]
    fn present_mode_priority() {
        let prio = crate::settings::default_present_priority();
        let pick = |modes: &[PresentMode]| choose_present_mode(modes, &prio).unwrap();

        assert_eq!(pick(&[PresentMode::Fifo]), PresentMode::Fifo);
        assert_eq!(pick(&[PresentMode::Fifo, PresentMode::Mailbox]), PresentMode::Mailbox);
        assert_eq!(pick(&[PresentMode::Fifo, PresentMode::Immediate]), PresentMode::Immediate);
        assert_eq!(
            pick(&[PresentMode::Immediate, PresentMode::Fifo, PresentMode::Mailbox]),
            PresentMode::Mailbox
        );
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let mode = choose_present_mode(
            &[PresentMode::FifoRelaxed, PresentMode::Fifo],
            &[PresentMode::Mailbox],
        )
        .unwrap();
        assert_eq!(mode, PresentMode::Fifo);
        assert_eq!(
            choose_present_mode(&[], &[PresentMode::Fifo]),
            Err(CapabilityError::NoPresentModes)
        );
    }

    #[test]
    fn image_count_is_min_plus_one_clamped() {
        assert_eq!(choose_image_count(&caps(2, 3, Extent2D::UNDEFINED), None), 3);
        assert_eq!(choose_image_count(&caps(2, 8, Extent2D::UNDEFINED), None), 3);
        assert_eq!(choose_image_count(&caps(2, 0, Extent2D::UNDEFINED), None), 3);
        assert_eq!(choose_image_count(&caps(3, 3, Extent2D::UNDEFINED), None), 3);
    }

    #[test]
    fn image_count_survives_extreme_minimum() {
        let c = caps(u32::MAX, 0, Extent2D::UNDEFINED);
        assert_eq!(choose_image_count(&c, None), u32::MAX);
        let c = caps(u32::MAX, u32::MAX, Extent2D::UNDEFINED);
        assert_eq!(choose_image_count(&c, None), u32::MAX);
    }

    #[test]
    fn image_count_bounds_hold_across_surfaces() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let c = caps(min, max, Extent2D::UNDEFINED);
                let n = choose_image_count(&c, None);
                assert!(n >= min);
                if max != 0 {
                    assert!(n <= max);
                }
                if max == 0 || max > min {
                    assert!(n >= min + 1, "min={min} max={max} n={n}");
                }
            }
        }
    }

    #[test]
    fn desired_image_count_is_clamped() {
        let c = caps(2, 4, Extent2D::UNDEFINED);
        assert_eq!(choose_image_count(&c, Some(1)), 2);
        assert_eq!(choose_image_count(&c, Some(2)), 2);
        assert_eq!(choose_image_count(&c, Some(9)), 4);
    }

    #[test]
    fn extent_uses_current_when_reported() {
        let c = caps(2, 3, Extent2D::new(800, 600));
        let hint = Some(Extent2D::new(1024, 768));
        assert_eq!(
            choose_extent(&c, hint, Extent2D::new(1920, 1200)),
            Extent2D::new(800, 600)
        );
    }

    #[test]
    fn zero_or_undefined_extent_uses_fallback() {
        let fallback = Extent2D::new(1920, 1200);
        let zero = caps(2, 3, Extent2D::new(0, 0));
        assert_eq!(choose_extent(&zero, None, fallback), fallback);
        let undefined = caps(2, 3, Extent2D::UNDEFINED);
        assert_eq!(choose_extent(&undefined, None, fallback), fallback);
    }

    #[test]
    fn undefined_extent_prefers_window_hint_within_bounds() {
        let c = SurfaceCapabilities {
            min_image_extent: Extent2D::new(64, 64),
            max_image_extent: Extent2D::new(4096, 2048),
            ..caps(2, 3, Extent2D::UNDEFINED)
        };
        let fallback = Extent2D::new(1920, 1200);
        assert_eq!(
            choose_extent(&c, Some(Extent2D::new(1280, 720)), fallback),
            Extent2D::new(1280, 720)
        );
        assert_eq!(
            choose_extent(&c, Some(Extent2D::new(8000, 16)), fallback),
            Extent2D::new(4096, 64)
        );
        // a zero-sized hint is ignored
        assert_eq!(choose_extent(&c, Some(Extent2D::new(0, 0)), fallback), fallback);
    }

    #[test]
    fn undefined_format_entry_means_any() {
        let any = [SurfaceFormat::new(ColorFormat::Undefined, ColorSpace::SrgbNonlinear)];
        assert_eq!(
            choose_surface_format(&any, ColorEncoding::Perceptual).unwrap(),
            srgb(ColorFormat::B8G8R8A8Srgb)
        );
        assert_eq!(
            choose_surface_format(&any, ColorEncoding::Linear).unwrap(),
            srgb(ColorFormat::B8G8R8A8Unorm)
        );
    }

    #[test]
    fn format_ladder_by_encoding() {
        let formats = [
            srgb(ColorFormat::R8G8B8A8Unorm),
            srgb(ColorFormat::R8G8B8A8Srgb),
            srgb(ColorFormat::B8G8R8A8Unorm),
        ];
        assert_eq!(
            choose_surface_format(&formats, ColorEncoding::Perceptual).unwrap(),
            srgb(ColorFormat::R8G8B8A8Srgb)
        );
        assert_eq!(
            choose_surface_format(&formats, ColorEncoding::Linear).unwrap(),
            srgb(ColorFormat::B8G8R8A8Unorm)
        );
    }

    #[test]
    fn format_falls_back_to_first_and_rejects_empty() {
        let odd = [
            SurfaceFormat::new(ColorFormat::A2B10G10R10Unorm, ColorSpace::Other(1_000_104_002)),
            srgb(ColorFormat::R16G16B16A16Sfloat),
        ];
        assert_eq!(
            choose_surface_format(&odd, ColorEncoding::Perceptual).unwrap(),
            odd[0]
        );
        assert_eq!(
            choose_surface_format(&[], ColorEncoding::Perceptual),
            Err(CapabilityError::NoSurfaceFormats)
        );
    }

    #[test]
    fn transform_prefers_identity() {
        let mut c = SurfaceCapabilities::default();
        c.supported_transforms = SurfaceTransforms::IDENTITY | SurfaceTransforms::ROTATE_90;
        c.current_transform = SurfaceTransforms::ROTATE_90;
        assert_eq!(choose_transform(&c), SurfaceTransforms::IDENTITY);

        c.supported_transforms = SurfaceTransforms::ROTATE_90 | SurfaceTransforms::ROTATE_270;
        assert_eq!(choose_transform(&c), SurfaceTransforms::ROTATE_90);
    }

    #[test]
    fn negotiate_end_to_end_against_mock_surface() {
        let surface = MockSurface {
            caps: caps(2, 3, Extent2D::new(1024, 768)),
            formats: vec![SurfaceFormat::new(ColorFormat::Undefined, ColorSpace::SrgbNonlinear)],
            modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            ..MockSurface::default()
        };
        let backend = MockBackend::new(surface);
        let config = negotiate(&backend, &EngineSettings::default(), None, None).unwrap();

        assert_eq!(config.image_count, 3);
        assert_eq!(config.present_mode, PresentMode::Mailbox);
        assert_eq!(config.extent, Extent2D::new(1024, 768));
        assert_eq!(config.color_format, ColorFormat::B8G8R8A8Srgb);
        assert_eq!(config.color_space, ColorSpace::SrgbNonlinear);
        assert_eq!(config.transform, SurfaceTransforms::IDENTITY);
    }

    #[test]
    fn negotiate_keeps_previous_format_while_offered() {
        let surface = MockSurface {
            formats: vec![
                srgb(ColorFormat::B8G8R8A8Srgb),
                srgb(ColorFormat::R8G8B8A8Unorm),
            ],
            ..MockSurface::default()
        };
        let backend = MockBackend::new(surface);
        let settings = EngineSettings::default();
        let first = negotiate(&backend, &settings, None, None).unwrap();
        assert_eq!(first.color_format, ColorFormat::B8G8R8A8Srgb);

        let prev = Configuration {
            color_format: ColorFormat::R8G8B8A8Unorm,
            ..first.clone()
        };
        let again = negotiate(&backend, &settings, None, Some(&prev)).unwrap();
        assert_eq!(again.color_format, ColorFormat::R8G8B8A8Unorm);

        backend.state().borrow_mut().surface.formats = vec![srgb(ColorFormat::B8G8R8A8Srgb)];
        let changed = negotiate(&backend, &settings, None, Some(&prev)).unwrap();
        assert_eq!(changed.color_format, ColorFormat::B8G8R8A8Srgb);
    }

    #[test]
    fn negotiate_surfaces_query_failures_and_empty_lists() {
        let backend = MockBackend::new(MockSurface {
            modes: vec![],
            ..MockSurface::default()
        });
        assert_eq!(
            negotiate(&backend, &EngineSettings::default(), None, None),
            Err(CapabilityError::NoPresentModes)
        );

        let backend = MockBackend::new(MockSurface::default());
        backend.state().borrow_mut().fail_capability_query = true;
        assert!(matches!(
            negotiate(&backend, &EngineSettings::default(), None, None),
            Err(CapabilityError::Query(_))
        ));
    }
}
