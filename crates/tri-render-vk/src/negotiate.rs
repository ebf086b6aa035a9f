// SPDX-License-Identifier: CEPL-1.0
//! Capability negotiation: adapter, queue family, surface format, present
//! mode, extent, image count. The `choose_*` functions are pure over the
//! query results so every selection rule is testable without a GPU.

use ash::vk;
use tracing::{debug, info};
use tri_render::RenderSize;

use crate::context::Surface;
use crate::error::{RenderError, RenderResult, VkResultExt};

/// Four-channel sRGB. The three-channel `B8G8R8_SRGB` is almost never offered
/// as a swapchain format, so matching on it would always hit the fallback.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Low-latency triple buffering.
    #[default]
    Mailbox,
    Fifo,
    FifoRelaxed,
    Immediate,
}

impl PresentModePreference {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
            PresentModePreference::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// The physical device picked for rendering and its graphics+present family.
#[derive(Clone, Debug)]
pub struct Adapter {
    pub physical: vk::PhysicalDevice,
    pub queue_family: u32,
    pub name: String,
}

#[derive(Clone, Copy, Debug)]
pub struct SurfaceConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub transform: vk::SurfaceTransformFlagsKHR,
}

/// First family, in index order, that can draw and present. Query errors
/// propagate rather than counting as "no support".
pub fn select_queue_family<F>(
    families: &[vk::QueueFamilyProperties],
    mut presents: F,
) -> RenderResult<Option<u32>>
where
    F: FnMut(u32) -> RenderResult<bool>,
{
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && presents(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> RenderResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| formats.first().copied())
        .ok_or(RenderError::NoSurfaceSupport("surface formats"))
}

pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> RenderResult<vk::PresentModeKHR> {
    if modes.contains(&preferred) {
        return Ok(preferred);
    }
    modes
        .first()
        .copied()
        .ok_or(RenderError::NoSurfaceSupport("present modes"))
}

/// `u32::MAX` in `current_extent` means the surface lets the swapchain decide.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: window
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: window
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}

pub fn negotiate_surface(
    caps: &vk::SurfaceCapabilitiesKHR,
    formats: &[vk::SurfaceFormatKHR],
    modes: &[vk::PresentModeKHR],
    window: RenderSize,
    preferred_mode: PresentModePreference,
) -> RenderResult<SurfaceConfig> {
    Ok(SurfaceConfig {
        format: choose_surface_format(formats, PREFERRED_SURFACE_FORMAT)?,
        present_mode: choose_present_mode(modes, preferred_mode.to_vk())?,
        extent: choose_extent(caps, window),
        image_count: caps.min_image_count,
        transform: caps.current_transform,
    })
}

/// Scans physical devices in enumeration order and takes the first that has
/// a graphics+present queue family for `surface`.
pub unsafe fn select_adapter(instance: &ash::Instance, surface: &Surface) -> RenderResult<Adapter> {
    let devices = instance
        .enumerate_physical_devices()
        .creation("enumerate_physical_devices")?;

    for physical in devices {
        let props = instance.get_physical_device_properties(physical);
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed device>".to_owned());

        let families = instance.get_physical_device_queue_family_properties(physical);
        let found = select_queue_family(&families, |index| {
            surface
                .loader()
                .get_physical_device_surface_support(physical, index, surface.raw())
                .creation("get_physical_device_surface_support")
        })?;

        match found {
            Some(queue_family) => {
                info!("adapter: {name} (queue family {queue_family})");
                return Ok(Adapter {
                    physical,
                    queue_family,
                    name,
                });
            }
            None => debug!("skipping {name}: no graphics+present queue family"),
        }
    }
    Err(RenderError::NoPresentQueue)
}

pub unsafe fn query_surface_config(
    surface: &Surface,
    adapter: &Adapter,
    window: RenderSize,
    preferred_mode: PresentModePreference,
) -> RenderResult<SurfaceConfig> {
    let loader = surface.loader();
    let caps = loader
        .get_physical_device_surface_capabilities(adapter.physical, surface.raw())
        .creation("get_physical_device_surface_capabilities")?;
    let formats = loader
        .get_physical_device_surface_formats(adapter.physical, surface.raw())
        .creation("get_physical_device_surface_formats")?;
    let modes = loader
        .get_physical_device_surface_present_modes(adapter.physical, surface.raw())
        .creation("get_physical_device_surface_present_modes")?;

    let config = negotiate_surface(&caps, &formats, &modes, window, preferred_mode)?;
    info!(
        "surface: {:?}/{:?}, {:?}, {}x{}, {} images",
        config.format.format,
        config.format.color_space,
        config.present_mode,
        config.extent.width,
        config.extent.height,
        config.image_count
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn caps_undefined() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn first_graphics_present_family_wins() {
        let families = [
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        // family 1 cannot present, 2 and 3 can
        let picked = select_queue_family(&families, |i| Ok(i >= 2)).unwrap();
        assert_eq!(picked, Some(2));
    }

    #[test]
    fn present_support_is_only_queried_for_graphics_families() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let picked = select_queue_family(&families, |i| {
            queried.push(i);
            Ok(true)
        })
        .unwrap();
        assert_eq!(picked, Some(1));
        assert_eq!(queried, [1]);
    }

    #[test]
    fn no_qualifying_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        assert_eq!(select_queue_family(&families, |_| Ok(false)).unwrap(), None);
    }

    #[test]
    fn support_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let err = select_queue_family(&families, |_| {
            Err(RenderError::Creation {
                stage: "get_physical_device_surface_support",
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            })
        })
        .unwrap_err();
        assert!(matches!(err, RenderError::Creation { .. }));
    }

    #[test]
    fn exact_format_match_preferred() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let f = choose_surface_format(&formats, PREFERRED_SURFACE_FORMAT).unwrap();
        assert_eq!(f.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn format_needs_color_space_match_too() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
        ];
        let f = choose_surface_format(&formats, PREFERRED_SURFACE_FORMAT).unwrap();
        assert_eq!(f.format, vk::Format::R16G16B16A16_SFLOAT);
        assert_eq!(f.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn empty_format_list_is_fatal() {
        let err = choose_surface_format(&[], PREFERRED_SURFACE_FORMAT).unwrap_err();
        assert!(matches!(err, RenderError::NoSurfaceSupport(_)));
    }

    #[test]
    fn present_mode_falls_back_to_first_reported() {
        let modes = [vk::PresentModeKHR::FIFO_RELAXED, vk::PresentModeKHR::FIFO];
        let m = choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX).unwrap();
        assert_eq!(m, vk::PresentModeKHR::FIFO_RELAXED);
    }

    #[test]
    fn present_mode_prefers_mailbox_when_reported() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let m = choose_present_mode(&modes, PresentModePreference::default().to_vk()).unwrap();
        assert_eq!(m, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn undefined_extent_uses_window_size() {
        let e = choose_extent(
            &caps_undefined(),
            RenderSize {
                width: 500,
                height: 500,
            },
        );
        assert_eq!((e.width, e.height), (500, 500));
    }

    #[test]
    fn undefined_extent_is_clamped() {
        let e = choose_extent(
            &caps_undefined(),
            RenderSize {
                width: 0,
                height: 10_000,
            },
        );
        assert_eq!((e.width, e.height), (1, 4096));
    }

    #[test]
    fn defined_extent_wins_over_window() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            ..caps_undefined()
        };
        let e = choose_extent(
            &caps,
            RenderSize {
                width: 500,
                height: 500,
            },
        );
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn negotiated_config_uses_minimum_image_count() {
        let formats = [fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let modes = [vk::PresentModeKHR::FIFO];
        let cfg = negotiate_surface(
            &caps_undefined(),
            &formats,
            &modes,
            RenderSize {
                width: 500,
                height: 500,
            },
            PresentModePreference::Mailbox,
        )
        .unwrap();
        assert_eq!(cfg.image_count, 2);
        assert_eq!(cfg.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(cfg.format.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(cfg.transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }
}
