// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr, CString};

use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};

use crate::diagnostics::{DebugMessenger, DiagnosticSink, SinkAnchor};
use crate::error::{RenderResult, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-level state: loader entry, instance, and the optional
/// diagnostics messenger. Outlives every other Vulkan object.
pub struct Context {
    debug: Option<DebugMessenger>,
    instance: Instance,
    entry: Entry,
    validation: bool,
}

impl Context {
    pub unsafe fn new(
        display: RawDisplayHandle,
        app_name: &str,
        validation: bool,
        sink: Option<Box<dyn DiagnosticSink>>,
    ) -> RenderResult<Self> {
        let entry = Entry::load()?;

        let mut extensions = ash_window::enumerate_required_extensions(display)
            .creation("enumerate_required_extensions")?
            .to_vec();

        let available = entry
            .enumerate_instance_extension_properties(None)
            .creation("enumerate_instance_extension_properties")?;
        let has_debug_utils = available
            .iter()
            .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == debug_utils::NAME));

        let anchor = match sink {
            Some(sink) if has_debug_utils => {
                extensions.push(debug_utils::NAME.as_ptr());
                Some(SinkAnchor::new(sink))
            }
            Some(_) => {
                warn!("VK_EXT_debug_utils unavailable; API diagnostics disabled");
                None
            }
            None => None,
        };

        let mut layers = Vec::new();
        if validation {
            let installed = entry
                .enumerate_instance_layer_properties()
                .creation("enumerate_instance_layer_properties")?;
            if installed
                .iter()
                .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER))
            {
                layers.push(VALIDATION_LAYER.as_ptr());
            } else {
                warn!("{VALIDATION_LAYER:?} not installed; running without validation");
            }
        }

        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app_name.as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: c"tri".as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_2,
            ..Default::default()
        };

        let debug_ci = anchor.as_ref().map(SinkAnchor::create_info);
        let p_next = debug_ci
            .as_ref()
            .map_or(std::ptr::null(), |ci| ci as *const _ as *const c_void);

        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_next,
            p_application_info: &app_info,
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            ..Default::default()
        };

        let instance = entry
            .create_instance(&create_info, None)
            .creation("create_instance")?;

        let mut ctx = Self {
            debug: None,
            instance,
            entry,
            validation: !layers.is_empty(),
        };
        if let Some(anchor) = anchor {
            ctx.debug = Some(DebugMessenger::new(&ctx.entry, &ctx.instance, anchor)?);
        }

        info!(
            "vulkan instance ready (validation={}, diagnostics={})",
            ctx.validation,
            ctx.debug.is_some()
        );
        Ok(ctx)
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // messenger goes before the instance it was registered on
        self.debug.take();
        unsafe {
            self.instance.destroy_instance(None);
        }
        debug!("instance destroyed");
    }
}

/// Presentation surface created from the window's raw handles.
pub struct Surface {
    loader: surface::Instance,
    raw: vk::SurfaceKHR,
}

impl Surface {
    pub unsafe fn new(
        ctx: &Context,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> RenderResult<Self> {
        let raw = ash_window::create_surface(ctx.entry(), ctx.instance(), display, window, None)
            .creation("create_surface")?;
        let loader = surface::Instance::new(ctx.entry(), ctx.instance());
        Ok(Self { loader, raw })
    }

    pub fn loader(&self) -> &surface::Instance {
        &self.loader
    }

    pub fn raw(&self) -> vk::SurfaceKHR {
        self.raw
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.raw, None);
        }
        debug!("surface destroyed");
    }
}
