// SPDX-License-Identifier: CEPL-1.0
//! Debug-utils messenger and the sinks it forwards to.

use std::borrow::Cow;
use std::ffi::{c_void, CStr};
use std::fmt;
use std::fs::File;
use std::io::{self, LineWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use ash::ext::debug_utils;
use ash::vk;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RenderResult, VkResultExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Verbose,
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn from_vk(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Self {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        if flags.contains(S::ERROR) {
            Severity::Error
        } else if flags.contains(S::WARNING) {
            Severity::Warning
        } else if flags.contains(S::INFO) {
            Severity::Info
        } else {
            Severity::Verbose
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    General,
    Validation,
    Performance,
    DeviceAddressBinding,
}

impl Category {
    pub fn from_vk(flags: vk::DebugUtilsMessageTypeFlagsEXT) -> Self {
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        if flags.contains(T::VALIDATION) {
            Category::Validation
        } else if flags.contains(T::PERFORMANCE) {
            Category::Performance
        } else if flags.contains(T::DEVICE_ADDRESS_BINDING) {
            Category::DeviceAddressBinding
        } else {
            Category::General
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Category::General => "general",
            Category::Validation => "validation",
            Category::Performance => "performance",
            Category::DeviceAddressBinding => "device-address",
        })
    }
}

/// Receives API-reported messages. May be called from driver threads.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, severity: Severity, category: Category, message: &str);
}

/// Routes messages into `tracing` under the `vulkan` target.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn record(&self, severity: Severity, category: Category, message: &str) {
        match severity {
            Severity::Error => error!(target: "vulkan", "[{category}] {message}"),
            Severity::Warning => warn!(target: "vulkan", "[{category}] {message}"),
            Severity::Info => debug!(target: "vulkan", "[{category}] {message}"),
            Severity::Verbose => trace!(target: "vulkan", "[{category}] {message}"),
        }
    }
}

/// Appends one line per message to a file, flushed per line.
pub struct FileSink {
    out: Mutex<LineWriter<File>>,
    write_failed: AtomicBool,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path.as_ref())?;
        info!("vulkan diagnostics -> {}", path.as_ref().display());
        Ok(Self::from_file(file))
    }

    fn from_file(file: File) -> Self {
        Self {
            out: Mutex::new(LineWriter::new(file)),
            write_failed: AtomicBool::new(false),
        }
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, severity: Severity, category: Category, message: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        // Reported once; a full disk would otherwise flood the log.
        if let Err(e) = writeln!(out, "{severity:?} [{category}] {message}") {
            if !self.write_failed.swap(true, Ordering::Relaxed) {
                warn!("vulkan diagnostics file write failed: {e}");
            }
        }
    }
}

type SinkHandle = Box<dyn DiagnosticSink>;

/// Keeps the sink at a stable heap address for the callback's user pointer.
pub(crate) struct SinkAnchor(Box<SinkHandle>);

impl SinkAnchor {
    pub(crate) fn new(sink: SinkHandle) -> Self {
        Self(Box::new(sink))
    }

    fn user_data(&self) -> *mut c_void {
        let slot: &SinkHandle = &self.0;
        slot as *const SinkHandle as *mut c_void
    }

    /// Create info pointing at this anchor. Also chained into instance
    /// creation so instance create/destroy messages are captured.
    pub(crate) fn create_info(&self) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
        vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            p_user_data: self.user_data(),
            ..Default::default()
        }
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    let sink = &*(user as *const SinkHandle);
    let p_message = (*data).p_message;
    let message = if p_message.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(p_message).to_string_lossy()
    };
    sink.record(Severity::from_vk(severity), Category::from_vk(types), &message);
    vk::FALSE
}

/// Registered sink. Dropping it deregisters the callback before the sink
/// itself is released.
pub struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    _anchor: SinkAnchor,
}

impl DebugMessenger {
    pub(crate) unsafe fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        anchor: SinkAnchor,
    ) -> RenderResult<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = anchor.create_info();
        let handle = loader
            .create_debug_utils_messenger(&ci, None)
            .creation("create_debug_utils_messenger")?;
        debug!("debug messenger registered");
        Ok(Self {
            loader,
            handle,
            _anchor: anchor,
        })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.handle, None);
        }
        debug!("debug messenger deregistered");
    }
}
