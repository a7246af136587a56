// SPDX-License-Identifier: CEPL-1.0
//! Validation layer plumbing. Only active in debug builds, and only when the
//! loader actually offers `VK_EXT_debug_utils`.

use anyhow::Result;
use ash::vk;
use std::ffi::CStr;

#[cfg(debug_assertions)]
use ash::ext::debug_utils as ext_debug;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[cfg(debug_assertions)]
pub type DebugState = Option<(ext_debug::Instance, vk::DebugUtilsMessengerEXT)>;
#[cfg(not(debug_assertions))]
pub type DebugState = ();

/// Instance extensions and layers to enable on top of the WSI ones.
pub struct DebugRequest {
    pub extensions: Vec<*const std::os::raw::c_char>,
    pub layers: Vec<*const std::os::raw::c_char>,
}

#[cfg(debug_assertions)]
pub unsafe fn request(entry: &ash::Entry) -> DebugRequest {
    let has_ext = unsafe { entry.enumerate_instance_extension_properties(None) }
        .unwrap_or_default()
        .iter()
        .any(|e| e.extension_name_as_c_str() == Ok(ext_debug::NAME));
    let has_layer = unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| l.layer_name_as_c_str() == Ok(VALIDATION_LAYER));

    if !has_layer {
        tracing::debug!("vk: validation layer not installed");
    }
    DebugRequest {
        extensions: if has_ext { vec![ext_debug::NAME.as_ptr()] } else { vec![] },
        layers: if has_layer { vec![VALIDATION_LAYER.as_ptr()] } else { vec![] },
    }
}

#[cfg(not(debug_assertions))]
pub unsafe fn request(_entry: &ash::Entry) -> DebugRequest {
    DebugRequest {
        extensions: Vec::new(),
        layers: Vec::new(),
    }
}

#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { (*data).message_as_c_str() }
        .map(|m| m.to_string_lossy())
        .unwrap_or_default();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!("[vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!("[vulkan] {msg}");
    } else {
        tracing::trace!("[vulkan] {msg}");
    }
    vk::FALSE
}

#[cfg(debug_assertions)]
pub unsafe fn create_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
    request: &DebugRequest,
) -> Result<DebugState> {
    if request.extensions.is_empty() {
        return Ok(None);
    }
    let loader = ext_debug::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None)? };
    Ok(Some((loader, messenger)))
}

#[cfg(not(debug_assertions))]
pub unsafe fn create_messenger(
    _entry: &ash::Entry,
    _instance: &ash::Instance,
    _request: &DebugRequest,
) -> Result<DebugState> {
    Ok(())
}

#[cfg(debug_assertions)]
pub unsafe fn destroy_messenger(state: &mut DebugState) {
    if let Some((loader, messenger)) = state.take() {
        unsafe { loader.destroy_debug_utils_messenger(messenger, None) };
    }
}

#[cfg(not(debug_assertions))]
pub unsafe fn destroy_messenger(_state: &mut DebugState) {
    // no-op
}
