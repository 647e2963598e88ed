pub use ash::ext::debug_utils::Instance as DebugUtilsInstance;
pub use ash::vk::{
    DebugUtilsMessageSeverityFlagsEXT as MessageSeverity,
    DebugUtilsMessageTypeFlagsEXT as MessageType, DebugUtilsMessengerEXT as DebugUtilsMessenger,
};

use std::borrow::Cow;
use std::ffi::CStr;

use ash::vk;
use tracing::{debug, error, trace, warn};

/// Routes validation layer output through the crate's log stream.
pub unsafe extern "system" fn debug_utils_messenger_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    let callback_data = *p_callback_data;

    let message_id_name = if callback_data.p_message_id_name.is_null() {
        Cow::from("unknown")
    } else {
        CStr::from_ptr(callback_data.p_message_id_name).to_string_lossy()
    };
    let message = if callback_data.p_message.is_null() {
        Cow::from("")
    } else {
        CStr::from_ptr(callback_data.p_message).to_string_lossy()
    };

    match message_severity {
        MessageSeverity::ERROR => {
            error!("{message_type:?} [{message_id_name}]: {message}");
        }
        MessageSeverity::WARNING => {
            warn!("{message_type:?} [{message_id_name}]: {message}");
        }
        MessageSeverity::INFO => {
            debug!("{message_type:?} [{message_id_name}]: {message}");
        }
        _ => {
            trace!("{message_type:?} [{message_id_name}]: {message}");
        }
    }

    vk::FALSE
}
