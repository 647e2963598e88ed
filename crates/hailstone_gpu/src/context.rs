use std::ffi::CStr;
use std::os::raw::c_char;

use anyhow::{ensure, Context as _, Result};
use ash::vk;
use tracing::info;

use crate::config::SearchConfig;
use crate::device::PhysicalDevice;
#[cfg(debug_assertions)]
use crate::validation::*;

/// Instance-level state: the loaded entry points, the instance, the selected
/// adapter and, in debug builds, the validation messenger.
pub struct Context {
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: PhysicalDevice,
    #[cfg(debug_assertions)]
    debug_utils: DebugUtilsInstance,
    #[cfg(debug_assertions)]
    debug_utils_messenger: DebugUtilsMessenger,
}

impl Context {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let entry = ash::Entry::linked();

        #[cfg(debug_assertions)]
        let layer_names = unsafe {
            [CStr::from_bytes_with_nul_unchecked(
                b"VK_LAYER_KHRONOS_validation\0",
            )]
        };
        #[cfg(not(debug_assertions))]
        let layer_names: [&CStr; 0] = [];
        let layer_names_raw: Vec<*const c_char> =
            layer_names.iter().map(|raw_name| raw_name.as_ptr()).collect();

        #[cfg(debug_assertions)]
        let extension_names = [ash::ext::debug_utils::NAME.as_ptr()];
        #[cfg(not(debug_assertions))]
        let extension_names: [*const c_char; 0] = [];

        let application_name =
            unsafe { CStr::from_bytes_with_nul_unchecked(b"hailstone\0") };
        let application_info = vk::ApplicationInfo::default()
            .application_name(application_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(application_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::make_api_version(0, 1, 3, 0));

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&layer_names_raw)
            .enabled_extension_names(&extension_names);
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Instance should be created.")?;

        // Enumerate adapters and keep the one asked for, or the best scoring.
        let mut devices = unsafe { instance.enumerate_physical_devices() }
            .context("Physical devices should be enumerable.")?
            .into_iter()
            .map(|handle| PhysicalDevice::new(&instance, handle))
            .collect::<Result<Vec<_>>>()?;
        ensure!(!devices.is_empty(), "No Vulkan adapters found.");
        for (index, device) in devices.iter().enumerate() {
            info!("adapter {index}: {} (score {})", device.name(), device.score());
        }

        let selected = match config.device_index {
            Some(index) => {
                ensure!(
                    index < devices.len(),
                    "Adapter index {index} is out of range, {} found.",
                    devices.len()
                );
                index
            }
            None => {
                devices
                    .iter()
                    .enumerate()
                    .max_by_key(|(_, device)| device.score())
                    .map(|(index, _)| index)
                    .unwrap_or(0)
            }
        };
        let physical_device = devices.swap_remove(selected);
        ensure!(
            physical_device.score() > 0,
            "Adapter {} does not support Vulkan 1.3 compute.",
            physical_device.name()
        );
        info!("using adapter {}", physical_device.name());

        #[cfg(debug_assertions)]
        let (debug_utils, debug_utils_messenger) = {
            let messenger_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                .message_severity(
                    MessageSeverity::ERROR | MessageSeverity::WARNING | MessageSeverity::INFO,
                )
                .message_type(
                    MessageType::GENERAL | MessageType::VALIDATION | MessageType::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_utils_messenger_callback));
            let debug_utils = DebugUtilsInstance::new(&entry, &instance);
            let debug_utils_messenger = unsafe {
                debug_utils.create_debug_utils_messenger(&messenger_info, None)
            }
            .context("Debug utils messenger should be created.")?;
            (debug_utils, debug_utils_messenger)
        };

        Ok(Self {
            _entry: entry,
            instance,
            physical_device,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_utils_messenger,
        })
    }

    pub fn adapter_name(&self) -> &str {
        self.physical_device.name()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            // Safety: the logical device is dropped before the context by
            // construction, so no child objects remain.
            #[cfg(debug_assertions)]
            self.debug_utils
                .destroy_debug_utils_messenger(self.debug_utils_messenger, None);
            self.instance.destroy_instance(None);
        }
    }
}
