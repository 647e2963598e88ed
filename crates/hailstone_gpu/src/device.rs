use std::ops::Deref;

use anyhow::{bail, Context as _, Result};
use ash::vk;
use tracing::debug;

use crate::context::Context;

/// Queue families the stream runs on. Transfer falls back to the compute
/// family, and both fall back to graphics, so `unified` marks heaps where
/// the ownership transfer degenerates to a plain barrier.
#[derive(Clone, Copy, Debug)]
pub struct QueueFamilies {
    pub transfer: u32,
    pub compute: u32,
    pub transfer_timestamp_bits: u32,
    pub compute_timestamp_bits: u32,
    pub unified: bool,
}

/// An adapter handle with the cached properties selection and setup need.
#[derive(Clone)]
pub struct PhysicalDevice {
    pub(crate) handle: vk::PhysicalDevice,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub(crate) queues: QueueFamilies,
    name: String,
}

impl PhysicalDevice {
    pub(crate) fn new(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(handle) };
        let family_properties =
            unsafe { instance.get_physical_device_queue_family_properties(handle) };

        let mut graphics = None;
        let mut dedicated_compute = None;
        let mut dedicated_transfer = None;
        for (index, family) in family_properties.iter().enumerate() {
            let flags = family.queue_flags;
            match (
                flags.contains(vk::QueueFlags::GRAPHICS),
                flags.contains(vk::QueueFlags::COMPUTE),
                flags.contains(vk::QueueFlags::TRANSFER),
            ) {
                (true, true, true) => {
                    graphics.get_or_insert(index as u32);
                }
                (false, true, true) => {
                    dedicated_compute.get_or_insert(index as u32);
                }
                (false, false, true) => {
                    dedicated_transfer.get_or_insert(index as u32);
                }
                _ => (),
            }
        }

        let compute = match dedicated_compute.or(graphics) {
            Some(family) => family,
            None => bail!("Adapter should expose a compute-capable queue family."),
        };
        let transfer = dedicated_transfer.unwrap_or(compute);
        let queues = QueueFamilies {
            transfer,
            compute,
            transfer_timestamp_bits: family_properties[transfer as usize].timestamp_valid_bits,
            compute_timestamp_bits: family_properties[compute as usize].timestamp_valid_bits,
            unified: transfer == compute,
        };

        let name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("unknown adapter"));

        Ok(Self {
            handle,
            properties,
            memory_properties,
            queues,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Selection score. Zero means unusable for this workload.
    pub(crate) fn score(&self) -> u32 {
        if self.properties.api_version < vk::make_api_version(0, 1, 3, 0) {
            return 0;
        }
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
            _ => 1,
        }
    }
}

/// Thin wrapper so heap and pipeline handles can keep a stable pointer to the
/// device across moves of the owning structs.
pub struct LogicalDevice {
    device: ash::Device,
}

impl Deref for LogicalDevice {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.device
    }
}

/// Logical device plus the two queues the stream submits to.
pub struct Device {
    pub(crate) physical_device: PhysicalDevice,
    pub(crate) logical_device: Box<LogicalDevice>,
    pub(crate) transfer_queue: vk::Queue,
    pub(crate) compute_queue: vk::Queue,
}

impl Device {
    pub fn new(context: &Context) -> Result<Self> {
        let physical_device = context.physical_device.clone();
        let queues = physical_device.queues;
        debug!(
            "queue families: transfer {} (timestamp bits {}), compute {} (timestamp bits {})",
            queues.transfer,
            queues.transfer_timestamp_bits,
            queues.compute,
            queues.compute_timestamp_bits
        );

        let priorities = [1.0];
        let mut queue_infos = vec![vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queues.compute)
            .queue_priorities(&priorities)];
        if !queues.unified {
            queue_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(queues.transfer)
                    .queue_priorities(&priorities),
            );
        }

        // All three are core mandatory once the adapter reports 1.3.
        let mut timeline_semaphore_features =
            vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true);
        let mut synchronization2_features =
            vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut host_query_reset_features =
            vk::PhysicalDeviceHostQueryResetFeatures::default().host_query_reset(true);
        let mut features = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut timeline_semaphore_features)
            .push_next(&mut synchronization2_features)
            .push_next(&mut host_query_reset_features);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .push_next(&mut features);
        let device = unsafe {
            context
                .instance
                .create_device(physical_device.handle, &create_info, None)
        }
        .context("Device should be created.")?;

        let transfer_queue = unsafe { device.get_device_queue(queues.transfer, 0) };
        let compute_queue = unsafe { device.get_device_queue(queues.compute, 0) };

        Ok(Self {
            physical_device,
            logical_device: Box::new(LogicalDevice { device }),
            transfer_queue,
            compute_queue,
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical_device.device_wait_idle() }.context("Device should reach idle.")
    }

    /// Tick length of the timestamp counter, in nanoseconds.
    pub(crate) fn timestamp_period(&self) -> f32 {
        self.physical_device.properties.limits.timestamp_period
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // Safety: heap and pipeline objects are dropped first and each
            // waits for its submissions, so the device is idle here.
            let _ = self.logical_device.device_wait_idle();
            self.logical_device.destroy_device(None);
        }
    }
}
