use std::ffi::CStr;
use std::fs::File;

use anyhow::{bail, Context as _, Result};
use ash::util::read_spv;
use ash::vk;

use crate::config::SearchConfig;
use crate::device::{Device, LogicalDevice};

/// The kernel pipeline, with the workgroup width burned in through a
/// specialization constant so the host and the dispatch always agree.
pub struct ComputePipeline {
    device: *const LogicalDevice,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) layout: vk::PipelineLayout,
    pub(crate) descriptor_set_layout: vk::DescriptorSetLayout,
}

impl ComputePipeline {
    pub fn new(device: &Device, config: &SearchConfig) -> Result<Self> {
        let logical_device = device.logical_device.as_ref();

        let mut file = File::open(&config.shader_path).with_context(|| {
            format!("Shader {} should be readable.", config.shader_path.display())
        })?;
        let code = read_spv(&mut file).with_context(|| {
            format!("Shader {} should be valid SPIR-V.", config.shader_path.display())
        })?;

        // binding 0: candidate limbs, binding 1: packed count pairs
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::COMPUTE),
        ];
        let descriptor_set_layout = unsafe {
            logical_device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings),
                None,
            )
        }
        .context("DescriptorSetLayout should be created.")?;

        let set_layouts = [descriptor_set_layout];
        let layout = unsafe {
            logical_device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts),
                None,
            )
        }
        .context("PipelineLayout should be created.")?;

        let specialization_entries = [vk::SpecializationMapEntry::default()
            .constant_id(0)
            .offset(0)
            .size(4)];
        let specialization_data = config.workgroup_size.to_ne_bytes();
        let specialization_info = vk::SpecializationInfo::default()
            .map_entries(&specialization_entries)
            .data(&specialization_data);

        let entry_point = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };
        let mut shader_module_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .name(entry_point)
            .specialization_info(&specialization_info)
            .push_next(&mut shader_module_info);

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);
        let pipeline = match unsafe {
            logical_device.create_compute_pipelines(
                vk::PipelineCache::null(),
                &[create_info],
                None,
            )
        } {
            Ok(pipelines) => pipelines[0],
            Err((_, error)) => bail!(error),
        };

        Ok(Self {
            device: logical_device as *const LogicalDevice,
            pipeline,
            layout,
            descriptor_set_layout,
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        // Safety: the stream drains before teardown, so nothing references
        // the pipeline on the device.
        let device = unsafe { self.device.as_ref().unwrap() };
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.layout, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
    }
}
