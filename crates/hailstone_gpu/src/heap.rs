use std::mem::ManuallyDrop;

use anyhow::{bail, Context as _, Result};
use ash::vk;
use vk_mem::{Alloc, AllocationCreateFlags, AllocationCreateInfo, MemoryUsage};

use crate::config::SearchConfig;
use crate::context::Context;
use crate::device::{Device, LogicalDevice, QueueFamilies};
use crate::pipeline::ComputePipeline;

/// Which queue family a slot region was last released to. Every submission
/// must find the slot in the matching state, which catches protocol slips on
/// the host before the device ever sees them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SlotOwner {
    /// Not primed yet.
    Idle,
    /// The compute batch released the region back to the transfer family.
    TransferOwned,
    /// An upload released the region to the compute family.
    ComputeOwned,
}

impl SlotOwner {
    /// State after submitting transfer work for the slot.
    pub(crate) fn after_transfer(self, slot: usize) -> Result<SlotOwner> {
        match self {
            SlotOwner::Idle | SlotOwner::TransferOwned => Ok(SlotOwner::ComputeOwned),
            SlotOwner::ComputeOwned => {
                bail!("slot {slot} is already released to compute, transfer submitted twice")
            }
        }
    }

    /// State after submitting the compute batch for the slot.
    pub(crate) fn after_compute(self, slot: usize) -> Result<SlotOwner> {
        match self {
            SlotOwner::ComputeOwned => Ok(SlotOwner::TransferOwned),
            SlotOwner::Idle | SlotOwner::TransferOwned => {
                bail!("slot {slot} is not released to compute, upload missing")
            }
        }
    }
}

struct HeapBuffer {
    buffer: vk::Buffer,
    allocation: vk_mem::Allocation,
    mapped: *mut u8,
}

/// The streaming heap: one host-visible and one device-local buffer pair per
/// heap buffer, carved into slots, plus every per-slot object the stream
/// needs, kept in lockstep arrays indexed by slot.
pub struct SearchHeap {
    device: *const LogicalDevice,
    allocator: ManuallyDrop<vk_mem::Allocator>,

    values_per_inout: u32,
    inouts_per_buffer: u32,
    bytes_per_in: vk::DeviceSize,
    bytes_per_out: vk::DeviceSize,
    host_coherent: bool,

    host_visible: Vec<HeapBuffer>,
    device_local: Vec<HeapBuffer>,

    transfer_pool: vk::CommandPool,
    compute_pool: vk::CommandPool,
    descriptor_pool: vk::DescriptorPool,

    semaphores: Vec<vk::Semaphore>,
    initial_transfer_commands: Vec<vk::CommandBuffer>,
    transfer_commands: Vec<vk::CommandBuffer>,
    compute_commands: Vec<vk::CommandBuffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    owners: Vec<SlotOwner>,

    transfer_queries: Option<vk::QueryPool>,
    compute_queries: Option<vk::QueryPool>,
}

impl SearchHeap {
    pub fn new(
        context: &Context,
        device: &Device,
        config: &SearchConfig,
        pipeline: &ComputePipeline,
    ) -> Result<Self> {
        let logical_device = device.logical_device.as_ref();
        let queues = device.physical_device.queues;
        let slot_count = config.inouts_per_heap() as usize;
        let bytes_per_buffer = config.bytes_per_inout() * config.inouts_per_buffer as u64;

        let allocator_info = vk_mem::AllocatorCreateInfo::new(
            &context.instance,
            logical_device,
            device.physical_device.handle,
        );
        let allocator = unsafe { vk_mem::Allocator::new(allocator_info) }
            .context("Allocator should be created.")?;

        // Staging side: persistently mapped, host-visible but not necessarily
        // coherent. Device side: the kernel's storage buffers.
        let host_visible_info = AllocationCreateInfo {
            flags: AllocationCreateFlags::MAPPED | AllocationCreateFlags::HOST_ACCESS_RANDOM,
            usage: MemoryUsage::AutoPreferHost,
            required_flags: vk::MemoryPropertyFlags::HOST_VISIBLE,
            ..Default::default()
        };
        let device_local_info = AllocationCreateInfo {
            usage: MemoryUsage::AutoPreferDevice,
            required_flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ..Default::default()
        };

        let mut host_visible = Vec::with_capacity(config.buffers_per_heap as usize);
        let mut device_local = Vec::with_capacity(config.buffers_per_heap as usize);
        let mut host_coherent = true;
        for _ in 0..config.buffers_per_heap {
            let create_info = vk::BufferCreateInfo::default()
                .size(bytes_per_buffer)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let (buffer, allocation) =
                unsafe { allocator.create_buffer(&create_info, &host_visible_info) }
                    .context("Host buffer should be created.")?;
            let allocation_info = allocator.get_allocation_info(&allocation);
            let mapped = allocation_info.mapped_data as *mut u8;
            if mapped.is_null() {
                bail!("Host buffer should be persistently mapped.");
            }
            let memory_flags = device.physical_device.memory_properties.memory_types
                [allocation_info.memory_type as usize]
                .property_flags;
            host_coherent &= memory_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT);
            host_visible.push(HeapBuffer {
                buffer,
                allocation,
                mapped,
            });

            let create_info = vk::BufferCreateInfo::default()
                .size(bytes_per_buffer)
                .usage(
                    vk::BufferUsageFlags::TRANSFER_SRC
                        | vk::BufferUsageFlags::TRANSFER_DST
                        | vk::BufferUsageFlags::STORAGE_BUFFER,
                )
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            let (buffer, allocation) =
                unsafe { allocator.create_buffer(&create_info, &device_local_info) }
                    .context("Device buffer should be created.")?;
            device_local.push(HeapBuffer {
                buffer,
                allocation,
                mapped: std::ptr::null_mut(),
            });
        }

        let mut semaphore_type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let semaphore_info = vk::SemaphoreCreateInfo::default().push_next(&mut semaphore_type_info);
        let semaphores = (0..slot_count)
            .map(|_| unsafe { logical_device.create_semaphore(&semaphore_info, None) })
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Timeline semaphores should be created.")?;

        let transfer_pool = unsafe {
            logical_device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(queues.transfer),
                None,
            )
        }
        .context("Transfer command pool should be created.")?;
        let compute_pool = unsafe {
            logical_device.create_command_pool(
                &vk::CommandPoolCreateInfo::default().queue_family_index(queues.compute),
                None,
            )
        }
        .context("Compute command pool should be created.")?;

        // Two transfer command buffers per slot: the priming upload has no
        // results to collect and nothing to acquire yet.
        let mut transfer_commands = unsafe {
            logical_device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(transfer_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(2 * slot_count as u32),
            )
        }
        .context("Transfer command buffers should be allocated.")?;
        let initial_transfer_commands = transfer_commands.split_off(slot_count);
        let compute_commands = unsafe {
            logical_device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(compute_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(slot_count as u32),
            )
        }
        .context("Compute command buffers should be allocated.")?;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(2 * slot_count as u32)];
        let descriptor_pool = unsafe {
            logical_device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(slot_count as u32)
                    .pool_sizes(&pool_sizes),
                None,
            )
        }
        .context("DescriptorPool should be created.")?;
        let set_layouts = vec![pipeline.descriptor_set_layout; slot_count];
        let descriptor_sets = unsafe {
            logical_device.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(descriptor_pool)
                    .set_layouts(&set_layouts),
            )
        }
        .context("DescriptorSets should be allocated.")?;

        let query_pool = |timestamp_bits: u32| -> Result<Option<vk::QueryPool>> {
            if !config.timings || timestamp_bits == 0 {
                return Ok(None);
            }
            let pool = unsafe {
                logical_device.create_query_pool(
                    &vk::QueryPoolCreateInfo::default()
                        .query_type(vk::QueryType::TIMESTAMP)
                        .query_count(2 * slot_count as u32),
                    None,
                )
            }
            .context("Query pool should be created.")?;
            // Queries come out of creation uninitialized.
            unsafe { logical_device.reset_query_pool(pool, 0, 2 * slot_count as u32) };
            Ok(Some(pool))
        };
        let transfer_queries = query_pool(queues.transfer_timestamp_bits)?;
        let compute_queries = query_pool(queues.compute_timestamp_bits)?;

        let heap = Self {
            device: logical_device as *const LogicalDevice,
            allocator: ManuallyDrop::new(allocator),
            values_per_inout: config.values_per_inout,
            inouts_per_buffer: config.inouts_per_buffer,
            bytes_per_in: config.bytes_per_in(),
            bytes_per_out: config.bytes_per_out(),
            host_coherent,
            host_visible,
            device_local,
            transfer_pool,
            compute_pool,
            descriptor_pool,
            semaphores,
            initial_transfer_commands,
            transfer_commands,
            compute_commands,
            descriptor_sets,
            owners: vec![SlotOwner::Idle; slot_count],
            transfer_queries,
            compute_queries,
        };
        heap.write_descriptors();
        for slot in 0..slot_count {
            heap.record_initial_transfer(slot, queues)?;
            heap.record_transfer(slot, queues)?;
            heap.record_compute(slot, queues, config, pipeline)?;
        }
        Ok(heap)
    }

    pub fn slot_count(&self) -> usize {
        self.semaphores.len()
    }

    pub fn owner(&self, slot: usize) -> SlotOwner {
        self.owners[slot]
    }

    pub(crate) fn semaphore(&self, slot: usize) -> vk::Semaphore {
        self.semaphores[slot]
    }

    pub(crate) fn initial_transfer_command(&self, slot: usize) -> vk::CommandBuffer {
        self.initial_transfer_commands[slot]
    }

    pub(crate) fn transfer_command(&self, slot: usize) -> vk::CommandBuffer {
        self.transfer_commands[slot]
    }

    pub(crate) fn compute_command(&self, slot: usize) -> vk::CommandBuffer {
        self.compute_commands[slot]
    }

    pub(crate) fn note_transfer_submitted(&mut self, slot: usize) -> Result<()> {
        self.owners[slot] = self.owners[slot].after_transfer(slot)?;
        Ok(())
    }

    pub(crate) fn note_compute_submitted(&mut self, slot: usize) -> Result<()> {
        self.owners[slot] = self.owners[slot].after_compute(slot)?;
        Ok(())
    }

    fn buffer_index(&self, slot: usize) -> usize {
        slot / self.inouts_per_buffer as usize
    }

    fn slot_offset(&self, slot: usize) -> vk::DeviceSize {
        (slot % self.inouts_per_buffer as usize) as vk::DeviceSize
            * (self.bytes_per_in + self.bytes_per_out)
    }

    /// Mapped view of a slot's in-region, one `[u32; 4]` limb group per
    /// candidate. Only valid while the transfer family owns the slot.
    pub fn in_region_mut(&mut self, slot: usize) -> &mut [[u32; 4]] {
        let base = self.host_visible[self.buffer_index(slot)].mapped;
        let offset = self.slot_offset(slot) as usize;
        // Safety: the staging buffer is persistently mapped and the region is
        // sized for exactly values_per_inout lanes.
        unsafe {
            std::slice::from_raw_parts_mut(
                base.add(offset) as *mut [u32; 4],
                self.values_per_inout as usize,
            )
        }
    }

    /// Mapped view of a slot's out-region as a flat count array: entry `2i`
    /// is the count of lane `i`'s value, entry `2i + 1` of its value + 2.
    pub fn out_region(&self, slot: usize) -> &[u16] {
        let base = self.host_visible[self.buffer_index(slot)].mapped;
        let offset = (self.slot_offset(slot) + self.bytes_per_in) as usize;
        // Safety: as above; the packed pairs read back as plain u16 counts on
        // little-endian hosts, which the limb layout already assumes.
        unsafe {
            std::slice::from_raw_parts(
                base.add(offset) as *const u16,
                2 * self.values_per_inout as usize,
            )
        }
    }

    pub fn flush_in_region(&self, slot: usize) -> Result<()> {
        if self.host_coherent {
            return Ok(());
        }
        self.allocator
            .flush_allocation(
                &self.host_visible[self.buffer_index(slot)].allocation,
                self.slot_offset(slot),
                self.bytes_per_in,
            )
            .context("Host writes should flush.")
    }

    pub fn invalidate_out_region(&self, slot: usize) -> Result<()> {
        if self.host_coherent {
            return Ok(());
        }
        self.allocator
            .invalidate_allocation(
                &self.host_visible[self.buffer_index(slot)].allocation,
                self.slot_offset(slot) + self.bytes_per_in,
                self.bytes_per_out,
            )
            .context("Device writes should be invalidated into view.")
    }

    fn device(&self) -> &LogicalDevice {
        // Safety: the device outlives the heap; see the owner struct's drop
        // order.
        unsafe { self.device.as_ref().unwrap() }
    }

    fn write_descriptors(&self) {
        let device = self.device();
        for slot in 0..self.slot_count() {
            let buffer = self.device_local[self.buffer_index(slot)].buffer;
            let offset = self.slot_offset(slot);
            let in_info = [vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(self.bytes_per_in)];
            let out_info = [vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset + self.bytes_per_in)
                .range(self.bytes_per_out)];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(self.descriptor_sets[slot])
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(&in_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(self.descriptor_sets[slot])
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(&out_info),
            ];
            unsafe { device.update_descriptor_sets(&writes, &[]) };
        }
    }

    /// Barrier handing the whole slot region to the compute family. Recorded
    /// with identical parameters as the release on the transfer queue and the
    /// acquire on the compute queue, as ownership transfer pairs must be.
    fn to_compute_barrier(&self, slot: usize, queues: QueueFamilies) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COPY)
            .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
            .dst_access_mask(
                vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE,
            )
            .src_queue_family_index(queues.transfer)
            .dst_queue_family_index(queues.compute)
            .buffer(self.device_local[self.buffer_index(slot)].buffer)
            .offset(self.slot_offset(slot))
            .size(self.bytes_per_in + self.bytes_per_out)
    }

    /// Reverse hand-off, back to the transfer family.
    fn to_transfer_barrier(&self, slot: usize, queues: QueueFamilies) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
            .src_access_mask(vk::AccessFlags2::SHADER_STORAGE_WRITE)
            .dst_stage_mask(vk::PipelineStageFlags2::COPY)
            .dst_access_mask(vk::AccessFlags2::TRANSFER_READ | vk::AccessFlags2::TRANSFER_WRITE)
            .src_queue_family_index(queues.compute)
            .dst_queue_family_index(queues.transfer)
            .buffer(self.device_local[self.buffer_index(slot)].buffer)
            .offset(self.slot_offset(slot))
            .size(self.bytes_per_in + self.bytes_per_out)
    }

    /// Priming upload: copy the first batch in and release the region to the
    /// compute family. There is nothing to acquire and no results to collect.
    fn record_initial_transfer(&self, slot: usize, queues: QueueFamilies) -> Result<()> {
        let device = self.device();
        let command_buffer = self.initial_transfer_commands[slot];
        let buffer_index = self.buffer_index(slot);
        let offset = self.slot_offset(slot);

        unsafe {
            device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())
                .context("Initial transfer commands should begin recording.")?;

            let regions = [vk::BufferCopy2::default()
                .src_offset(offset)
                .dst_offset(offset)
                .size(self.bytes_per_in)];
            device.cmd_copy_buffer2(
                command_buffer,
                &vk::CopyBufferInfo2::default()
                    .src_buffer(self.host_visible[buffer_index].buffer)
                    .dst_buffer(self.device_local[buffer_index].buffer)
                    .regions(&regions),
            );

            let barriers = [self.to_compute_barrier(slot, queues)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().buffer_memory_barriers(&barriers),
            );

            device
                .end_command_buffer(command_buffer)
                .context("Initial transfer commands should end recording.")?;
        }
        Ok(())
    }

    /// Steady-state transfer: acquire the region, collect the finished counts
    /// into staging, upload the next batch, release back to compute.
    fn record_transfer(&self, slot: usize, queues: QueueFamilies) -> Result<()> {
        let device = self.device();
        let command_buffer = self.transfer_commands[slot];
        let buffer_index = self.buffer_index(slot);
        let offset = self.slot_offset(slot);

        unsafe {
            device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())
                .context("Transfer commands should begin recording.")?;

            if let Some(pool) = self.transfer_queries {
                device.cmd_write_timestamp2(
                    command_buffer,
                    vk::PipelineStageFlags2::NONE,
                    pool,
                    2 * slot as u32,
                );
            }

            let acquire = [self.to_transfer_barrier(slot, queues)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().buffer_memory_barriers(&acquire),
            );

            let out_regions = [vk::BufferCopy2::default()
                .src_offset(offset + self.bytes_per_in)
                .dst_offset(offset + self.bytes_per_in)
                .size(self.bytes_per_out)];
            device.cmd_copy_buffer2(
                command_buffer,
                &vk::CopyBufferInfo2::default()
                    .src_buffer(self.device_local[buffer_index].buffer)
                    .dst_buffer(self.host_visible[buffer_index].buffer)
                    .regions(&out_regions),
            );

            let in_regions = [vk::BufferCopy2::default()
                .src_offset(offset)
                .dst_offset(offset)
                .size(self.bytes_per_in)];
            device.cmd_copy_buffer2(
                command_buffer,
                &vk::CopyBufferInfo2::default()
                    .src_buffer(self.host_visible[buffer_index].buffer)
                    .dst_buffer(self.device_local[buffer_index].buffer)
                    .regions(&in_regions),
            );

            let release = [self.to_compute_barrier(slot, queues)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().buffer_memory_barriers(&release),
            );

            if let Some(pool) = self.transfer_queries {
                device.cmd_write_timestamp2(
                    command_buffer,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    pool,
                    2 * slot as u32 + 1,
                );
            }

            device
                .end_command_buffer(command_buffer)
                .context("Transfer commands should end recording.")?;
        }
        Ok(())
    }

    /// One batch of kernel work: acquire, dispatch, release.
    fn record_compute(
        &self,
        slot: usize,
        queues: QueueFamilies,
        config: &SearchConfig,
        pipeline: &ComputePipeline,
    ) -> Result<()> {
        let device = self.device();
        let command_buffer = self.compute_commands[slot];

        unsafe {
            device
                .begin_command_buffer(command_buffer, &vk::CommandBufferBeginInfo::default())
                .context("Compute commands should begin recording.")?;

            if let Some(pool) = self.compute_queries {
                device.cmd_write_timestamp2(
                    command_buffer,
                    vk::PipelineStageFlags2::NONE,
                    pool,
                    2 * slot as u32,
                );
            }

            let acquire = [self.to_compute_barrier(slot, queues)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().buffer_memory_barriers(&acquire),
            );

            device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.pipeline,
            );
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.layout,
                0,
                &[self.descriptor_sets[slot]],
                &[],
            );
            device.cmd_dispatch(command_buffer, config.dispatch_groups(), 1, 1);

            let release = [self.to_transfer_barrier(slot, queues)];
            device.cmd_pipeline_barrier2(
                command_buffer,
                &vk::DependencyInfo::default().buffer_memory_barriers(&release),
            );

            if let Some(pool) = self.compute_queries {
                device.cmd_write_timestamp2(
                    command_buffer,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    pool,
                    2 * slot as u32 + 1,
                );
            }

            device
                .end_command_buffer(command_buffer)
                .context("Compute commands should end recording.")?;
        }
        Ok(())
    }

    fn read_span_ms(
        &self,
        pool: vk::QueryPool,
        slot: usize,
        timestamp_bits: u32,
        period: f32,
    ) -> Result<f64> {
        let device = self.device();
        let mut stamps = [0u64; 2];
        unsafe {
            device
                .get_query_pool_results(
                    pool,
                    2 * slot as u32,
                    &mut stamps,
                    vk::QueryResultFlags::TYPE_64,
                )
                .context("Timestamps should be readable after the wait.")?;
            device.reset_query_pool(pool, 2 * slot as u32, 2);
        }
        let mask = if timestamp_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << timestamp_bits) - 1
        };
        let ticks = stamps[1].wrapping_sub(stamps[0]) & mask;
        Ok(ticks as f64 * period as f64 / 1_000_000.0)
    }

    /// Wall time of the slot's last transfer batch, when timestamps are on.
    pub fn transfer_span_ms(&self, device: &Device, slot: usize) -> Result<Option<f64>> {
        match self.transfer_queries {
            Some(pool) => self
                .read_span_ms(
                    pool,
                    slot,
                    device.physical_device.queues.transfer_timestamp_bits,
                    device.timestamp_period(),
                )
                .map(Some),
            None => Ok(None),
        }
    }

    /// Wall time of the slot's last kernel batch, when timestamps are on.
    pub fn compute_span_ms(&self, device: &Device, slot: usize) -> Result<Option<f64>> {
        match self.compute_queries {
            Some(pool) => self
                .read_span_ms(
                    pool,
                    slot,
                    device.physical_device.queues.compute_timestamp_bits,
                    device.timestamp_period(),
                )
                .map(Some),
            None => Ok(None),
        }
    }
}

impl Drop for SearchHeap {
    fn drop(&mut self) {
        let device = unsafe { self.device.as_ref().unwrap() };
        unsafe {
            // Safety: a failed run can leave submissions in flight; settle
            // them before destroying anything they use.
            let _ = device.device_wait_idle();
            if let Some(pool) = self.transfer_queries.take() {
                device.destroy_query_pool(pool, None);
            }
            if let Some(pool) = self.compute_queries.take() {
                device.destroy_query_pool(pool, None);
            }
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_command_pool(self.transfer_pool, None);
            device.destroy_command_pool(self.compute_pool, None);
            for semaphore in self.semaphores.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
            for mut heap_buffer in self
                .host_visible
                .drain(..)
                .chain(self.device_local.drain(..))
            {
                self.allocator
                    .destroy_buffer(heap_buffer.buffer, &mut heap_buffer.allocation);
            }
            ManuallyDrop::drop(&mut self.allocator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_alternates_through_the_protocol() {
        let owner = SlotOwner::Idle;
        let owner = owner.after_transfer(0).unwrap();
        assert_eq!(owner, SlotOwner::ComputeOwned);
        let owner = owner.after_compute(0).unwrap();
        assert_eq!(owner, SlotOwner::TransferOwned);
        let owner = owner.after_transfer(0).unwrap();
        assert_eq!(owner, SlotOwner::ComputeOwned);
    }

    #[test]
    fn double_submission_is_rejected() {
        assert!(SlotOwner::ComputeOwned.after_transfer(1).is_err());
        assert!(SlotOwner::Idle.after_compute(1).is_err());
        assert!(SlotOwner::TransferOwned.after_compute(1).is_err());
    }
}
