use anyhow::{bail, Context as _, Result};
use ash::vk;
use tracing::{debug, trace};

use crate::config::SearchConfig;
use crate::device::Device;
use crate::heap::SearchHeap;
use crate::report::{PassTimings, RunObserver};
use crate::sequencer::ValueSequencer;
use crate::stop::StopSignal;
use crate::tracker::RecordTracker;

/// Next values to wait for on a slot's semaphore. Compute signals even
/// values, transfer signals odd ones; each sweep advances both by two.
#[derive(Clone, Copy)]
struct SlotThresholds {
    compute: u64,
    transfer: u64,
}

/// How a run ended.
pub struct RunOutcome {
    pub passes: u64,
    pub stopped: bool,
}

/// Drives the stream: keeps one compute batch per slot in flight on the
/// device while the host consumes the previous round's counts and refills
/// the next batch, all ordered through one timeline semaphore per slot.
pub struct StreamScheduler {
    heap: SearchHeap,
    sequencers: Vec<ValueSequencer>,
    thresholds: Vec<SlotThresholds>,
    wait_timeout_ns: u64,
    loops: u64,
}

impl StreamScheduler {
    pub fn new(heap: SearchHeap, config: &SearchConfig, first_value: u128) -> Self {
        let slot_count = heap.slot_count();
        let sequencers = (0..slot_count)
            .map(|slot| {
                ValueSequencer::for_slot(
                    first_value,
                    slot as u32,
                    slot_count as u32,
                    config.values_per_inout,
                )
            })
            .collect();
        Self {
            heap,
            sequencers,
            thresholds: vec![
                SlotThresholds {
                    compute: 0,
                    transfer: 0,
                };
                slot_count
            ],
            wait_timeout_ns: config.wait_timeout_ns(),
            loops: config.loops,
        }
    }

    /// Runs the configured number of sweeps, or fewer on a stop request, and
    /// drains the stream. The tracker's position afterwards covers exactly
    /// the consumed prefix; whatever was still in flight is discarded.
    pub fn run(
        &mut self,
        device: &Device,
        tracker: &mut RecordTracker,
        observer: &mut dyn RunObserver,
        stop: &StopSignal,
    ) -> Result<RunOutcome> {
        observer.run_started(
            tracker.position().cur_value,
            self.heap.slot_count(),
            self.loops,
        );

        self.prime(device)?;

        let mut outcome = RunOutcome {
            passes: 0,
            stopped: false,
        };
        for pass in 1..=self.loops {
            if stop.stop_requested() {
                outcome.stopped = true;
                break;
            }
            let range_start = tracker.position().cur_value;
            let timings = self.sweep(device, tracker, observer)?;
            outcome.passes = pass;
            observer.pass_finished(
                pass,
                self.loops,
                range_start,
                tracker.position().cur_value,
                timings.as_ref(),
            );
        }

        self.drain(device)?;
        debug!("stream drained after {} passes", outcome.passes);
        Ok(outcome)
    }

    /// Starts every slot: upload batch one, dispatch it, then queue batch two
    /// behind it. Compute work for round one is on the device before the host
    /// finishes writing round two, which is the point of the double buffer.
    fn prime(&mut self, device: &Device) -> Result<()> {
        for slot in 0..self.heap.slot_count() {
            self.fill_slot(slot)?;
            self.heap.note_transfer_submitted(slot)?;
            self.submit(
                device,
                device.transfer_queue,
                self.heap.initial_transfer_command(slot),
                slot,
                None,
                1,
            )?;
            self.heap.note_compute_submitted(slot)?;
            self.submit(
                device,
                device.compute_queue,
                self.heap.compute_command(slot),
                slot,
                Some(1),
                2,
            )?;
        }

        for slot in 0..self.heap.slot_count() {
            // The first upload has to land before its staging region is
            // overwritten with the second batch.
            self.wait(device, slot, 1, "initial upload")?;
            self.fill_slot(slot)?;
            self.heap.note_transfer_submitted(slot)?;
            self.submit(
                device,
                device.transfer_queue,
                self.heap.transfer_command(slot),
                slot,
                Some(2),
                3,
            )?;
            self.thresholds[slot] = SlotThresholds {
                compute: 2,
                transfer: 3,
            };
        }
        Ok(())
    }

    /// One pass over all slots. Per slot: wait for the oldest compute batch,
    /// resubmit compute for the already-uploaded next batch, then wait for
    /// the transfer that surfaced the finished counts, consume them, refill
    /// the staging region and resubmit the transfer.
    fn sweep(
        &mut self,
        device: &Device,
        tracker: &mut RecordTracker,
        observer: &mut dyn RunObserver,
    ) -> Result<Option<PassTimings>> {
        let mut transfer_ms = Vec::new();
        let mut compute_ms = Vec::new();

        for slot in 0..self.heap.slot_count() {
            let SlotThresholds { compute, transfer } = self.thresholds[slot];

            self.wait(device, slot, compute, "compute")?;
            if let Some(span) = self.heap.compute_span_ms(device, slot)? {
                compute_ms.push(span);
            }
            self.heap.note_compute_submitted(slot)?;
            self.submit(
                device,
                device.compute_queue,
                self.heap.compute_command(slot),
                slot,
                Some(compute + 1),
                compute + 2,
            )?;

            self.wait(device, slot, transfer, "transfer")?;
            if let Some(span) = self.heap.transfer_span_ms(device, slot)? {
                transfer_ms.push(span);
            }
            self.heap.invalidate_out_region(slot)?;
            let appended = tracker.consume(self.heap.out_region(slot));
            let records = tracker.records();
            for record in &records[records.len() - appended..] {
                observer.record_found(record);
            }
            trace!(
                "slot {slot}: consumed up to {:#x}, {appended} new records",
                tracker.position().cur_value
            );

            self.fill_slot(slot)?;
            self.heap.note_transfer_submitted(slot)?;
            self.submit(
                device,
                device.transfer_queue,
                self.heap.transfer_command(slot),
                slot,
                Some(compute + 2),
                transfer + 2,
            )?;

            self.thresholds[slot] = SlotThresholds {
                compute: compute + 2,
                transfer: transfer + 2,
            };
        }

        if transfer_ms.is_empty() && compute_ms.is_empty() {
            return Ok(None);
        }
        Ok(Some(PassTimings {
            transfer_ms: (!transfer_ms.is_empty()).then_some(transfer_ms),
            compute_ms: (!compute_ms.is_empty()).then_some(compute_ms),
        }))
    }

    /// Waits for each slot's last transfer signal, which also orders every
    /// earlier compute signal, then settles the device.
    fn drain(&mut self, device: &Device) -> Result<()> {
        for slot in 0..self.heap.slot_count() {
            self.wait(device, slot, self.thresholds[slot].transfer, "drain")?;
        }
        device.wait_idle()
    }

    fn fill_slot(&mut self, slot: usize) -> Result<()> {
        self.sequencers[slot].fill(self.heap.in_region_mut(slot));
        self.heap.flush_in_region(slot)
    }

    fn wait(&self, device: &Device, slot: usize, value: u64, phase: &str) -> Result<()> {
        let semaphores = [self.heap.semaphore(slot)];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        match unsafe {
            device
                .logical_device
                .wait_semaphores(&wait_info, self.wait_timeout_ns)
        } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                bail!("timed out waiting for {phase} on slot {slot}")
            }
            Err(error) => {
                Err(error).with_context(|| format!("Slot {slot} {phase} wait should succeed."))
            }
        }
    }

    fn submit(
        &self,
        device: &Device,
        queue: vk::Queue,
        command_buffer: vk::CommandBuffer,
        slot: usize,
        wait_value: Option<u64>,
        signal_value: u64,
    ) -> Result<()> {
        let command_buffer_infos =
            [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];
        let signal_infos = [vk::SemaphoreSubmitInfo::default()
            .semaphore(self.heap.semaphore(slot))
            .value(signal_value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let wait_infos: Vec<vk::SemaphoreSubmitInfo> = wait_value
            .map(|value| {
                vec![vk::SemaphoreSubmitInfo::default()
                    .semaphore(self.heap.semaphore(slot))
                    .value(value)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)]
            })
            .unwrap_or_default();

        let submits = [vk::SubmitInfo2::default()
            .command_buffer_infos(&command_buffer_infos)
            .wait_semaphore_infos(&wait_infos)
            .signal_semaphore_infos(&signal_infos)];
        unsafe {
            device
                .logical_device
                .queue_submit2(queue, &submits, vk::Fence::null())
        }
        .with_context(|| format!("Slot {slot} submission should succeed."))
    }
}
