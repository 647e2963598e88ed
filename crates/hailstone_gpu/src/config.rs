use std::path::PathBuf;

use anyhow::{ensure, Result};

use crate::report::Verbosity;

/// Geometry and policy for one search run. Sizes are fixed for the run; the
/// heap, pipeline and command buffers are all derived from them once.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Candidate values per batch. Must be a positive multiple of 128 so
    /// every slot region keeps storage buffer alignment on its own.
    pub values_per_inout: u32,
    /// Streaming slots per buffer.
    pub inouts_per_buffer: u32,
    /// Device buffers in the heap. Slots = `inouts_per_buffer * buffers_per_heap`.
    pub buffers_per_heap: u32,
    /// Kernel workgroup width, set through a specialization constant.
    pub workgroup_size: u32,
    /// Sweeps over all slots before the run winds down.
    pub loops: u64,
    /// Compiled SPIR-V kernel to load.
    pub shader_path: PathBuf,
    /// Resume point location.
    pub progress_path: PathBuf,
    /// Save the advanced position on clean shutdown.
    pub persist: bool,
    /// Read GPU timestamps and report per-slot timings.
    pub timings: bool,
    /// Pick a specific adapter instead of scoring them.
    pub device_index: Option<usize>,
    /// Bound on each semaphore wait, infinite when unset.
    pub wait_timeout_ms: Option<u64>,
    pub verbosity: Verbosity,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            values_per_inout: 32768,
            inouts_per_buffer: 2,
            buffers_per_heap: 2,
            workgroup_size: 128,
            loops: 16,
            shader_path: PathBuf::from("shaders/hailstone.spv"),
            progress_path: PathBuf::from("hailstone.progress"),
            persist: true,
            timings: true,
            device_index: None,
            wait_timeout_ms: None,
            verbosity: Verbosity::Normal,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.values_per_inout > 0 && self.values_per_inout % 128 == 0,
            "values per inout must be a positive multiple of 128, got {}",
            self.values_per_inout
        );
        ensure!(
            self.workgroup_size > 0 && self.values_per_inout % self.workgroup_size == 0,
            "workgroup size {} must divide the {} values per inout",
            self.workgroup_size,
            self.values_per_inout
        );
        ensure!(self.inouts_per_buffer > 0, "need at least one inout per buffer");
        ensure!(self.buffers_per_heap > 0, "need at least one buffer in the heap");
        ensure!(self.loops > 0, "need at least one loop");
        Ok(())
    }

    /// Streaming slots in the heap.
    pub fn inouts_per_heap(&self) -> u32 {
        self.inouts_per_buffer * self.buffers_per_heap
    }

    /// Candidate values emitted per full sweep over the slots.
    pub fn values_per_heap(&self) -> u64 {
        self.values_per_inout as u64 * self.inouts_per_heap() as u64
    }

    /// In-region bytes per slot: one uvec4 per value.
    pub fn bytes_per_in(&self) -> u64 {
        self.values_per_inout as u64 * 16
    }

    /// Out-region bytes per slot: one packed count pair per value.
    pub fn bytes_per_out(&self) -> u64 {
        self.values_per_inout as u64 * 4
    }

    pub fn bytes_per_inout(&self) -> u64 {
        self.bytes_per_in() + self.bytes_per_out()
    }

    pub fn dispatch_groups(&self) -> u32 {
        self.values_per_inout / self.workgroup_size
    }

    /// Nanosecond bound for semaphore waits.
    pub fn wait_timeout_ns(&self) -> u64 {
        self.wait_timeout_ms
            .map(|ms| ms.saturating_mul(1_000_000))
            .unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SearchConfig::default();
        config.validate().unwrap();
        assert_eq!(config.inouts_per_heap(), 4);
        assert_eq!(config.values_per_heap(), 131072);
        assert_eq!(config.bytes_per_in(), 32768 * 16);
        assert_eq!(config.bytes_per_out(), 32768 * 4);
        assert_eq!(config.dispatch_groups(), 256);
    }

    #[test]
    fn rejects_bad_geometry() {
        let mut config = SearchConfig {
            values_per_inout: 100,
            ..SearchConfig::default()
        };
        assert!(config.validate().is_err());

        config.values_per_inout = 256;
        config.workgroup_size = 96;
        assert!(config.validate().is_err());

        config.workgroup_size = 64;
        config.buffers_per_heap = 0;
        assert!(config.validate().is_err());

        config.buffers_per_heap = 1;
        config.loops = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn wait_timeout_defaults_to_infinite() {
        let mut config = SearchConfig::default();
        assert_eq!(config.wait_timeout_ns(), u64::MAX);
        config.wait_timeout_ms = Some(2_000);
        assert_eq!(config.wait_timeout_ns(), 2_000_000_000);
    }
}
