use anyhow::{ensure, Result};
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::context::Context;
use crate::device::Device;
use crate::heap::SearchHeap;
use crate::pipeline::ComputePipeline;
use crate::progress::ProgressStore;
use crate::report::RunObserver;
use crate::stop::StopSignal;
use crate::stream::StreamScheduler;
use crate::tracker::{Record, RecordTracker};

/// What a finished run covered and found.
pub struct SearchSummary {
    pub records: Vec<Record>,
    pub passes: u64,
    pub stopped: bool,
    pub first_value: u128,
    pub next_value: u128,
}

/// Runs a whole search: load the resume point, bring the device up, stream
/// until the loop budget or a stop request, then save and report.
pub fn run_search(
    config: &SearchConfig,
    observer: &mut dyn RunObserver,
    stop: &StopSignal,
) -> Result<SearchSummary> {
    config.validate()?;

    let store = ProgressStore::new(&config.progress_path);
    let position = store.load()?;
    ensure!(
        position.cur_value % 8 == 3,
        "progress file {} resumes at {:#x}, which is not 3 mod 8",
        store.path().display(),
        position.cur_value
    );
    let first_value = position.cur_value;
    info!(
        "resuming at {:#x} with record count {}",
        position.cur_value, position.cur_count
    );
    let mut tracker = RecordTracker::new(position);

    let context = Context::new(config)?;
    let device = Device::new(&context)?;
    let pipeline = ComputePipeline::new(&device, config)?;
    let heap = SearchHeap::new(&context, &device, config, &pipeline)?;
    let mut scheduler = StreamScheduler::new(heap, config, first_value);

    let outcome = scheduler.run(&device, &mut tracker, observer, stop)?;

    if config.persist {
        store.save(tracker.position())?;
        info!("progress saved to {}", store.path().display());
    } else {
        debug!("progress save skipped");
    }

    let summary = SearchSummary {
        records: tracker.records().to_vec(),
        passes: outcome.passes,
        stopped: outcome.stopped,
        first_value,
        next_value: tracker.position().cur_value,
    };
    observer.run_finished(&summary.records, summary.next_value, summary.stopped);
    Ok(summary)
}
