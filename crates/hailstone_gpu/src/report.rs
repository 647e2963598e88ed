use crate::tracker::Record;

/// Output tiers, ordered so a simple comparison gates each message.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum Verbosity {
    /// Nothing on stdout, not even the final summary.
    Silent,
    /// Records and the final summary only.
    Quiet,
    #[default]
    Normal,
    /// Adds per-slot timing detail to each loop line.
    Verbose,
}

/// Per-slot GPU times for one sweep, in milliseconds. `None` when the queue
/// family does not support timestamps or timings are disabled.
#[derive(Clone, Debug, Default)]
pub struct PassTimings {
    pub transfer_ms: Option<Vec<f64>>,
    pub compute_ms: Option<Vec<f64>>,
}

/// Observer of run milestones. The scheduler drives it; the binary plugs in
/// the console reporter, tests plug in collectors.
pub trait RunObserver {
    fn run_started(&mut self, _first_value: u128, _slots: usize, _loops: u64) {}
    fn pass_finished(
        &mut self,
        _pass: u64,
        _loops: u64,
        _range_start: u128,
        _range_end: u128,
        _timings: Option<&PassTimings>,
    ) {
    }
    fn record_found(&mut self, _record: &Record) {}
    fn run_finished(&mut self, _records: &[Record], _next_value: u128, _stopped: bool) {}
}

/// Stdout reporter honoring the verbosity tiers.
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

impl RunObserver for ConsoleReporter {
    fn run_started(&mut self, first_value: u128, slots: usize, loops: u64) {
        if self.verbosity >= Verbosity::Normal {
            println!("searching from {first_value:#x} across {slots} slots for {loops} loops");
        }
    }

    fn pass_finished(
        &mut self,
        pass: u64,
        loops: u64,
        range_start: u128,
        range_end: u128,
        timings: Option<&PassTimings>,
    ) {
        if self.verbosity < Verbosity::Normal {
            return;
        }
        let mut line = format!("loop {pass}/{loops}: [{range_start:#x}, {range_end:#x})");
        if let Some(timings) = timings {
            if let Some(transfer) = &timings.transfer_ms {
                line.push_str(&format!(", transfer {:.3} ms", mean(transfer)));
            }
            if let Some(compute) = &timings.compute_ms {
                line.push_str(&format!(", compute {:.3} ms", mean(compute)));
            }
        }
        println!("{line}");

        if self.verbosity >= Verbosity::Verbose {
            if let Some(timings) = timings {
                let slots = timings
                    .transfer_ms
                    .as_ref()
                    .or(timings.compute_ms.as_ref())
                    .map_or(0, Vec::len);
                for slot in 0..slots {
                    let transfer = timings
                        .transfer_ms
                        .as_ref()
                        .map_or(String::from("-"), |t| format!("{:.3} ms", t[slot]));
                    let compute = timings
                        .compute_ms
                        .as_ref()
                        .map_or(String::from("-"), |t| format!("{:.3} ms", t[slot]));
                    println!("  slot {slot}: transfer {transfer}, compute {compute}");
                }
            }
        }
    }

    fn record_found(&mut self, record: &Record) {
        if self.verbosity >= Verbosity::Quiet {
            println!("record: {:#x} takes {} steps", record.value, record.count);
        }
    }

    fn run_finished(&mut self, records: &[Record], next_value: u128, stopped: bool) {
        if self.verbosity < Verbosity::Quiet {
            return;
        }
        if stopped {
            println!("stopped early, next value {next_value:#x}");
        } else {
            println!("finished, next value {next_value:#x}");
        }
        if records.is_empty() {
            println!("no new records this run");
            return;
        }
        println!("{:>4}  {:<36}  {:>5}", "#", "value", "steps");
        for (index, record) in records.iter().enumerate() {
            println!(
                "{index:>4}  {:<36}  {:>5}",
                format!("{:#x}", record.value),
                record.count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_are_ordered() {
        assert!(Verbosity::Silent < Verbosity::Quiet);
        assert!(Verbosity::Quiet < Verbosity::Normal);
        assert!(Verbosity::Normal < Verbosity::Verbose);
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }

    #[test]
    fn mean_handles_empty_input() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[2.0, 4.0]), 3.0);
    }
}
