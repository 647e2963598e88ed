use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hailstone_gpu::prelude::*;

#[derive(Parser)]
#[command(name = "hailstone", version, about = "GPU search for Collatz stopping-time records", long_about = None)]
struct Cli {
    /// Candidate values per batch, a multiple of 128
    #[arg(long, default_value_t = 32768)]
    values_per_inout: u32,

    /// Streaming slots per buffer
    #[arg(long, default_value_t = 2)]
    inouts_per_buffer: u32,

    /// Device buffers in the heap
    #[arg(long, default_value_t = 2)]
    buffers_per_heap: u32,

    /// Kernel workgroup width
    #[arg(long, default_value_t = 128)]
    workgroup_size: u32,

    /// Sweeps over all slots before the run winds down
    #[arg(short, long, default_value_t = 16)]
    loops: u64,

    /// Compiled SPIR-V kernel
    #[arg(long, default_value = "shaders/hailstone.spv")]
    shader: PathBuf,

    /// Resume point file
    #[arg(long, default_value = "hailstone.progress")]
    progress_file: PathBuf,

    /// Do not save the resume point on exit
    #[arg(long)]
    no_persist: bool,

    /// Skip GPU timestamp readback
    #[arg(long)]
    no_timings: bool,

    /// Use this adapter index instead of scoring the adapters
    #[arg(long)]
    device: Option<usize>,

    /// Give up when a semaphore wait exceeds this many milliseconds
    #[arg(long)]
    wait_timeout_ms: Option<u64>,

    /// Records and the final summary only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Per-slot timing detail
    #[arg(short, long)]
    verbose: bool,

    /// Nothing on stdout at all
    #[arg(long, conflicts_with_all = ["quiet", "verbose"])]
    silent: bool,
}

fn setup_logging(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Silent => EnvFilter::new("error"),
        Verbosity::Quiet => EnvFilter::new("warn"),
        Verbosity::Normal => EnvFilter::new("info"),
        Verbosity::Verbose => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbosity = if cli.silent {
        Verbosity::Silent
    } else if cli.quiet {
        Verbosity::Quiet
    } else if cli.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    };
    setup_logging(verbosity);

    let config = SearchConfig {
        values_per_inout: cli.values_per_inout,
        inouts_per_buffer: cli.inouts_per_buffer,
        buffers_per_heap: cli.buffers_per_heap,
        workgroup_size: cli.workgroup_size,
        loops: cli.loops,
        shader_path: cli.shader,
        progress_path: cli.progress_file,
        persist: !cli.no_persist,
        timings: !cli.no_timings,
        device_index: cli.device,
        wait_timeout_ms: cli.wait_timeout_ms,
        verbosity,
    };

    let stop = StopSignal::new();
    stop.watch_stdin();

    let mut reporter = ConsoleReporter::new(config.verbosity);
    run_search(&config, &mut reporter, &stop)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
