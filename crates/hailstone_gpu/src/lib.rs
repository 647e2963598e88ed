pub mod config;
pub mod context;
pub mod device;
pub mod heap;
pub mod pipeline;
pub mod progress;
pub mod report;
pub mod search;
pub mod sequencer;
pub mod stop;
pub mod stream;
pub mod tracker;
#[cfg(debug_assertions)]
mod validation;

pub mod prelude {
    pub use crate::config::SearchConfig;
    pub use crate::report::{ConsoleReporter, PassTimings, RunObserver, Verbosity};
    pub use crate::search::{run_search, SearchSummary};
    pub use crate::stop::StopSignal;
    pub use crate::tracker::{Position, Record};
}
