use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::info;

/// Cooperative shutdown flag. The scheduler polls it once per sweep and winds
/// the stream down cleanly when it is set.
#[derive(Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Spawns a detached thread that requests a stop once a line arrives on
    /// stdin. EOF leaves the flag untouched so piped runs are not cut short.
    pub fn watch_stdin(&self) {
        let flag = Arc::clone(&self.flag);
        thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            if let Ok(read) = stdin.lock().read_line(&mut line) {
                if read > 0 {
                    info!("stop requested, finishing the current loop");
                    flag.store(true, Ordering::Relaxed);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear_and_latches() {
        let signal = StopSignal::new();
        assert!(!signal.stop_requested());

        let shared = signal.clone();
        shared.request_stop();
        assert!(signal.stop_requested());
    }
}
