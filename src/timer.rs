use std::time::{Duration, Instant};
use tracing::debug;

/// Wall clock lap timer used to pace live output to realtime.
#[derive(Debug, Default)]
pub struct Timer {
    begin: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the current lap.
    pub fn start(&mut self) {
        self.begin = Some(Instant::now());
    }

    /// Seconds elapsed since the lap began.
    pub fn elapsed(&self) -> f64 {
        self.begin
            .map(|begin| begin.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Sleep off whatever part of `seg_time` the current lap has not yet
    /// consumed, then restart the lap.
    pub fn throttle(&mut self, seg_time: f64) {
        let diff = seg_time - self.elapsed();
        if diff > 0.0 {
            debug!("throttling {:.2}s", diff);
            std::thread::sleep(Duration::from_secs_f64(diff));
        }
        self.start();
    }
}
