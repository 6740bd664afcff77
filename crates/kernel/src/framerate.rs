use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Counts render ticks over a sliding window.
#[derive(Debug)]
pub struct FrameRateCounter {
    window: Duration,
    ticks: VecDeque<Instant>,
    fps: u32,
}

impl FrameRateCounter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            ticks: VecDeque::new(),
            fps: 0,
        }
    }

    /// Record a tick at `now`. Returns the new rate when it changed.
    pub fn record(&mut self, now: Instant) -> Option<u32> {
        self.ticks.push_back(now);
        while let Some(&oldest) = self.ticks.front() {
            if now.duration_since(oldest) >= self.window {
                self.ticks.pop_front();
            } else {
                break;
            }
        }
        let per_second = self.ticks.len() as f64 / self.window.as_secs_f64();
        let fps = per_second.round() as u32;
        if fps == self.fps {
            return None;
        }
        self.fps = fps;
        Some(fps)
    }

    /// Ticks per second over the last window.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn reset(&mut self) {
        self.ticks.clear();
        self.fps = 0;
    }
}
