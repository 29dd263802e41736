use std::time::{Duration, Instant};

/// Fixed-cadence tick source.
///
/// A late tick does not cause a burst of catch-up ticks: the next deadline is
/// one period after the later of the missed deadline and now.
#[derive(Debug)]
pub struct FrameClock {
    period: Duration,
    next: Instant,
    running: bool,
}

impl FrameClock {
    pub fn new(fps: u32, now: Instant) -> Self {
        let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        Self {
            period,
            next: now,
            running: true,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.running && now >= self.next
    }

    /// Schedule the next tick after one that ran at `now`.
    pub fn advance(&mut self, now: Instant) {
        let candidate = self.next + self.period;
        self.next = if candidate > now {
            candidate
        } else {
            now + self.period
        };
    }

    /// Stop scheduling ticks. Permanent.
    pub fn stop(&mut self) {
        self.running = false;
    }
}
