use std::time::Duration;

/// Time spent in each stage of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTimes {
    /// Waiting on the capture device.
    pub capture: Duration,
    /// Cropping and resizing the frame to the surface.
    pub fit: Duration,
    pub segment: Duration,
    pub composite: Duration,
}

impl StageTimes {
    pub fn total(&self) -> Duration {
        self.capture + self.fit + self.segment + self.composite
    }

    fn add(&mut self, other: &StageTimes) {
        self.capture += other.capture;
        self.fit += other.fit;
        self.segment += other.segment;
        self.composite += other.composite;
    }
}

/// Rolling per-stage timings, logged every `log_every` presented frames.
#[derive(Debug)]
pub struct TickStats {
    log_every: u64,
    presented: u64,
    skipped: u64,
    degraded: u64,
    totals: StageTimes,
}

impl TickStats {
    pub fn new(log_every: u64) -> Self {
        Self {
            log_every: log_every.max(1),
            presented: 0,
            skipped: 0,
            degraded: 0,
            totals: StageTimes::default(),
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn degraded(&self) -> u64 {
        self.degraded
    }

    /// Mean stage times over all presented frames.
    pub fn averages(&self) -> StageTimes {
        if self.presented == 0 {
            return StageTimes::default();
        }
        let n = self.presented.min(u32::MAX as u64) as u32;
        StageTimes {
            capture: self.totals.capture / n,
            fit: self.totals.fit / n,
            segment: self.totals.segment / n,
            composite: self.totals.composite / n,
        }
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_presented(&mut self, times: StageTimes, degraded: bool) {
        self.presented += 1;
        self.totals.add(&times);
        if degraded {
            self.degraded += 1;
        }

        if self.presented % self.log_every == 0 {
            self.log();
        }
    }

    fn log(&self) {
        let avg = self.averages();
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;

        tracing::info!(
            "Frame {}: capture={:.1}ms, fit={:.1}ms, segment={:.1}ms, composite={:.1}ms, total={:.1}ms, skipped={}, degraded={}",
            self.presented,
            ms(avg.capture),
            ms(avg.fit),
            ms(avg.segment),
            ms(avg.composite),
            ms(avg.total()),
            self.skipped,
            self.degraded
        );
    }
}
