//! In-process metrics for the dashboard: a rate meter, a counter and a
//! sampling histogram.
//!
//! All three are safe to share between tasks. Snapshots are plain values so
//! the status document can be built without holding any lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// EWMA tick interval.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Beyond an hour of idle ticks every moving average has decayed to ~0.
const MAX_CATCHUP_TICKS: u64 = 720;

/// Values retained by a histogram sample.
pub const SAMPLE_SIZE: usize = 1028;

/// Exponentially-weighted moving average over a window of `minutes`.
#[derive(Debug, Clone)]
struct Ewma {
    alpha: f64,
    rate: f64,
    primed: bool,
}

impl Ewma {
    fn new(minutes: f64) -> Self {
        let alpha = 1.0 - (-TICK_INTERVAL.as_secs_f64() / 60.0 / minutes).exp();
        Self {
            alpha,
            rate: 0.0,
            primed: false,
        }
    }

    fn tick(&mut self, uncounted: u64) {
        let instant = uncounted as f64 / TICK_INTERVAL.as_secs_f64();
        if self.primed {
            self.rate += self.alpha * (instant - self.rate);
        } else {
            self.rate = instant;
            self.primed = true;
        }
    }
}

/// Point-in-time view of a [`Meter`]. Rates are events per second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeterSnapshot {
    pub count: u64,
    pub rate1: f64,
    pub rate5: f64,
    pub rate15: f64,
    pub rate_mean: f64,
}

struct MeterState {
    count: u64,
    uncounted: u64,
    last_tick: Instant,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    /// Apply every tick that elapsed since the last one. Ticks are lazy: they
    /// happen on the next mark or snapshot instead of on a timer task.
    fn catch_up(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_tick);
        let ticks = elapsed.as_secs() / TICK_INTERVAL.as_secs();
        if ticks == 0 {
            return;
        }
        self.last_tick += Duration::from_secs(TICK_INTERVAL.as_secs() * ticks);

        let uncounted = std::mem::take(&mut self.uncounted);
        for i in 0..ticks.min(MAX_CATCHUP_TICKS) {
            let n = if i == 0 { uncounted } else { 0 };
            self.m1.tick(n);
            self.m5.tick(n);
            self.m15.tick(n);
        }
    }
}

/// Counts events and tracks 1/5/15-minute moving rates.
pub struct Meter {
    start: Instant,
    state: Mutex<MeterState>,
}

impl Meter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(start: Instant) -> Self {
        Self {
            start,
            state: Mutex::new(MeterState {
                count: 0,
                uncounted: 0,
                last_tick: start,
                m1: Ewma::new(1.0),
                m5: Ewma::new(5.0),
                m15: Ewma::new(15.0),
            }),
        }
    }

    /// Record `n` events.
    pub fn mark(&self, n: u64) {
        self.mark_at(n, Instant::now());
    }

    fn mark_at(&self, n: u64, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.catch_up(now);
        state.count += n;
        state.uncounted += n;
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshot_at(Instant::now())
    }

    fn snapshot_at(&self, now: Instant) -> MeterSnapshot {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.catch_up(now);
        let secs = now.saturating_duration_since(self.start).as_secs_f64();
        MeterSnapshot {
            count: state.count,
            rate1: state.m1.rate,
            rate5: state.m5.rate,
            rate15: state.m15.rate,
            rate_mean: if secs > 0.0 {
                state.count as f64 / secs
            } else {
                0.0
            },
        }
    }
}

impl Default for Meter {
    fn default() -> Self {
        Self::new()
    }
}

/// Monotonic total.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Distribution summary. An empty histogram summarises to all zeros.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
    pub p75: f64,
    pub p95: f64,
    pub p99: f64,
    pub p999: f64,
}

struct Sample {
    count: u64,
    values: VecDeque<u64>,
}

/// Histogram over a sliding sample of the most recent [`SAMPLE_SIZE`] values.
pub struct Histogram {
    sample: Mutex<Sample>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            sample: Mutex::new(Sample {
                count: 0,
                values: VecDeque::with_capacity(SAMPLE_SIZE),
            }),
        }
    }

    pub fn update(&self, value: u64) {
        let mut sample = self.sample.lock().unwrap_or_else(PoisonError::into_inner);
        if sample.values.len() == SAMPLE_SIZE {
            sample.values.pop_front();
        }
        sample.values.push_back(value);
        sample.count += 1;
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let (count, mut values) = {
            let sample = self.sample.lock().unwrap_or_else(PoisonError::into_inner);
            (sample.count, sample.values.iter().copied().collect::<Vec<_>>())
        };
        if values.is_empty() {
            return HistogramSnapshot {
                count,
                ..Default::default()
            };
        }
        values.sort_unstable();

        let n = values.len() as f64;
        let mean = values.iter().map(|&v| v as f64).sum::<f64>() / n;
        let variance = values
            .iter()
            .map(|&v| {
                let d = v as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        HistogramSnapshot {
            count,
            min: values[0],
            max: values[values.len() - 1],
            mean,
            stddev: variance.sqrt(),
            median: percentile(&values, 0.5),
            p75: percentile(&values, 0.75),
            p95: percentile(&values, 0.95),
            p99: percentile(&values, 0.99),
            p999: percentile(&values, 0.999),
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear interpolation between closest ranks over a sorted, non-empty slice.
fn percentile(sorted: &[u64], p: f64) -> f64 {
    let n = sorted.len();
    let pos = p * (n as f64 + 1.0);
    if pos < 1.0 {
        sorted[0] as f64
    } else if pos >= n as f64 {
        sorted[n - 1] as f64
    } else {
        let lower = sorted[pos as usize - 1] as f64;
        let upper = sorted[pos as usize] as f64;
        lower + (pos - pos.floor()) * (upper - lower)
    }
}

/// Byte traffic in one direction: running total plus per-connection sizes.
#[derive(Default)]
pub struct ByteMetrics {
    total: Counter,
    sizes: Histogram,
}

impl ByteMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one connection that moved `bytes`.
    pub fn record(&self, bytes: u64) {
        self.total.inc(bytes);
        self.sizes.update(bytes);
    }

    /// Histogram summary whose `count` is the total byte count.
    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            count: self.total.count(),
            ..self.sizes.snapshot()
        }
    }
}
