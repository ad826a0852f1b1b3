//! Latency histograms for pipeline timing points.
//! Each metric keeps a bounded window of its most recent samples and reports
//! nearest-rank p50/p95/p99 over that window.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

/// Samples kept per metric unless configured otherwise.
const DEFAULT_WINDOW: usize = 1024;

/// Times one pipeline phase. Nothing is recorded unless `finish` is called,
/// so an abandoned phase leaves no sample.
#[must_use = "a span records nothing until finished"]
pub struct TimingSpan {
    name: &'static str,
    started: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn finish(self) -> Duration {
        let elapsed = self.started.elapsed();
        self.registry.record(self.name, elapsed);
        elapsed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    /// Samples currently in the window.
    pub count: usize,
    /// Samples recorded since startup.
    pub recorded: u64,
}

struct LatencyWindow {
    samples_us: VecDeque<f64>,
    limit: usize,
    recorded: u64,
}

impl LatencyWindow {
    fn new(limit: usize) -> Self {
        Self {
            samples_us: VecDeque::with_capacity(limit.min(64)),
            limit,
            recorded: 0,
        }
    }

    fn push(&mut self, value_us: f64) {
        if self.samples_us.len() == self.limit {
            self.samples_us.pop_front();
        }
        self.samples_us.push_back(value_us);
        self.recorded += 1;
    }

    fn summarize(&self) -> MetricSummary {
        let mut sorted: Vec<f64> = self.samples_us.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = |q: f64| -> f64 {
            if sorted.is_empty() {
                return 0.0;
            }
            let idx = (q * sorted.len() as f64).ceil() as usize;
            sorted[idx.saturating_sub(1).min(sorted.len() - 1)]
        };
        MetricSummary {
            p50_us: rank(0.50),
            p95_us: rank(0.95),
            p99_us: rank(0.99),
            count: sorted.len(),
            recorded: self.recorded,
        }
    }
}

pub struct MetricsRegistry {
    windows: Mutex<HashMap<&'static str, LatencyWindow>>,
    window: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    pub fn record(&self, name: &'static str, elapsed: Duration) {
        let value_us = elapsed.as_secs_f64() * 1e6;
        self.windows
            .lock()
            .entry(name)
            .or_insert_with(|| LatencyWindow::new(self.window))
            .push(value_us);
        tracing::trace!(metric = name, value_us, "metric recorded");
    }

    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            started: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    /// Summary of one metric; `None` if it was never recorded.
    pub fn summary_for(&self, name: &str) -> Option<MetricSummary> {
        self.windows.lock().get(name).map(LatencyWindow::summarize)
    }

    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        self.windows
            .lock()
            .iter()
            .map(|(name, window)| (name.to_string(), window.summarize()))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub mod metric_names {
    pub const CACHE_LOOKUP: &str = "cache_lookup";
    pub const PROVIDER_CALL: &str = "provider_call";
    pub const RERANK: &str = "rerank";
    pub const TRANSLATE_DONE: &str = "translate_done";
    pub const REFRESH_DONE: &str = "refresh_done";
}
