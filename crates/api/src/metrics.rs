use extract::ExtractionReport;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    failed_requests: AtomicUsize,
    cached_responses: AtomicUsize,

    // Timing (in microseconds)
    total_process_time_us: AtomicU64,
    processed_messages: AtomicUsize,

    // Pipeline outcomes
    artifacts_built: AtomicUsize,
    prior_artifacts_kept: AtomicUsize,
    blocks_recovered: AtomicUsize,
    blocks_failed: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            failed_requests: AtomicUsize::new(0),
            cached_responses: AtomicUsize::new(0),
            total_process_time_us: AtomicU64::new(0),
            processed_messages: AtomicUsize::new(0),
            artifacts_built: AtomicUsize::new(0),
            prior_artifacts_kept: AtomicUsize::new(0),
            blocks_recovered: AtomicUsize::new(0),
            blocks_failed: AtomicUsize::new(0),
        })
    }

    pub fn record_request(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_hit(&self) {
        self.cached_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_process(&self, duration: Duration, report: &ExtractionReport) {
        self.total_process_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.processed_messages.fetch_add(1, Ordering::Relaxed);
        self.artifacts_built
            .fetch_add(report.artifacts_built, Ordering::Relaxed);
        self.prior_artifacts_kept
            .fetch_add(report.prior_kept, Ordering::Relaxed);
        self.blocks_recovered
            .fetch_add(report.blocks_recovered, Ordering::Relaxed);
        self.blocks_failed
            .fetch_add(report.blocks_failed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            cached_responses: self.cached_responses.load(Ordering::Relaxed),
            avg_process_time_ms: avg_time_ms(&self.total_process_time_us, &self.processed_messages),
            artifacts_built: self.artifacts_built.load(Ordering::Relaxed),
            prior_artifacts_kept: self.prior_artifacts_kept.load(Ordering::Relaxed),
            blocks_recovered: self.blocks_recovered.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    let cnt = count.load(Ordering::Relaxed) as f64;
    if cnt > 0.0 {
        total / cnt / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub cached_responses: usize,
    pub avg_process_time_ms: f64,
    pub artifacts_built: usize,
    pub prior_artifacts_kept: usize,
    pub blocks_recovered: usize,
    pub blocks_failed: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
