//! Lock-free run counters
//!
//! Camera workers and the matcher bump these concurrently; the pipeline takes
//! one `summary()` at the end of the run and logs it.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Per-camera worker duration bucket bounds (microseconds)
/// Buckets: ≤1ms, ≤4ms, ≤16ms, ≤64ms, ≤256ms, ≤1s, ≤4s, >4s
const WORKER_BUCKET_BOUNDS: [u64; 7] = [1_000, 4_000, 16_000, 64_000, 256_000, 1_000_000, 4_000_000];
const NUM_BUCKETS: usize = 8;

#[inline]
fn bucket_index(duration_us: u64) -> usize {
    WORKER_BUCKET_BOUNDS.partition_point(|&bound| bound < duration_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Counters for one batch run
pub struct RunMetrics {
    started: Instant,
    cameras_processed: AtomicU64,
    tracks_loaded: AtomicU64,
    tracks_dropped: AtomicU64,
    samples_processed: AtomicU64,
    events_confirmed: AtomicU64,
    events_ended: AtomicU64,
    /// Tracks that joined an existing identity
    identity_matches: AtomicU64,
    /// Tracks that opened a new identity
    identities_created: AtomicU64,
    /// Tracks skipped by the matcher (no or unusable embeddings)
    identity_skipped: AtomicU64,
    /// Cluster candidates excluded by the camera topology gate
    gate_rejections: AtomicU64,
    events_enriched: AtomicU64,
    events_deduplicated: AtomicU64,
    worker_duration_max_us: AtomicU64,
    worker_buckets: [AtomicU64; NUM_BUCKETS],
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            cameras_processed: AtomicU64::new(0),
            tracks_loaded: AtomicU64::new(0),
            tracks_dropped: AtomicU64::new(0),
            samples_processed: AtomicU64::new(0),
            events_confirmed: AtomicU64::new(0),
            events_ended: AtomicU64::new(0),
            identity_matches: AtomicU64::new(0),
            identities_created: AtomicU64::new(0),
            identity_skipped: AtomicU64::new(0),
            gate_rejections: AtomicU64::new(0),
            events_enriched: AtomicU64::new(0),
            events_deduplicated: AtomicU64::new(0),
            worker_duration_max_us: AtomicU64::new(0),
            worker_buckets: Default::default(),
        }
    }

    #[inline]
    pub fn record_tracks_loaded(&self, n: u64) {
        self.tracks_loaded.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_track_dropped(&self) {
        self.tracks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_samples(&self, n: u64) {
        self.samples_processed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_confirmed(&self) {
        self.events_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_ended(&self) {
        self.events_ended.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished camera worker and its wall time
    pub fn record_camera_processed(&self, duration_us: u64) {
        self.cameras_processed.fetch_add(1, Ordering::Relaxed);
        self.worker_buckets[bucket_index(duration_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.worker_duration_max_us, duration_us);
    }

    #[inline]
    pub fn record_identity_match(&self) {
        self.identity_matches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_identity_created(&self) {
        self.identities_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_identity_skipped(&self) {
        self.identity_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_gate_rejection(&self) {
        self.gate_rejections.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_enriched(&self) {
        self.events_enriched.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_event_deduplicated(&self) {
        self.events_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn identities_created(&self) -> u64 {
        self.identities_created.load(Ordering::Relaxed)
    }

    pub fn gate_rejections(&self) -> u64 {
        self.gate_rejections.load(Ordering::Relaxed)
    }

    /// Snapshot all counters (no reset; a run reports once)
    pub fn summary(&self) -> RunSummary {
        let mut worker_buckets = [0u64; NUM_BUCKETS];
        for (i, bucket) in self.worker_buckets.iter().enumerate() {
            worker_buckets[i] = bucket.load(Ordering::Relaxed);
        }
        RunSummary {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            cameras_processed: self.cameras_processed.load(Ordering::Relaxed),
            tracks_loaded: self.tracks_loaded.load(Ordering::Relaxed),
            tracks_dropped: self.tracks_dropped.load(Ordering::Relaxed),
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            events_confirmed: self.events_confirmed.load(Ordering::Relaxed),
            events_ended: self.events_ended.load(Ordering::Relaxed),
            identity_matches: self.identity_matches.load(Ordering::Relaxed),
            identities_created: self.identities_created.load(Ordering::Relaxed),
            identity_skipped: self.identity_skipped.load(Ordering::Relaxed),
            gate_rejections: self.gate_rejections.load(Ordering::Relaxed),
            events_enriched: self.events_enriched.load(Ordering::Relaxed),
            events_deduplicated: self.events_deduplicated.load(Ordering::Relaxed),
            worker_duration_max_us: self.worker_duration_max_us.load(Ordering::Relaxed),
            worker_buckets,
        }
    }
}

/// Point-in-time copy of the run counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub elapsed_ms: u64,
    pub cameras_processed: u64,
    pub tracks_loaded: u64,
    pub tracks_dropped: u64,
    pub samples_processed: u64,
    pub events_confirmed: u64,
    pub events_ended: u64,
    pub identity_matches: u64,
    pub identities_created: u64,
    pub identity_skipped: u64,
    pub gate_rejections: u64,
    pub events_enriched: u64,
    pub events_deduplicated: u64,
    pub worker_duration_max_us: u64,
    /// Camera worker duration histogram
    /// Bounds: ≤1ms, ≤4ms, ≤16ms, ≤64ms, ≤256ms, ≤1s, ≤4s, >4s
    pub worker_buckets: [u64; NUM_BUCKETS],
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            elapsed_ms = %self.elapsed_ms,
            cameras = %self.cameras_processed,
            tracks = %self.tracks_loaded,
            tracks_dropped = %self.tracks_dropped,
            samples = %self.samples_processed,
            confirmed = %self.events_confirmed,
            ended = %self.events_ended,
            matches = %self.identity_matches,
            identities = %self.identities_created,
            gate_rejections = %self.gate_rejections,
            deduplicated = %self.events_deduplicated,
            worker_max_us = %self.worker_duration_max_us,
            "run_metrics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = RunMetrics::new();
        let summary = metrics.summary();
        assert_eq!(summary.tracks_loaded, 0);
        assert_eq!(summary.identities_created, 0);
        assert_eq!(summary.worker_buckets, [0; NUM_BUCKETS]);
    }

    #[test]
    fn test_counters_accumulate() {
        let metrics = RunMetrics::new();
        metrics.record_tracks_loaded(3);
        metrics.record_tracks_loaded(2);
        metrics.record_event_confirmed();
        metrics.record_event_ended();
        metrics.record_event_ended();
        metrics.record_identity_created();
        metrics.record_identity_match();

        let summary = metrics.summary();
        assert_eq!(summary.tracks_loaded, 5);
        assert_eq!(summary.events_confirmed, 1);
        assert_eq!(summary.events_ended, 2);
        assert_eq!(summary.identities_created, 1);
        assert_eq!(summary.identity_matches, 1);
    }

    #[test]
    fn test_worker_buckets_and_max() {
        let metrics = RunMetrics::new();
        metrics.record_camera_processed(500);
        metrics.record_camera_processed(5_000);
        metrics.record_camera_processed(10_000_000);

        let summary = metrics.summary();
        assert_eq!(summary.cameras_processed, 3);
        assert_eq!(summary.worker_buckets[0], 1);
        assert_eq!(summary.worker_buckets[2], 1);
        assert_eq!(summary.worker_buckets[NUM_BUCKETS - 1], 1);
        assert_eq!(summary.worker_duration_max_us, 10_000_000);
    }

    #[test]
    fn test_bucket_index_bounds() {
        assert_eq!(bucket_index(0), 0);
        assert_eq!(bucket_index(1_000), 0);
        assert_eq!(bucket_index(1_001), 1);
        assert_eq!(bucket_index(4_000_001), 7);
    }
}
