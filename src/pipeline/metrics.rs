// src/pipeline/metrics.rs
//
// Pipeline counters. Cloned handles share the same atomics, so the
// persistence worker reports into the same struct as the frame loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_detections: Arc<AtomicU64>,
    pub events_emitted: Arc<AtomicU64>,
    pub evidence_accepted: Arc<AtomicU64>,
    pub evidence_enqueued: Arc<AtomicU64>,
    pub evidence_dropped: Arc<AtomicU64>,
    pub evidence_written: Arc<AtomicU64>,
    pub evidence_write_failures: Arc<AtomicU64>,
    pub head_failures: Arc<AtomicU64>,
    pub perception_failures: Arc<AtomicU64>,
    pub frame_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_detections: Arc::new(AtomicU64::new(0)),
            events_emitted: Arc::new(AtomicU64::new(0)),
            evidence_accepted: Arc::new(AtomicU64::new(0)),
            evidence_enqueued: Arc::new(AtomicU64::new(0)),
            evidence_dropped: Arc::new(AtomicU64::new(0)),
            evidence_written: Arc::new(AtomicU64::new(0)),
            evidence_write_failures: Arc::new(AtomicU64::new(0)),
            head_failures: Arc::new(AtomicU64::new(0)),
            perception_failures: Arc::new(AtomicU64::new(0)),
            frame_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Zero every counter; handles held elsewhere see the reset
    pub fn reset(&self) {
        for counter in [
            &self.total_frames,
            &self.frames_with_detections,
            &self.events_emitted,
            &self.evidence_accepted,
            &self.evidence_enqueued,
            &self.evidence_dropped,
            &self.evidence_written,
            &self.evidence_write_failures,
            &self.head_failures,
            &self.perception_failures,
            &self.frame_time_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            frames_with_detections: self.frames_with_detections.load(Ordering::Relaxed),
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            evidence_accepted: self.evidence_accepted.load(Ordering::Relaxed),
            evidence_enqueued: self.evidence_enqueued.load(Ordering::Relaxed),
            evidence_dropped: self.evidence_dropped.load(Ordering::Relaxed),
            evidence_written: self.evidence_written.load(Ordering::Relaxed),
            evidence_write_failures: self.evidence_write_failures.load(Ordering::Relaxed),
            head_failures: self.head_failures.load(Ordering::Relaxed),
            perception_failures: self.perception_failures.load(Ordering::Relaxed),
            last_frame_us: self.frame_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_detections: u64,
    pub events_emitted: u64,
    pub evidence_accepted: u64,
    pub evidence_enqueued: u64,
    pub evidence_dropped: u64,
    pub evidence_written: u64,
    pub evidence_write_failures: u64,
    pub head_failures: u64,
    pub perception_failures: u64,
    pub last_frame_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let worker_handle = metrics.clone();
        worker_handle.inc(&worker_handle.evidence_written);
        metrics.add(&metrics.events_emitted, 3);
        let summary = metrics.summary();
        assert_eq!(summary.evidence_written, 1);
        assert_eq!(summary.events_emitted, 3);

        metrics.reset();
        assert_eq!(worker_handle.summary().evidence_written, 0);
    }
}
