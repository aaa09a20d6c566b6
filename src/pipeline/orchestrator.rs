// src/pipeline/orchestrator.rs
//
// Per-frame pipeline. Single entry point: call process_frame() each frame.
//
//   DetectionFrame
//     → speed service update
//     → heads in fixed order (traffic flow, collision, anomaly, crowd)
//     → events: safety index, violation stats, evidence gate
//         → accepted: notification + render + writer queue
//     → telemetry bus (flow / stability histories, system status)
//     → FrameTelemetry returned to the caller
//
// A failing head is logged and skipped; the frame still completes.
// Call flush() at stream end so every open violation gets its END.

use super::event::{Event, EventRecord, EventType};
use super::evidence_gate::EvidenceGate;
use super::frame_context::FrameContext;
use super::metrics::PipelineMetrics;
use super::safety_index::SafetyIndex;
use super::telemetry_bus::{FlowSample, Health, StabilitySample, SystemStatus, TelemetryBus};
use crate::analysis::SpeedEstimator;
use crate::config::Config;
use crate::error::PipelineError;
use crate::heads::{build_heads, CrowdPoint, HeadControl, HeadMetrics, IntelligenceHead};
use crate::notification;
use crate::storage::{EvidenceItem, EvidenceRenderer, EvidenceStore, EvidenceWriter, MetadataRenderer};
use crate::types::DetectionFrame;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViolationStat {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u64,
}

/// Everything a telemetry consumer needs for one frame
#[derive(Debug, Clone, Serialize)]
pub struct FrameTelemetry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub frame_number: u64,
    pub fps: f64,
    /// Cumulative line count
    pub total_vehicles: u64,
    pub vehicle_count: usize,
    pub person_count: usize,
    /// Violations currently open across all heads
    pub active_violations: usize,
    /// Closest pair of vehicle centers, px
    pub min_proximity: Option<f32>,
    pub violation_stats: Vec<ViolationStat>,
    pub flow_rate: usize,
    pub flow_history: Vec<FlowSample>,
    pub crowd_data: Vec<CrowdPoint>,
    pub anomaly_history: Vec<StabilitySample>,
    pub system_status: Health,
    pub classification_stats: BTreeMap<String, u32>,
    pub avg_speed: f32,
    pub peak_speed: f32,
    pub safety_index: f64,
    pub events: Vec<EventRecord>,
}

impl FrameTelemetry {
    /// Documented shape for frames that could not be processed
    pub fn error(frame_number: u64) -> Self {
        Self {
            kind: "telemetry",
            frame_number,
            fps: 0.0,
            total_vehicles: 0,
            vehicle_count: 0,
            person_count: 0,
            active_violations: 0,
            min_proximity: None,
            violation_stats: Vec::new(),
            flow_rate: 0,
            flow_history: Vec::new(),
            crowd_data: Vec::new(),
            anomaly_history: Vec::new(),
            system_status: Health::Error,
            classification_stats: BTreeMap::new(),
            avg_speed: 0.0,
            peak_speed: 0.0,
            safety_index: 0.0,
            events: Vec::new(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.system_status == Health::Error
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct SafetyPipeline {
    config: Config,
    speed: SpeedEstimator,
    heads: Vec<Box<dyn IntelligenceHead>>,
    safety: SafetyIndex,
    gate: EvidenceGate,
    bus: Arc<TelemetryBus>,
    metrics: PipelineMetrics,
    writer: Option<EvidenceWriter>,
    renderer: Box<dyn EvidenceRenderer>,
    frames_processed: u64,
    /// (frame_index, timestamp_ms) of the last processed frame
    last_frame: Option<(u64, f64)>,
    violation_counts: BTreeMap<EventType, u64>,
    fps_window: VecDeque<f64>,
}

impl SafetyPipeline {
    /// Pipeline without durable evidence: captures are still gated and
    /// notified, but nothing is persisted.
    pub fn new(config: Config) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            speed: SpeedEstimator::new(config.speed.clone(), config.video.fps),
            heads: build_heads(&config),
            safety: SafetyIndex::new(&config.safety),
            gate: EvidenceGate::new(&config.evidence),
            bus: Arc::new(TelemetryBus::new(&config.telemetry)),
            metrics: PipelineMetrics::new(),
            writer: None,
            renderer: Box::new(MetadataRenderer),
            frames_processed: 0,
            last_frame: None,
            violation_counts: BTreeMap::new(),
            fps_window: VecDeque::with_capacity(config.telemetry.fps_window),
            config,
        })
    }

    /// Pipeline with a background writer persisting accepted captures
    pub fn with_store(config: Config, store: Box<dyn EvidenceStore>) -> anyhow::Result<Self> {
        let mut pipeline = Self::new(config).context("Invalid pipeline configuration")?;
        let writer = EvidenceWriter::spawn(
            store,
            pipeline.config.evidence.queue_capacity,
            pipeline.metrics.clone(),
        )
        .context("Failed to start evidence writer")?;
        pipeline.writer = Some(writer);
        Ok(pipeline)
    }

    pub fn with_renderer(mut self, renderer: Box<dyn EvidenceRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the standard head set (order is preserved as given)
    pub fn with_heads(mut self, heads: Vec<Box<dyn IntelligenceHead>>) -> Self {
        self.heads = heads;
        self
    }

    pub fn bus(&self) -> Arc<TelemetryBus> {
        Arc::clone(&self.bus)
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Output of the external perception engine for one frame. A failure
    /// there costs this frame only.
    pub fn process_tracked(&mut self, result: Result<DetectionFrame, PipelineError>) -> FrameTelemetry {
        match result {
            Ok(frame) => self.process_frame(&frame),
            Err(e) => {
                self.metrics.inc(&self.metrics.perception_failures);
                let frame_number = self.last_frame.map_or(0, |(index, _)| index + 1);
                error!("Perception failed for frame {}: {}", frame_number, e);
                FrameTelemetry::error(frame_number)
            }
        }
    }

    pub fn process_frame(&mut self, frame: &DetectionFrame) -> FrameTelemetry {
        if let Err(e) = frame.validate() {
            error!("Skipping frame: {}", e);
            return FrameTelemetry::error(frame.frame_index);
        }

        let t0 = Instant::now();
        self.frames_processed += 1;
        self.metrics.inc(&self.metrics.total_frames);
        if !frame.detections.is_empty() {
            self.metrics.inc(&self.metrics.frames_with_detections);
        }

        let speeds = self.speed.update(frame);

        // ── Heads ────────────────────────────────────────────
        let mut events: Vec<Event> = Vec::new();
        let mut merged = HeadMetrics::default();
        let (avg_speed, peak_speed) = {
            let ctx = FrameContext::new(frame, &speeds, &self.speed);
            for head in self.heads.iter_mut() {
                match head.process(&ctx) {
                    Ok(output) => {
                        events.extend(output.events);
                        merged.merge(output.metrics);
                    }
                    Err(e) => {
                        self.metrics.inc(&self.metrics.head_failures);
                        error!("Head {} failed on frame {}: {}", head.name(), frame.frame_index, e);
                    }
                }
            }
            ctx.speed_stats()
        };

        // ── Events ───────────────────────────────────────────
        let records = self.handle_events(&events, frame.frame_index, frame.timestamp_ms, Some(frame));
        let safety_index = self.safety.compute(frame.timestamp_ms);
        self.last_frame = Some((frame.frame_index, frame.timestamp_ms));

        // ── Bus ──────────────────────────────────────────────
        let total_vehicles = merged.vehicle_count.unwrap_or(0);
        let crowd_data = merged.crowd_density.take().unwrap_or_default();
        self.update_bus(frame, total_vehicles, safety_index, &crowd_data);

        let elapsed = t0.elapsed();
        let fps = self.record_fps(elapsed.as_secs_f64());
        self.metrics.set_timing(&self.metrics.frame_time_us, elapsed.as_micros() as u64);
        self.bus.set_system_status(SystemStatus {
            fps,
            latency_ms: elapsed.as_secs_f64() * 1000.0,
            health: Health::from_safety_index(safety_index),
        });

        let snapshot = self.bus.snapshot();
        FrameTelemetry {
            kind: "telemetry",
            frame_number: frame.frame_index,
            fps: (fps * 10.0).round() / 10.0,
            total_vehicles,
            vehicle_count: frame.detections.iter().filter(|d| d.is_vehicle()).count(),
            person_count: frame.detections.iter().filter(|d| d.is_person()).count(),
            active_violations: merged.active_violations.unwrap_or(0),
            min_proximity: min_vehicle_proximity(frame),
            violation_stats: self.violation_stats(),
            flow_rate: merged.flow_rate.unwrap_or(0),
            flow_history: snapshot.flow_history,
            crowd_data,
            anomaly_history: snapshot.stability_history,
            system_status: Health::from_safety_index(safety_index),
            classification_stats: merged.classification_stats.unwrap_or_default(),
            avg_speed,
            peak_speed,
            safety_index,
            events: records,
        }
    }

    /// Signal-controller input, forwarded to every head
    pub fn set_crosswalk_active(&mut self, active: bool) {
        let control = HeadControl::CrosswalkActive(active);
        for head in self.heads.iter_mut() {
            head.apply(&control);
        }
    }

    /// END records for every violation still open in any head
    pub fn flush(&mut self) -> Vec<EventRecord> {
        let mut events = Vec::new();
        for head in self.heads.iter_mut() {
            events.extend(head.flush());
        }
        if events.is_empty() {
            return Vec::new();
        }

        let (frame_index, timestamp_ms) = self
            .last_frame
            .unwrap_or_else(|| (0, Utc::now().timestamp_millis() as f64));
        info!("Flushed {} open violation(s)", events.len());
        self.handle_events(&events, frame_index, timestamp_ms, None)
    }

    /// New source: close open violations, then start from a clean session.
    /// Readers holding the bus keep their handle. Custom heads are replaced
    /// by the standard set.
    pub fn reset(&mut self) -> Vec<EventRecord> {
        let flushed = self.flush();

        self.speed.reset();
        self.heads = build_heads(&self.config);
        self.safety.reset();
        self.gate.reset();
        self.violation_counts.clear();
        self.fps_window.clear();
        self.frames_processed = 0;
        self.last_frame = None;
        self.bus.reset();
        self.metrics.reset();

        info!("Pipeline state reset for new source");
        flushed
    }

    /// Stop the evidence writer after draining its queue
    pub fn shutdown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown();
        }
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn handle_events(
        &mut self,
        events: &[Event],
        frame_index: u64,
        timestamp_ms: f64,
        frame: Option<&DetectionFrame>,
    ) -> Vec<EventRecord> {
        let mut records = Vec::with_capacity(events.len());

        for event in events {
            self.safety.record(event, timestamp_ms);
            if event.is_start() {
                *self.violation_counts.entry(event.event_type).or_insert(0) += 1;
            }

            let triggered = self.config.evidence.enabled
                && event.event_type.is_evidence_worthy()
                && self
                    .gate
                    .should_capture(event.entity_id, event.event_type, event.status, timestamp_ms);

            if triggered {
                self.metrics.inc(&self.metrics.evidence_accepted);
                info!("Capturing {} evidence for {}", event.event_type, event.entity_id);
                notification::dispatch(event, frame_index);
                if let Some(frame) = frame {
                    self.persist(event, frame);
                }
            }

            let mut record = EventRecord::from_event(event, frame_index, timestamp_ms);
            record.snapshot_triggered = triggered;
            records.push(record);
        }

        self.metrics.add(&self.metrics.events_emitted, records.len() as u64);
        records
    }

    fn persist(&self, event: &Event, frame: &DetectionFrame) {
        let Some(writer) = &self.writer else {
            return;
        };
        match self.renderer.render(event, frame) {
            Ok(image_bytes) => {
                writer.submit(EvidenceItem {
                    violation_type: event.event_type.as_str().to_string(),
                    entity_id: event.entity_id.to_string(),
                    image_bytes,
                });
            }
            Err(e) => {
                self.metrics.inc(&self.metrics.evidence_dropped);
                warn!("Could not render evidence for {}: {}", event.entity_id, e);
            }
        }
    }

    fn update_bus(&self, frame: &DetectionFrame, total_vehicles: u64, safety_index: f64, crowd: &[CrowdPoint]) {
        let telemetry = &self.config.telemetry;

        if self.frames_processed % telemetry.flow_sample_every_frames == 0 {
            let time = DateTime::<Utc>::from_timestamp_millis(frame.timestamp_ms as i64)
                .map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            self.bus.push_flow(FlowSample {
                time,
                value: total_vehicles,
            });
        }

        if self.frames_processed % telemetry.stability_sample_every_frames == 0 {
            self.bus.push_stability(StabilitySample {
                frame: frame.frame_index,
                stability: safety_index,
            });
        }

        self.bus.set_crowd_density(crowd.to_vec());
    }

    /// Rolling mean of instantaneous processing rate
    fn record_fps(&mut self, frame_secs: f64) -> f64 {
        if frame_secs > 0.0 {
            if self.fps_window.len() >= self.config.telemetry.fps_window.max(1) {
                self.fps_window.pop_front();
            }
            self.fps_window.push_back(1.0 / frame_secs);
        }
        if self.fps_window.is_empty() {
            return self.config.video.fps;
        }
        self.fps_window.iter().sum::<f64>() / self.fps_window.len() as f64
    }

    fn violation_stats(&self) -> Vec<ViolationStat> {
        self.violation_counts
            .iter()
            .map(|(kind, count)| ViolationStat {
                kind: kind.label(),
                count: *count,
            })
            .collect()
    }
}

impl Drop for SafetyPipeline {
    fn drop(&mut self) {
        if self.writer.is_some() {
            debug!("Pipeline dropped, stopping evidence writer");
        }
        self.shutdown();
    }
}

/// Smallest center-to-center distance between any two vehicles
fn min_vehicle_proximity(frame: &DetectionFrame) -> Option<f32> {
    let centers: Vec<[f32; 2]> = frame
        .detections
        .iter()
        .filter(|d| d.is_vehicle() && d.has_valid_bbox())
        .map(|d| d.center())
        .collect();

    let mut best: Option<f32> = None;
    for (i, a) in centers.iter().enumerate() {
        for b in &centers[i + 1..] {
            let d = crate::geometry::distance(*a, *b);
            if best.map_or(true, |current| d < current) {
                best = Some(d);
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::heads::{CrowdHead, HeadOutput};
    use crate::pipeline::event::EventStatus;
    use crate::storage::MemoryEvidenceStore;
    use crate::types::{Detection, ObjectClass};

    const FRAME_MS: f64 = 1000.0 / 30.0;

    fn car(id: u32, cx: f32) -> Detection {
        Detection {
            track_id: Some(id),
            class: ObjectClass::Car,
            bbox: [cx - 50.0, 370.0, cx + 50.0, 430.0],
            confidence: 0.9,
        }
    }

    fn person(id: u32, y_bottom: f32) -> Detection {
        Detection {
            track_id: Some(id),
            class: ObjectClass::Person,
            bbox: [100.0, y_bottom - 80.0, 130.0, y_bottom],
            confidence: 0.8,
        }
    }

    fn frame(i: u64, dets: Vec<Detection>) -> DetectionFrame {
        DetectionFrame::new(i, i as f64 * FRAME_MS, 1280, 720, dets)
    }

    /// Car 1 parked at x=400; car 2 approaches at 5 px/frame until it
    /// overlaps completely at frame 60, then pulls away at 10 px/frame.
    fn approach_and_separate(f: u64) -> DetectionFrame {
        let cx = if f <= 60 {
            700.0 - 5.0 * f as f32
        } else {
            400.0 + 10.0 * (f - 60) as f32
        };
        frame(f, vec![car(1, 400.0), car(2, cx)])
    }

    fn collision_records(records: &[EventRecord], status: EventStatus) -> Vec<&EventRecord> {
        records
            .iter()
            .filter(|r| r.event_type == EventType::Collision && r.status == status)
            .collect()
    }

    struct FailingHead;

    impl IntelligenceHead for FailingHead {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn process(&mut self, _ctx: &FrameContext<'_>) -> Result<HeadOutput, PipelineError> {
            Err(PipelineError::Head {
                head: "failing",
                reason: "model crashed".into(),
            })
        }
    }

    #[test]
    fn test_approach_overlap_separate_scenario() {
        let store = MemoryEvidenceStore::new();
        let mut pipeline = SafetyPipeline::with_store(Config::default(), Box::new(store.clone())).unwrap();

        let mut records = Vec::new();
        for f in 0..100 {
            let telemetry = pipeline.process_frame(&approach_and_separate(f));
            assert!((0.0..=100.0).contains(&telemetry.safety_index));
            assert!(telemetry.anomaly_history.len() <= 50);
            records.extend(telemetry.events);
        }

        let starts = collision_records(&records, EventStatus::Start);
        let ends = collision_records(&records, EventStatus::End);
        assert_eq!(starts.len(), 1);
        assert_eq!(ends.len(), 1);
        assert!((40..=50).contains(&starts[0].frame_number), "START at {}", starts[0].frame_number);
        assert!(ends[0].frame_number > 60, "END at {}", ends[0].frame_number);
        assert_eq!(starts[0].entity_id, "id_1_id_2");
        assert!(starts[0].snapshot_triggered);
        assert!(!ends[0].snapshot_triggered);

        // Nothing else fires in this scene
        assert_eq!(records.len(), 2);

        let snapshot = pipeline.bus().snapshot();
        assert!(snapshot.stability_history.len() <= 50);
        assert!(snapshot.stability_score < 100.0);

        pipeline.shutdown();
        assert_eq!(store.len(), 1);
        assert_eq!(store.list().unwrap()[0].violation_type, "collision");
        assert_eq!(pipeline.metrics().summary().evidence_written, 1);
    }

    #[test]
    fn test_violation_stats_count_starts() {
        let mut pipeline = SafetyPipeline::new(Config::default()).unwrap();
        let mut last = None;
        for f in 0..100 {
            last = Some(pipeline.process_frame(&approach_and_separate(f)));
        }
        let telemetry = last.unwrap();
        assert_eq!(
            telemetry.violation_stats,
            vec![ViolationStat {
                kind: "Collision".into(),
                count: 1
            }]
        );
        assert_eq!(telemetry.vehicle_count, 2);
        assert!(telemetry.min_proximity.is_some());
    }

    #[test]
    fn test_failing_head_does_not_stop_others() {
        let mut pipeline = SafetyPipeline::new(Config::default()).unwrap()
            .with_heads(vec![Box::new(FailingHead), Box::new(CrowdHead::new())]);

        let telemetry = pipeline.process_frame(&frame(0, vec![person(1, 300.0)]));
        assert!(!telemetry.is_error());
        assert_eq!(telemetry.crowd_data.len(), 1);
        assert_eq!(pipeline.metrics().summary().head_failures, 1);
    }

    #[test]
    fn test_perception_failure_costs_one_frame() {
        let mut pipeline = SafetyPipeline::new(Config::default()).unwrap();
        pipeline.process_frame(&frame(0, vec![car(1, 400.0)]));

        let telemetry = pipeline.process_tracked(Err(PipelineError::Perception("tracker returned nothing".into())));
        assert!(telemetry.is_error());
        assert_eq!(telemetry.frame_number, 1);
        assert!(telemetry.events.is_empty());
        assert_eq!(pipeline.metrics().summary().perception_failures, 1);

        let next = pipeline.process_tracked(Ok(frame(2, vec![car(1, 400.0)])));
        assert_eq!(next.system_status, Health::Optimal);
    }

    #[test]
    fn test_invalid_frame_yields_error_shape() {
        let mut pipeline = SafetyPipeline::new(Config::default()).unwrap();
        let bad = DetectionFrame::new(5, 0.0, 0, 720, vec![car(1, 400.0)]);
        assert!(matches!(bad.validate(), Err(PipelineError::InvalidFrame(_))));
        let telemetry = pipeline.process_frame(&bad);
        assert!(telemetry.is_error());
        assert_eq!(telemetry.safety_index, 0.0);

        let json = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(json["type"], "telemetry");
        assert_eq!(json["system_status"], "ERROR");
    }

    #[test]
    fn test_flush_closes_open_violations() {
        let mut config = Config::default();
        config.jaywalking.roadway = Some(Polygon::new(vec![[0.0, 0.5], [1.0, 0.5], [1.0, 1.0], [0.0, 1.0]]));
        let mut pipeline = SafetyPipeline::new(config).unwrap();

        let telemetry = pipeline.process_frame(&frame(0, vec![person(7, 600.0)]));
        assert_eq!(telemetry.events.len(), 1);
        assert_eq!(telemetry.active_violations, 1);

        let flushed = pipeline.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].status, EventStatus::End);
        assert_eq!(flushed[0].event_type, EventType::Jaywalking);
        assert!(pipeline.flush().is_empty());
    }

    #[test]
    fn test_crosswalk_control_suppresses_jaywalking() {
        let mut config = Config::default();
        config.jaywalking.roadway = Some(Polygon::new(vec![[0.0, 0.5], [1.0, 0.5], [1.0, 1.0], [0.0, 1.0]]));
        let mut pipeline = SafetyPipeline::new(config).unwrap();
        pipeline.set_crosswalk_active(true);
        assert!(pipeline.process_frame(&frame(0, vec![person(7, 600.0)])).events.is_empty());
    }

    #[test]
    fn test_reset_flushes_and_clears_session() {
        let mut pipeline = SafetyPipeline::new(Config::default()).unwrap();
        let bus = pipeline.bus();
        for f in 0..50 {
            pipeline.process_frame(&approach_and_separate(f));
        }
        assert!(!bus.stability_history().is_empty());

        let flushed = pipeline.reset();
        assert_eq!(collision_records(&flushed, EventStatus::End).len(), 1);
        assert!(bus.snapshot().stability_history.is_empty());

        let telemetry = pipeline.process_frame(&frame(0, vec![car(1, 400.0)]));
        assert!(telemetry.violation_stats.is_empty());
        assert_eq!(telemetry.safety_index, 100.0);
    }

    #[test]
    fn test_flow_and_stability_cadence() {
        let mut pipeline = SafetyPipeline::new(Config::default()).unwrap();
        for f in 0..60 {
            pipeline.process_frame(&frame(f, vec![car(1, 400.0)]));
        }
        let snapshot = pipeline.bus().snapshot();
        assert_eq!(snapshot.flow_history.len(), 2);
        assert_eq!(snapshot.stability_history.len(), 6);
        assert_eq!(snapshot.flow_history[0].time.len(), 8);
    }

    #[test]
    fn test_unrunnable_config_is_rejected_up_front() {
        let mut config = Config::default();
        config.telemetry.flow_sample_every_frames = 0;
        assert!(matches!(
            SafetyPipeline::new(config.clone()),
            Err(PipelineError::InvalidConfig(_))
        ));
        assert!(SafetyPipeline::with_store(config, Box::new(MemoryEvidenceStore::new())).is_err());

        let mut config = Config::default();
        config.collision.trend_lag = 0;
        assert!(SafetyPipeline::new(config).is_err());
    }
}
