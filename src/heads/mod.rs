// src/heads/mod.rs
//
// Intelligence heads: domain groupings of analyzers behind one contract.
//
//   TrafficFlowHead → line count, flow rate, per-class breakdown
//   CollisionHead   → pairwise vehicle clashes
//   AnomalyHead     → stopped/stalled/jam, lane, jaywalking, wrong-way, boarding
//   CrowdHead       → person density points
//
// The orchestrator runs them in that order and tolerates any one failing.

pub mod anomaly;
pub mod collision;
pub mod crowd;
pub mod traffic_flow;

pub use anomaly::AnomalyHead;
pub use collision::CollisionHead;
pub use crowd::CrowdHead;
pub use traffic_flow::TrafficFlowHead;

use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::event::Event;
use crate::pipeline::frame_context::FrameContext;
use serde::Serialize;
use std::collections::BTreeMap;

pub trait IntelligenceHead: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, ctx: &FrameContext<'_>) -> Result<HeadOutput, PipelineError>;

    /// END events for every violation still open; used at stream end
    fn flush(&mut self) -> Vec<Event> {
        Vec::new()
    }

    /// Runtime control from outside the frame stream
    fn apply(&mut self, _control: &HeadControl) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeadControl {
    /// Pedestrian phase of the signal controller
    CrosswalkActive(bool),
}

/// Normalized weight point on a 0–100 grid
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CrowdPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Default)]
pub struct HeadMetrics {
    pub vehicle_count: Option<u64>,
    pub flow_rate: Option<usize>,
    pub classification_stats: Option<BTreeMap<String, u32>>,
    pub crowd_density: Option<Vec<CrowdPoint>>,
    pub active_violations: Option<usize>,
}

impl HeadMetrics {
    /// Later heads overwrite scalar metrics; violation counts add up
    pub fn merge(&mut self, other: HeadMetrics) {
        if other.vehicle_count.is_some() {
            self.vehicle_count = other.vehicle_count;
        }
        if other.flow_rate.is_some() {
            self.flow_rate = other.flow_rate;
        }
        if other.classification_stats.is_some() {
            self.classification_stats = other.classification_stats;
        }
        if other.crowd_density.is_some() {
            self.crowd_density = other.crowd_density;
        }
        if let Some(n) = other.active_violations {
            self.active_violations = Some(self.active_violations.unwrap_or(0) + n);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeadOutput {
    pub events: Vec<Event>,
    pub metrics: HeadMetrics,
}

/// The fixed head set, in execution order
pub fn build_heads(config: &Config) -> Vec<Box<dyn IntelligenceHead>> {
    vec![
        Box::new(TrafficFlowHead::new(config)),
        Box::new(CollisionHead::new(config)),
        Box::new(AnomalyHead::new(config)),
        Box::new(CrowdHead::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_sums_violations_and_overwrites_scalars() {
        let mut merged = HeadMetrics::default();
        merged.merge(HeadMetrics {
            vehicle_count: Some(3),
            active_violations: Some(1),
            ..HeadMetrics::default()
        });
        merged.merge(HeadMetrics {
            flow_rate: Some(7),
            active_violations: Some(2),
            ..HeadMetrics::default()
        });
        assert_eq!(merged.vehicle_count, Some(3));
        assert_eq!(merged.flow_rate, Some(7));
        assert_eq!(merged.active_violations, Some(3));
    }

    #[test]
    fn test_head_order() {
        let names: Vec<&str> = build_heads(&Config::default()).iter().map(|h| h.name()).collect();
        assert_eq!(names, ["traffic_flow", "collision", "anomaly", "crowd"]);
    }
}
