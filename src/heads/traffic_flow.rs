// src/heads/traffic_flow.rs

use super::{HeadMetrics, HeadOutput, IntelligenceHead};
use crate::analysis::VehicleCounter;
use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::frame_context::FrameContext;
use std::collections::BTreeMap;

pub struct TrafficFlowHead {
    counter: VehicleCounter,
}

impl TrafficFlowHead {
    pub fn new(config: &Config) -> Self {
        Self {
            counter: VehicleCounter::new(config.counting.clone()),
        }
    }
}

impl IntelligenceHead for TrafficFlowHead {
    fn name(&self) -> &'static str {
        "traffic_flow"
    }

    fn process(&mut self, ctx: &FrameContext<'_>) -> Result<HeadOutput, PipelineError> {
        let count = self.counter.update(ctx.frame);

        // Breakdown covers every detection, tracked or not
        let mut stats: BTreeMap<String, u32> = BTreeMap::new();
        for det in &ctx.frame.detections {
            *stats.entry(det.class.display_name().to_string()).or_insert(0) += 1;
        }

        Ok(HeadOutput {
            events: Vec::new(),
            metrics: HeadMetrics {
                vehicle_count: Some(count),
                flow_rate: Some(ctx.frame.detections.len()),
                classification_stats: Some(stats),
                ..HeadMetrics::default()
            },
        })
    }
}
