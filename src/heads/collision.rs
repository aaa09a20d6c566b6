// src/heads/collision.rs

use super::{HeadMetrics, HeadOutput, IntelligenceHead};
use crate::analysis::CollisionAnalyzer;
use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::event::Event;
use crate::pipeline::frame_context::FrameContext;

pub struct CollisionHead {
    analyzer: CollisionAnalyzer,
}

impl CollisionHead {
    pub fn new(config: &Config) -> Self {
        Self {
            analyzer: CollisionAnalyzer::new(config.collision.clone()),
        }
    }
}

impl IntelligenceHead for CollisionHead {
    fn name(&self) -> &'static str {
        "collision"
    }

    fn process(&mut self, ctx: &FrameContext<'_>) -> Result<HeadOutput, PipelineError> {
        let events = self.analyzer.update(ctx.frame, ctx.speed_service);
        Ok(HeadOutput {
            events,
            metrics: HeadMetrics {
                active_violations: Some(self.analyzer.active_count()),
                ..HeadMetrics::default()
            },
        })
    }

    fn flush(&mut self) -> Vec<Event> {
        self.analyzer.flush()
    }
}
