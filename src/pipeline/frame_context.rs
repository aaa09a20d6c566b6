// src/pipeline/frame_context.rs
//
// Single source of truth for one frame. Speeds are computed once by the
// orchestrator before any head runs, so every head reads the same values.

use crate::analysis::{SpeedEstimator, TrackSpeed};
use crate::types::DetectionFrame;

pub struct FrameContext<'a> {
    pub frame: &'a DetectionFrame,
    /// Samples produced by this frame's speed update
    pub speeds: &'a [TrackSpeed],
    /// Speed service state after this frame's update (histories)
    pub speed_service: &'a SpeedEstimator,
}

impl<'a> FrameContext<'a> {
    pub fn new(
        frame: &'a DetectionFrame,
        speeds: &'a [TrackSpeed],
        speed_service: &'a SpeedEstimator,
    ) -> Self {
        Self {
            frame,
            speeds,
            speed_service,
        }
    }

    /// Mean and peak over this frame's samples; (0, 0) when there are none
    pub fn speed_stats(&self) -> (f32, f32) {
        if self.speeds.is_empty() {
            return (0.0, 0.0);
        }
        let total: f32 = self.speeds.iter().map(|s| s.speed_kmh).sum();
        let peak = self.speeds.iter().map(|s| s.speed_kmh).fold(0.0, f32::max);
        (total / self.speeds.len() as f32, peak)
    }
}
