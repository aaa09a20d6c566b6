// src/heads/anomaly.rs
//
// Composite anomaly head. Stopped-vehicle analysis runs first because its
// stationary set gates the boarding analyzer.

use super::{HeadControl, HeadMetrics, HeadOutput, IntelligenceHead};
use crate::analysis::{
    BoardingAnalyzer, JaywalkingAnalyzer, LaneViolationAnalyzer, StoppedVehicleAnalyzer,
    WrongWayAnalyzer,
};
use crate::config::Config;
use crate::error::PipelineError;
use crate::pipeline::event::Event;
use crate::pipeline::frame_context::FrameContext;

pub struct AnomalyHead {
    stopped: StoppedVehicleAnalyzer,
    lane: LaneViolationAnalyzer,
    jaywalking: JaywalkingAnalyzer,
    wrong_way: WrongWayAnalyzer,
    boarding: BoardingAnalyzer,
}

impl AnomalyHead {
    pub fn new(config: &Config) -> Self {
        Self {
            stopped: StoppedVehicleAnalyzer::new(config.stopped_vehicle.clone(), &config.video),
            lane: LaneViolationAnalyzer::new(config.lanes.clone()),
            jaywalking: JaywalkingAnalyzer::new(config.jaywalking.clone()),
            wrong_way: WrongWayAnalyzer::new(config.wrong_way.clone()),
            boarding: BoardingAnalyzer::new(config.interaction.clone(), &config.video),
        }
    }

    fn active_count(&self) -> usize {
        self.stopped.active_count()
            + self.lane.active_count()
            + self.jaywalking.active_count()
            + self.wrong_way.active_count()
            + self.boarding.active_count()
    }
}

impl IntelligenceHead for AnomalyHead {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    fn process(&mut self, ctx: &FrameContext<'_>) -> Result<HeadOutput, PipelineError> {
        let frame = ctx.frame;
        let stopped = self.stopped.update(frame);

        let mut events = stopped.events;
        events.extend(self.lane.update(frame));
        events.extend(self.jaywalking.update(frame));
        events.extend(self.wrong_way.update(frame));
        events.extend(self.boarding.update(frame, &stopped.stationary));

        Ok(HeadOutput {
            events,
            metrics: HeadMetrics {
                active_violations: Some(self.active_count()),
                ..HeadMetrics::default()
            },
        })
    }

    fn flush(&mut self) -> Vec<Event> {
        let mut events = self.stopped.flush();
        events.extend(self.lane.flush());
        events.extend(self.jaywalking.flush());
        events.extend(self.wrong_way.flush());
        events.extend(self.boarding.flush());
        events
    }

    fn apply(&mut self, control: &HeadControl) {
        match control {
            HeadControl::CrosswalkActive(active) => self.jaywalking.set_crosswalk_active(*active),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SpeedEstimator;
    use crate::geometry::Polygon;
    use crate::pipeline::event::{EventStatus, EventType};
    use crate::types::{Detection, DetectionFrame, ObjectClass};

    fn person(id: u32, y_bottom: f32) -> Detection {
        Detection {
            track_id: Some(id),
            class: ObjectClass::Person,
            bbox: [100.0, y_bottom - 80.0, 130.0, y_bottom],
            confidence: 0.8,
        }
    }

    fn config_with_roadway() -> Config {
        let mut config = Config::default();
        config.jaywalking.roadway = Some(Polygon::new(vec![[0.0, 0.5], [1.0, 0.5], [1.0, 1.0], [0.0, 1.0]]));
        config
    }

    fn run(head: &mut AnomalyHead, frame: &DetectionFrame) -> HeadOutput {
        let speeds = SpeedEstimator::new(crate::config::SpeedConfig::default(), 30.0);
        let ctx = FrameContext::new(frame, &[], &speeds);
        head.process(&ctx).unwrap()
    }

    #[test]
    fn test_jaywalking_flows_through_head() {
        let mut head = AnomalyHead::new(&config_with_roadway());
        let frame = DetectionFrame::new(0, 0.0, 1280, 720, vec![person(5, 600.0)]);
        let out = run(&mut head, &frame);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].event_type, EventType::Jaywalking);
        assert_eq!(out.metrics.active_violations, Some(1));

        let flushed = head.flush();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0].status, EventStatus::End);
    }

    #[test]
    fn test_crosswalk_control_reaches_jaywalking() {
        let mut head = AnomalyHead::new(&config_with_roadway());
        head.apply(&HeadControl::CrosswalkActive(true));
        let frame = DetectionFrame::new(0, 0.0, 1280, 720, vec![person(5, 600.0)]);
        assert!(run(&mut head, &frame).events.is_empty());
    }
}
