// src/analysis/lane_violation.rs
//
// Vehicles outside every allowed lane polygon. START on exit, END on
// re-entry. Open violators are kept until re-entry or flush: a violating
// track that disappears is never ended by track loss, so it keeps counting
// toward active_count() (and the telemetry active violation total) until it
// is seen inside a lane again or flush() closes it.

use crate::config::LaneConfig;
use crate::pipeline::event::{EntityId, Event, EventType};
use crate::types::{BBox, DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet};
use tracing::info;

pub struct LaneViolationAnalyzer {
    config: LaneConfig,
    /// Open violations with the last box seen outside the lanes
    violating: HashMap<TrackId, BBox>,
}

impl LaneViolationAnalyzer {
    pub fn new(config: LaneConfig) -> Self {
        Self {
            config,
            violating: HashMap::new(),
        }
    }

    pub fn update(&mut self, frame: &DetectionFrame) -> Vec<Event> {
        let mut events = Vec::new();
        if self.config.polygons.is_empty() {
            return events;
        }

        let (w, h) = (frame.width_f32(), frame.height_f32());
        let mut seen: HashSet<TrackId> = HashSet::new();

        for (id, det) in frame.vehicles() {
            if !seen.insert(id) {
                continue;
            }
            let center = det.center();
            let inside = self.config.polygons.iter().any(|lane| lane.contains(center, w, h));

            match (inside, self.violating.contains_key(&id)) {
                (false, false) => {
                    info!("🛣️  Track {} left the allowed lanes", id);
                    self.violating.insert(id, det.bbox);
                    events.push(Event::start(
                        EventType::LaneViolation,
                        EntityId::Track(id),
                        Some(det.bbox),
                        "Vehicle outside allowed lanes",
                    ));
                }
                (false, true) => {
                    self.violating.insert(id, det.bbox);
                }
                (true, true) => {
                    self.violating.remove(&id);
                    events.push(Event::end(
                        EventType::LaneViolation,
                        EntityId::Track(id),
                        Some(det.bbox),
                        "Vehicle returned to lane",
                    ));
                }
                (true, false) => {}
            }
        }

        events
    }

    /// END for every open violation; callers must flush before discarding
    pub fn flush(&mut self) -> Vec<Event> {
        let mut open: Vec<(TrackId, BBox)> = self.violating.drain().collect();
        open.sort_unstable_by_key(|(id, _)| *id);
        open.into_iter()
            .map(|(id, bbox)| {
                Event::end(
                    EventType::LaneViolation,
                    EntityId::Track(id),
                    Some(bbox),
                    "Video ended during lane violation",
                )
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.violating.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Polygon;
    use crate::pipeline::event::EventStatus;
    use crate::types::{Detection, ObjectClass};

    fn car(id: u32, cx: f32, cy: f32) -> Detection {
        Detection {
            track_id: Some(id),
            class: ObjectClass::Car,
            bbox: [cx - 40.0, cy - 25.0, cx + 40.0, cy + 25.0],
            confidence: 0.9,
        }
    }

    fn frame(i: u64, dets: Vec<Detection>) -> DetectionFrame {
        DetectionFrame::new(i, i as f64 * 33.3, 1280, 720, dets)
    }

    /// Left half of the frame, normalized
    fn left_lane() -> LaneConfig {
        LaneConfig {
            polygons: vec![Polygon::new(vec![[0.0, 0.0], [0.5, 0.0], [0.5, 1.0], [0.0, 1.0]])],
        }
    }

    #[test]
    fn test_no_lanes_is_noop() {
        let mut a = LaneViolationAnalyzer::new(LaneConfig::default());
        assert!(a.update(&frame(0, vec![car(1, 1000.0, 300.0)])).is_empty());
    }

    #[test]
    fn test_exit_and_reentry() {
        let mut a = LaneViolationAnalyzer::new(left_lane());
        assert!(a.update(&frame(0, vec![car(1, 300.0, 300.0)])).is_empty());

        let events = a.update(&frame(1, vec![car(1, 900.0, 300.0)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Start);

        // Still outside: no repeat
        assert!(a.update(&frame(2, vec![car(1, 950.0, 300.0)])).is_empty());

        let events = a.update(&frame(3, vec![car(1, 300.0, 300.0)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::End);
        assert_eq!(a.active_count(), 0);
    }

    #[test]
    fn test_pixel_polygons() {
        let config = LaneConfig {
            polygons: vec![Polygon::new(vec![[0.0, 0.0], [640.0, 0.0], [640.0, 720.0], [0.0, 720.0]])],
        };
        let mut a = LaneViolationAnalyzer::new(config);
        assert!(a.update(&frame(0, vec![car(1, 300.0, 300.0)])).is_empty());
        assert_eq!(a.update(&frame(1, vec![car(1, 900.0, 300.0)])).len(), 1);
    }

    #[test]
    fn test_flush_closes_lost_violators() {
        let mut a = LaneViolationAnalyzer::new(left_lane());
        a.update(&frame(0, vec![car(1, 900.0, 300.0), car(2, 1000.0, 500.0)]));
        a.update(&frame(1, vec![]));
        assert_eq!(a.active_count(), 2);

        let flushed = a.flush();
        assert_eq!(flushed.len(), 2);
        assert!(flushed.iter().all(|e| e.status == EventStatus::End && e.bbox.is_some()));
        assert!(a.flush().is_empty());
    }
}
