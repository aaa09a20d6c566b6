// src/analysis/wrong_way.rs
//
// Vehicles travelling against the configured flow direction.
//
// A track is judged only after `min_samples` positions. Two checks must both
// pass so turning vehicles are not flagged:
//   1. consistency: overall (oldest→newest) and recent (mid→newest)
//      displacement point the same way
//   2. alignment: overall displacement opposes the expected flow

use crate::config::WrongWayConfig;
use crate::pipeline::event::{EntityId, Event, EventType};
use crate::types::{BBox, DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct TrackHistory {
    positions: VecDeque<[f32; 2]>,
    last_bbox: BBox,
}

pub struct WrongWayAnalyzer {
    config: WrongWayConfig,
    /// Unit vector; None disables the analyzer
    expected: Option<[f32; 2]>,
    histories: HashMap<TrackId, TrackHistory>,
    active: HashMap<TrackId, BBox>,
}

impl WrongWayAnalyzer {
    pub fn new(config: WrongWayConfig) -> Self {
        let expected = config.expected_flow.and_then(normalize);
        Self {
            config,
            expected,
            histories: HashMap::new(),
            active: HashMap::new(),
        }
    }

    pub fn update(&mut self, frame: &DetectionFrame) -> Vec<Event> {
        let Some(expected) = self.expected else {
            return Vec::new();
        };

        let mut present: HashSet<TrackId> = HashSet::new();
        let mut wrong: HashMap<TrackId, BBox> = HashMap::new();

        for (id, det) in frame.vehicles() {
            if !present.insert(id) {
                continue;
            }
            let history = self.histories.entry(id).or_insert_with(|| TrackHistory {
                positions: VecDeque::with_capacity(self.config.history_len),
                last_bbox: det.bbox,
            });
            history.positions.push_back(det.center());
            if history.positions.len() > self.config.history_len {
                history.positions.pop_front();
            }
            history.last_bbox = det.bbox;

            if is_wrong_way(&history.positions, expected, &self.config) {
                wrong.insert(id, det.bbox);
            }
        }

        let mut events = Vec::new();

        let mut started: Vec<TrackId> = wrong
            .keys()
            .filter(|id| !self.active.contains_key(id))
            .copied()
            .collect();
        started.sort_unstable();
        for id in started {
            info!("⛔ Track {} moving against traffic flow", id);
            events.push(Event::start(
                EventType::WrongWay,
                EntityId::Track(id),
                wrong.get(&id).copied(),
                "Vehicle moving against expected traffic flow",
            ));
        }

        let mut ended: Vec<TrackId> = self
            .active
            .keys()
            .filter(|id| !wrong.contains_key(id))
            .copied()
            .collect();
        ended.sort_unstable();
        for id in ended {
            let bbox = self
                .histories
                .get(&id)
                .filter(|_| present.contains(&id))
                .map(|h| h.last_bbox)
                .or_else(|| self.active.get(&id).copied());
            events.push(Event::end(
                EventType::WrongWay,
                EntityId::Track(id),
                bbox,
                "Vehicle no longer moving against flow",
            ));
        }

        self.active = wrong;

        let before = self.histories.len();
        self.histories.retain(|id, _| present.contains(id));
        if self.histories.len() < before {
            debug!("Pruned {} wrong-way histories", before - self.histories.len());
        }

        events
    }

    pub fn flush(&mut self) -> Vec<Event> {
        let mut open: Vec<(TrackId, BBox)> = self.active.drain().collect();
        open.sort_unstable_by_key(|(id, _)| *id);
        open.into_iter()
            .map(|(id, bbox)| {
                Event::end(
                    EventType::WrongWay,
                    EntityId::Track(id),
                    Some(bbox),
                    "Video ended during wrong-way movement",
                )
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

fn is_wrong_way(positions: &VecDeque<[f32; 2]>, expected: [f32; 2], config: &WrongWayConfig) -> bool {
    let len = positions.len();
    if len < config.min_samples || len < 2 {
        return false;
    }
    let (Some(oldest), Some(newest)) = (positions.front(), positions.back()) else {
        return false;
    };
    let mid = positions[len / 2];

    let overall = [newest[0] - oldest[0], newest[1] - oldest[1]];
    let recent = [newest[0] - mid[0], newest[1] - mid[1]];

    let overall_len = overall[0].hypot(overall[1]);
    let recent_len = recent[0].hypot(recent[1]);
    if overall_len <= config.min_total_px || recent_len <= config.min_recent_px {
        return false;
    }

    let overall_dir = [overall[0] / overall_len, overall[1] / overall_len];
    let recent_dir = [recent[0] / recent_len, recent[1] / recent_len];

    let consistency = dot(overall_dir, recent_dir);
    let alignment = dot(overall_dir, expected);

    consistency > config.min_consistency && alignment < config.max_alignment
}

fn dot(a: [f32; 2], b: [f32; 2]) -> f32 {
    a[0] * b[0] + a[1] * b[1]
}

fn normalize(v: [f32; 2]) -> Option<[f32; 2]> {
    let len = v[0].hypot(v[1]);
    (len > f32::EPSILON).then(|| [v[0] / len, v[1] / len])
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn southbound() -> WrongWayConfig {
        WrongWayConfig {
            expected_flow: Some([0.0, 1.0]),
            ..WrongWayConfig::default()
        }
    }

    #[test]
    fn test_with_flow_never_triggers() {
        let mut a = WrongWayAnalyzer::new(southbound());
        for i in 0..60u64 {
            let events = a.update(&frame(i, vec![car(1, 400.0, 50.0 + i as f32 * 5.0)]));
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_against_flow_starts_at_min_samples() {
        let mut a = WrongWayAnalyzer::new(southbound());
        for i in 0..14u64 {
            let events = a.update(&frame(i, vec![car(1, 400.0, 600.0 - i as f32 * 5.0)]));
            assert!(events.is_empty(), "judged too early at sample {}", i + 1);
        }
        let events = a.update(&frame(14, vec![car(1, 400.0, 600.0 - 14.0 * 5.0)]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::Start);

        // Keeps going the wrong way: exactly one START
        for i in 15..40u64 {
            assert!(a.update(&frame(i, vec![car(1, 400.0, 600.0 - i as f32 * 5.0)])).is_empty());
        }
    }

    #[test]
    fn test_expected_flow_is_normalized() {
        let config = WrongWayConfig {
            expected_flow: Some([0.0, 7.0]),
            ..WrongWayConfig::default()
        };
        let mut a = WrongWayAnalyzer::new(config);
        let mut starts = 0;
        for i in 0..20u64 {
            starts += a
                .update(&frame(i, vec![car(1, 400.0, 600.0 - i as f32 * 5.0)]))
                .iter()
                .filter(|e| e.is_start())
                .count();
        }
        assert_eq!(starts, 1);
    }

    #[test]
    fn test_track_loss_ends_with_stored_bbox() {
        let mut a = WrongWayAnalyzer::new(southbound());
        for i in 0..20u64 {
            a.update(&frame(i, vec![car(1, 400.0, 600.0 - i as f32 * 5.0)]));
        }
        let events = a.update(&frame(20, vec![]));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::End);
        assert!(events[0].bbox.is_some());
        assert_eq!(a.active_count(), 0);
    }

    #[test]
    fn test_disabled_without_flow() {
        let mut a = WrongWayAnalyzer::new(WrongWayConfig::default());
        for i in 0..30u64 {
            assert!(a.update(&frame(i, vec![car(1, 400.0, 600.0 - i as f32 * 5.0)])).is_empty());
        }
    }

    #[test]
    fn test_stationary_vehicle_is_not_judged() {
        let mut a = WrongWayAnalyzer::new(southbound());
        for i in 0..40 {
            assert!(a.update(&frame(i, vec![car(1, 400.0, 300.0)])).is_empty());
        }
    }
}
