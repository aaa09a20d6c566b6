// src/analysis/collision.rs
//
// Pairwise vehicle clash detection.
//
// Each unordered vehicle pair keeps a bounded IoU history. A pair clashes
// when its boxes sit on the same ground plane (bottom edges within
// same_plane_ratio × frame_height) and any of:
//   (a) significant overlap that is still growing
//   (b) moderate overlap growing fast
//   (c) centers very close while either vehicle brakes hard
//   (d) centers close with any overlap at all
//
// Distance thresholds scale with frame width.

use crate::analysis::speed_estimator::SpeedEstimator;
use crate::config::CollisionConfig;
use crate::geometry;
use crate::pipeline::event::{EntityId, Event, EventType};
use crate::types::{BBox, DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info};

type PairKey = (TrackId, TrackId);

fn pair_key(a: TrackId, b: TrackId) -> PairKey {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

pub struct CollisionAnalyzer {
    config: CollisionConfig,
    iou_history: HashMap<PairKey, VecDeque<f32>>,
    /// Open clashes with their last combined box
    active: HashMap<PairKey, BBox>,
}

impl CollisionAnalyzer {
    pub fn new(config: CollisionConfig) -> Self {
        Self {
            config,
            iou_history: HashMap::new(),
            active: HashMap::new(),
        }
    }

    pub fn update(&mut self, frame: &DetectionFrame, speeds: &SpeedEstimator) -> Vec<Event> {
        let mut vehicles: Vec<(TrackId, BBox)> = Vec::new();
        let mut seen: HashSet<TrackId> = HashSet::new();
        for (id, det) in frame.vehicles() {
            if seen.insert(id) {
                vehicles.push((id, det.bbox));
            }
        }
        vehicles.sort_unstable_by_key(|(id, _)| *id);

        let tight_distance = self.config.tight_distance_ratio * frame.width_f32();
        let plane_band = self.config.same_plane_ratio * frame.height_f32();

        let mut clashing: HashMap<PairKey, BBox> = HashMap::new();
        let mut observed: HashSet<PairKey> = HashSet::new();

        for (i, &(id_a, box_a)) in vehicles.iter().enumerate() {
            for &(id_b, box_b) in &vehicles[i + 1..] {
                let key = pair_key(id_a, id_b);
                observed.insert(key);

                let iou = geometry::iou(&box_a, &box_b);
                let history = self.iou_history.entry(key).or_default();
                history.push_back(iou);
                if history.len() > self.config.history_len {
                    history.pop_front();
                }
                let trend = iou_trend(history, self.config.trend_lag);

                if (box_a[3] - box_b[3]).abs() >= plane_band {
                    continue;
                }

                let distance = geometry::distance(geometry::center(&box_a), geometry::center(&box_b));

                let significant = iou > self.config.iou_threshold && trend > self.config.iou_trend;
                let moderate = iou > self.config.moderate_iou && trend > self.config.moderate_trend;
                let braking = distance < tight_distance
                    && (self.velocity_drop(speeds, id_a) || self.velocity_drop(speeds, id_b));
                let touching = distance < tight_distance * 1.5 && iou > 0.0;

                if significant || moderate || braking || touching {
                    clashing.insert(key, geometry::union_box(&box_a, &box_b));
                }
            }
        }

        let mut events = Vec::new();

        let mut started: Vec<PairKey> = clashing
            .keys()
            .filter(|k| !self.active.contains_key(k))
            .copied()
            .collect();
        started.sort_unstable();
        for key in started {
            let iou = self
                .iou_history
                .get(&key)
                .and_then(|h| h.back().copied())
                .unwrap_or(0.0);
            info!("💥 Collision: tracks {} and {} (IoU {:.2})", key.0, key.1, iou);
            events.push(Event::start(
                EventType::Collision,
                EntityId::pair(key.0, key.1),
                clashing.get(&key).copied(),
                format!("Vehicles {} and {} collided (IoU {:.2})", key.0, key.1, iou),
            ));
        }

        let mut ended: Vec<(PairKey, BBox)> = self
            .active
            .iter()
            .filter(|(k, _)| !clashing.contains_key(k))
            .map(|(k, b)| (*k, *b))
            .collect();
        ended.sort_unstable_by_key(|(k, _)| *k);
        for (key, last_box) in ended {
            debug!("Collision between {} and {} cleared", key.0, key.1);
            events.push(Event::end(
                EventType::Collision,
                EntityId::pair(key.0, key.1),
                Some(last_box),
                "Vehicles separated",
            ));
        }

        self.active = clashing;
        self.iou_history.retain(|k, _| observed.contains(k));

        events
    }

    /// Hard braking: the newest speed sample fell sharply from one of the
    /// two samples before it.
    fn velocity_drop(&self, speeds: &SpeedEstimator, id: TrackId) -> bool {
        let Some(history) = speeds.speed_history(id) else {
            return false;
        };
        let Some(&latest) = history.back() else {
            return false;
        };
        history
            .iter()
            .rev()
            .skip(1)
            .take(2)
            .any(|&prior| {
                prior - latest > self.config.velocity_drop_kmh
                    || (prior > self.config.velocity_drop_kmh
                        && latest < self.config.velocity_retained_ratio * prior)
            })
    }

    pub fn flush(&mut self) -> Vec<Event> {
        let mut open: Vec<(PairKey, BBox)> = self.active.drain().collect();
        open.sort_unstable_by_key(|(k, _)| *k);
        open.into_iter()
            .map(|(key, bbox)| {
                Event::end(
                    EventType::Collision,
                    EntityId::pair(key.0, key.1),
                    Some(bbox),
                    "Video ended during collision",
                )
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn latest_iou(&self, a: TrackId, b: TrackId) -> Option<f32> {
        self.iou_history
            .get(&pair_key(a, b))
            .and_then(|h| h.back().copied())
    }
}

/// Newest IoU minus the one `lag - 1` entries before it; 0 until enough samples
fn iou_trend(history: &VecDeque<f32>, lag: usize) -> f32 {
    let len = history.len();
    if len < lag {
        return 0.0;
    }
    match (history.back(), history.get(len - lag)) {
        (Some(newest), Some(past)) => newest - past,
        _ => 0.0,
    }
}
