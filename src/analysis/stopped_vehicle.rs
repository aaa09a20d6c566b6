// src/analysis/stopped_vehicle.rs
//
// Stopped / stalled / jammed vehicle detection.
//
// One shared per-track counter of consecutive "stopped" frames (center moved
// less than movement_ratio × frame_width) feeds three rules:
//   - Traffic jam:        ≥N vehicles stopped at once, reported when any of
//                         them reaches the jam frame count. One open jam at a
//                         time; it ends once the stopped count has stayed below
//                         N for more than jam_grace_frames (tracker flicker).
//   - Potential accident: a vehicle stopped past the accident frame count while
//                         more than min_moving_vehicles others are moving.
//   - Stalled vehicle:    stopped past the stall threshold, optionally inside a
//                         restricted lane. Ends when the track is lost.
//
// The set of currently stationary ids is handed to the boarding analyzer.

use crate::config::{StoppedVehicleConfig, VideoConfig};
use crate::pipeline::event::{EntityId, Event, EventType};
use crate::types::{BBox, DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

const JAM_ENTITY: EntityId = EntityId::Scene("JAM_01");

#[derive(Debug, Clone)]
struct StopState {
    last_center: [f32; 2],
    last_bbox: BBox,
    stopped_frames: u64,
    accident_active: bool,
}

#[derive(Debug, Default)]
pub struct StoppedVehicleOutput {
    pub events: Vec<Event>,
    /// Tracks that did not move this frame
    pub stationary: HashSet<TrackId>,
}

pub struct StoppedVehicleAnalyzer {
    config: StoppedVehicleConfig,
    jam_frames: u64,
    accident_frames: u64,
    stall_frames: u64,
    vehicles: HashMap<TrackId, StopState>,
    stalled: HashSet<TrackId>,
    jam_active: bool,
    /// Consecutive frames an open jam has had fewer than N stopped vehicles
    jam_thin_frames: u64,
}

impl StoppedVehicleAnalyzer {
    pub fn new(config: StoppedVehicleConfig, video: &VideoConfig) -> Self {
        Self {
            jam_frames: video.frames_for(config.jam_after_secs),
            accident_frames: video.frames_for(config.accident_after_secs),
            stall_frames: video.frames_for(config.time_threshold_secs),
            config,
            vehicles: HashMap::new(),
            stalled: HashSet::new(),
            jam_active: false,
            jam_thin_frames: 0,
        }
    }

    pub fn update(&mut self, frame: &DetectionFrame) -> StoppedVehicleOutput {
        let mut out = StoppedVehicleOutput::default();
        let movement_threshold = frame.width_f32() * self.config.movement_ratio;
        let mut present: HashSet<TrackId> = HashSet::new();
        let mut moving_count = 0usize;

        for (id, det) in frame.vehicles() {
            if !present.insert(id) {
                continue;
            }
            let center = det.center();

            let Some(state) = self.vehicles.get_mut(&id) else {
                self.vehicles.insert(
                    id,
                    StopState {
                        last_center: center,
                        last_bbox: det.bbox,
                        stopped_frames: 0,
                        accident_active: false,
                    },
                );
                continue;
            };

            let movement = crate::geometry::distance(center, state.last_center);
            if movement < movement_threshold {
                state.stopped_frames += 1;
                out.stationary.insert(id);
            } else {
                moving_count += 1;
                state.stopped_frames = 0;
                if state.accident_active {
                    state.accident_active = false;
                    out.events.push(Event::end(
                        EventType::PotentialAccident,
                        EntityId::Track(id),
                        Some(det.bbox),
                        "Resumed motion",
                    ));
                }
            }
            state.last_center = center;
            state.last_bbox = det.bbox;
        }

        self.check_jam(frame, &out.stationary, &mut out.events);
        self.check_accidents(moving_count, &out.stationary, &mut out.events);
        self.check_stalls(frame, &out.stationary, &mut out.events);
        self.cleanup(&present, &mut out.events);

        out
    }

    fn check_jam(&mut self, frame: &DetectionFrame, stationary: &HashSet<TrackId>, events: &mut Vec<Event>) {
        let full_frame = Some([0.0, 0.0, frame.width_f32(), frame.height_f32()]);

        if stationary.len() < self.config.jam_min_vehicles {
            if !self.jam_active {
                return;
            }
            self.jam_thin_frames += 1;
            if self.jam_thin_frames > self.config.jam_grace_frames {
                self.jam_active = false;
                self.jam_thin_frames = 0;
                events.push(Event::end(
                    EventType::TrafficJam,
                    JAM_ENTITY,
                    full_frame,
                    format!("Traffic jam cleared: {} vehicles stopped.", stationary.len()),
                ));
            }
            return;
        }
        self.jam_thin_frames = 0;

        let jammed = stationary.iter().any(|id| {
            self.vehicles
                .get(id)
                .is_some_and(|s| s.stopped_frames >= self.jam_frames)
        });

        if jammed && !self.jam_active {
            self.jam_active = true;
            info!("🚦 Traffic jam: {} vehicles stopped", stationary.len());
            events.push(Event::start(
                EventType::TrafficJam,
                JAM_ENTITY,
                full_frame,
                format!("Traffic jam detected: {} vehicles stopped.", stationary.len()),
            ));
        }
    }

    fn check_accidents(&mut self, moving_count: usize, stationary: &HashSet<TrackId>, events: &mut Vec<Event>) {
        if moving_count <= self.config.min_moving_vehicles {
            return;
        }
        for id in stationary {
            let Some(state) = self.vehicles.get_mut(id) else { continue };
            if state.stopped_frames > self.accident_frames && !state.accident_active {
                state.accident_active = true;
                info!("⚠️  Track {} stopped while {} vehicles keep moving", id, moving_count);
                events.push(Event::start(
                    EventType::PotentialAccident,
                    EntityId::Track(*id),
                    Some(state.last_bbox),
                    "Vehicle stopped while surrounding traffic is moving",
                ));
            }
        }
    }

    fn check_stalls(&mut self, frame: &DetectionFrame, stationary: &HashSet<TrackId>, events: &mut Vec<Event>) {
        for id in stationary {
            if self.stalled.contains(id) {
                continue;
            }
            let Some(state) = self.vehicles.get(id) else { continue };
            if state.stopped_frames < self.stall_frames {
                continue;
            }

            let in_lane = self.config.restricted_lane.as_ref().map_or(true, |roi| {
                roi.contains(state.last_center, frame.width_f32(), frame.height_f32())
            });
            if !in_lane {
                continue;
            }

            self.stalled.insert(*id);
            info!("🛑 Track {} stalled for {} frames", id, state.stopped_frames);
            events.push(Event::start(
                EventType::StalledVehicle,
                EntityId::Track(*id),
                Some(state.last_bbox),
                format!(
                    "Vehicle stalled in active lane for > {} seconds",
                    self.config.time_threshold_secs
                ),
            ));
        }
    }

    fn cleanup(&mut self, present: &HashSet<TrackId>, events: &mut Vec<Event>) {
        let lost: Vec<TrackId> = self
            .vehicles
            .keys()
            .filter(|id| !present.contains(id))
            .copied()
            .collect();

        for id in lost {
            let Some(state) = self.vehicles.remove(&id) else { continue };
            if state.accident_active {
                events.push(Event::end(
                    EventType::PotentialAccident,
                    EntityId::Track(id),
                    Some(state.last_bbox),
                    "Resumed motion or track lost",
                ));
            }
            if self.stalled.remove(&id) {
                events.push(Event::end(
                    EventType::StalledVehicle,
                    EntityId::Track(id),
                    Some(state.last_bbox),
                    "Stalled vehicle cleared",
                ));
            }
            debug!("Track {} left stopped-vehicle tracking", id);
        }
    }

    /// END for every open violation; called at stream termination.
    pub fn flush(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        let mut ids: Vec<TrackId> = self.vehicles.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(state) = self.vehicles.get_mut(&id) else { continue };
            if state.accident_active {
                state.accident_active = false;
                events.push(Event::end(
                    EventType::PotentialAccident,
                    EntityId::Track(id),
                    Some(state.last_bbox),
                    "Video ended while vehicle was still stopped",
                ));
            }
            if self.stalled.remove(&id) {
                events.push(Event::end(
                    EventType::StalledVehicle,
                    EntityId::Track(id),
                    Some(state.last_bbox),
                    "Video ended while vehicle was still stalled",
                ));
            }
        }
        if self.jam_active {
            self.jam_active = false;
            self.jam_thin_frames = 0;
            events.push(Event::end(EventType::TrafficJam, JAM_ENTITY, None, "Video ended during traffic jam"));
        }
        events
    }

    /// Open violations (accidents, stalls, jam)
    pub fn active_count(&self) -> usize {
        self.vehicles.values().filter(|s| s.accident_active).count()
            + self.stalled.len()
            + usize::from(self.jam_active)
    }
}
