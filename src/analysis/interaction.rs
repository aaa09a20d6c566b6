// src/analysis/interaction.rs
//
// Illegal curbside boarding: a person lingering next to a stationary vehicle.
//
//   NONE ──contact──▶ POTENTIAL ──persisted ≥ persistence frames──▶ ACTIVE (START)
//     ▲                   │                                           │
//     └──contact lost─────┘            contact lost > grace frames ───┘ (END)
//
// POTENTIAL and ACTIVE live in the same map entry, so a pair is never both.

use crate::config::{InteractionConfig, VideoConfig};
use crate::geometry;
use crate::pipeline::event::{EntityId, Event, EventType};
use crate::types::{BBox, DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

type PairKey = (TrackId, TrackId);

#[derive(Debug, Clone, Copy)]
enum Phase {
    Potential { since_frame: u64 },
    Active { lost_since: Option<u64>, bbox: BBox },
}

pub struct BoardingAnalyzer {
    config: InteractionConfig,
    persistence_frames: u64,
    frame_count: u64,
    pairs: HashMap<PairKey, Phase>,
}

impl BoardingAnalyzer {
    pub fn new(config: InteractionConfig, video: &VideoConfig) -> Self {
        Self {
            persistence_frames: video.frames_for(config.persistence_secs),
            config,
            frame_count: 0,
            pairs: HashMap::new(),
        }
    }

    /// `stationary` comes from the stopped-vehicle analyzer for the same frame.
    pub fn update(&mut self, frame: &DetectionFrame, stationary: &HashSet<TrackId>) -> Vec<Event> {
        self.frame_count += 1;
        let now = self.frame_count;
        let mut events = Vec::new();

        let contacts = self.find_contacts(frame, stationary);

        for (&key, &bbox) in &contacts {
            match self.pairs.get_mut(&key) {
                None => {
                    debug!("Potential boarding: vehicle {} / person {}", key.0, key.1);
                    self.pairs.insert(key, Phase::Potential { since_frame: now });
                }
                Some(phase) => match *phase {
                    Phase::Potential { since_frame } => {
                        if now - since_frame >= self.persistence_frames {
                            *phase = Phase::Active {
                                lost_since: None,
                                bbox,
                            };
                            info!("🚏 Illegal boarding: vehicle {} / person {}", key.0, key.1);
                            events.push(Event::start(
                                EventType::IllegalBoarding,
                                entity(key),
                                Some(bbox),
                                "Person interacting with stopped vehicle",
                            ));
                        }
                    }
                    Phase::Active { .. } => {
                        *phase = Phase::Active {
                            lost_since: None,
                            bbox,
                        };
                    }
                },
            }
        }

        // Pairs not in contact this frame
        let grace = self.config.grace_frames;
        let mut expired: Vec<PairKey> = Vec::new();
        for (key, phase) in self.pairs.iter_mut() {
            if contacts.contains_key(key) {
                continue;
            }
            match phase {
                Phase::Potential { .. } => expired.push(*key),
                Phase::Active { lost_since, bbox } => {
                    let lost = *lost_since.get_or_insert(now);
                    if now - lost > grace {
                        events.push(Event::end(
                            EventType::IllegalBoarding,
                            entity(*key),
                            Some(*bbox),
                            "Interaction ended",
                        ));
                        expired.push(*key);
                    }
                }
            }
        }
        for key in expired {
            self.pairs.remove(&key);
        }

        events
    }

    /// Pairs in contact this frame, with their combined box
    fn find_contacts(&self, frame: &DetectionFrame, stationary: &HashSet<TrackId>) -> HashMap<PairKey, BBox> {
        let mut contacts = HashMap::new();
        if stationary.is_empty() {
            return contacts;
        }

        let vehicles: Vec<(TrackId, BBox)> = frame
            .vehicles()
            .filter(|(id, _)| stationary.contains(id))
            .map(|(id, d)| (id, d.bbox))
            .collect();
        if vehicles.is_empty() {
            return contacts;
        }

        let (w, h) = (frame.width_f32(), frame.height_f32());
        for (person_id, person) in frame.persons() {
            if let Some(roi) = &self.config.restricted_lane {
                if !roi.contains(person.bottom_center(), w, h) {
                    continue;
                }
            }
            for (vehicle_id, vehicle_bbox) in &vehicles {
                if geometry::box_gap(&person.bbox, vehicle_bbox) < self.config.proximity_px {
                    contacts.insert(
                        (*vehicle_id, person_id),
                        geometry::union_box(&person.bbox, vehicle_bbox),
                    );
                }
            }
        }
        contacts
    }

    pub fn flush(&mut self) -> Vec<Event> {
        let mut keys: Vec<PairKey> = self.pairs.keys().copied().collect();
        keys.sort_unstable();

        let mut events = Vec::new();
        for key in keys {
            if let Some(Phase::Active { bbox, .. }) = self.pairs.remove(&key) {
                events.push(Event::end(
                    EventType::IllegalBoarding,
                    entity(key),
                    Some(bbox),
                    "Video ended during interaction",
                ));
            }
        }
        events
    }

    pub fn active_count(&self) -> usize {
        self.pairs
            .values()
            .filter(|p| matches!(p, Phase::Active { .. }))
            .count()
    }
}

fn entity((vehicle, person): PairKey) -> EntityId {
    EntityId::Interaction { vehicle, person }
}
