// src/analysis/jaywalking.rs
//
// Persons standing on the roadway. No debounce: the roadway edge is
// spatially unambiguous, so transitions are immediate set differences.

use crate::config::JaywalkingConfig;
use crate::pipeline::event::{EntityId, Event, EventType};
use crate::types::{BBox, DetectionFrame, TrackId};
use std::collections::HashMap;
use tracing::info;

pub struct JaywalkingAnalyzer {
    config: JaywalkingConfig,
    active: HashMap<TrackId, BBox>,
}

impl JaywalkingAnalyzer {
    pub fn new(config: JaywalkingConfig) -> Self {
        Self {
            config,
            active: HashMap::new(),
        }
    }

    /// Signal-controller override: pedestrians may cross while set
    pub fn set_crosswalk_active(&mut self, active: bool) {
        self.config.crosswalk_active = active;
    }

    pub fn update(&mut self, frame: &DetectionFrame) -> Vec<Event> {
        // Disabled: close anything still open
        if self.config.crosswalk_active {
            return self.flush();
        }
        let Some(roadway) = &self.config.roadway else {
            return self.flush();
        };

        let (w, h) = (frame.width_f32(), frame.height_f32());
        let mut current: HashMap<TrackId, BBox> = HashMap::new();
        for (id, person) in frame.persons() {
            if roadway.contains(person.bottom_center(), w, h) {
                current.insert(id, person.bbox);
            }
        }

        let mut events = Vec::new();
        let mut started: Vec<TrackId> = current
            .keys()
            .filter(|id| !self.active.contains_key(id))
            .copied()
            .collect();
        started.sort_unstable();
        for id in started {
            info!("🚶 Person {} on the roadway", id);
            events.push(Event::start(
                EventType::Jaywalking,
                EntityId::Track(id),
                current.get(&id).copied(),
                "Pedestrian on roadway outside crosswalk",
            ));
        }

        let mut ended: Vec<(TrackId, BBox)> = self
            .active
            .iter()
            .filter(|(id, _)| !current.contains_key(id))
            .map(|(id, bbox)| (*id, *bbox))
            .collect();
        ended.sort_unstable_by_key(|(id, _)| *id);
        for (id, bbox) in ended {
            events.push(Event::end(
                EventType::Jaywalking,
                EntityId::Track(id),
                Some(bbox),
                "Pedestrian left roadway",
            ));
        }

        self.active = current;
        events
    }

    pub fn flush(&mut self) -> Vec<Event> {
        let mut open: Vec<(TrackId, BBox)> = self.active.drain().collect();
        open.sort_unstable_by_key(|(id, _)| *id);
        open.into_iter()
            .map(|(id, bbox)| {
                Event::end(
                    EventType::Jaywalking,
                    EntityId::Track(id),
                    Some(bbox),
                    "Jaywalking check ended",
                )
            })
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
