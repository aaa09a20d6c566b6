// src/analysis/vehicle_counter.rs
//
// Counting line across the frame at line_y_fraction × height. A vehicle is
// counted once when its center crosses the line moving down the image.

use crate::config::CountingConfig;
use crate::types::{DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet};

pub struct VehicleCounter {
    config: CountingConfig,
    last_y: HashMap<TrackId, f32>,
    counted: HashSet<TrackId>,
    total: u64,
}

impl VehicleCounter {
    pub fn new(config: CountingConfig) -> Self {
        Self {
            config,
            last_y: HashMap::new(),
            counted: HashSet::new(),
            total: 0,
        }
    }

    /// Returns the cumulative count after this frame
    pub fn update(&mut self, frame: &DetectionFrame) -> u64 {
        let line_y = frame.height_f32() * self.config.line_y_fraction;
        let mut present: HashSet<TrackId> = HashSet::new();

        for (id, det) in frame.vehicles() {
            if !present.insert(id) {
                continue;
            }
            let y = det.center()[1];
            if let Some(prev) = self.last_y.insert(id, y) {
                if prev < line_y && y >= line_y && self.counted.insert(id) {
                    self.total += 1;
                }
            }
        }

        self.last_y.retain(|id, _| present.contains(id));
        self.counted.retain(|id| present.contains(id));
        self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
