// src/analysis/speed_estimator.rs
//
// Per-track kinematics from frame-to-frame center displacement.
// Pixels → meters uses a calibration scaled by frame_width / reference_width
// so the same constant works for 720p and 1080p sources.

use crate::config::SpeedConfig;
use crate::types::{DetectionFrame, TrackId};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

const MPS_TO_KMH: f32 = 3.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSpeed {
    pub track_id: TrackId,
    pub speed_kmh: f32,
}

#[derive(Debug, Clone)]
struct TrackKinematics {
    last_position: [f32; 2],
    history: VecDeque<f32>,
}

pub struct SpeedEstimator {
    config: SpeedConfig,
    fps: f32,
    tracks: HashMap<TrackId, TrackKinematics>,
}

impl SpeedEstimator {
    pub fn new(config: SpeedConfig, fps: f64) -> Self {
        Self {
            config,
            fps: fps as f32,
            tracks: HashMap::new(),
        }
    }

    /// Speed samples for every tracked detection that has a previous position.
    /// First sightings produce no sample.
    pub fn update(&mut self, frame: &DetectionFrame) -> Vec<TrackSpeed> {
        let scale = frame.width_f32() / self.config.reference_width;
        let ppm = self.config.pixels_per_meter * scale;
        let mut samples = Vec::new();
        let mut seen: HashSet<TrackId> = HashSet::new();

        for det in frame.detections.iter().filter(|d| d.has_valid_bbox()) {
            let Some(id) = det.track_id else { continue };
            if !seen.insert(id) {
                continue;
            }
            let center = det.center();

            let Some(track) = self.tracks.get_mut(&id) else {
                self.tracks.insert(
                    id,
                    TrackKinematics {
                        last_position: center,
                        history: VecDeque::with_capacity(self.config.history_len),
                    },
                );
                continue;
            };

            let dist_px = crate::geometry::distance(center, track.last_position);

            // Jitter on a parked object: report zero, keep the anchor and the history
            if dist_px < self.config.jitter_px {
                samples.push(TrackSpeed {
                    track_id: id,
                    speed_kmh: 0.0,
                });
                continue;
            }

            let speed_mps = dist_px / ppm * self.fps;
            let speed_kmh = (speed_mps * MPS_TO_KMH).min(self.config.max_speed_kmh);

            track.history.push_back(speed_kmh);
            if track.history.len() > self.config.history_len {
                track.history.pop_front();
            }
            track.last_position = center;

            samples.push(TrackSpeed {
                track_id: id,
                speed_kmh,
            });
        }

        let before = self.tracks.len();
        self.tracks.retain(|id, _| seen.contains(id));
        if self.tracks.len() < before {
            debug!("Pruned {} lost track(s) from speed history", before - self.tracks.len());
        }

        samples
    }

    /// Oldest → newest, at most `history_len` samples
    pub fn speed_history(&self, id: TrackId) -> Option<&VecDeque<f32>> {
        self.tracks.get(&id).map(|t| &t.history)
    }

    pub fn tracked_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }
}
