// src/config.rs
//
// YAML configuration tree. Every section defaults, so a partial file (or no
// file at all) yields a working pipeline calibrated for 30 fps / 1280 px.

use crate::error::PipelineError;
use crate::geometry::Polygon;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub video: VideoConfig,
    pub speed: SpeedConfig,
    pub stopped_vehicle: StoppedVehicleConfig,
    pub interaction: InteractionConfig,
    pub lanes: LaneConfig,
    pub jaywalking: JaywalkingConfig,
    pub wrong_way: WrongWayConfig,
    pub collision: CollisionConfig,
    pub counting: CountingConfig,
    pub evidence: EvidenceConfig,
    pub safety: SafetyConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Assumed source frame rate; all second-based thresholds convert through it
    pub fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self { fps: 30.0 }
    }
}

impl VideoConfig {
    /// Whole frames spanned by `secs` at the configured rate
    pub fn frames_for(&self, secs: f64) -> u64 {
        (secs * self.fps).max(0.0) as u64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Calibration at `reference_width`; scaled linearly for other widths
    pub pixels_per_meter: f32,
    pub reference_width: f32,
    pub max_speed_kmh: f32,
    /// Displacements below this are tracker jitter
    pub jitter_px: f32,
    pub history_len: usize,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            pixels_per_meter: 25.0,
            reference_width: 1280.0,
            max_speed_kmh: 150.0,
            jitter_px: 10.0,
            history_len: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoppedVehicleConfig {
    /// Stall rule threshold
    pub time_threshold_secs: f64,
    pub jam_min_vehicles: usize,
    pub jam_after_secs: f64,
    /// Frames the stopped count may stay below jam_min_vehicles before the jam ends
    pub jam_grace_frames: u64,
    pub accident_after_secs: f64,
    /// Potential accident needs strictly more moving vehicles than this
    pub min_moving_vehicles: usize,
    /// Per-frame center movement below `movement_ratio × frame_width` counts as stopped
    pub movement_ratio: f32,
    pub restricted_lane: Option<Polygon>,
}

impl Default for StoppedVehicleConfig {
    fn default() -> Self {
        Self {
            time_threshold_secs: 60.0,
            jam_min_vehicles: 4,
            jam_after_secs: 30.0,
            jam_grace_frames: 10,
            accident_after_secs: 30.0,
            min_moving_vehicles: 2,
            movement_ratio: 0.005,
            restricted_lane: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub proximity_px: f32,
    pub persistence_secs: f64,
    pub grace_frames: u64,
    pub restricted_lane: Option<Polygon>,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            proximity_px: 60.0,
            persistence_secs: 1.5,
            grace_frames: 10,
            restricted_lane: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Allowed lanes; empty disables the check
    pub polygons: Vec<Polygon>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JaywalkingConfig {
    pub roadway: Option<Polygon>,
    pub crosswalk_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WrongWayConfig {
    /// Expected flow direction (normalized on use); None disables the analyzer
    pub expected_flow: Option<[f32; 2]>,
    pub history_len: usize,
    pub min_samples: usize,
    pub min_total_px: f32,
    pub min_recent_px: f32,
    pub min_consistency: f32,
    pub max_alignment: f32,
}

impl Default for WrongWayConfig {
    fn default() -> Self {
        Self {
            expected_flow: None,
            history_len: 30,
            min_samples: 15,
            min_total_px: 30.0,
            min_recent_px: 10.0,
            min_consistency: 0.8,
            max_alignment: -0.75,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Significant overlap (rule a)
    pub iou_threshold: f32,
    pub iou_trend: f32,
    /// Moderate overlap (rule b)
    pub moderate_iou: f32,
    pub moderate_trend: f32,
    pub history_len: usize,
    /// Trend compares the newest IoU against the sample this many entries back (inclusive)
    pub trend_lag: usize,
    pub tight_distance_ratio: f32,
    pub same_plane_ratio: f32,
    pub velocity_drop_kmh: f32,
    /// Latest speed below this fraction of a recent speed counts as a drop
    pub velocity_retained_ratio: f32,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.15,
            iou_trend: 0.01,
            moderate_iou: 0.05,
            moderate_trend: 0.03,
            history_len: 20,
            trend_lag: 3,
            tight_distance_ratio: 0.04,
            same_plane_ratio: 0.25,
            velocity_drop_kmh: 10.0,
            velocity_retained_ratio: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CountingConfig {
    pub line_y_fraction: f32,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            line_y_fraction: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    pub enabled: bool,
    pub entity_cooldown_secs: f64,
    pub global_cooldown_secs: f64,
    pub queue_capacity: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entity_cooldown_secs: 60.0,
            global_cooldown_secs: 10.0,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Fraction of a penalty retained per elapsed second
    pub decay_rate: f64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self { decay_rate: 0.92 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Stability (safety index) history cap
    pub history_length: usize,
    pub flow_history_length: usize,
    pub flow_sample_every_frames: u64,
    pub stability_sample_every_frames: u64,
    pub fps_window: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            history_length: 50,
            flow_history_length: 20,
            flow_sample_every_frames: 30,
            stability_sample_every_frames: 10,
            fps_window: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_yaml(&contents)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |msg: &str| Err(PipelineError::InvalidConfig(msg.to_string()));

        if !(self.video.fps > 0.0) {
            return invalid("video.fps must be positive");
        }
        if !(self.speed.pixels_per_meter > 0.0) || !(self.speed.reference_width > 0.0) {
            return invalid("speed calibration must be positive");
        }
        if !(self.safety.decay_rate > 0.0 && self.safety.decay_rate < 1.0) {
            return invalid("safety.decay_rate must be within (0, 1)");
        }
        if self.speed.history_len == 0
            || self.collision.history_len == 0
            || self.wrong_way.history_len == 0
            || self.telemetry.history_length == 0
            || self.telemetry.flow_history_length == 0
        {
            return invalid("history lengths must be non-zero");
        }
        if self.collision.trend_lag == 0 {
            return invalid("collision.trend_lag must be non-zero");
        }
        if self.wrong_way.min_samples > self.wrong_way.history_len {
            return invalid("wrong_way.min_samples exceeds wrong_way.history_len");
        }
        if self.telemetry.flow_sample_every_frames == 0
            || self.telemetry.stability_sample_every_frames == 0
        {
            return invalid("telemetry sample cadence must be non-zero");
        }
        if let Some([dx, dy]) = self.wrong_way.expected_flow {
            if dx.hypot(dy) <= f32::EPSILON {
                return invalid("wrong_way.expected_flow must not be the zero vector");
            }
        }

        let polygons = self
            .lanes
            .polygons
            .iter()
            .chain(self.stopped_vehicle.restricted_lane.iter())
            .chain(self.interaction.restricted_lane.iter())
            .chain(self.jaywalking.roadway.iter());
        for polygon in polygons {
            if polygon.points.len() < 3 {
                return invalid("polygons need at least 3 points");
            }
        }
        Ok(())
    }
}
