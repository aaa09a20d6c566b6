// src/types.rs
//
// Data contract with the external perception engine. Detections are
// produced fresh every frame by the tracker and are read-only here.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// [x1, y1, x2, y2] in frame pixel space
pub type BBox = [f32; 4];

/// Tracker-assigned identifier, stable across frames while the track lives
pub type TrackId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    Other,
}

impl ObjectClass {
    /// COCO class ids as emitted by YOLO models (2=car, 3=motorcycle, 5=bus, 7=truck)
    pub fn from_coco_id(id: u32) -> Self {
        match id {
            0 => Self::Person,
            1 => Self::Bicycle,
            2 => Self::Car,
            3 => Self::Motorcycle,
            5 => Self::Bus,
            7 => Self::Truck,
            _ => Self::Other,
        }
    }

    pub fn is_vehicle(&self) -> bool {
        matches!(self, Self::Car | Self::Motorcycle | Self::Bus | Self::Truck)
    }

    pub fn is_person(&self) -> bool {
        matches!(self, Self::Person)
    }

    /// Name used in the per-class telemetry breakdown
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Car => "Car",
            Self::Motorcycle => "Motorcycle",
            Self::Bus => "Bus",
            Self::Truck => "Truck",
            Self::Bicycle | Self::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub track_id: Option<TrackId>,
    pub class: ObjectClass,
    pub bbox: BBox,
    pub confidence: f32,
}

impl Detection {
    pub fn center(&self) -> [f32; 2] {
        crate::geometry::center(&self.bbox)
    }

    /// Ground contact point (bottom-center of the box)
    pub fn bottom_center(&self) -> [f32; 2] {
        crate::geometry::bottom_center(&self.bbox)
    }

    pub fn is_vehicle(&self) -> bool {
        self.class.is_vehicle()
    }

    pub fn is_person(&self) -> bool {
        self.class.is_person()
    }

    /// Finite, non-inverted box
    pub fn has_valid_bbox(&self) -> bool {
        self.bbox.iter().all(|v| v.is_finite())
            && self.bbox[2] >= self.bbox[0]
            && self.bbox[3] >= self.bbox[1]
    }

    /// Track id of a tracked vehicle; None for persons, other classes and untracked boxes
    pub fn tracked_vehicle(&self) -> Option<TrackId> {
        if self.is_vehicle() {
            self.track_id
        } else {
            None
        }
    }
}

/// One processing step worth of detections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionFrame {
    pub frame_index: u64,
    /// Wall-clock capture time, milliseconds since the Unix epoch
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    pub detections: Vec<Detection>,
}

impl DetectionFrame {
    pub fn new(
        frame_index: u64,
        timestamp_ms: f64,
        width: u32,
        height: u32,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            width,
            height,
            detections,
        }
    }

    /// Zero-sized frames and non-finite timestamps cannot be analyzed
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(PipelineError::InvalidFrame(format!(
                "frame {} is {}x{}",
                self.frame_index, self.width, self.height
            )));
        }
        if !self.timestamp_ms.is_finite() {
            return Err(PipelineError::InvalidFrame(format!(
                "frame {} has timestamp {}",
                self.frame_index, self.timestamp_ms
            )));
        }
        Ok(())
    }

    pub fn width_f32(&self) -> f32 {
        self.width as f32
    }

    pub fn height_f32(&self) -> f32 {
        self.height as f32
    }

    /// Tracked vehicles with a usable box
    pub fn vehicles(&self) -> impl Iterator<Item = (TrackId, &Detection)> {
        self.detections
            .iter()
            .filter(|d| d.has_valid_bbox())
            .filter_map(|d| d.tracked_vehicle().map(|id| (id, d)))
    }

    /// Tracked persons with a usable box
    pub fn persons(&self) -> impl Iterator<Item = (TrackId, &Detection)> {
        self.detections
            .iter()
            .filter(|d| d.is_person() && d.has_valid_bbox())
            .filter_map(|d| d.track_id.map(|id| (id, d)))
    }
}
