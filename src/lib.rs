// src/lib.rs
//
// Traffic incident detection over tracked detections.
//
// The caller runs perception (detector + tracker) and hands each frame to
// SafetyPipeline::process_frame(). The pipeline returns per-frame telemetry
// with debounced START/END events, keeps a rolling telemetry bus for other
// readers, and persists evidence for severe events on a background thread.

pub mod analysis;
pub mod config;
pub mod error;
pub mod geometry;
pub mod heads;
pub mod logging;
pub mod notification;
pub mod pipeline;
pub mod storage;
pub mod types;

pub use config::Config;
pub use error::{PipelineError, StoreError};
pub use pipeline::{EntityId, Event, EventRecord, EventStatus, EventType, FrameTelemetry, SafetyPipeline};
pub use storage::{EvidenceStore, MemoryEvidenceStore, SqliteEvidenceStore};
pub use types::{BBox, Detection, DetectionFrame, ObjectClass, TrackId};
