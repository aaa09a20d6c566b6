// src/analysis/mod.rs
//
// Per-entity analyzers and the shared speed service.
//
// Signal flow per frame:
//   DetectionFrame → speed_estimator ─────────────────────────┐
//                  → stopped_vehicle ── stationary ids ──▶ interaction
//                  → lane_violation / jaywalking / wrong_way  │
//                  → collision ◀── speed history ─────────────┘
//                  → vehicle_counter
//
// Each analyzer owns its entity-keyed state and emits edge-triggered
// START/END events. Grouped into domains by crate::heads.

pub mod collision;
pub mod interaction;
pub mod jaywalking;
pub mod lane_violation;
pub mod speed_estimator;
pub mod stopped_vehicle;
pub mod vehicle_counter;
pub mod wrong_way;

pub use collision::CollisionAnalyzer;
pub use interaction::BoardingAnalyzer;
pub use jaywalking::JaywalkingAnalyzer;
pub use lane_violation::LaneViolationAnalyzer;
pub use speed_estimator::{SpeedEstimator, TrackSpeed};
pub use stopped_vehicle::{StoppedVehicleAnalyzer, StoppedVehicleOutput};
pub use vehicle_counter::VehicleCounter;
pub use wrong_way::WrongWayAnalyzer;
