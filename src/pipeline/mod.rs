// src/pipeline/mod.rs
//
// Frame-level orchestration: events, the safety index, the evidence gate,
// the telemetry bus and the orchestrator that drives the heads.

pub mod event;
pub mod evidence_gate;
pub mod frame_context;
pub mod metrics;
pub mod orchestrator;
pub mod safety_index;
pub mod telemetry_bus;

pub use event::{EntityId, Event, EventRecord, EventStatus, EventType, Severity};
pub use evidence_gate::EvidenceGate;
pub use frame_context::FrameContext;
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{FrameTelemetry, SafetyPipeline, ViolationStat};
pub use safety_index::SafetyIndex;
pub use telemetry_bus::{BusSnapshot, FlowSample, Health, StabilitySample, SystemStatus, TelemetryBus};
