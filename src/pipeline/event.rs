// src/pipeline/event.rs
//
// Violation events. Analyzers emit edge-triggered START/END pairs keyed by a
// typed entity id; the orchestrator serializes them into EventRecords for
// telemetry consumers.

use crate::types::{BBox, TrackId};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Collision,
    PotentialAccident,
    TrafficJam,
    StalledVehicle,
    LaneViolation,
    Jaywalking,
    WrongWay,
    IllegalBoarding,
    // Produced by external rule engines; carried for the safety penalty table.
    TrafficViolation,
    RedLight,
    Speeding,
    NoHelmet,
    WrongLane,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collision => "collision",
            Self::PotentialAccident => "potential_accident",
            Self::TrafficJam => "traffic_jam",
            Self::StalledVehicle => "stalled_vehicle",
            Self::LaneViolation => "lane_violation",
            Self::Jaywalking => "jaywalking",
            Self::WrongWay => "wrong_way",
            Self::IllegalBoarding => "illegal_boarding",
            Self::TrafficViolation => "traffic_violation",
            Self::RedLight => "red_light",
            Self::Speeding => "speeding",
            Self::NoHelmet => "no_helmet",
            Self::WrongLane => "wrong_lane",
        }
    }

    /// Title-cased label used in violation statistics ("Wrong Way")
    pub fn label(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Safety index penalty seeded when the entity first appears
    pub fn base_penalty(&self) -> f64 {
        match self {
            Self::Collision => 50.0,
            Self::WrongWay => 30.0,
            Self::RedLight => 25.0,
            Self::TrafficViolation => 20.0,
            Self::Speeding => 18.0,
            Self::NoHelmet => 15.0,
            Self::IllegalBoarding => 15.0,
            Self::WrongLane => 12.0,
            Self::StalledVehicle => 10.0,
            _ => 15.0,
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            Self::Collision | Self::PotentialAccident => Severity::Critical,
            Self::TrafficJam => Severity::Info,
            _ => Severity::Warning,
        }
    }

    /// Types severe enough to justify durable evidence
    pub fn is_evidence_worthy(&self) -> bool {
        matches!(
            self,
            Self::Collision
                | Self::TrafficViolation
                | Self::PotentialAccident
                | Self::WrongWay
                | Self::IllegalBoarding
                | Self::StalledVehicle
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    Start,
    End,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::End => "END",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

// ============================================================================
// ENTITY IDS
// ============================================================================

/// What a violation is about: one track, a canonical (sorted) track pair, a
/// role-ordered vehicle/person interaction, or a scene-wide condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Track(TrackId),
    Pair(TrackId, TrackId),
    Interaction { vehicle: TrackId, person: TrackId },
    Scene(&'static str),
}

impl EntityId {
    /// Order-independent pair key: pair(a, b) == pair(b, a)
    pub fn pair(a: TrackId, b: TrackId) -> Self {
        if a <= b {
            Self::Pair(a, b)
        } else {
            Self::Pair(b, a)
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Track(id) => write!(f, "id_{}", id),
            Self::Pair(a, b) => write!(f, "id_{}_id_{}", a, b),
            Self::Interaction { vehicle, person } => write!(f, "id_{}_id_{}", vehicle, person),
            Self::Scene(name) => write!(f, "{}", name),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// EVENTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub event_type: EventType,
    pub status: EventStatus,
    pub entity_id: EntityId,
    /// Last observed box for the entity; None only when the analyzer never saw one
    pub bbox: Option<BBox>,
    pub details: String,
    pub severity: Severity,
}

impl Event {
    pub fn start(
        event_type: EventType,
        entity_id: EntityId,
        bbox: Option<BBox>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            status: EventStatus::Start,
            entity_id,
            bbox,
            details: details.into(),
            severity: event_type.default_severity(),
        }
    }

    pub fn end(
        event_type: EventType,
        entity_id: EntityId,
        bbox: Option<BBox>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            status: EventStatus::End,
            entity_id,
            bbox,
            details: details.into(),
            severity: event_type.default_severity(),
        }
    }

    pub fn is_start(&self) -> bool {
        self.status == EventStatus::Start
    }
}

/// Serialized event handed to telemetry consumers
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub event_type: EventType,
    pub entity_id: String,
    pub frame_number: u64,
    pub timestamp: DateTime<Utc>,
    pub status: EventStatus,
    pub bbox: Option<BBox>,
    pub details: String,
    pub severity: Severity,
    pub snapshot_triggered: bool,
}

impl EventRecord {
    pub fn from_event(event: &Event, frame_number: u64, timestamp_ms: f64) -> Self {
        let timestamp = DateTime::from_timestamp_millis(timestamp_ms as i64).unwrap_or_else(Utc::now);
        Self {
            event_id: Uuid::new_v4(),
            event_type: event.event_type,
            entity_id: event.entity_id.to_string(),
            frame_number,
            timestamp,
            status: event.status,
            bbox: event.bbox,
            details: event.details.clone(),
            severity: event.severity,
            snapshot_triggered: false,
        }
    }
}
