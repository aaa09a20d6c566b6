// src/pipeline/evidence_gate.rs
//
// Decides which START events justify capturing durable evidence. Two
// cooldowns must both pass:
//   - global, per violation type (throttles bursty types)
//   - per (entity, type) (no repeat capture of the same ongoing situation)
// Clocks are frame timestamps, so replayed footage gates deterministically.

use crate::config::EvidenceConfig;
use crate::pipeline::event::{EntityId, EventStatus, EventType};
use std::collections::HashMap;
use tracing::debug;

pub struct EvidenceGate {
    entity_cooldown_ms: f64,
    global_cooldown_ms: f64,
    last_entity_capture: HashMap<(EntityId, EventType), f64>,
    last_global_capture: HashMap<EventType, f64>,
}

impl EvidenceGate {
    pub fn new(config: &EvidenceConfig) -> Self {
        Self {
            entity_cooldown_ms: config.entity_cooldown_secs * 1000.0,
            global_cooldown_ms: config.global_cooldown_secs * 1000.0,
            last_entity_capture: HashMap::new(),
            last_global_capture: HashMap::new(),
        }
    }

    pub fn should_capture(
        &mut self,
        entity: EntityId,
        event_type: EventType,
        status: EventStatus,
        now_ms: f64,
    ) -> bool {
        if status != EventStatus::Start {
            return false;
        }

        if let Some(last) = self.last_global_capture.get(&event_type) {
            if now_ms - last < self.global_cooldown_ms {
                debug!("{} capture throttled by global cooldown", event_type);
                return false;
            }
        }
        if let Some(last) = self.last_entity_capture.get(&(entity, event_type)) {
            if now_ms - last < self.entity_cooldown_ms {
                debug!("{} capture for {} still cooling down", event_type, entity);
                return false;
            }
        }

        self.last_global_capture.insert(event_type, now_ms);
        self.last_entity_capture.insert((entity, event_type), now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.last_entity_capture.clear();
        self.last_global_capture.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> EvidenceGate {
        EvidenceGate::new(&EvidenceConfig::default())
    }

    #[test]
    fn test_end_never_captures() {
        let mut g = gate();
        assert!(!g.should_capture(EntityId::Track(1), EventType::WrongWay, EventStatus::End, 0.0));
    }

    #[test]
    fn test_same_entity_within_cooldown() {
        let mut g = gate();
        let id = EntityId::Track(7);
        let decisions = [
            g.should_capture(id, EventType::StalledVehicle, EventStatus::Start, 0.0),
            g.should_capture(id, EventType::StalledVehicle, EventStatus::Start, 30_000.0),
        ];
        assert_eq!(decisions, [true, false]);
        assert!(g.should_capture(id, EventType::StalledVehicle, EventStatus::Start, 61_000.0));
    }

    #[test]
    fn test_global_cooldown_blocks_other_entities() {
        let mut g = gate();
        assert!(g.should_capture(EntityId::pair(1, 2), EventType::Collision, EventStatus::Start, 0.0));
        assert!(!g.should_capture(EntityId::pair(3, 4), EventType::Collision, EventStatus::Start, 5_000.0));
        assert!(g.should_capture(EntityId::pair(3, 4), EventType::Collision, EventStatus::Start, 10_000.0));
    }

    #[test]
    fn test_rejection_does_not_refresh_clocks() {
        let mut g = gate();
        assert!(g.should_capture(EntityId::Track(1), EventType::WrongWay, EventStatus::Start, 0.0));
        assert!(!g.should_capture(EntityId::Track(2), EventType::WrongWay, EventStatus::Start, 9_000.0));
        // Still measured from the accepted capture at t=0
        assert!(g.should_capture(EntityId::Track(2), EventType::WrongWay, EventStatus::Start, 10_500.0));
    }

    #[test]
    fn test_types_are_independent() {
        let mut g = gate();
        let id = EntityId::Track(1);
        assert!(g.should_capture(id, EventType::WrongWay, EventStatus::Start, 0.0));
        assert!(g.should_capture(id, EventType::StalledVehicle, EventStatus::Start, 0.0));
    }
}
