// src/pipeline/safety_index.rs
//
// Aggregate 0–100 safety score. Every violation entity contributes its
// type's base penalty, decayed by decay_rate^elapsed_seconds since the
// entity first appeared. Entries fade out below 1% of their base.

use crate::config::SafetyConfig;
use crate::pipeline::event::{EntityId, Event};
use std::collections::HashMap;
use tracing::debug;

const SAFETY_BASE: f64 = 100.0;
const EXPIRY_FRACTION: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
struct PenaltyEntry {
    base_penalty: f64,
    created_at_ms: f64,
}

pub struct SafetyIndex {
    decay_rate: f64,
    entries: HashMap<EntityId, PenaltyEntry>,
}

impl SafetyIndex {
    pub fn new(config: &SafetyConfig) -> Self {
        Self {
            decay_rate: config.decay_rate,
            entries: HashMap::new(),
        }
    }

    /// Seed a penalty for the event's entity if it has none yet. Later events
    /// for the same entity do not refresh it.
    pub fn record(&mut self, event: &Event, now_ms: f64) {
        self.entries.entry(event.entity_id).or_insert_with(|| PenaltyEntry {
            base_penalty: event.event_type.base_penalty(),
            created_at_ms: now_ms,
        });
    }

    /// Decay all entries to `now_ms`, drop the expired ones, return the index
    pub fn compute(&mut self, now_ms: f64) -> f64 {
        let decay_rate = self.decay_rate;
        let mut total_penalty = 0.0;

        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let elapsed_s = ((now_ms - entry.created_at_ms) / 1000.0).max(0.0);
            let decayed = entry.base_penalty * decay_rate.powf(elapsed_s);
            if decayed < EXPIRY_FRACTION * entry.base_penalty {
                return false;
            }
            total_penalty += decayed;
            true
        });
        if self.entries.len() < before {
            debug!("{} safety penalties expired", before - self.entries.len());
        }

        (SAFETY_BASE - total_penalty).clamp(0.0, SAFETY_BASE)
    }

    pub fn active_penalties(&self) -> usize {
        self.entries.len()
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}
