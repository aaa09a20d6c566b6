// src/pipeline/telemetry_bus.rs
//
// Shared aggregator between the frame loop (writer) and telemetry readers
// (status endpoints, streaming channels). One mutex guards the whole state;
// every read hands back an owned copy, never a reference into the live data.

use crate::config::TelemetryConfig;
use crate::heads::CrowdPoint;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Optimal,
    Warning,
    Critical,
    Error,
}

impl Health {
    pub fn from_safety_index(index: f64) -> Self {
        if index > 80.0 {
            Self::Optimal
        } else if index > 60.0 {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub fps: f64,
    pub latency_ms: f64,
    pub health: Health,
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self {
            fps: 0.0,
            latency_ms: 0.0,
            health: Health::Optimal,
        }
    }
}

/// Line-count sample, one per flow cadence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSample {
    /// HH:MM:SS of the frame that produced it
    pub time: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StabilitySample {
    pub frame: u64,
    pub stability: f64,
}

/// Point-in-time copy of the bus
#[derive(Debug, Clone, Serialize)]
pub struct BusSnapshot {
    pub system_status: SystemStatus,
    pub flow_history: Vec<FlowSample>,
    pub stability_history: Vec<StabilitySample>,
    pub crowd_density: Vec<CrowdPoint>,
    pub stability_score: f64,
}

#[derive(Debug)]
struct BusState {
    system_status: SystemStatus,
    flow_history: VecDeque<FlowSample>,
    stability_history: VecDeque<StabilitySample>,
    crowd_density: Vec<CrowdPoint>,
    stability_score: f64,
}

impl BusState {
    fn new(config: &TelemetryConfig) -> Self {
        Self {
            system_status: SystemStatus::default(),
            flow_history: VecDeque::with_capacity(config.flow_history_length),
            stability_history: VecDeque::with_capacity(config.history_length),
            crowd_density: Vec::new(),
            stability_score: 100.0,
        }
    }
}

pub struct TelemetryBus {
    state: Mutex<BusState>,
    flow_capacity: usize,
    stability_capacity: usize,
}

impl TelemetryBus {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            state: Mutex::new(BusState::new(config)),
            flow_capacity: config.flow_history_length,
            stability_capacity: config.history_length,
        }
    }

    /// Writers only store plain values, so a panic mid-update cannot leave
    /// the state half-built; recover the guard instead of propagating.
    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_flow(&self, sample: FlowSample) {
        let mut state = self.lock();
        if state.flow_history.len() >= self.flow_capacity {
            state.flow_history.pop_front();
        }
        state.flow_history.push_back(sample);
    }

    pub fn push_stability(&self, sample: StabilitySample) {
        let mut state = self.lock();
        if state.stability_history.len() >= self.stability_capacity {
            state.stability_history.pop_front();
        }
        state.stability_score = sample.stability;
        state.stability_history.push_back(sample);
    }

    pub fn set_system_status(&self, status: SystemStatus) {
        self.lock().system_status = status;
    }

    pub fn set_crowd_density(&self, points: Vec<CrowdPoint>) {
        self.lock().crowd_density = points;
    }

    pub fn snapshot(&self) -> BusSnapshot {
        let state = self.lock();
        BusSnapshot {
            system_status: state.system_status.clone(),
            flow_history: state.flow_history.iter().cloned().collect(),
            stability_history: state.stability_history.iter().cloned().collect(),
            crowd_density: state.crowd_density.clone(),
            stability_score: state.stability_score,
        }
    }

    pub fn flow_history(&self) -> Vec<FlowSample> {
        self.lock().flow_history.iter().cloned().collect()
    }

    pub fn stability_history(&self) -> Vec<StabilitySample> {
        self.lock().stability_history.iter().cloned().collect()
    }

    /// Clear in place; readers holding the Arc keep a valid handle
    pub fn reset(&self) {
        let mut state = self.lock();
        state.system_status = SystemStatus::default();
        state.flow_history.clear();
        state.stability_history.clear();
        state.crowd_density.clear();
        state.stability_score = 100.0;
        debug!("Telemetry bus cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn bus() -> TelemetryBus {
        TelemetryBus::new(&TelemetryConfig::default())
    }

    #[test]
    fn test_histories_are_bounded() {
        let bus = bus();
        for i in 0..100u64 {
            bus.push_flow(FlowSample {
                time: format!("00:00:{:02}", i % 60),
                value: i,
            });
            bus.push_stability(StabilitySample {
                frame: i,
                stability: 100.0,
            });
        }
        let snap = bus.snapshot();
        assert_eq!(snap.flow_history.len(), 20);
        assert_eq!(snap.flow_history[0].value, 80);
        assert_eq!(snap.stability_history.len(), 50);
        assert_eq!(snap.stability_history.last().unwrap().frame, 99);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let bus = bus();
        bus.push_stability(StabilitySample {
            frame: 1,
            stability: 70.0,
        });
        let snap = bus.snapshot();
        bus.push_stability(StabilitySample {
            frame: 2,
            stability: 40.0,
        });
        assert_eq!(snap.stability_history.len(), 1);
        assert_eq!(snap.stability_score, 70.0);
        assert_eq!(bus.snapshot().stability_score, 40.0);
    }

    #[test]
    fn test_concurrent_readers_see_consistent_state() {
        let bus = Arc::new(bus());
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let bus = Arc::clone(&bus);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let snap = bus.snapshot();
                        assert!(snap.stability_history.len() <= 50);
                        assert!(snap.flow_history.len() <= 20);
                    }
                })
            })
            .collect();

        for i in 0..500u64 {
            bus.push_stability(StabilitySample {
                frame: i,
                stability: 90.0,
            });
            bus.push_flow(FlowSample {
                time: "12:00:00".into(),
                value: i,
            });
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(bus.stability_history().len(), 50);
    }

    #[test]
    fn test_reset_clears_in_place() {
        let bus = bus();
        bus.push_flow(FlowSample {
            time: "12:00:00".into(),
            value: 3,
        });
        bus.set_system_status(SystemStatus {
            fps: 25.0,
            latency_ms: 40.0,
            health: Health::Warning,
        });
        bus.reset();
        let snap = bus.snapshot();
        assert!(snap.flow_history.is_empty());
        assert_eq!(snap.system_status.health, Health::Optimal);
    }

    #[test]
    fn test_health_bands() {
        assert_eq!(Health::from_safety_index(95.0), Health::Optimal);
        assert_eq!(Health::from_safety_index(80.0), Health::Warning);
        assert_eq!(Health::from_safety_index(61.0), Health::Warning);
        assert_eq!(Health::from_safety_index(60.0), Health::Critical);
    }
}
