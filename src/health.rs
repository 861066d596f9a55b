//! The diagnostics surface spec §6's `GET /health` describes, exposed
//! as a plain library-level snapshot so a host's own route adapter has
//! something real to serialize instead of reimplementing circuit/cache
//! introspection itself.

use std::collections::HashMap;

use serde::Serialize;

use crate::resilience::CircuitState;
use crate::types::RegistryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub l1_size: usize,
    pub l2_available: bool,
    pub l3_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: EngineStatus,
    pub circuits: HashMap<RegistryId, &'static str>,
    pub cache: CacheSnapshot,
}

impl HealthSnapshot {
    pub fn new(circuit_states: HashMap<RegistryId, CircuitState>, cache: CacheSnapshot) -> Self {
        let circuits: HashMap<RegistryId, &'static str> =
            circuit_states.iter().map(|(id, s)| (*id, circuit_label(*s))).collect();

        let open_count = circuit_states.values().filter(|s| **s == CircuitState::Open).count();
        let status = if open_count == 0 && cache.l3_available {
            EngineStatus::Healthy
        } else if open_count < circuit_states.len() {
            EngineStatus::Degraded
        } else {
            EngineStatus::Unhealthy
        };

        HealthSnapshot { status, circuits, cache }
    }

    /// Renders the same table shape the teacher's CLI health check uses,
    /// for the demo harness's human-facing `health` command.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("# Ingredient Intelligence Engine — health\n\n");
        out.push_str(&format!("overall status: {:?}\n\n", self.status));
        out.push_str("| Registry | Circuit |\n");
        out.push_str("|----------|---------|\n");
        let mut rows: Vec<(&RegistryId, &&str)> = self.circuits.iter().collect();
        rows.sort_by_key(|(id, _)| id.as_str());
        for (id, state) in rows {
            out.push_str(&format!("| {id} | {state} |\n"));
        }
        out.push_str(&format!(
            "\ncache: l1_size={} l2_available={} l3_available={}\n",
            self.cache.l1_size, self.cache.l2_available, self.cache.l3_available
        ));
        out
    }
}

fn circuit_label(state: CircuitState) -> &'static str {
    match state {
        CircuitState::Closed => "closed",
        CircuitState::Open => "open",
        CircuitState::HalfOpen => "half_open",
    }
}
