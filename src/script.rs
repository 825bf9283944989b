use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::engine::{EngineError, ParkingSystem};
use crate::model::*;
use crate::observability::{operation_label, OPERATIONS_TOTAL, OPERATION_DURATION_SECONDS};

/// A scenario file: topology first, then operations applied in order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default)]
    pub zones: Vec<ZoneSpec>,
    /// Symmetric links, added in both directions.
    #[serde(default)]
    pub links: Vec<(ZoneId, ZoneId)>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneSpec {
    pub id: ZoneId,
    /// Shorthand: one area of this many generated slots.
    #[serde(default)]
    pub slots: Option<u32>,
    #[serde(default)]
    pub areas: Vec<AreaSpec>,
    /// One-directional links from this zone.
    #[serde(default)]
    pub adjacent: Vec<ZoneId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaSpec {
    pub id: AreaId,
    pub slots: Vec<SlotId>,
}

/// One call against the system.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateRequest { vehicle: String, zone: ZoneId },
    SubmitRequest { vehicle: String, zone: ZoneId },
    Allocate { vehicle: String },
    Occupy { vehicle: String },
    Release { vehicle: String },
    Cancel { vehicle: String },
    Rollback { count: usize },
    FreeSlot { slot: SlotId },
    ResetPenalty { vehicle: String },
    ZoneUtilization { zone: ZoneId },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub op: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    fn ok(op: &'static str) -> Self {
        Self {
            op,
            ok: true,
            request: None,
            reverted: None,
            utilization: None,
            error_kind: None,
            error: None,
        }
    }

    fn failed(op: &'static str, err: &EngineError) -> Self {
        Self {
            ok: false,
            error_kind: Some(err.kind()),
            error: Some(err.to_string()),
            ..Self::ok(op)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub outcomes: Vec<Outcome>,
    pub zones: Vec<ZoneInfo>,
    pub requests: Vec<RequestInfo>,
    pub history_size: usize,
    pub total_rollbacks: usize,
    pub active_requests: usize,
}

#[derive(Debug)]
pub enum ScriptError {
    Parse(String),
    Topology(EngineError),
}

impl std::fmt::Display for ScriptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptError::Parse(s) => write!(f, "parse error: {s}"),
            ScriptError::Topology(e) => write!(f, "topology error: {e}"),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<EngineError> for ScriptError {
    fn from(e: EngineError) -> Self {
        ScriptError::Topology(e)
    }
}

pub fn parse_scenario(json: &str) -> Result<Scenario, ScriptError> {
    serde_json::from_str(json).map_err(|e| ScriptError::Parse(e.to_string()))
}

/// Install the scenario topology. Zones are created before any link so
/// forward references work.
pub fn build_topology(system: &mut ParkingSystem, scenario: &Scenario) -> Result<(), ScriptError> {
    for zone in &scenario.zones {
        match zone.slots {
            Some(n) => {
                system.create_zone(zone.id, n)?;
            }
            None => system.add_zone(zone.id)?,
        }
        for area in &zone.areas {
            system.add_area(zone.id, area.id)?;
            for slot in &area.slots {
                system.add_slot(zone.id, area.id, *slot)?;
            }
        }
    }
    for zone in &scenario.zones {
        for to in &zone.adjacent {
            system.add_adjacency(zone.id, *to)?;
        }
    }
    for (a, b) in &scenario.links {
        system.link_zones(*a, *b)?;
    }
    Ok(())
}

/// Apply one operation. Failures are reported in the outcome, never raised.
pub fn execute(system: &mut ParkingSystem, op: &Operation) -> Outcome {
    let label = operation_label(op);
    let start = Instant::now();

    let result = match op {
        Operation::CreateRequest { vehicle, zone } => {
            system.create_request(vehicle, *zone).map(|r| with_request(label, r))
        }
        Operation::SubmitRequest { vehicle, zone } => {
            system.submit_request(vehicle, *zone).map(|r| with_request(label, r))
        }
        Operation::Allocate { vehicle } => system
            .allocate_slot_for_request(vehicle)
            .map(|r| with_request(label, r)),
        Operation::Occupy { vehicle } => system.occupy(vehicle).map(|r| with_request(label, r)),
        Operation::Release { vehicle } => system.release(vehicle).map(|r| with_request(label, r)),
        Operation::Cancel { vehicle } => system.cancel(vehicle).map(|r| with_request(label, r)),
        Operation::ResetPenalty { vehicle } => system
            .reset_penalty(vehicle)
            .map(|r| with_request(label, r)),
        Operation::Rollback { count } => system.rollback_operations(*count).map(|cmds| Outcome {
            reverted: Some(cmds.len()),
            ..Outcome::ok(label)
        }),
        Operation::FreeSlot { slot } => system.free_slot(*slot).map(|()| Outcome::ok(label)),
        Operation::ZoneUtilization { zone } => system.zone_utilization(*zone).map(|u| Outcome {
            utilization: Some(u),
            ..Outcome::ok(label)
        }),
    };

    let outcome = result.unwrap_or_else(|e| {
        tracing::debug!(op = label, "operation failed: {e}");
        Outcome::failed(label, &e)
    });
    let status = if outcome.ok { "ok" } else { outcome.error_kind.unwrap_or("error") };
    metrics::counter!(OPERATIONS_TOTAL, "op" => label, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => label)
        .record(start.elapsed().as_secs_f64());
    outcome
}

fn with_request(op: &'static str, request: RequestInfo) -> Outcome {
    Outcome {
        request: Some(request),
        ..Outcome::ok(op)
    }
}

/// Build the topology, run every operation in order, and snapshot the result.
pub fn run(system: &mut ParkingSystem, scenario: &Scenario) -> Result<Report, ScriptError> {
    build_topology(system, scenario)?;
    let outcomes = scenario
        .operations
        .iter()
        .map(|op| execute(system, op))
        .collect();
    Ok(Report {
        outcomes,
        zones: system.zones(),
        requests: system.history_info(),
        history_size: system.history_size(),
        total_rollbacks: system.total_rollbacks_performed(),
        active_requests: system.active_request_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PenaltyConfig;

    #[test]
    fn parse_full_scenario() {
        let json = r#"{
            "zones": [
                {"id": 1, "slots": 2, "adjacent": [2]},
                {"id": 2, "areas": [{"id": 7, "slots": [100, 101]}]}
            ],
            "links": [[2, 1]],
            "operations": [
                {"op": "create_request", "vehicle": "A", "zone": 1},
                {"op": "occupy", "vehicle": "A"},
                {"op": "rollback", "count": 1},
                {"op": "free_slot", "slot": 100},
                {"op": "zone_utilization", "zone": 1}
            ]
        }"#;
        let scenario = parse_scenario(json).unwrap();
        assert_eq!(scenario.zones.len(), 2);
        assert_eq!(scenario.zones[0].slots, Some(2));
        assert_eq!(scenario.zones[1].areas[0].slots, vec![SlotId(100), SlotId(101)]);
        assert_eq!(scenario.links, vec![(ZoneId(2), ZoneId(1))]);
        assert_eq!(
            scenario.operations[0],
            Operation::CreateRequest {
                vehicle: "A".into(),
                zone: ZoneId(1)
            }
        );
        assert_eq!(scenario.operations[2], Operation::Rollback { count: 1 });
    }

    #[test]
    fn unknown_operation_rejected() {
        let err = parse_scenario(r#"{"operations": [{"op": "teleport"}]}"#).unwrap_err();
        assert!(matches!(err, ScriptError::Parse(_)));
    }

    #[test]
    fn bad_topology_is_fatal() {
        let scenario = parse_scenario(r#"{"zones": [{"id": 1, "slots": 1, "adjacent": [5]}]}"#).unwrap();
        let mut system = ParkingSystem::new(PenaltyConfig::default());
        let err = run(&mut system, &scenario).unwrap_err();
        assert!(matches!(err, ScriptError::Topology(EngineError::ZoneNotFound(ZoneId(5)))));
    }

    #[test]
    fn failures_do_not_stop_the_run() {
        let scenario = parse_scenario(
            r#"{
                "zones": [{"id": 1, "slots": 1}],
                "operations": [
                    {"op": "occupy", "vehicle": "ghost"},
                    {"op": "create_request", "vehicle": "A", "zone": 1},
                    {"op": "create_request", "vehicle": "B", "zone": 1},
                    {"op": "rollback", "count": 0},
                    {"op": "zone_utilization", "zone": 1}
                ]
            }"#,
        )
        .unwrap();
        let mut system = ParkingSystem::new(PenaltyConfig::default());
        let report = run(&mut system, &scenario).unwrap();

        let kinds: Vec<Option<&str>> = report.outcomes.iter().map(|o| o.error_kind).collect();
        assert_eq!(
            kinds,
            vec![
                Some("not_found"),
                None,
                Some("capacity_exhausted"),
                Some("invalid_argument"),
                None
            ]
        );
        assert_eq!(report.outcomes[4].utilization, Some(100.0));
        assert_eq!(report.active_requests, 1);
        assert_eq!(report.history_size, 2);
        // The failed request is still in the master history.
        assert_eq!(report.requests.len(), 2);
        assert_eq!(report.requests[1].state, RequestState::Cancelled);
    }

    #[test]
    fn report_serializes() {
        let scenario = parse_scenario(
            r#"{"zones": [{"id": 1, "slots": 1}],
                "operations": [{"op": "create_request", "vehicle": "A", "zone": 1}]}"#,
        )
        .unwrap();
        let mut system = ParkingSystem::new(PenaltyConfig::default());
        let report = run(&mut system, &scenario).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["op"], "create_request");
        assert_eq!(json["outcomes"][0]["request"]["state"], "ALLOCATED");
        assert_eq!(json["outcomes"][0]["request"]["allocated_slot"], 1);
        assert!(json["outcomes"][0].get("error").is_none());
        assert_eq!(json["zones"][0]["available_slots"], 0);
    }
}
