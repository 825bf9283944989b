use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::script::Operation;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: scenario operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "parksim_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "parksim_operation_duration_seconds";

/// Counter: parking requests submitted. Labels: outcome.
pub const REQUESTS_TOTAL: &str = "parksim_requests_total";

// ── Allocation / lifecycle ──────────────────────────────────────

/// Counter: successful allocations. Labels: route (home, adjacent).
pub const ALLOCATIONS_TOTAL: &str = "parksim_allocations_total";

/// Counter: penalties charged. Labels: kind (cross_zone, cancellation).
pub const PENALTY_TOTAL: &str = "parksim_penalty_total";

/// Counter: lifecycle transitions refused by the state table.
pub const TRANSITIONS_REJECTED_TOTAL: &str = "parksim_transitions_rejected_total";

/// Counter: commands undone by rollback.
pub const ROLLBACKS_TOTAL: &str = "parksim_rollbacks_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: available slots per zone. Labels: zone.
pub const ZONE_AVAILABLE_SLOTS: &str = "parksim_zone_available_slots";

/// Gauge: requests in the active index.
pub const ACTIVE_REQUESTS: &str = "parksim_active_requests";

/// Install the Prometheus recorder. Returns `None` when metrics are disabled
/// or another recorder is already installed.
pub fn init(enabled: bool) -> Option<PrometheusHandle> {
    if !enabled {
        return None;
    }
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("metrics recorder not installed: {e}");
            None
        }
    }
}

/// Map an Operation variant to a short label for metrics.
pub fn operation_label(op: &Operation) -> &'static str {
    match op {
        Operation::CreateRequest { .. } => "create_request",
        Operation::SubmitRequest { .. } => "submit_request",
        Operation::Allocate { .. } => "allocate",
        Operation::Occupy { .. } => "occupy",
        Operation::Release { .. } => "release",
        Operation::Cancel { .. } => "cancel",
        Operation::Rollback { .. } => "rollback",
        Operation::FreeSlot { .. } => "free_slot",
        Operation::ResetPenalty { .. } => "reset_penalty",
        Operation::ZoneUtilization { .. } => "zone_utilization",
    }
}
