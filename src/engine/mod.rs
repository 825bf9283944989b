mod allocation;
mod error;
mod lifecycle;
mod mutations;
mod pool;
mod queries;
mod rollback;

pub use allocation::{Allocation, AllocationEngine, Route};
pub use error::EngineError;
pub use pool::SlotPool;
pub use rollback::RollbackManager;

use std::collections::HashMap;

use crate::config::{Config, PenaltyConfig};
use crate::model::*;

/// Orchestrator: owns the slot pool (through the allocation engine), the
/// rollback log, the append-only master history and the active-request index.
///
/// Every public operation runs to completion before the next one starts; the
/// struct is the single owner of all mutable state and takes `&mut self`.
#[derive(Debug, Default)]
pub struct ParkingSystem {
    pub(super) allocator: AllocationEngine,
    pub(super) rollback: RollbackManager,
    /// Every request ever created, in creation order. Indexed by `RequestKey`.
    pub(super) history: Vec<ParkingRequest>,
    /// vehicle id → its non-terminal request
    pub(super) active: HashMap<String, RequestKey>,
}

impl ParkingSystem {
    pub fn new(penalties: PenaltyConfig) -> Self {
        Self {
            allocator: AllocationEngine::new(penalties),
            rollback: RollbackManager::new(),
            history: Vec::new(),
            active: HashMap::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.penalties)
    }

    pub fn engine(&self) -> &AllocationEngine {
        &self.allocator
    }

    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Active request for a vehicle, or `VehicleNotFound`.
    pub(super) fn resolve_active(&self, vehicle_id: &str) -> Result<RequestKey, EngineError> {
        self.active
            .get(vehicle_id)
            .copied()
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// Zone owning a slot key, if it resolves.
    pub(super) fn slot_zone(&self, slot: Option<SlotKey>) -> Option<ZoneId> {
        slot.and_then(|k| self.allocator.pool().slot(k))
            .map(|s| s.zone_id)
    }

    pub(super) fn request_info(&self, key: RequestKey) -> Option<RequestInfo> {
        let req = self.history.get(key.0)?;
        let slot = req.allocated_slot.and_then(|k| self.allocator.pool().slot(k));
        Some(RequestInfo {
            ticket: req.ticket,
            vehicle_id: req.vehicle_id.clone(),
            requested_zone: req.requested_zone,
            allocated_slot: slot.map(|s| s.id),
            allocated_zone: slot.map(|s| s.zone_id),
            state: req.state(),
            penalty_cost: req.penalty_cost(),
            created_at: req.created_at(),
        })
    }

    pub(super) fn publish_active_gauge(&self) {
        metrics::gauge!(crate::observability::ACTIVE_REQUESTS).set(self.active.len() as f64);
    }
}
