use ulid::Ulid;

use crate::model::*;

use super::{EngineError, ParkingSystem};

impl ParkingSystem {
    /// Snapshot of the vehicle's active request.
    pub fn request(&self, vehicle_id: &str) -> Option<RequestInfo> {
        let key = self.active.get(vehicle_id)?;
        self.request_info(*key)
    }

    pub fn request_by_ticket(&self, ticket: Ulid) -> Option<RequestInfo> {
        let pos = self.history.iter().position(|r| r.ticket == ticket)?;
        self.request_info(RequestKey(pos))
    }

    /// Master history, creation order. Includes failed and rolled-back requests.
    pub fn history(&self) -> &[ParkingRequest] {
        &self.history
    }

    /// Snapshot of every request in the master history.
    pub fn history_info(&self) -> Vec<RequestInfo> {
        (0..self.history.len())
            .filter_map(|i| self.request_info(RequestKey(i)))
            .collect()
    }

    /// Requests in `state`, ignoring those whose creation was rolled back.
    pub fn request_count_by_state(&self, state: RequestState) -> usize {
        self.history
            .iter()
            .filter(|r| !r.is_rolled_back() && r.state() == state)
            .count()
    }

    pub fn active_request_count(&self) -> usize {
        self.active.len()
    }

    /// Depth of the rollback log.
    pub fn history_size(&self) -> usize {
        self.rollback.history_size()
    }

    pub fn total_rollbacks_performed(&self) -> usize {
        self.rollback.total_rollbacks_performed()
    }

    pub fn zone_info(&self, zone: ZoneId) -> Result<ZoneInfo, EngineError> {
        let pool = self.allocator.pool();
        pool.zone_key(zone)
            .and_then(|k| pool.zone_info(k))
            .ok_or(EngineError::ZoneNotFound(zone))
    }

    /// Occupied share of the zone's capacity, in percent. Zero-capacity zones
    /// report 0.
    pub fn zone_utilization(&self, zone: ZoneId) -> Result<f64, EngineError> {
        self.zone_info(zone).map(|info| info.utilization)
    }

    pub fn available_slots(&self, zone: ZoneId) -> Result<u32, EngineError> {
        self.zone_info(zone).map(|info| info.available_slots)
    }

    /// All zones, insertion order.
    pub fn zones(&self) -> Vec<ZoneInfo> {
        let pool = self.allocator.pool();
        pool.zones()
            .filter_map(|z| pool.zone_key(z.id).and_then(|k| pool.zone_info(k)))
            .collect()
    }
}
