use crate::limits::*;
use crate::model::*;
use crate::observability::REQUESTS_TOTAL;

use super::{EngineError, ParkingSystem};

impl ParkingSystem {
    // ── Topology setup ───────────────────────────────────────

    pub fn add_zone(&mut self, id: ZoneId) -> Result<(), EngineError> {
        self.allocator.pool_mut().add_zone(id)?;
        Ok(())
    }

    pub fn add_area(&mut self, zone: ZoneId, area: AreaId) -> Result<(), EngineError> {
        self.allocator.pool_mut().add_area(zone, area)?;
        Ok(())
    }

    pub fn add_slot(&mut self, zone: ZoneId, area: AreaId, slot: SlotId) -> Result<(), EngineError> {
        self.allocator.pool_mut().add_slot(zone, area, slot)?;
        Ok(())
    }

    /// Zone with a single area (id 1) of `slots` fresh slots. Returns the
    /// ids handed out, in search order.
    pub fn create_zone(&mut self, id: ZoneId, slots: u32) -> Result<Vec<SlotId>, EngineError> {
        if slots == 0 {
            return Err(EngineError::InvalidArgument("zone needs at least one slot"));
        }
        if slots as usize > MAX_SLOTS_PER_AREA {
            return Err(EngineError::LimitExceeded("too many slots in area"));
        }
        let pool = self.allocator.pool_mut();
        let first = pool
            .next_slot_id()
            .filter(|first| first.0.checked_add(slots - 1).is_some())
            .ok_or(EngineError::LimitExceeded("slot ids exhausted"))?
            .0;
        pool.add_zone(id)?;
        pool.add_area(id, AreaId(1))?;
        let mut ids = Vec::with_capacity(slots as usize);
        for n in 0..slots {
            let slot = SlotId(first + n);
            pool.add_slot(id, AreaId(1), slot)?;
            ids.push(slot);
        }
        tracing::info!(zone = id.0, slots, "zone created");
        Ok(ids)
    }

    pub fn add_adjacency(&mut self, from: ZoneId, to: ZoneId) -> Result<(), EngineError> {
        self.allocator.pool_mut().add_adjacency(from, to)
    }

    /// Both directions.
    pub fn link_zones(&mut self, a: ZoneId, b: ZoneId) -> Result<(), EngineError> {
        let pool = self.allocator.pool_mut();
        if pool.zone_key(b).is_none() {
            return Err(EngineError::ZoneNotFound(b));
        }
        pool.add_adjacency(a, b)?;
        pool.add_adjacency(b, a)
    }

    pub fn remove_adjacency(&mut self, from: ZoneId, to: ZoneId) -> Result<bool, EngineError> {
        self.allocator.pool_mut().remove_adjacency(from, to)
    }

    // ── Request lifecycle ────────────────────────────────────

    fn validate_new_request(&self, vehicle_id: &str, zone: ZoneId) -> Result<(), EngineError> {
        if vehicle_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument("vehicle id must not be empty"));
        }
        if vehicle_id.len() > MAX_VEHICLE_ID_LEN {
            return Err(EngineError::LimitExceeded("vehicle id too long"));
        }
        if self.active.contains_key(vehicle_id) {
            tracing::warn!(vehicle = vehicle_id, "duplicate active request rejected");
            return Err(EngineError::DuplicateActiveRequest(vehicle_id.to_string()));
        }
        if self.allocator.pool().zone_key(zone).is_none() {
            return Err(EngineError::ZoneNotFound(zone));
        }
        Ok(())
    }

    /// Create a request and allocate it in one step.
    ///
    /// On success two commands are logged: the creation marker and the
    /// allocation. When no slot is reachable nothing is logged, the pool is
    /// untouched and the request goes to the master history as `Cancelled`
    /// carrying the cancellation penalty.
    pub fn create_request(&mut self, vehicle_id: &str, zone: ZoneId) -> Result<RequestInfo, EngineError> {
        self.validate_new_request(vehicle_id, zone)?;
        let vehicle = Vehicle::new(vehicle_id, zone);
        let mut request = ParkingRequest::new(vehicle_id, zone);
        let key = RequestKey(self.history.len());

        match self.allocator.allocate(&vehicle, &mut request) {
            Ok(alloc) => {
                self.history.push(request);
                self.active.insert(vehicle_id.to_string(), key);
                self.rollback.record_command(Command::creation(key, zone));
                self.rollback.record_command(Command::transition(
                    key,
                    Some(alloc.slot),
                    Some(alloc.zone),
                    RequestState::Requested,
                    RequestState::Allocated,
                ));
                metrics::counter!(REQUESTS_TOTAL, "outcome" => "allocated").increment(1);
                self.publish_active_gauge();
                tracing::info!(
                    vehicle = vehicle_id,
                    zone = zone.0,
                    slot = alloc.slot_id.0,
                    served_by = alloc.zone.0,
                    route = alloc.route.as_str(),
                    "request allocated"
                );
                self.request_info(key)
                    .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
            }
            Err(err) => {
                if matches!(err, EngineError::CapacityExhausted { .. }) {
                    request.update_state(RequestState::Cancelled);
                    self.history.push(request);
                    metrics::counter!(REQUESTS_TOTAL, "outcome" => "exhausted").increment(1);
                }
                Err(err)
            }
        }
    }

    /// Create a `Requested` request without allocating it.
    pub fn submit_request(&mut self, vehicle_id: &str, zone: ZoneId) -> Result<RequestInfo, EngineError> {
        self.validate_new_request(vehicle_id, zone)?;
        let key = RequestKey(self.history.len());
        self.history.push(ParkingRequest::new(vehicle_id, zone));
        self.active.insert(vehicle_id.to_string(), key);
        self.rollback.record_command(Command::creation(key, zone));
        metrics::counter!(REQUESTS_TOTAL, "outcome" => "submitted").increment(1);
        self.publish_active_gauge();
        tracing::info!(vehicle = vehicle_id, zone = zone.0, "request submitted");
        self.request_info(key)
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// Allocate a slot for a `Requested` request. On exhaustion the request
    /// stays `Requested` and carries the cancellation penalty.
    pub fn allocate_slot_for_request(&mut self, vehicle_id: &str) -> Result<RequestInfo, EngineError> {
        let key = self.resolve_active(vehicle_id)?;
        let request = &mut self.history[key.0];
        let vehicle = Vehicle::new(request.vehicle_id.clone(), request.requested_zone);
        let alloc = self.allocator.allocate(&vehicle, request)?;
        self.rollback.record_command(Command::transition(
            key,
            Some(alloc.slot),
            Some(alloc.zone),
            RequestState::Requested,
            RequestState::Allocated,
        ));
        tracing::info!(
            vehicle = vehicle_id,
            slot = alloc.slot_id.0,
            served_by = alloc.zone.0,
            route = alloc.route.as_str(),
            "request allocated"
        );
        self.request_info(key)
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// Validated transition on an active request. Returns the state it left.
    fn transition(&mut self, key: RequestKey, to: RequestState) -> Result<RequestState, EngineError> {
        let request = &mut self.history[key.0];
        let from = request.state();
        if !request.update_state(to) {
            tracing::warn!(vehicle = %request.vehicle_id, %from, %to, "transition refused");
            return Err(EngineError::InvalidTransition {
                vehicle_id: request.vehicle_id.clone(),
                from,
                to,
            });
        }
        Ok(from)
    }

    pub fn occupy(&mut self, vehicle_id: &str) -> Result<RequestInfo, EngineError> {
        let key = self.resolve_active(vehicle_id)?;
        let from = self.transition(key, RequestState::Occupied)?;
        let slot = self.history[key.0].allocated_slot;
        let zone = self.slot_zone(slot);
        self.rollback.record_command(Command::transition(
            key,
            slot,
            zone,
            from,
            RequestState::Occupied,
        ));
        tracing::info!(vehicle = vehicle_id, "slot occupied");
        self.request_info(key)
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// `Occupied → Released`; frees the slot and drops the request from the
    /// active index. History keeps it.
    pub fn release(&mut self, vehicle_id: &str) -> Result<RequestInfo, EngineError> {
        let key = self.resolve_active(vehicle_id)?;
        let from = self.transition(key, RequestState::Released)?;
        let slot = self.history[key.0].allocated_slot;
        if let Some(slot) = slot {
            self.allocator.free_key(slot);
        }
        let zone = self.slot_zone(slot);
        self.rollback.record_command(Command::transition(
            key,
            slot,
            zone,
            from,
            RequestState::Released,
        ));
        self.active.remove(vehicle_id);
        self.publish_active_gauge();
        tracing::info!(vehicle = vehicle_id, "slot released");
        self.request_info(key)
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// Cancel from `Requested` or `Allocated`, freeing any held slot.
    pub fn cancel(&mut self, vehicle_id: &str) -> Result<RequestInfo, EngineError> {
        let key = self.resolve_active(vehicle_id)?;
        let from = self.transition(key, RequestState::Cancelled)?;
        let slot = if from.holds_slot() {
            self.history[key.0].allocated_slot
        } else {
            None
        };
        if let Some(slot) = slot {
            self.allocator.free_key(slot);
        }
        let zone = self.slot_zone(slot);
        self.rollback.record_command(Command::transition(
            key,
            slot,
            zone,
            from,
            RequestState::Cancelled,
        ));
        self.active.remove(vehicle_id);
        self.publish_active_gauge();
        tracing::info!(vehicle = vehicle_id, %from, "request cancelled");
        self.request_info(key)
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// Explicit reset of the running penalty of an active request.
    pub fn reset_penalty(&mut self, vehicle_id: &str) -> Result<RequestInfo, EngineError> {
        let key = self.resolve_active(vehicle_id)?;
        self.history[key.0].reset_penalty();
        self.request_info(key)
            .ok_or_else(|| EngineError::VehicleNotFound(vehicle_id.to_string()))
    }

    /// Mark a slot available by id. Not logged; meant for operator repair of
    /// slots no request holds. A slot held by an Allocated or Occupied request
    /// is refused with `SlotInUse`.
    pub fn free_slot(&mut self, slot: SlotId) -> Result<(), EngineError> {
        let key = self
            .allocator
            .pool()
            .find_by_id(slot)
            .ok_or(EngineError::SlotNotFound(slot))?;
        let holder = self.history.iter().find(|r| {
            !r.is_rolled_back() && r.state().holds_slot() && r.allocated_slot == Some(key)
        });
        if let Some(holder) = holder {
            tracing::warn!(slot = slot.0, vehicle = %holder.vehicle_id, "free of held slot refused");
            return Err(EngineError::SlotInUse {
                slot,
                vehicle_id: holder.vehicle_id.clone(),
            });
        }
        self.allocator.free_slot(slot)?;
        Ok(())
    }

    // ── Rollback ─────────────────────────────────────────────

    /// Undo the last `k` logged operations, then reconcile the active index:
    /// requests whose creation was undone leave it (freeing any slot they
    /// still hold); other reverted requests that are non-terminal again are
    /// put back if missing.
    pub fn rollback_operations(&mut self, k: usize) -> Result<Vec<Command>, EngineError> {
        if k == 0 {
            return Err(EngineError::InvalidArgument("rollback count must be positive"));
        }
        let reverted = self
            .rollback
            .perform_rollback(k, &mut self.allocator, &mut self.history)?;

        let mut touched = Vec::new();
        for cmd in &reverted {
            if !cmd.is_creation() {
                touched.push(cmd.request);
                continue;
            }
            let Some(request) = self.history.get_mut(cmd.request.0) else {
                continue;
            };
            if let Some(slot) = request.allocated_slot.take() {
                self.allocator.free_key(slot);
            }
            request.rolled_back = true;
            if self.active.get(&request.vehicle_id) == Some(&cmd.request) {
                self.active.remove(&request.vehicle_id);
            }
            tracing::info!(vehicle = %request.vehicle_id, "request removed by rollback");
        }

        for key in touched {
            let Some(request) = self.history.get(key.0) else {
                continue;
            };
            if request.rolled_back || request.state().is_terminal() {
                continue;
            }
            match self.active.get(&request.vehicle_id) {
                Some(existing) if *existing == key => {}
                Some(_) => {
                    tracing::warn!(
                        vehicle = %request.vehicle_id,
                        "reverted request not restored: vehicle already active"
                    );
                }
                None => {
                    self.active.insert(request.vehicle_id.clone(), key);
                    tracing::info!(vehicle = %request.vehicle_id, state = %request.state(), "request restored to active");
                }
            }
        }

        self.publish_active_gauge();
        Ok(reverted)
    }
}
