use crate::config::PenaltyConfig;
use crate::model::*;
use crate::observability::{ALLOCATIONS_TOTAL, PENALTY_TOTAL};

use super::pool::SlotPool;
use super::EngineError;

/// Where a successful allocation was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Adjacent,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Home => "home",
            Route::Adjacent => "adjacent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Allocation {
    pub slot: SlotKey,
    pub slot_id: SlotId,
    pub zone: ZoneId,
    pub route: Route,
    pub penalty: f64,
}

/// Preferred zone first, then its direct neighbours, else fail.
#[derive(Debug, Default)]
pub struct AllocationEngine {
    pool: SlotPool,
    penalties: PenaltyConfig,
}

impl AllocationEngine {
    pub fn new(penalties: PenaltyConfig) -> Self {
        Self {
            pool: SlotPool::new(),
            penalties,
        }
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut SlotPool {
        &mut self.pool
    }

    pub fn penalties(&self) -> PenaltyConfig {
        self.penalties
    }

    /// Search the requested zone, then its adjacency list in insertion order.
    /// The search never goes further than one hop.
    ///
    /// On success the slot is taken, the request holds it and is `Allocated`.
    /// On capacity exhaustion the cancellation penalty is charged and the
    /// request is otherwise untouched. An unknown zone charges nothing.
    pub fn allocate(
        &mut self,
        vehicle: &Vehicle,
        request: &mut ParkingRequest,
    ) -> Result<Allocation, EngineError> {
        if request.state() != RequestState::Requested {
            return Err(EngineError::InvalidTransition {
                vehicle_id: request.vehicle_id.clone(),
                from: request.state(),
                to: RequestState::Allocated,
            });
        }
        let home_id = request.requested_zone;
        let home = self
            .pool
            .zone_key(home_id)
            .ok_or(EngineError::ZoneNotFound(home_id))?;

        if let Some(slot) = self.pool.find_available_in_zone(home) {
            tracing::debug!(vehicle = %vehicle.id, zone = home_id.0, "slot found in requested zone");
            return Ok(self.commit(slot, request, Route::Home, 0.0));
        }

        let adjacent = self
            .pool
            .zone(home)
            .map(|z| z.adjacent.clone())
            .unwrap_or_default();
        for neighbour in adjacent {
            let Some(key) = self.pool.zone_key(neighbour) else {
                continue;
            };
            if let Some(slot) = self.pool.find_available_in_zone(key) {
                tracing::debug!(
                    vehicle = %vehicle.id,
                    zone = home_id.0,
                    fallback = neighbour.0,
                    "requested zone full, using adjacent zone"
                );
                let penalty = self.penalties.cross_zone;
                return Ok(self.commit(slot, request, Route::Adjacent, penalty));
            }
        }

        let penalty = self.penalties.cancellation;
        request.add_penalty(penalty);
        metrics::counter!(PENALTY_TOTAL, "kind" => "cancellation").increment(1);
        tracing::info!(
            vehicle = %vehicle.id,
            zone = home_id.0,
            penalty,
            "no slot reachable from requested zone"
        );
        Err(EngineError::CapacityExhausted {
            zone: home_id,
            penalty,
        })
    }

    fn commit(
        &mut self,
        slot: SlotKey,
        request: &mut ParkingRequest,
        route: Route,
        penalty: f64,
    ) -> Allocation {
        self.pool.set_available(slot, false);
        let taken = self
            .pool
            .slot(slot)
            .map(|s| (s.id, s.zone_id))
            .unwrap_or((SlotId(0), request.requested_zone));
        request.allocated_slot = Some(slot);
        let moved = request.update_state(RequestState::Allocated);
        debug_assert!(moved, "allocate() checked the request was Requested");
        if penalty > 0.0 {
            request.add_penalty(penalty);
            metrics::counter!(PENALTY_TOTAL, "kind" => "cross_zone").increment(1);
        }
        metrics::counter!(ALLOCATIONS_TOTAL, "route" => route.as_str()).increment(1);
        Allocation {
            slot,
            slot_id: taken.0,
            zone: taken.1,
            route,
            penalty,
        }
    }

    /// Mark a slot available by id. Freeing an available slot is a no-op.
    pub fn free_slot(&mut self, slot_id: SlotId) -> Result<SlotKey, EngineError> {
        let key = self
            .pool
            .find_by_id(slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        self.pool.set_available(key, true);
        tracing::debug!(slot = slot_id.0, "slot freed");
        Ok(key)
    }

    /// Free by key, used when the caller already holds the arena key.
    pub(crate) fn free_key(&mut self, key: SlotKey) -> bool {
        self.pool.set_available(key, true).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Zone 1 with `home` slots, zone 2 with `neighbour` slots, linked 1 -> 2.
    fn engine(home: u32, neighbour: u32) -> AllocationEngine {
        let mut engine = AllocationEngine::new(PenaltyConfig::default());
        let pool = engine.pool_mut();
        let mut next = 1;
        for (zone, count) in [(1, home), (2, neighbour)] {
            pool.add_zone(ZoneId(zone)).unwrap();
            pool.add_area(ZoneId(zone), AreaId(1)).unwrap();
            for _ in 0..count {
                pool.add_slot(ZoneId(zone), AreaId(1), SlotId(next)).unwrap();
                next += 1;
            }
        }
        pool.add_adjacency(ZoneId(1), ZoneId(2)).unwrap();
        engine
    }

    fn request(zone: u32) -> (Vehicle, ParkingRequest) {
        (
            Vehicle::new("V", ZoneId(zone)),
            ParkingRequest::new("V", ZoneId(zone)),
        )
    }

    #[test]
    fn home_zone_first_no_penalty() {
        let mut engine = engine(2, 2);
        let (vehicle, mut req) = request(1);
        let alloc = engine.allocate(&vehicle, &mut req).unwrap();

        assert_eq!(alloc.route, Route::Home);
        assert_eq!(alloc.zone, ZoneId(1));
        assert_eq!(alloc.slot_id, SlotId(1));
        assert_eq!(req.state(), RequestState::Allocated);
        assert_eq!(req.allocated_slot, Some(alloc.slot));
        assert_eq!(req.penalty_cost(), 0.0);
        assert!(!engine.pool().slot(alloc.slot).unwrap().available);
    }

    #[test]
    fn adjacent_fallback_charges_cross_zone_penalty() {
        let mut engine = engine(1, 1);
        let (v1, mut r1) = request(1);
        engine.allocate(&v1, &mut r1).unwrap();

        let (v2, mut r2) = request(1);
        let alloc = engine.allocate(&v2, &mut r2).unwrap();
        assert_eq!(alloc.route, Route::Adjacent);
        assert_eq!(alloc.zone, ZoneId(2));
        assert_eq!(r2.penalty_cost(), engine.penalties().cross_zone);
    }

    #[test]
    fn exhausted_charges_cancellation_penalty() {
        let mut engine = engine(1, 0);
        let (v1, mut r1) = request(1);
        engine.allocate(&v1, &mut r1).unwrap();

        let (v2, mut r2) = request(1);
        let err = engine.allocate(&v2, &mut r2).unwrap_err();
        assert_eq!(
            err,
            EngineError::CapacityExhausted {
                zone: ZoneId(1),
                penalty: 100.0
            }
        );
        assert_eq!(r2.state(), RequestState::Requested);
        assert_eq!(r2.allocated_slot, None);
        assert_eq!(r2.penalty_cost(), 100.0);
    }

    #[test]
    fn unknown_zone_charges_nothing() {
        let mut engine = engine(1, 1);
        let (vehicle, mut req) = request(9);
        let err = engine.allocate(&vehicle, &mut req).unwrap_err();
        assert_eq!(err, EngineError::ZoneNotFound(ZoneId(9)));
        assert_eq!(req.penalty_cost(), 0.0);
    }

    #[test]
    fn search_is_one_hop_only() {
        // 1 -> 2 -> 3, zones 1 and 2 full, 3 has room.
        let mut engine = engine(0, 0);
        let pool = engine.pool_mut();
        pool.add_zone(ZoneId(3)).unwrap();
        pool.add_area(ZoneId(3), AreaId(1)).unwrap();
        pool.add_slot(ZoneId(3), AreaId(1), SlotId(99)).unwrap();
        pool.add_adjacency(ZoneId(2), ZoneId(3)).unwrap();

        let (vehicle, mut req) = request(1);
        assert!(matches!(
            engine.allocate(&vehicle, &mut req),
            Err(EngineError::CapacityExhausted { .. })
        ));
    }

    #[test]
    fn adjacency_not_assumed_symmetric() {
        let mut engine = engine(1, 0);
        let (v1, mut r1) = request(1);
        engine.allocate(&v1, &mut r1).unwrap();
        // Zone 2 is empty and has no link back to 1.
        let (v2, mut r2) = request(2);
        assert!(engine.allocate(&v2, &mut r2).is_err());
    }

    #[test]
    fn only_requested_requests_allocate() {
        let mut engine = engine(2, 0);
        let (vehicle, mut req) = request(1);
        engine.allocate(&vehicle, &mut req).unwrap();
        let err = engine.allocate(&vehicle, &mut req).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransition { .. }));
        let zone = engine.pool().zone_key(ZoneId(1)).unwrap();
        assert_eq!(engine.pool().zone_available_slots(zone), 1);
    }

    #[test]
    fn free_slot_is_idempotent() {
        let mut engine = engine(2, 0);
        let (vehicle, mut req) = request(1);
        let alloc = engine.allocate(&vehicle, &mut req).unwrap();

        engine.free_slot(alloc.slot_id).unwrap();
        engine.free_slot(alloc.slot_id).unwrap();
        let zone = engine.pool().zone_key(ZoneId(1)).unwrap();
        assert_eq!(engine.pool().zone_available_slots(zone), 2);
        assert_eq!(engine.pool().zone(zone).unwrap().total_capacity, 2);
    }

    #[test]
    fn free_unknown_slot_not_found() {
        let mut engine = engine(1, 0);
        assert_eq!(
            engine.free_slot(SlotId(404)),
            Err(EngineError::SlotNotFound(SlotId(404)))
        );
    }
}
