use crate::model::{Command, ParkingRequest, RequestState};
use crate::observability::ROLLBACKS_TOTAL;

use super::allocation::AllocationEngine;
use super::EngineError;

/// LIFO log of committed commands.
#[derive(Debug, Default)]
pub struct RollbackManager {
    log: Vec<Command>,
    total_rollbacks: usize,
}

impl RollbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&mut self, command: Command) {
        self.log.push(command);
        tracing::trace!(depth = self.log.len(), "command recorded");
    }

    /// Undo the last `k` commands, most recent first.
    ///
    /// Rejected without any mutation when fewer than `k` commands are logged.
    /// Commands naming a request or slot that no longer resolves are dropped
    /// and the remaining pops continue. Returns the commands that were popped,
    /// in pop order.
    pub fn perform_rollback(
        &mut self,
        k: usize,
        engine: &mut AllocationEngine,
        requests: &mut [ParkingRequest],
    ) -> Result<Vec<Command>, EngineError> {
        if self.log.len() < k {
            return Err(EngineError::InsufficientHistory {
                requested: k,
                available: self.log.len(),
            });
        }

        let mut reverted = Vec::with_capacity(k);
        for _ in 0..k {
            let Some(cmd) = self.log.pop() else { break };

            let Some(request) = requests.get_mut(cmd.request.0) else {
                tracing::warn!(request = cmd.request.0, "rollback skipped stale request reference");
                continue;
            };

            if let Some(slot) = cmd.slot {
                // Put the slot back to what the earlier state implies.
                let available = !cmd.before.holds_slot();
                if engine.pool_mut().set_available(slot, available).is_none() {
                    tracing::warn!(slot = slot.0, "rollback skipped stale slot reference");
                }
            }

            request.restore_state(cmd.before);
            if cmd.before == RequestState::Requested {
                request.allocated_slot = None;
            }
            tracing::info!(
                vehicle = %request.vehicle_id,
                zone = ?cmd.zone,
                from = %cmd.after,
                to = %cmd.before,
                creation = cmd.is_creation(),
                "reverted"
            );
            reverted.push(cmd);
        }

        self.total_rollbacks += k;
        metrics::counter!(ROLLBACKS_TOTAL).increment(k as u64);
        Ok(reverted)
    }

    pub fn has_history(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn history_size(&self) -> usize {
        self.log.len()
    }

    pub fn total_rollbacks_performed(&self) -> usize {
        self.total_rollbacks
    }

    pub fn last_command(&self) -> Option<&Command> {
        self.log.last()
    }

    /// Top of the stack first.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.log.iter().rev()
    }

    pub fn clear_history(&mut self) {
        self.log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PenaltyConfig;
    use crate::model::*;

    fn setup() -> (AllocationEngine, Vec<ParkingRequest>, RollbackManager) {
        let mut engine = AllocationEngine::new(PenaltyConfig::default());
        let pool = engine.pool_mut();
        pool.add_zone(ZoneId(1)).unwrap();
        pool.add_area(ZoneId(1), AreaId(1)).unwrap();
        pool.add_slot(ZoneId(1), AreaId(1), SlotId(1)).unwrap();
        pool.add_slot(ZoneId(1), AreaId(1), SlotId(2)).unwrap();
        (engine, Vec::new(), RollbackManager::new())
    }

    /// Create + allocate one request, logging both commands.
    fn allocate(
        engine: &mut AllocationEngine,
        requests: &mut Vec<ParkingRequest>,
        log: &mut RollbackManager,
        vehicle: &str,
    ) -> RequestKey {
        let key = RequestKey(requests.len());
        let mut req = ParkingRequest::new(vehicle, ZoneId(1));
        log.record_command(Command::creation(key, ZoneId(1)));
        let alloc = engine
            .allocate(&Vehicle::new(vehicle, ZoneId(1)), &mut req)
            .unwrap();
        log.record_command(Command::transition(
            key,
            Some(alloc.slot),
            Some(alloc.zone),
            RequestState::Requested,
            RequestState::Allocated,
        ));
        requests.push(req);
        key
    }

    fn available(engine: &AllocationEngine) -> u32 {
        let zone = engine.pool().zone_key(ZoneId(1)).unwrap();
        engine.pool().zone_available_slots(zone)
    }

    #[test]
    fn undo_allocation_frees_slot() {
        let (mut engine, mut requests, mut log) = setup();
        let key = allocate(&mut engine, &mut requests, &mut log, "A");
        assert_eq!(available(&engine), 1);

        let reverted = log.perform_rollback(1, &mut engine, &mut requests).unwrap();
        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].after, RequestState::Allocated);
        assert_eq!(requests[key.0].state(), RequestState::Requested);
        assert_eq!(requests[key.0].allocated_slot, None);
        assert_eq!(available(&engine), 2);
        assert_eq!(log.history_size(), 1);
        assert_eq!(log.total_rollbacks_performed(), 1);
    }

    #[test]
    fn pops_in_reverse_order() {
        let (mut engine, mut requests, mut log) = setup();
        let a = allocate(&mut engine, &mut requests, &mut log, "A");
        let b = allocate(&mut engine, &mut requests, &mut log, "B");

        let reverted = log.perform_rollback(4, &mut engine, &mut requests).unwrap();
        let order: Vec<(RequestKey, bool)> =
            reverted.iter().map(|c| (c.request, c.is_creation())).collect();
        assert_eq!(order, vec![(b, false), (b, true), (a, false), (a, true)]);
        assert!(!log.has_history());
        assert_eq!(available(&engine), 2);
    }

    #[test]
    fn insufficient_history_mutates_nothing() {
        let (mut engine, mut requests, mut log) = setup();
        let key = allocate(&mut engine, &mut requests, &mut log, "A");

        let err = log.perform_rollback(3, &mut engine, &mut requests).unwrap_err();
        assert_eq!(
            err,
            EngineError::InsufficientHistory {
                requested: 3,
                available: 2
            }
        );
        assert_eq!(log.history_size(), 2);
        assert_eq!(log.total_rollbacks_performed(), 0);
        assert_eq!(requests[key.0].state(), RequestState::Allocated);
        assert_eq!(available(&engine), 1);
    }

    #[test]
    fn undo_release_retakes_slot() {
        let (mut engine, mut requests, mut log) = setup();
        let key = allocate(&mut engine, &mut requests, &mut log, "A");
        let slot = requests[key.0].allocated_slot.unwrap();

        requests[key.0].update_state(RequestState::Occupied);
        requests[key.0].update_state(RequestState::Released);
        engine.free_key(slot);
        log.record_command(Command::transition(
            key,
            Some(slot),
            Some(ZoneId(1)),
            RequestState::Occupied,
            RequestState::Released,
        ));
        assert_eq!(available(&engine), 2);

        log.perform_rollback(1, &mut engine, &mut requests).unwrap();
        assert_eq!(requests[key.0].state(), RequestState::Occupied);
        assert_eq!(requests[key.0].allocated_slot, Some(slot));
        assert!(!engine.pool().slot(slot).unwrap().available);
        assert_eq!(available(&engine), 1);
    }

    #[test]
    fn stale_references_are_skipped() {
        let (mut engine, mut requests, mut log) = setup();
        let key = allocate(&mut engine, &mut requests, &mut log, "A");
        log.record_command(Command::creation(RequestKey(42), ZoneId(1)));
        log.record_command(Command::transition(
            key,
            Some(SlotKey(999)),
            None,
            RequestState::Allocated,
            RequestState::Occupied,
        ));

        let reverted = log.perform_rollback(3, &mut engine, &mut requests).unwrap();
        // The dangling request entry is dropped, the others still apply.
        assert_eq!(reverted.len(), 2);
        assert_eq!(requests[key.0].state(), RequestState::Requested);
        assert_eq!(log.history_size(), 1);
        assert_eq!(log.total_rollbacks_performed(), 3);
    }

    #[test]
    fn accessors() {
        let (mut engine, mut requests, mut log) = setup();
        assert!(log.last_command().is_none());
        let key = allocate(&mut engine, &mut requests, &mut log, "A");

        let top = log.last_command().unwrap();
        assert_eq!(top.request, key);
        assert_eq!(top.after, RequestState::Allocated);
        assert!(log.commands().last().unwrap().is_creation());

        log.clear_history();
        assert!(!log.has_history());
        assert_eq!(log.history_size(), 0);
    }
}
