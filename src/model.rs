use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds.
pub type Ms = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(pub u32);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zone {}", self.0)
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "area {}", self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

// ── Arena keys ───────────────────────────────────────────────────
//
// Stable indices into the arenas owned by the slot pool and the master
// history. Nothing is ever removed from those arenas, so a key handed out
// once stays valid for the lifetime of the system.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoneKey(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AreaKey(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey(pub(crate) usize);

// ── Slot pool ────────────────────────────────────────────────────

/// Atomic allocatable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingSlot {
    pub id: SlotId,
    pub zone_id: ZoneId,
    pub area: AreaKey,
    pub available: bool,
}

/// Ordered collection of slots. Insertion order is search order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParkingArea {
    pub id: AreaId,
    pub zone: ZoneKey,
    pub slots: Vec<SlotKey>,
    /// Cached; equals the slot count after every pool mutation.
    pub total_slots: u32,
    /// Cached; equals the number of available slots after every pool mutation.
    pub available_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    pub id: ZoneId,
    pub areas: Vec<AreaKey>,
    /// Non-owning, one direction only. Callers add the reverse link themselves.
    pub adjacent: Vec<ZoneId>,
    pub total_capacity: u32,
}

/// Carries allocation intent into the engine. Not retained by the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub id: String,
    pub preferred_zone: ZoneId,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, preferred_zone: ZoneId) -> Self {
        Self {
            id: id.into(),
            preferred_zone,
        }
    }
}

// ── Request lifecycle ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Requested,
    Allocated,
    Occupied,
    Released,
    Cancelled,
}

impl RequestState {
    pub const ALL: [RequestState; 5] = [
        RequestState::Requested,
        RequestState::Allocated,
        RequestState::Occupied,
        RequestState::Released,
        RequestState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Requested => "REQUESTED",
            RequestState::Allocated => "ALLOCATED",
            RequestState::Occupied => "OCCUPIED",
            RequestState::Released => "RELEASED",
            RequestState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParkingRequest {
    pub ticket: Ulid,
    pub vehicle_id: String,
    pub requested_zone: ZoneId,
    pub allocated_slot: Option<SlotKey>,
    pub(crate) state: RequestState,
    pub(crate) penalty_cost: f64,
    /// Set when rollback undid the creation of this request.
    pub(crate) rolled_back: bool,
}

impl ParkingRequest {
    pub fn new(vehicle_id: impl Into<String>, requested_zone: ZoneId) -> Self {
        Self {
            ticket: Ulid::new(),
            vehicle_id: vehicle_id.into(),
            requested_zone,
            allocated_slot: None,
            state: RequestState::Requested,
            penalty_cost: 0.0,
            rolled_back: false,
        }
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn penalty_cost(&self) -> f64 {
        self.penalty_cost
    }

    pub fn add_penalty(&mut self, amount: f64) {
        debug_assert!(amount >= 0.0, "penalties never decrease the running cost");
        self.penalty_cost += amount;
    }

    pub fn reset_penalty(&mut self) {
        self.penalty_cost = 0.0;
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    pub fn created_at(&self) -> Ms {
        self.ticket.timestamp_ms() as Ms
    }
}

// ── Rollback log ─────────────────────────────────────────────────

/// One committed state transition. `before == after == Requested` marks the
/// creation of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub request: RequestKey,
    pub slot: Option<SlotKey>,
    pub zone: Option<ZoneId>,
    pub before: RequestState,
    pub after: RequestState,
}

impl Command {
    pub fn creation(request: RequestKey, zone: ZoneId) -> Self {
        Self {
            request,
            slot: None,
            zone: Some(zone),
            before: RequestState::Requested,
            after: RequestState::Requested,
        }
    }

    pub fn transition(
        request: RequestKey,
        slot: Option<SlotKey>,
        zone: Option<ZoneId>,
        before: RequestState,
        after: RequestState,
    ) -> Self {
        Self {
            request,
            slot,
            zone,
            before,
            after,
        }
    }

    pub fn is_creation(&self) -> bool {
        self.before == RequestState::Requested && self.after == RequestState::Requested
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestInfo {
    pub ticket: Ulid,
    pub vehicle_id: String,
    pub requested_zone: ZoneId,
    pub allocated_slot: Option<SlotId>,
    pub allocated_zone: Option<ZoneId>,
    pub state: RequestState,
    pub penalty_cost: f64,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneInfo {
    pub id: ZoneId,
    pub total_capacity: u32,
    pub available_slots: u32,
    pub occupied_slots: u32,
    pub utilization: f64,
    pub adjacent: Vec<ZoneId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_request_starts_requested_without_slot() {
        let req = ParkingRequest::new("ABC-123", ZoneId(1));
        assert_eq!(req.state(), RequestState::Requested);
        assert_eq!(req.allocated_slot, None);
        assert_eq!(req.penalty_cost(), 0.0);
        assert!(!req.is_rolled_back());
    }

    #[test]
    fn created_at_comes_from_ticket() {
        let req = ParkingRequest::new("ABC-123", ZoneId(1));
        assert_eq!(req.created_at(), req.ticket.timestamp_ms() as Ms);
        assert!(req.created_at() > 0);
    }

    #[test]
    fn penalty_accumulates_until_reset() {
        let mut req = ParkingRequest::new("ABC-123", ZoneId(1));
        req.add_penalty(75.0);
        req.add_penalty(100.0);
        assert_eq!(req.penalty_cost(), 175.0);
        req.reset_penalty();
        assert_eq!(req.penalty_cost(), 0.0);
    }

    #[test]
    fn creation_marker() {
        let create = Command::creation(RequestKey(0), ZoneId(1));
        assert!(create.is_creation());

        let alloc = Command::transition(
            RequestKey(0),
            Some(SlotKey(3)),
            Some(ZoneId(1)),
            RequestState::Requested,
            RequestState::Allocated,
        );
        assert!(!alloc.is_creation());
    }

    #[test]
    fn state_labels() {
        assert_eq!(RequestState::Requested.to_string(), "REQUESTED");
        assert_eq!(RequestState::Cancelled.as_str(), "CANCELLED");
        let json = serde_json::to_string(&RequestState::Occupied).unwrap();
        assert_eq!(json, "\"OCCUPIED\"");
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ZoneId(7)).unwrap();
        assert_eq!(json, "7");
        let slot: SlotId = serde_json::from_str("42").unwrap();
        assert_eq!(slot, SlotId(42));
        assert_eq!(slot.to_string(), "slot 42");
    }
}
