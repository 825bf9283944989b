use crate::model::{AreaId, RequestState, SlotId, ZoneId};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    ZoneNotFound(ZoneId),
    AreaNotFound { zone: ZoneId, area: AreaId },
    SlotNotFound(SlotId),
    VehicleNotFound(String),
    AlreadyExists(String),
    DuplicateActiveRequest(String),
    SlotInUse { slot: SlotId, vehicle_id: String },
    InvalidTransition {
        vehicle_id: String,
        from: RequestState,
        to: RequestState,
    },
    CapacityExhausted { zone: ZoneId, penalty: f64 },
    InsufficientHistory { requested: usize, available: usize },
    InvalidArgument(&'static str),
    LimitExceeded(&'static str),
}

impl EngineError {
    /// Short label used for metrics and script reports.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ZoneNotFound(_)
            | EngineError::AreaNotFound { .. }
            | EngineError::SlotNotFound(_)
            | EngineError::VehicleNotFound(_) => "not_found",
            EngineError::AlreadyExists(_) => "already_exists",
            EngineError::DuplicateActiveRequest(_) => "duplicate_active_request",
            EngineError::SlotInUse { .. } => "slot_in_use",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::CapacityExhausted { .. } => "capacity_exhausted",
            EngineError::InsufficientHistory { .. } => "insufficient_history",
            EngineError::InvalidArgument(_) => "invalid_argument",
            EngineError::LimitExceeded(_) => "limit_exceeded",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ZoneNotFound(id) => write!(f, "not found: {id}"),
            EngineError::AreaNotFound { zone, area } => write!(f, "not found: {area} in {zone}"),
            EngineError::SlotNotFound(id) => write!(f, "not found: {id}"),
            EngineError::VehicleNotFound(v) => write!(f, "no active request for vehicle {v}"),
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::DuplicateActiveRequest(v) => {
                write!(f, "vehicle {v} already has an active request")
            }
            EngineError::SlotInUse { slot, vehicle_id } => {
                write!(f, "{slot} is held by vehicle {vehicle_id}")
            }
            EngineError::InvalidTransition {
                vehicle_id,
                from,
                to,
            } => write!(f, "invalid transition for vehicle {vehicle_id}: {from} -> {to}"),
            EngineError::CapacityExhausted { zone, penalty } => write!(
                f,
                "no slot available in {zone} or its adjacent zones (penalty {penalty:.2})"
            ),
            EngineError::InsufficientHistory {
                requested,
                available,
            } => write!(
                f,
                "cannot roll back {requested} operations: history holds {available}"
            ),
            EngineError::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
