//! Hard caps on topology and input sizes. Exceeding one is `LimitExceeded`.

pub const MAX_ZONES: usize = 1_024;
pub const MAX_AREAS_PER_ZONE: usize = 256;
pub const MAX_SLOTS_PER_AREA: usize = 10_000;
pub const MAX_ADJACENT_ZONES: usize = 64;
pub const MAX_VEHICLE_ID_LEN: usize = 64;
