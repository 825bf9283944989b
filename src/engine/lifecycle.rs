use crate::model::{ParkingRequest, RequestState};

impl RequestState {
    /// Forward transitions only. Same-state moves are never valid.
    pub fn can_transition_to(self, to: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, to),
            (Requested, Allocated)
                | (Requested, Cancelled)
                | (Allocated, Occupied)
                | (Allocated, Cancelled)
                | (Occupied, Released)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequestState::Released | RequestState::Cancelled)
    }

    /// A request in this state owns its allocated slot.
    pub fn holds_slot(self) -> bool {
        matches!(self, RequestState::Allocated | RequestState::Occupied)
    }
}

impl ParkingRequest {
    /// Validated transition. On rejection the state is left untouched.
    pub fn update_state(&mut self, to: RequestState) -> bool {
        if !self.state.can_transition_to(to) {
            metrics::counter!(crate::observability::TRANSITIONS_REJECTED_TOTAL).increment(1);
            tracing::debug!(
                vehicle = %self.vehicle_id,
                from = %self.state,
                to = %to,
                "transition rejected"
            );
            return false;
        }
        self.state = to;
        true
    }

    /// Privileged assignment for rollback; skips the transition table.
    pub(crate) fn restore_state(&mut self, state: RequestState) {
        self.state = state;
    }
}
