//! Per-lane load/store unit.
//!
//! ```text
//! IDLE --op latched--> REQUESTING --> WAITING --ack--> DONE --> IDLE
//! ```
//!
//! The request is asserted in `REQUESTING` and held in `WAITING` until the
//! data memory acknowledges it. `DONE` lasts exactly one cycle.

use crate::memory::{DataRequest, DataResponse};

/// Memory operation latched by the SIMD engine for one lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemOp {
    Load { addr: u32 },
    Store { addr: u32, data: u32 },
}

impl MemOp {
    fn request(&self) -> DataRequest {
        match *self {
            MemOp::Load { addr } => DataRequest::read(addr),
            MemOp::Store { addr, data } => DataRequest::write(addr, data),
        }
    }
}

/// LSU state. Variants carry the operation in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LsuState {
    #[default]
    Idle,
    Requesting(MemOp),
    Waiting(MemOp),
    /// Completed; loads carry the data read, stores carry 0.
    Done(u32),
}

impl LsuState {
    /// 2-bit hardware encoding.
    pub fn code(&self) -> u8 {
        match self {
            LsuState::Idle => 0,
            LsuState::Requesting(_) => 1,
            LsuState::Waiting(_) => 2,
            LsuState::Done(_) => 3,
        }
    }
}

/// Load/store unit for one lane.
#[derive(Debug, Clone, Default)]
pub struct LoadStoreUnit {
    state: LsuState,
}

impl LoadStoreUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> LsuState {
        self.state
    }

    /// Back to `IDLE`, dropping anything in flight.
    pub fn reset(&mut self) {
        self.state = LsuState::Idle;
    }

    /// Registered request presented to data memory.
    pub fn request(&self) -> DataRequest {
        match &self.state {
            LsuState::Requesting(op) | LsuState::Waiting(op) => op.request(),
            _ => DataRequest::default(),
        }
    }

    /// Result of a completed operation, visible for the one `DONE` cycle.
    pub fn completed(&self) -> Option<u32> {
        match self.state {
            LsuState::Done(data) => Some(data),
            _ => None,
        }
    }

    /// Advance one edge.
    ///
    /// `op` is the lane's pending operation; it is only taken in `IDLE`.
    /// `response` is the memory response latched on the previous edge.
    pub fn step(&mut self, op: Option<MemOp>, response: &DataResponse) {
        self.state = match self.state {
            LsuState::Idle => match op {
                Some(op) => LsuState::Requesting(op),
                None => LsuState::Idle,
            },
            LsuState::Requesting(op) => LsuState::Waiting(op),
            LsuState::Waiting(op) => match op {
                MemOp::Load { .. } if response.read_ack => LsuState::Done(response.read_data),
                MemOp::Store { .. } if response.write_ack => LsuState::Done(0),
                _ => LsuState::Waiting(op),
            },
            LsuState::Done(_) => LsuState::Idle,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_ack(data: u32) -> DataResponse {
        DataResponse { read_data: data, read_ack: true, write_ack: false }
    }

    #[test]
    fn test_load_sequence() {
        let mut lsu = LoadStoreUnit::new();
        let op = MemOp::Load { addr: 12 };
        let none = DataResponse::default();

        lsu.step(Some(op), &none);
        assert_eq!(lsu.state().code(), 1);
        assert_eq!(lsu.request(), DataRequest::read(12));

        lsu.step(Some(op), &none);
        assert_eq!(lsu.state(), LsuState::Waiting(op));
        assert!(lsu.request().read_valid);

        // No ack yet: keep waiting
        lsu.step(Some(op), &none);
        assert_eq!(lsu.state().code(), 2);

        lsu.step(Some(op), &read_ack(77));
        assert_eq!(lsu.completed(), Some(77));
        assert!(!lsu.request().is_active());

        lsu.step(None, &none);
        assert_eq!(lsu.state(), LsuState::Idle);
        assert_eq!(lsu.completed(), None);
    }

    #[test]
    fn test_store_needs_write_ack() {
        let mut lsu = LoadStoreUnit::new();
        let op = MemOp::Store { addr: 3, data: 9 };

        lsu.step(Some(op), &DataResponse::default());
        assert_eq!(lsu.request(), DataRequest::write(3, 9));
        lsu.step(None, &DataResponse::default());

        // A read ack does not complete a store
        lsu.step(None, &read_ack(1));
        assert_eq!(lsu.state().code(), 2);

        lsu.step(None, &DataResponse { write_ack: true, ..Default::default() });
        assert_eq!(lsu.completed(), Some(0));
    }

    #[test]
    fn test_ack_ignored_while_requesting() {
        let mut lsu = LoadStoreUnit::new();
        lsu.step(Some(MemOp::Load { addr: 0 }), &DataResponse::default());
        lsu.step(None, &read_ack(5));
        assert!(matches!(lsu.state(), LsuState::Waiting(_)));
    }

    #[test]
    fn test_idle_without_op() {
        let mut lsu = LoadStoreUnit::new();
        lsu.step(None, &read_ack(5));
        assert_eq!(lsu.state(), LsuState::Idle);
        assert_eq!(lsu.request(), DataRequest::default());
    }
}
