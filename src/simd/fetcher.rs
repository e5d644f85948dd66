//! Instruction fetcher.
//!
//! Requests the word at the current PC while its SIMD engine is in `FETCH`
//! and holds it until the engine takes it.

use crate::memory::{ProgramRequest, ProgramResponse};

/// Fetcher state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetcherState {
    #[default]
    Idle,
    Requesting { pc: u32 },
    Fetched { pc: u32, word: u32 },
}

impl FetcherState {
    /// 2-bit hardware encoding.
    pub fn code(&self) -> u8 {
        match self {
            FetcherState::Idle => 0,
            FetcherState::Requesting { .. } => 1,
            FetcherState::Fetched { .. } => 2,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    state: FetcherState,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FetcherState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = FetcherState::Idle;
    }

    /// Registered request presented to program memory.
    pub fn request(&self) -> ProgramRequest {
        match self.state {
            FetcherState::Requesting { pc } => ProgramRequest { valid: true, addr: pc },
            _ => ProgramRequest::default(),
        }
    }

    /// Word waiting for the engine, if any.
    pub fn fetched(&self) -> Option<u32> {
        match self.state {
            FetcherState::Fetched { word, .. } => Some(word),
            _ => None,
        }
    }

    /// Advance one edge.
    ///
    /// `fetching` is true while the engine is in `FETCH`; an engine that sees
    /// `Fetched` on the same edge takes the word.
    pub fn step(&mut self, fetching: bool, pc: u32, response: &ProgramResponse) {
        self.state = match self.state {
            FetcherState::Idle if fetching => FetcherState::Requesting { pc },
            FetcherState::Idle => FetcherState::Idle,
            FetcherState::Requesting { pc } if response.ack => FetcherState::Fetched { pc, word: response.data },
            FetcherState::Requesting { pc } => FetcherState::Requesting { pc },
            FetcherState::Fetched { .. } if fetching => FetcherState::Idle,
            held @ FetcherState::Fetched { .. } => held,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_sequence() {
        let mut f = Fetcher::new();
        let none = ProgramResponse::default();

        f.step(true, 4, &none);
        assert_eq!(f.request(), ProgramRequest { valid: true, addr: 4 });

        // Stall until ack
        f.step(true, 4, &none);
        assert_eq!(f.state().code(), 1);

        f.step(true, 4, &ProgramResponse { ack: true, data: 0xFC00_0000 });
        assert_eq!(f.fetched(), Some(0xFC00_0000));
        assert!(!f.request().valid);

        f.step(true, 4, &none);
        assert_eq!(f.state(), FetcherState::Idle);
    }

    #[test]
    fn test_idle_when_not_fetching() {
        let mut f = Fetcher::new();
        f.step(false, 0, &ProgramResponse { ack: true, data: 1 });
        assert_eq!(f.state(), FetcherState::Idle);
    }

    #[test]
    fn test_word_held_until_taken() {
        let mut f = Fetcher::new();
        f.step(true, 0, &ProgramResponse::default());
        f.step(true, 0, &ProgramResponse { ack: true, data: 5 });
        f.step(false, 0, &ProgramResponse::default());
        assert_eq!(f.fetched(), Some(5));
    }
}
