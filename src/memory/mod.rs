//! Memory handshake interfaces.
//!
//! Program and data memory are external collaborators. The core only sees
//! them through a valid/ack handshake: a requester drives a request, the
//! memory model samples it on a clock edge and its response becomes visible
//! to the requester on the following cycle.
//!
//! - [`ProgramMemory`]: one read-only port per instruction fetcher
//! - [`DataMemory`]: one read/write port per physical lane
//! - [`FlatMemory`]: word-addressed model implementing both

pub mod flat;

pub use flat::FlatMemory;

/// Identifies a requester port on a memory model.
pub type PortId = usize;

/// Fetcher → program memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramRequest {
    /// Read request asserted.
    pub valid: bool,
    /// Word address (the program counter).
    pub addr: u32,
}

/// Program memory → fetcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgramResponse {
    /// Read acknowledged; `data` is meaningful.
    pub ack: bool,
    /// Instruction word.
    pub data: u32,
}

/// LSU → data memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataRequest {
    /// Word address.
    pub addr: u32,
    /// Store data (valid with `write_valid`).
    pub write_data: u32,
    /// Load requested.
    pub read_valid: bool,
    /// Store requested.
    pub write_valid: bool,
}

impl DataRequest {
    /// A load from `addr`.
    pub fn read(addr: u32) -> Self {
        Self { addr, read_valid: true, ..Self::default() }
    }

    /// A store of `data` to `addr`.
    pub fn write(addr: u32, data: u32) -> Self {
        Self { addr, write_data: data, write_valid: true, ..Self::default() }
    }

    /// Is either request line asserted?
    pub fn is_active(&self) -> bool {
        self.read_valid || self.write_valid
    }
}

/// Data memory → LSU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataResponse {
    /// Load data (valid with `read_ack`).
    pub read_data: u32,
    /// Load acknowledged.
    pub read_ack: bool,
    /// Store committed.
    pub write_ack: bool,
}

/// A program memory model.
///
/// Called once per port per clock edge with the request the port is
/// currently driving. The returned response is latched and presented to
/// the port during the next cycle.
pub trait ProgramMemory {
    /// Sample one port's request.
    fn respond(&mut self, port: PortId, request: &ProgramRequest) -> ProgramResponse;
}

/// A data memory model.
///
/// Same timing contract as [`ProgramMemory`]. Ports are sampled in
/// ascending order within an edge.
pub trait DataMemory {
    /// Sample one port's request.
    fn respond(&mut self, port: PortId, request: &DataRequest) -> DataResponse;
}
