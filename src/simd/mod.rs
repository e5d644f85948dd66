//! SIMD engine and its per-lane and per-wave subunits.
//!
//! - [`registers`]: per-thread register file with the kernel-derived R28-R31
//! - [`pc`]: program counters, one per wave context
//! - [`fetcher`]: program memory handshake
//! - [`lsu`]: per-lane data memory handshake
//! - [`engine`]: the pipeline FSM tying them together
//!
//! # Example
//!
//! ```ignore
//! let mut simd = SimdEngine::new(0, &GpuConfig::default());
//! simd.step(Some(WaveAssignment { wave_id: 0, block }));
//! while !simd.done() {
//!     let rsp = simd.sample_memory(&mut prog, &mut data, 0, 0);
//!     simd.step(None);
//!     simd.latch(rsp);
//! }
//! ```

pub mod engine;
pub mod fetcher;
pub mod lsu;
pub mod pc;
pub mod registers;

pub use engine::{PortResponses, SimdEngine, SimdState, SimdStats, WaveAssignment};
pub use fetcher::{Fetcher, FetcherState};
pub use lsu::{LoadStoreUnit, LsuState, MemOp};
pub use pc::{PcBank, PcControl};
pub use registers::{RegisterFile, ThreadCoords};
