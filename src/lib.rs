//! minigpu-emu library
//!
//! Cycle-level model of a miniature GPU compute core: a block dispatcher
//! feeding compute units, per-unit wave dispatchers feeding SIMD engines, and
//! a lockstep fetch/decode/execute pipeline over per-lane register files and
//! load/store units.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod isa;
pub mod kernel;
pub mod memory;
pub mod simd;
