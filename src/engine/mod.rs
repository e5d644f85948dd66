//! GPU top level.
//!
//! The [`Gpu`] owns the block dispatcher, the compute units and both
//! memories, and advances them one clock edge at a time.
//!
//! # Execution Model
//!
//! Units run "conceptually in parallel": each step advances every unit by one
//! edge, and no unit sees a value another unit produced on the same edge.
//!
//! # Example
//!
//! ```ignore
//! use minigpu_emu::engine::Gpu;
//! use minigpu_emu::config::GpuConfig;
//! use minigpu_emu::kernel::KernelLaunch;
//!
//! let mut gpu = Gpu::with_flat_memory(GpuConfig::default())?;
//! gpu.program_memory_mut().write_slice(0, &program);
//! gpu.launch(KernelLaunch::new(64, 32)?);
//!
//! let summary = gpu.run(10_000);
//! assert!(summary.kernel_done);
//! ```

mod compute_unit;
mod coordinator;
mod trace;

pub use compute_unit::ComputeUnit;
pub use coordinator::{Gpu, GpuStatus, RunSummary};
pub use trace::{EventLog, GpuEvent, TimestampedEvent};
