//! Top-level GPU coordinator.

use crate::config::{ConfigError, GpuConfig};
use crate::dispatch::{BlockDispatcher, SlotEventKind, SlotEvents};
use crate::kernel::{BlockInfo, KernelLaunch};
use crate::memory::{DataMemory, FlatMemory, ProgramMemory};
use crate::simd::{PortResponses, SimdStats};

use super::compute_unit::ComputeUnit;
use super::trace::{EventLog, GpuEvent};

/// GPU execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuStatus {
    /// Launched (or reset) but not stepped yet.
    #[default]
    Ready,
    /// At least one edge taken and the kernel is not done.
    Running,
    /// `kernel_done` is high.
    KernelDone,
}

/// Outcome of [`Gpu::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Cycles executed by this call.
    pub cycles: u64,
    pub kernel_done: bool,
    pub blocks_done: u32,
    /// Instructions retired by all SIMD engines (per wave, not per thread).
    pub instructions: u64,
}

/// The whole GPU: block dispatcher, compute units and the two memories.
///
/// Each [`step`](Gpu::step) is one rising clock edge. Every unit computes its
/// next state from the outputs its peers had before the edge:
///
/// 1. memory samples the registered requests of every fetcher and LSU
/// 2. the block dispatcher steps on each compute unit's `block_done`
/// 3. each compute unit steps on the `core_start` it saw before the edge
/// 4. memory responses are latched into the requesters
pub struct Gpu<P = FlatMemory, M = FlatMemory>
where
    P: ProgramMemory,
    M: DataMemory,
{
    config: GpuConfig,
    block_dispatcher: BlockDispatcher,
    cores: Vec<ComputeUnit>,
    program_memory: P,
    data_memory: M,
    enabled: bool,
    status: GpuStatus,
    total_cycles: u64,
    events: EventLog,
}

impl Gpu<FlatMemory, FlatMemory> {
    /// Create a GPU backed by [`FlatMemory`] sized and timed by `config`.
    pub fn with_flat_memory(config: GpuConfig) -> Result<Self, ConfigError> {
        let program = FlatMemory::with_latency(config.program_memory_words, config.memory_latency);
        let data = FlatMemory::with_latency(config.data_memory_words, config.memory_latency);
        Self::new(config, program, data)
    }
}

impl<P, M> Gpu<P, M>
where
    P: ProgramMemory,
    M: DataMemory,
{
    /// Create a GPU with the given memories. Fails on invalid geometry.
    pub fn new(config: GpuConfig, program_memory: P, data_memory: M) -> Result<Self, ConfigError> {
        config.validate()?;
        let cores = (0..config.num_cores).map(|c| ComputeUnit::new(c, &config)).collect();
        Ok(Self {
            config,
            block_dispatcher: BlockDispatcher::new(config.num_cores),
            cores,
            program_memory,
            data_memory,
            enabled: false,
            status: GpuStatus::Ready,
            total_cycles: 0,
            events: EventLog::new(),
        })
    }

    /// Latch a launch, reset everything and enable the clock.
    pub fn launch(&mut self, launch: KernelLaunch) {
        log::info!(
            "launch: {} threads, block_dim {}, {} blocks on {} cores",
            launch.num_threads(),
            launch.block_dim(),
            launch.num_blocks(),
            self.config.num_cores
        );
        self.block_dispatcher.launch(launch);
        self.reset();
        self.enabled = true;
    }

    /// Global reset. The latched launch and memory contents are kept.
    pub fn reset(&mut self) {
        self.block_dispatcher.reset();
        for core in &mut self.cores {
            core.reset();
        }
        self.status = GpuStatus::Ready;
        self.total_cycles = 0;
        self.events.clear();
    }

    /// Gate the clock. A disabled GPU ignores [`step`](Gpu::step).
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Advance one clock edge.
    pub fn step(&mut self) {
        if !self.enabled {
            return;
        }
        let cycle = self.total_cycles;
        let lane_width = self.config.lane_width as usize;

        // 1. Memory sees last edge's registered requests
        let mut responses: Vec<PortResponses> = Vec::with_capacity(self.config.total_simds());
        for core in &self.cores {
            for simd in core.simds() {
                let port = simd.index();
                responses.push(simd.sample_memory(
                    &mut self.program_memory,
                    &mut self.data_memory,
                    port,
                    port * lane_width,
                ));
            }
        }

        // Peer outputs before the edge
        let core_done: Vec<bool> = self.cores.iter().map(ComputeUnit::block_done).collect();
        let core_start: Vec<Option<BlockInfo>> =
            (0..self.cores.len()).map(|c| self.block_dispatcher.starting_block(c)).collect();

        // 2. Block dispatch
        let block_events = self.block_dispatcher.step(|c| core_done[c]);
        self.record_block_events(cycle, &block_events);

        // 3. Compute units
        for (c, start) in core_start.into_iter().enumerate() {
            let wave_events = self.cores[c].step(start);
            self.record_wave_events(cycle, c, &wave_events);
        }

        // 4. Latch responses
        let mut responses = responses.into_iter();
        for core in &mut self.cores {
            for simd in core.simds_mut() {
                if let Some(rsp) = responses.next() {
                    simd.latch(rsp);
                }
            }
        }

        self.total_cycles += 1;

        if self.block_dispatcher.kernel_done() {
            if self.status != GpuStatus::KernelDone {
                log::info!("kernel done after {} cycles", self.total_cycles);
                self.events.record(cycle, GpuEvent::KernelDone);
            }
            self.status = GpuStatus::KernelDone;
        } else {
            self.status = GpuStatus::Running;
        }
    }

    /// Run until `kernel_done` or for at most `max_cycles` edges.
    pub fn run(&mut self, max_cycles: u64) -> RunSummary {
        let start = self.total_cycles;

        for _ in 0..max_cycles {
            if self.kernel_done() || !self.enabled {
                break;
            }
            self.step();
        }

        let summary = RunSummary {
            cycles: self.total_cycles - start,
            kernel_done: self.kernel_done(),
            blocks_done: self.blocks_done(),
            instructions: self.simd_stats().instructions,
        };
        if !summary.kernel_done {
            log::warn!(
                "kernel not done after {} cycles ({}/{} blocks)",
                summary.cycles,
                summary.blocks_done,
                self.block_dispatcher.num_blocks()
            );
        }
        summary
    }

    pub fn config(&self) -> &GpuConfig {
        &self.config
    }

    pub fn status(&self) -> GpuStatus {
        self.status
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn kernel_done(&self) -> bool {
        self.block_dispatcher.kernel_done()
    }

    pub fn blocks_dispatched(&self) -> u32 {
        self.block_dispatcher.blocks_dispatched()
    }

    pub fn blocks_done(&self) -> u32 {
        self.block_dispatcher.blocks_done()
    }

    pub fn block_dispatcher(&self) -> &BlockDispatcher {
        &self.block_dispatcher
    }

    pub fn cores(&self) -> &[ComputeUnit] {
        &self.cores
    }

    pub fn core(&self, index: usize) -> Option<&ComputeUnit> {
        self.cores.get(index)
    }

    pub fn program_memory(&self) -> &P {
        &self.program_memory
    }

    pub fn program_memory_mut(&mut self) -> &mut P {
        &mut self.program_memory
    }

    pub fn data_memory(&self) -> &M {
        &self.data_memory
    }

    pub fn data_memory_mut(&mut self) -> &mut M {
        &mut self.data_memory
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventLog {
        &mut self.events
    }

    /// Statistics summed over every SIMD engine.
    pub fn simd_stats(&self) -> SimdStats {
        self.cores.iter().flat_map(|c| c.simds()).fold(SimdStats::default(), |mut acc, simd| {
            let s = simd.stats();
            acc.busy_cycles += s.busy_cycles;
            acc.instructions += s.instructions;
            acc.stall_cycles += s.stall_cycles;
            acc.decode_errors += s.decode_errors;
            acc.waves += s.waves;
            acc
        })
    }

    /// Status as string for display.
    pub fn status_string(&self) -> &'static str {
        match self.status {
            GpuStatus::Ready => "Ready",
            GpuStatus::Running => "Running",
            GpuStatus::KernelDone => "KernelDone",
        }
    }

    fn record_block_events(&mut self, cycle: u64, events: &SlotEvents) {
        for e in events {
            let event = match e.kind {
                SlotEventKind::Assigned(block_id) => GpuEvent::BlockDispatched { core: e.slot, block_id },
                SlotEventKind::Completed(block_id) => GpuEvent::BlockRetired { core: e.slot, block_id },
            };
            self.events.record(cycle, event);
        }
    }

    fn record_wave_events(&mut self, cycle: u64, core: usize, events: &SlotEvents) {
        for e in events {
            let event = match e.kind {
                SlotEventKind::Assigned(wave_id) => GpuEvent::WaveDispatched { core, simd: e.slot, wave_id },
                SlotEventKind::Completed(wave_id) => GpuEvent::WaveRetired { core, simd: e.slot, wave_id },
            };
            self.events.record(cycle, event);
        }
    }
}
