//! Wave dispatcher: splits a compute unit's block into waves for its SIMD engines.

use crate::kernel::{BlockInfo, INVALID_WAVE_ID};
use crate::simd::WaveAssignment;

use super::{SlotEventKind, SlotEvents, SlotState, SlotTable};

/// Per compute unit scheduler. One slot per SIMD engine.
#[derive(Debug, Clone)]
pub struct WaveDispatcher {
    table: SlotTable,
    wave_size: u32,
    block: Option<BlockInfo>,
    block_done: bool,
}

impl WaveDispatcher {
    pub fn new(num_simds: usize, wave_size: u32) -> Self {
        Self { table: SlotTable::new(num_simds), wave_size, block: None, block_done: false }
    }

    /// Drop the block and return to the reset state.
    pub fn reset(&mut self) {
        self.table.reset(0);
        self.block = None;
        self.block_done = false;
    }

    /// Latch a new block (on `core_start`).
    ///
    /// Clears the wave counters and `block_done`, and frees every SIMD slot.
    pub fn load_block(&mut self, block: BlockInfo) {
        self.table.reset(block.num_waves(self.wave_size));
        self.block = Some(block);
        self.block_done = false;
        log::debug!(
            "block {} loaded: {} threads in {} waves",
            block.block_id,
            block.thread_count,
            self.table.total()
        );
    }

    /// Advance one edge. `simd_done(i)` is SIMD `i`'s done output.
    pub fn step(&mut self, simd_done: impl Fn(usize) -> bool) -> SlotEvents {
        if self.block.is_none() {
            return SlotEvents::new();
        }

        let finished = self.table.all_done();
        let events = self.table.step(simd_done);
        self.block_done = finished;

        for event in &events {
            if let SlotEventKind::Assigned(id) = event.kind {
                log::trace!("wave {} -> SIMD {}", id, event.slot);
            }
        }
        events
    }

    pub fn block(&self) -> Option<&BlockInfo> {
        self.block.as_ref()
    }

    pub fn num_simds(&self) -> usize {
        self.table.slots().len()
    }

    pub fn num_waves_in_block(&self) -> u32 {
        self.table.total()
    }

    pub fn waves_dispatched(&self) -> u32 {
        self.table.dispatched()
    }

    pub fn waves_done(&self) -> u32 {
        self.table.done()
    }

    /// Registered: rises the edge after every wave is done, holds until the
    /// next `load_block` or reset.
    pub fn block_done(&self) -> bool {
        self.block_done
    }

    pub fn slot(&self, simd: usize) -> SlotState {
        self.table.slot(simd).unwrap_or_default()
    }

    pub fn simd_ready(&self, simd: usize) -> bool {
        self.slot(simd).ready()
    }

    pub fn simd_start(&self, simd: usize) -> bool {
        self.slot(simd).start()
    }

    pub fn simd_working(&self, simd: usize) -> bool {
        self.slot(simd).working()
    }

    /// Wave id shown to `simd`, or [`INVALID_WAVE_ID`].
    pub fn simd_wave_id(&self, simd: usize) -> u32 {
        self.slot(simd).id().unwrap_or(INVALID_WAVE_ID)
    }

    /// Wave being started on `simd` this cycle.
    pub fn starting_wave(&self, simd: usize) -> Option<WaveAssignment> {
        match (self.slot(simd), self.block) {
            (SlotState::Starting(wave_id), Some(block)) => Some(WaveAssignment { wave_id, block }),
            _ => None,
        }
    }
}
