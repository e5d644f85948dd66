//! Block dispatcher: hands the blocks of a launch to compute units.

use crate::kernel::{BlockInfo, KernelLaunch, INVALID_BLOCK_ID};

use super::{SlotEventKind, SlotEvents, SlotState, SlotTable};

/// Top-level scheduler. One slot per compute unit.
#[derive(Debug, Clone)]
pub struct BlockDispatcher {
    table: SlotTable,
    launch: Option<KernelLaunch>,
    kernel_done: bool,
}

impl BlockDispatcher {
    pub fn new(num_cores: usize) -> Self {
        Self { table: SlotTable::new(num_cores), launch: None, kernel_done: false }
    }

    /// Latch a launch and reset.
    pub fn launch(&mut self, launch: KernelLaunch) {
        self.launch = Some(launch);
        self.reset();
    }

    /// Every compute unit idle, counters and `kernel_done` cleared.
    ///
    /// The latched launch is kept; without one the dispatcher stays idle.
    pub fn reset(&mut self) {
        let total = self.launch.map(|l| l.num_blocks()).unwrap_or(0);
        self.table.reset(total);
        self.kernel_done = false;
    }

    /// Advance one edge. `core_done(i)` is compute unit `i`'s `block_done`.
    pub fn step(&mut self, core_done: impl Fn(usize) -> bool) -> SlotEvents {
        if self.launch.is_none() {
            return SlotEvents::new();
        }

        let finished = self.table.all_done();
        let events = self.table.step(core_done);
        self.kernel_done = finished;

        for event in &events {
            match event.kind {
                SlotEventKind::Assigned(id) => log::debug!("block {} -> core {}", id, event.slot),
                SlotEventKind::Completed(id) => log::debug!("core {} finished block {}", event.slot, id),
            }
        }
        events
    }

    pub fn launch_params(&self) -> Option<&KernelLaunch> {
        self.launch.as_ref()
    }

    pub fn num_cores(&self) -> usize {
        self.table.slots().len()
    }

    pub fn num_blocks(&self) -> u32 {
        self.table.total()
    }

    pub fn blocks_dispatched(&self) -> u32 {
        self.table.dispatched()
    }

    pub fn blocks_done(&self) -> u32 {
        self.table.done()
    }

    /// Registered: rises the edge after every block is done, holds until reset.
    pub fn kernel_done(&self) -> bool {
        self.kernel_done
    }

    pub fn slot(&self, core: usize) -> SlotState {
        self.table.slot(core).unwrap_or_default()
    }

    pub fn core_ready(&self, core: usize) -> bool {
        self.slot(core).ready()
    }

    pub fn core_start(&self, core: usize) -> bool {
        self.slot(core).start()
    }

    /// Block id shown to `core`, or [`INVALID_BLOCK_ID`].
    pub fn core_block_id(&self, core: usize) -> u32 {
        self.slot(core).id().unwrap_or(INVALID_BLOCK_ID)
    }

    /// Block being started on `core` this cycle.
    pub fn starting_block(&self, core: usize) -> Option<BlockInfo> {
        match self.slot(core) {
            SlotState::Starting(id) => self.launch.and_then(|l| l.block(id)),
            _ => None,
        }
    }
}
