//! Program counter bank.
//!
//! One PC per wave context. A SIMD engine may run several waves over its
//! lifetime, so the PC is looked up by context rather than by engine.

/// Control inputs sampled on a clock edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PcControl {
    /// Context the other two signals apply to.
    pub active_context: usize,
    /// A new wave starts in this context; PC goes to 0.
    pub dispatch_new_wave: bool,
    /// Advance the PC by one instruction.
    pub update_pc: bool,
}

/// Per-context program counters.
#[derive(Debug, Clone)]
pub struct PcBank {
    pcs: Vec<u32>,
}

impl PcBank {
    /// Create a bank with `num_contexts` entries (at least one).
    pub fn new(num_contexts: usize) -> Self {
        Self { pcs: vec![0; num_contexts.max(1)] }
    }

    /// Number of contexts.
    pub fn num_contexts(&self) -> usize {
        self.pcs.len()
    }

    /// Context a wave id maps to.
    pub fn context_for(&self, wave_id: u32) -> usize {
        wave_id as usize % self.pcs.len()
    }

    /// Zero every entry.
    pub fn reset(&mut self) {
        self.pcs.fill(0);
    }

    /// Start a new wave in `ctx`.
    pub fn reset_to_zero(&mut self, ctx: usize) {
        let idx = self.index(ctx);
        self.pcs[idx] = 0;
    }

    /// Advance `ctx` by one instruction.
    pub fn increment(&mut self, ctx: usize) {
        let idx = self.index(ctx);
        self.pcs[idx] = self.pcs[idx].wrapping_add(1);
    }

    /// Current PC of `ctx`.
    pub fn pc(&self, ctx: usize) -> u32 {
        self.pcs[self.index(ctx)]
    }

    /// Apply one edge of control signals. Dispatch wins over update.
    pub fn step(&mut self, control: PcControl) {
        if control.dispatch_new_wave {
            self.reset_to_zero(control.active_context);
        } else if control.update_pc {
            self.increment(control.active_context);
        }
    }

    fn index(&self, ctx: usize) -> usize {
        ctx % self.pcs.len()
    }
}
