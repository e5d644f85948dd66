//! Compute unit: a wave dispatcher and the SIMD engines it feeds.

use smallvec::SmallVec;

use crate::config::GpuConfig;
use crate::dispatch::{SlotEvents, WaveDispatcher};
use crate::kernel::BlockInfo;
use crate::simd::{SimdEngine, WaveAssignment};

/// One compute unit.
pub struct ComputeUnit {
    index: usize,
    wave_dispatcher: WaveDispatcher,
    simds: Vec<SimdEngine>,
}

impl ComputeUnit {
    /// Create compute unit `index`. Its SIMD engines get global indices
    /// `index * num_simds ..`.
    pub fn new(index: usize, config: &GpuConfig) -> Self {
        let simds = (0..config.num_simds)
            .map(|s| SimdEngine::new(index * config.num_simds + s, config))
            .collect();
        Self {
            index,
            wave_dispatcher: WaveDispatcher::new(config.num_simds, config.wave_size),
            simds,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn reset(&mut self) {
        self.wave_dispatcher.reset();
        for simd in &mut self.simds {
            simd.reset();
        }
    }

    /// Advance one edge.
    ///
    /// `core_start` is the block dispatcher's start pulse as seen before the
    /// edge. A start loads the block into the wave dispatcher instead of
    /// stepping it. Returns the wave dispatch events.
    pub fn step(&mut self, core_start: Option<BlockInfo>) -> SlotEvents {
        let starts: SmallVec<[Option<WaveAssignment>; 8]> =
            (0..self.simds.len()).map(|s| self.wave_dispatcher.starting_wave(s)).collect();
        let dones: SmallVec<[bool; 8]> = self.simds.iter().map(SimdEngine::done).collect();

        let events = match core_start {
            Some(block) => {
                log::debug!("core {} starts block {}", self.index, block.block_id);
                self.wave_dispatcher.load_block(block);
                SlotEvents::new()
            }
            None => self.wave_dispatcher.step(|s| dones[s]),
        };

        for (simd, start) in self.simds.iter_mut().zip(starts) {
            simd.step(start);
        }
        events
    }

    /// `core_done`: the wave dispatcher's registered `block_done`.
    pub fn block_done(&self) -> bool {
        self.wave_dispatcher.block_done()
    }

    pub fn wave_dispatcher(&self) -> &WaveDispatcher {
        &self.wave_dispatcher
    }

    pub fn simds(&self) -> &[SimdEngine] {
        &self.simds
    }

    pub fn simds_mut(&mut self) -> &mut [SimdEngine] {
        &mut self.simds
    }

    pub fn simd(&self, index: usize) -> Option<&SimdEngine> {
        self.simds.get(index)
    }

    /// Does any SIMD engine hold a wave?
    pub fn is_busy(&self) -> bool {
        self.simds.iter().any(|s| !s.is_idle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::SimdState;

    #[test]
    fn test_start_loads_block() {
        let config = GpuConfig::default();
        let mut cu = ComputeUnit::new(1, &config);
        assert_eq!(cu.simd(1).unwrap().index(), 3);

        let block = BlockInfo { block_id: 5, block_dim: 64, thread_count: 64 };
        cu.step(Some(block));
        assert_eq!(cu.wave_dispatcher().num_waves_in_block(), 2);
        assert_eq!(cu.wave_dispatcher().waves_dispatched(), 0);
        assert!(!cu.is_busy());

        let events = cu.step(None);
        assert_eq!(events.len(), 2);
        assert!(cu.wave_dispatcher().simd_start(0));
        assert!(!cu.is_busy());

        // SIMDs take the start pulse on the following edge
        cu.step(None);
        assert!(cu.simds().iter().all(|s| s.state() == SimdState::Fetch));
        assert_eq!(cu.simd(1).unwrap().wave().map(|w| w.wave_id), Some(1));
    }

    #[test]
    fn test_reset_drops_block() {
        let mut cu = ComputeUnit::new(0, &GpuConfig::default());
        cu.step(Some(BlockInfo { block_id: 0, block_dim: 32, thread_count: 32 }));
        cu.step(None);
        cu.step(None);
        assert!(cu.is_busy());

        cu.reset();
        assert!(!cu.is_busy());
        assert!(cu.wave_dispatcher().block().is_none());
        assert!(!cu.block_done());
    }
}
