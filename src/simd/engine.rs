//! SIMD execution engine.
//!
//! Runs one wave at a time over `lane_width` physical lanes. A wave of
//! `wave_size` threads takes `wave_size / lane_width` wave cycles per
//! instruction: the instruction is fetched and decoded once, then
//! REQUEST → (WAIT) → EXECUTE → UPDATE repeats for each wave cycle.
//!
//! ```text
//!  IDLE --start--> FETCH --word--> DECODE --> REQUEST --mem--> WAIT
//!   ^                ^                          |  ^             |
//!   |                |                          v  |             v
//!  DONE <--RET-- UPDATE <------------------- EXECUTE <-----------+
//!                    |  more wave cycles: back to REQUEST
//! ```
//!
//! The engine never touches memory itself. Its fetcher and LSUs present
//! registered requests that the owner samples with [`SimdEngine::sample_memory`]
//! and hands back through [`SimdEngine::latch`] at the end of the edge.

use smallvec::SmallVec;

use crate::config::GpuConfig;
use crate::isa::Instruction;
use crate::kernel::BlockInfo;
use crate::memory::{DataMemory, DataRequest, DataResponse, PortId, ProgramMemory, ProgramRequest, ProgramResponse};

use super::fetcher::Fetcher;
use super::lsu::{LoadStoreUnit, MemOp};
use super::pc::{PcBank, PcControl};
use super::registers::{RegisterFile, ThreadCoords};

/// Pipeline state with its 3-bit hardware encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SimdState {
    #[default]
    Idle = 0,
    Fetch = 1,
    Decode = 2,
    Request = 3,
    Wait = 4,
    Execute = 5,
    Update = 6,
    Done = 7,
}

impl SimdState {
    /// 3-bit encoding.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// A wave handed to the engine by its wave dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveAssignment {
    /// Wave id within the block.
    pub wave_id: u32,
    /// Block the wave belongs to.
    pub block: BlockInfo,
}

/// Memory responses for one engine, latched at the end of an edge.
#[derive(Debug, Clone, Default)]
pub struct PortResponses {
    pub fetch: ProgramResponse,
    pub lanes: SmallVec<[DataResponse; 16]>,
}

/// Counters kept by each engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimdStats {
    /// Cycles spent outside IDLE.
    pub busy_cycles: u64,
    /// Instructions retired (counted once per instruction, not per wave cycle).
    pub instructions: u64,
    /// Cycles spent waiting on program or data memory.
    pub stall_cycles: u64,
    /// Words that did not decode and ran as no-ops.
    pub decode_errors: u64,
    /// Waves run to completion.
    pub waves: u64,
}

/// Per-lane operands and result latched between pipeline stages.
#[derive(Debug, Clone, Copy, Default)]
struct LaneLatch {
    first: u32,
    second: u32,
    pending: Option<MemOp>,
    result: u32,
}

/// One SIMD engine and its private subunits.
pub struct SimdEngine {
    /// Global index across the GPU (selects memory ports).
    index: usize,
    wave_size: u32,
    lane_width: u32,
    state: SimdState,
    wave: Option<WaveAssignment>,
    wave_cycle: u32,
    /// Fetched word, held through DECODE.
    word: u32,
    /// Decoded instruction; None for an undecodable word.
    instruction: Option<Instruction>,
    fetcher: Fetcher,
    pc_bank: PcBank,
    /// One register file per thread of the wave, indexed `wave_cycle * lane_width + lane`.
    registers: Vec<RegisterFile>,
    lsus: SmallVec<[LoadStoreUnit; 16]>,
    lanes: SmallVec<[LaneLatch; 16]>,
    /// Responses latched on the previous edge.
    responses: PortResponses,
    stats: SimdStats,
}

impl SimdEngine {
    /// Create engine number `index` with the geometry of `config`.
    pub fn new(index: usize, config: &GpuConfig) -> Self {
        let lane_width = config.lane_width.max(1);
        let lanes = lane_width as usize;
        let threads = (config.wave_size.div_ceil(lane_width) * lane_width) as usize;
        Self {
            index,
            wave_size: config.wave_size,
            lane_width,
            state: SimdState::Idle,
            wave: None,
            wave_cycle: 0,
            word: 0,
            instruction: None,
            fetcher: Fetcher::new(),
            pc_bank: PcBank::new(config.num_pc_contexts),
            registers: vec![RegisterFile::new(); threads],
            lsus: (0..lanes).map(|_| LoadStoreUnit::new()).collect(),
            lanes: SmallVec::from_elem(LaneLatch::default(), lanes),
            responses: PortResponses {
                fetch: ProgramResponse::default(),
                lanes: SmallVec::from_elem(DataResponse::default(), lanes),
            },
            stats: SimdStats::default(),
        }
    }

    /// Global engine index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current pipeline state.
    pub fn state(&self) -> SimdState {
        self.state
    }

    /// `simd_done`: high for the single DONE cycle.
    pub fn done(&self) -> bool {
        self.state == SimdState::Done
    }

    pub fn is_idle(&self) -> bool {
        self.state == SimdState::Idle
    }

    /// Wave currently held, if any.
    pub fn wave(&self) -> Option<&WaveAssignment> {
        self.wave.as_ref()
    }

    pub fn wave_cycle(&self) -> u32 {
        self.wave_cycle
    }

    /// Number of wave cycles per instruction.
    pub fn wave_cycles(&self) -> u32 {
        self.wave_size.div_ceil(self.lane_width)
    }

    /// Instruction in flight, if decoded.
    pub fn instruction(&self) -> Option<&Instruction> {
        self.instruction.as_ref()
    }

    /// PC of the current wave's context.
    pub fn pc(&self) -> Option<u32> {
        self.wave.map(|w| self.pc_bank.pc(self.pc_bank.context_for(w.wave_id)))
    }

    pub fn pc_bank(&self) -> &PcBank {
        &self.pc_bank
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn lsu(&self, lane: usize) -> Option<&LoadStoreUnit> {
        self.lsus.get(lane)
    }

    /// Register file of the thread run in `wave_cycle` on `lane`.
    pub fn register_file(&self, wave_cycle: u32, lane: u32) -> Option<&RegisterFile> {
        self.registers.get((wave_cycle * self.lane_width + lane) as usize)
    }

    pub fn stats(&self) -> &SimdStats {
        &self.stats
    }

    /// Back to IDLE with every subunit cleared.
    pub fn reset(&mut self) {
        self.state = SimdState::Idle;
        self.wave = None;
        self.wave_cycle = 0;
        self.word = 0;
        self.instruction = None;
        self.fetcher.reset();
        self.pc_bank.reset();
        for rf in &mut self.registers {
            *rf = RegisterFile::new();
        }
        for lsu in &mut self.lsus {
            lsu.reset();
        }
        self.lanes.fill(LaneLatch::default());
        self.responses.fetch = ProgramResponse::default();
        self.responses.lanes.fill(DataResponse::default());
        self.stats = SimdStats::default();
    }

    /// Registered program memory request.
    pub fn fetch_request(&self) -> ProgramRequest {
        self.fetcher.request()
    }

    /// Registered data memory request of `lane`.
    pub fn data_request(&self, lane: usize) -> DataRequest {
        self.lsus.get(lane).map(LoadStoreUnit::request).unwrap_or_default()
    }

    /// Present this engine's requests to memory.
    ///
    /// The fetcher uses `fetch_port`; lane `n` uses `data_port_base + n`.
    /// Idle ports are presented too so the memory model sees valid drop.
    pub fn sample_memory<P, M>(
        &self,
        program: &mut P,
        data: &mut M,
        fetch_port: PortId,
        data_port_base: PortId,
    ) -> PortResponses
    where
        P: ProgramMemory + ?Sized,
        M: DataMemory + ?Sized,
    {
        PortResponses {
            fetch: program.respond(fetch_port, &self.fetch_request()),
            lanes: (0..self.lsus.len())
                .map(|lane| data.respond(data_port_base + lane, &self.data_request(lane)))
                .collect(),
        }
    }

    /// Latch memory responses; they are seen on the next edge.
    pub fn latch(&mut self, responses: PortResponses) {
        self.responses = responses;
        self.responses.lanes.resize(self.lsus.len(), DataResponse::default());
    }

    /// Advance one clock edge.
    ///
    /// `start` is the dispatcher's one-cycle start pulse with the wave to run;
    /// it is only taken in IDLE.
    pub fn step(&mut self, start: Option<WaveAssignment>) {
        let prev = self.state;
        if prev != SimdState::Idle {
            self.stats.busy_cycles += 1;
        }

        let next = match prev {
            SimdState::Idle => match start {
                Some(wave) => {
                    self.dispatch(wave);
                    SimdState::Fetch
                }
                None => SimdState::Idle,
            },
            SimdState::Fetch => self.fetch(),
            SimdState::Decode => {
                self.decode();
                SimdState::Request
            }
            SimdState::Request => {
                if self.request() {
                    SimdState::Wait
                } else {
                    SimdState::Execute
                }
            }
            SimdState::Wait => {
                if self.wait() {
                    SimdState::Execute
                } else {
                    SimdState::Wait
                }
            }
            SimdState::Execute => {
                self.execute();
                SimdState::Update
            }
            SimdState::Update => self.update(),
            SimdState::Done => {
                self.wave = None;
                SimdState::Idle
            }
        };

        if next != prev {
            log::trace!("SIMD{} {:?} -> {:?} (pc {:?})", self.index, prev, next, self.pc());
        }
        self.state = next;
    }

    fn context(&self) -> usize {
        self.wave.map(|w| self.pc_bank.context_for(w.wave_id)).unwrap_or(0)
    }

    fn coords(&self, wave: &WaveAssignment, wave_cycle: u32, lane: u32) -> ThreadCoords {
        ThreadCoords {
            block_id: wave.block.block_id,
            block_dim: wave.block.block_dim,
            wave_id: wave.wave_id,
            wave_cycle,
            lane_id: lane,
            wave_size: self.wave_size,
            lane_width: self.lane_width,
        }
    }

    /// Is `lane` running a real thread in the current wave cycle?
    ///
    /// Lanes past the end of the wave or of the block are masked.
    fn lane_active(&self, lane: u32) -> bool {
        let Some(wave) = &self.wave else {
            return false;
        };
        self.wave_cycle * self.lane_width + lane < self.wave_size
            && self.coords(wave, self.wave_cycle, lane).thread_idx() < wave.block.thread_count
    }

    fn dispatch(&mut self, wave: WaveAssignment) {
        let ctx = self.pc_bank.context_for(wave.wave_id);
        self.pc_bank.step(PcControl { active_context: ctx, dispatch_new_wave: true, update_pc: false });

        for wave_cycle in 0..self.wave_cycles() {
            for lane in 0..self.lane_width {
                let coords = self.coords(&wave, wave_cycle, lane);
                if let Some(rf) = self.registers.get_mut((wave_cycle * self.lane_width + lane) as usize) {
                    rf.reset(&coords);
                }
            }
        }

        self.wave = Some(wave);
        self.wave_cycle = 0;
        self.instruction = None;
        self.lanes.fill(LaneLatch::default());
        log::debug!(
            "SIMD{} starts wave {} of block {} ({} threads)",
            self.index,
            wave.wave_id,
            wave.block.block_id,
            wave.block.thread_count
        );
    }

    fn fetch(&mut self) -> SimdState {
        let fetched = self.fetcher.fetched();
        let pc = self.pc_bank.pc(self.context());
        self.fetcher.step(true, pc, &self.responses.fetch);

        match fetched {
            Some(word) => {
                self.word = word;
                SimdState::Decode
            }
            None => {
                self.stats.stall_cycles += 1;
                SimdState::Fetch
            }
        }
    }

    fn decode(&mut self) {
        self.instruction = match Instruction::decode(self.word) {
            Ok(ins) => Some(ins),
            Err(e) => {
                log::warn!("SIMD{} pc {:?}: {}, executing as no-op", self.index, self.pc(), e);
                self.stats.decode_errors += 1;
                None
            }
        };
    }

    /// Read operands and latch memory operations. Returns true for memory ops.
    fn request(&mut self) -> bool {
        let Some(ins) = self.instruction else {
            return false;
        };
        let (first, second) = ins.source_registers();

        for lane in 0..self.lane_width {
            let rf = self.registers.get((self.wave_cycle * self.lane_width + lane) as usize);
            let latch = if let Some(rf) = rf.filter(|_| self.lane_active(lane)) {
                let a = first.map(|r| rf.read(r)).unwrap_or(0);
                let b = second.map(|r| rf.read(r)).unwrap_or(0);
                let pending = match ins {
                    Instruction::Ldur { offset, .. } => Some(MemOp::Load { addr: a.wrapping_add(offset as i32 as u32) }),
                    Instruction::Stur { offset, .. } => {
                        Some(MemOp::Store { addr: a.wrapping_add(offset as i32 as u32), data: b })
                    }
                    _ => None,
                };
                LaneLatch { first: a, second: b, pending, result: 0 }
            } else {
                LaneLatch::default()
            };
            self.lanes[lane as usize] = latch;
        }

        ins.is_memory()
    }

    /// Advance the LSUs. Returns true once every active lane has completed.
    fn wait(&mut self) -> bool {
        let mut complete = true;

        for (lane, (lsu, latch)) in self.lsus.iter_mut().zip(self.lanes.iter_mut()).enumerate() {
            if let Some(data) = lsu.completed() {
                latch.result = data;
                latch.pending = None;
            } else if latch.pending.is_some() {
                complete = false;
            }
            lsu.step(latch.pending, &self.responses.lanes[lane]);
        }

        if !complete {
            self.stats.stall_cycles += 1;
        }
        complete
    }

    fn execute(&mut self) {
        let Some(ins) = self.instruction else {
            return;
        };
        for latch in self.lanes.iter_mut() {
            latch.result = match ins {
                Instruction::Add { .. } => latch.first.wrapping_add(latch.second),
                Instruction::Mul { .. } => latch.first.wrapping_mul(latch.second),
                Instruction::Const { imm, .. } => imm as u32,
                // loaded during WAIT
                Instruction::Ldur { .. } => latch.result,
                Instruction::Stur { .. } | Instruction::Ret => 0,
            };
        }
    }

    fn update(&mut self) -> SimdState {
        if let Some(rd) = self.instruction.and_then(|i| i.destination()) {
            for lane in 0..self.lane_width {
                let enabled = self.lane_active(lane);
                let value = self.lanes[lane as usize].result;
                let Some(rf) = self.registers.get_mut((self.wave_cycle * self.lane_width + lane) as usize) else {
                    continue;
                };
                if !rf.write(rd, value, enabled) && enabled {
                    log::trace!("SIMD{} lane {}: write to read-only R{} dropped", self.index, lane, rd);
                }
            }
        }

        if self.wave_cycle + 1 < self.wave_cycles() {
            self.wave_cycle += 1;
            return SimdState::Request;
        }

        self.wave_cycle = 0;
        let ctx = self.context();
        self.pc_bank.step(PcControl { active_context: ctx, dispatch_new_wave: false, update_pc: true });
        self.stats.instructions += 1;

        if self.instruction.is_some_and(|i| i.is_ret()) {
            self.stats.waves += 1;
            if let Some(wave) = &self.wave {
                log::debug!("SIMD{} finished wave {} of block {}", self.index, wave.wave_id, wave.block.block_id);
            }
            SimdState::Done
        } else {
            SimdState::Fetch
        }
    }
}
