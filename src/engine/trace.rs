//! Scheduler event trace.

use std::collections::VecDeque;

/// Scheduling events recorded by the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuEvent {
    /// Block handed to a compute unit.
    BlockDispatched { core: usize, block_id: u32 },
    /// Compute unit reported its block done.
    BlockRetired { core: usize, block_id: u32 },
    /// Wave handed to a SIMD engine of `core`.
    WaveDispatched { core: usize, simd: usize, wave_id: u32 },
    /// SIMD engine reported its wave done.
    WaveRetired { core: usize, simd: usize, wave_id: u32 },
    /// `kernel_done` rose.
    KernelDone,
}

impl GpuEvent {
    /// Compute unit the event belongs to; None for kernel-wide events.
    pub fn core(&self) -> Option<usize> {
        match *self {
            GpuEvent::BlockDispatched { core, .. }
            | GpuEvent::BlockRetired { core, .. }
            | GpuEvent::WaveDispatched { core, .. }
            | GpuEvent::WaveRetired { core, .. } => Some(core),
            GpuEvent::KernelDone => None,
        }
    }
}

/// An event with the cycle it happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedEvent {
    pub cycle: u64,
    pub event: GpuEvent,
}

/// Events kept when no capacity is given.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Ring of the most recent scheduling events. Off until [`EventLog::enable`].
#[derive(Debug, Clone)]
pub struct EventLog {
    events: VecDeque<TimestampedEvent>,
    capacity: usize,
    enabled: bool,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self::bounded(DEFAULT_EVENT_CAPACITY)
    }

    /// Log keeping at most `capacity` events.
    pub fn bounded(capacity: usize) -> Self {
        Self { events: VecDeque::new(), capacity, enabled: false }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn record(&mut self, cycle: u64, event: GpuEvent) {
        if !self.enabled {
            return;
        }
        self.events.push_back(TimestampedEvent { cycle, event });
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &TimestampedEvent> {
        self.events.iter()
    }

    /// Events involving compute unit `core`.
    pub fn for_core(&self, core: usize) -> impl Iterator<Item = &TimestampedEvent> {
        self.events.iter().filter(move |e| e.event.core() == Some(core))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_by_default() {
        let mut log = EventLog::new();
        log.record(0, GpuEvent::KernelDone);
        assert!(log.is_empty());
    }

    #[test]
    fn test_oldest_dropped() {
        let mut log = EventLog::bounded(2);
        log.enable();
        for cycle in 0..3 {
            log.record(cycle, GpuEvent::BlockDispatched { core: 0, block_id: cycle as u32 });
        }
        let cycles: Vec<u64> = log.events().map(|e| e.cycle).collect();
        assert_eq!(cycles, vec![1, 2]);
    }

    #[test]
    fn test_filter_by_core() {
        let mut log = EventLog::new();
        log.enable();
        log.record(0, GpuEvent::BlockDispatched { core: 0, block_id: 0 });
        log.record(0, GpuEvent::BlockDispatched { core: 1, block_id: 1 });
        log.record(9, GpuEvent::KernelDone);

        let core1: Vec<u64> = log.for_core(1).map(|e| e.cycle).collect();
        assert_eq!(core1, vec![0]);
        assert_eq!(log.len(), 3);
    }
}
