//! Work dispatch.
//!
//! Both levels of the scheduler hand out sequential ids to a fixed set of
//! resources: the [`BlockDispatcher`] gives blocks to compute units, and each
//! compute unit's [`WaveDispatcher`] gives waves to its SIMD engines. They
//! share the slot state machine in [`SlotTable`]:
//!
//! ```text
//!            work left                      done
//!  Idle ---------------> Starting(id) --> Working(id) --------> Retired(id)
//!   ^                        ^                                      |
//!   |     no work left       |             work left                |
//!   +------------------------|--------------------------------------+
//!                            +--------------------------------------+
//! ```
//!
//! `Starting` is the one-cycle start pulse. Done is only sampled in
//! `Working`, so a done flag that is still high from the previous unit of
//! work is never counted twice.

pub mod block;
pub mod wave;

pub use block::BlockDispatcher;
pub use wave::WaveDispatcher;

use smallvec::SmallVec;

/// State of one dispatch slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotState {
    /// No work held.
    #[default]
    Idle,
    /// Start pulse for `id`.
    Starting(u32),
    /// Running `id`.
    Working(u32),
    /// Finished `id`; the id stays visible until replaced.
    Retired(u32),
}

impl SlotState {
    /// Resource can take new work.
    pub fn ready(&self) -> bool {
        matches!(self, SlotState::Idle | SlotState::Retired(_))
    }

    /// One-cycle start pulse.
    pub fn start(&self) -> bool {
        matches!(self, SlotState::Starting(_))
    }

    /// Resource holds work that has not finished.
    pub fn working(&self) -> bool {
        matches!(self, SlotState::Starting(_) | SlotState::Working(_))
    }

    /// Id currently shown on the slot.
    pub fn id(&self) -> Option<u32> {
        match *self {
            SlotState::Idle => None,
            SlotState::Starting(id) | SlotState::Working(id) | SlotState::Retired(id) => Some(id),
        }
    }
}

/// What happened to a slot on an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotEventKind {
    Assigned(u32),
    Completed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEvent {
    pub slot: usize,
    pub kind: SlotEventKind,
}

/// Events produced by one edge.
pub type SlotEvents = SmallVec<[SlotEvent; 8]>;

/// Slots plus the dispatched/done counters they share.
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<SlotState>,
    total: u32,
    dispatched: u32,
    done: u32,
}

impl SlotTable {
    pub fn new(num_slots: usize) -> Self {
        Self { slots: vec![SlotState::Idle; num_slots], total: 0, dispatched: 0, done: 0 }
    }

    /// All slots idle, counters cleared, `total` units to hand out.
    pub fn reset(&mut self, total: u32) {
        self.slots.fill(SlotState::Idle);
        self.total = total;
        self.dispatched = 0;
        self.done = 0;
    }

    pub fn slots(&self) -> &[SlotState] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<SlotState> {
        self.slots.get(index).copied()
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn dispatched(&self) -> u32 {
        self.dispatched
    }

    pub fn done(&self) -> u32 {
        self.done
    }

    /// Every unit has been handed out and reported done.
    pub fn all_done(&self) -> bool {
        self.done == self.total
    }

    /// Advance every slot one edge, in index order.
    ///
    /// `done(i)` is slot `i`'s done input as seen before the edge.
    pub fn step(&mut self, done: impl Fn(usize) -> bool) -> SlotEvents {
        let mut events = SlotEvents::new();

        for index in 0..self.slots.len() {
            let current = self.slots[index];
            let next = match current {
                SlotState::Idle | SlotState::Retired(_) => self.assign(index, &mut events),
                SlotState::Starting(id) => SlotState::Working(id),
                SlotState::Working(id) if done(index) => {
                    self.done += 1;
                    events.push(SlotEvent { slot: index, kind: SlotEventKind::Completed(id) });
                    SlotState::Retired(id)
                }
                working @ SlotState::Working(_) => working,
            };
            self.slots[index] = next;
        }

        events
    }

    fn assign(&mut self, index: usize, events: &mut SlotEvents) -> SlotState {
        if self.dispatched >= self.total {
            return SlotState::Idle;
        }
        let id = self.dispatched;
        self.dispatched += 1;
        events.push(SlotEvent { slot: index, kind: SlotEventKind::Assigned(id) });
        SlotState::Starting(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_flags() {
        assert!(SlotState::Idle.ready());
        assert!(!SlotState::Idle.working());
        assert!(SlotState::Starting(3).start() && SlotState::Starting(3).working());
        assert!(!SlotState::Working(3).start());
        assert!(SlotState::Retired(3).ready());
        assert_eq!(SlotState::Retired(3).id(), Some(3));
        assert_eq!(SlotState::Idle.id(), None);
    }

    #[test]
    fn test_lowest_slot_gets_next_id() {
        let mut table = SlotTable::new(3);
        table.reset(2);
        let events = table.step(|_| false);

        assert_eq!(table.slots(), &[SlotState::Starting(0), SlotState::Starting(1), SlotState::Idle]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SlotEvent { slot: 1, kind: SlotEventKind::Assigned(1) });
    }

    #[test]
    fn test_done_ignored_outside_working() {
        let mut table = SlotTable::new(1);
        table.reset(2);

        table.step(|_| true);
        assert_eq!(table.slot(0), Some(SlotState::Starting(0)));
        // Held done during the start pulse is not counted
        table.step(|_| true);
        assert_eq!(table.slot(0), Some(SlotState::Working(0)));
        assert_eq!(table.done(), 0);

        table.step(|_| true);
        assert_eq!(table.slot(0), Some(SlotState::Retired(0)));
        assert_eq!(table.done(), 1);

        table.step(|_| true);
        assert_eq!(table.slot(0), Some(SlotState::Starting(1)));
        assert_eq!(table.done(), 1);
    }

    #[test]
    fn test_retired_goes_idle_without_work() {
        let mut table = SlotTable::new(1);
        table.reset(1);
        table.step(|_| false);
        table.step(|_| false);
        table.step(|_| true);
        assert!(table.all_done());

        table.step(|_| false);
        assert_eq!(table.slot(0), Some(SlotState::Idle));
        assert_eq!(table.dispatched(), 1);
    }
}
