//! Clocks and the page timer queue
//!
//! Everything time-dependent takes explicit millisecond timestamps from a
//! monotonic source. The browser feeds `performance.now()`, tests feed a
//! `ManualClock`. Timers never fire on their own: the owner of the queue pops
//! due entries when it is told the current time.

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap};

/// Monotonic millisecond time source
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Hand-driven clock for tests and the headless demo
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Cell::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms.max(self.now.get()));
    }

    pub fn advance(&self, ms: u64) -> u64 {
        let next = self.now.get().saturating_add(ms);
        self.now.set(next);
        next
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Everything the page can arm a timer for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Next autofire shot
    AutofireShot,
    /// Return the face to its resting state
    FaceRevert,
    /// Debounced flush of queued counter increments
    CounterFlush,
    /// Periodic remote counter poll
    CounterPoll,
    /// End of the counter "pop" animation
    CounterPulseEnd,
    /// Unmount a bullet whose flight has finished
    BulletExpiry(u64),
}

/// Handle to an armed timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// A timer that came due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTimer {
    pub id: TimerId,
    /// When it was scheduled to fire (not when it was popped)
    pub deadline_ms: u64,
    pub kind: TimerKind,
}

/// Deadline-ordered one-shot timers
///
/// Timers with equal deadlines fire in the order they were armed.
#[derive(Debug, Default)]
pub struct TimerQueue {
    next_id: u64,
    pending: BTreeMap<(u64, TimerId), TimerKind>,
    deadlines: HashMap<TimerId, u64>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot timer
    pub fn schedule(&mut self, deadline_ms: u64, kind: TimerKind) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.insert((deadline_ms, id), kind);
        self.deadlines.insert(id, deadline_ms);
        id
    }

    /// Disarm a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.pending.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.deadlines.contains_key(&id)
    }

    /// Earliest armed deadline
    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.keys().next().map(|(deadline, _)| *deadline)
    }

    /// Pop the earliest timer if it is due at `now_ms`
    pub fn pop_due(&mut self, now_ms: u64) -> Option<DueTimer> {
        let (&(deadline_ms, id), _) = self.pending.iter().next()?;
        if deadline_ms > now_ms {
            return None;
        }
        let kind = self.pending.remove(&(deadline_ms, id))?;
        self.deadlines.remove(&id);
        Some(DueTimer {
            id,
            deadline_ms,
            kind,
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of armed timers of one kind
    pub fn count_of(&self, kind: TimerKind) -> usize {
        self.pending.values().filter(|k| **k == kind).count()
    }
}
