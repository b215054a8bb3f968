//! Virtual-time timer queue.
//!
//! Timers are keyed by `(deadline, rank, seq)`. At the same deadline a stage
//! end pops after every other timer, so a token arriving exactly as its
//! stage closes still counts as arrived; otherwise timers with the same
//! deadline pop in the order they were scheduled. Every timer remembers the run
//! generation it was created for; the orchestrator drops timers from older
//! generations instead of firing them.

use std::collections::BTreeMap;

use crate::types::{Millis, TokenId};

/// What a timer does when it fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Fire operation `operation` of stage `stage`.
    FireOperation { stage: usize, operation: usize },
    /// A token reaches the end of its wire.
    Arrival { token: TokenId },
    /// The stage's duration has elapsed.
    StageEnd { stage: usize },
    /// The run exceeded its time budget.
    Watchdog,
}

impl TimerKind {
    fn rank(&self) -> u8 {
        match self {
            TimerKind::StageEnd { .. } => 1,
            _ => 0,
        }
    }
}

/// A scheduled timer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Timer {
    pub generation: u64,
    pub kind: TimerKind,
}

/// Ordered timer queue.
#[derive(Clone, Debug, Default)]
pub struct TimerQueue {
    entries: BTreeMap<(Millis, u8, u64), Timer>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `kind` at `deadline` and returns its sequence number.
    pub fn schedule(&mut self, deadline: Millis, generation: u64, kind: TimerKind) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline, kind.rank(), seq), Timer { generation, kind });
        seq
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<Millis> {
        self.entries.keys().next().map(|&(deadline, _, _)| deadline)
    }

    /// Removes and returns the earliest timer if it is due at `now`.
    pub fn pop_due(&mut self, now: Millis) -> Option<(Millis, Timer)> {
        let (&(deadline, _, _), _) = self.entries.first_key_value()?;
        if deadline > now {
            return None;
        }
        self.entries
            .pop_first()
            .map(|((deadline, _, _), timer)| (deadline, timer))
    }

    /// Drops every pending timer.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
