//! Sorted timer list (spec §3 "Timer", §4.5).

use crate::awaitable::Awaitable;
use crate::lock::SpinLock;
use smallvec::SmallVec;
use std::time::Instant;

pub(crate) struct TimerEntry {
    pub id: u64,
    pub deadline: Instant,
    pub awaitable: Awaitable<bool, SpinLock>,
}

/// A list of timers kept sorted by deadline ascending. Inserts are typically
/// near the tail, so a simple insertion sort suffices; cancellation is O(n).
/// Backed by a `SmallVec` since a scheduler's live timer count is typically
/// small enough to stay off the heap entirely.
#[derive(Default)]
pub(crate) struct TimerList {
    entries: SmallVec<[TimerEntry; 4]>,
}

impl TimerList {
    pub fn new() -> Self {
        Self { entries: SmallVec::new() }
    }

    pub fn insert(&mut self, entry: TimerEntry) {
        let pos = self.entries.iter().position(|e| e.deadline > entry.deadline).unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// Removes every timer whose deadline has passed, returning them in
    /// deadline order.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<TimerEntry> {
        let split = self.entries.iter().position(|e| e.deadline > now).unwrap_or(self.entries.len());
        self.entries.drain(..split).collect()
    }

    /// The deadline of the earliest still-pending timer, if any.
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.entries.first().map(|e| e.deadline)
    }

    /// Removes and returns the timer with the given id, if present.
    pub fn cancel(&mut self, id: u64) -> Option<TimerEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(id: u64, millis: u64) -> TimerEntry {
        TimerEntry { id, deadline: Instant::now() + Duration::from_millis(millis), awaitable: Awaitable::pending() }
    }

    #[test]
    fn stays_sorted_by_deadline() {
        let mut list = TimerList::new();
        list.insert(entry(1, 30));
        list.insert(entry(2, 10));
        list.insert(entry(3, 20));
        let ids: Vec<_> = list.entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn cancel_removes_matching_id() {
        let mut list = TimerList::new();
        list.insert(entry(1, 10));
        list.insert(entry(2, 20));
        assert!(list.cancel(1).is_some());
        assert!(list.cancel(1).is_none());
        assert_eq!(list.entries.len(), 1);
    }

    #[test]
    fn drain_expired_only_past_deadlines() {
        let mut list = TimerList::new();
        let now = Instant::now();
        list.entries.push(TimerEntry { id: 1, deadline: now - Duration::from_millis(5), awaitable: Awaitable::pending() });
        list.entries.push(TimerEntry { id: 2, deadline: now + Duration::from_secs(60), awaitable: Awaitable::pending() });
        let expired = list.drain_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, 1);
        assert_eq!(list.entries.len(), 1);
    }
}
