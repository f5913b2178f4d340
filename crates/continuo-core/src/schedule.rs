//! Pulse-ordered queue of outbound events

use std::sync::Mutex;

use crate::event::Event;

/// Outbound events waiting for their target pulse.
///
/// At rest the queue is sorted non-decreasing by target pulse. Ties keep
/// insertion order, except that inside a single `push_many` batch a note-off
/// sorts before any other event at the same pulse, so a note closing at
/// pulse P never silences a fresh note-on at P.
pub struct ScheduledQueue {
    entries: Mutex<Vec<(u64, Event)>>,
}

impl ScheduledQueue {
    pub fn new() -> Self {
        Self { entries: Mutex::new(Vec::new()) }
    }

    /// Insert a batch of (target_pulse, event) pairs, restoring the sort
    /// invariant before the lock is released.
    pub fn push_many<I>(&self, batch: I)
    where
        I: IntoIterator<Item = (u64, Event)>,
    {
        let mut batch: Vec<(u64, Event)> = batch.into_iter().collect();
        // Stable: equal keys keep the batch's own order.
        batch.sort_by_key(|(pulse, event)| {
            let rank = if matches!(event, Event::NoteOff { .. }) { 0u8 } else { 1 };
            (*pulse, rank)
        });

        if let Ok(mut entries) = self.entries.lock() {
            entries.extend(batch);
            entries.sort_by_key(|(pulse, _)| *pulse);
        }
    }

    /// Remove and return every entry with `target_pulse <= current_pulse`,
    /// in ascending target order, stable for ties.
    pub fn drain_due(&self, current_pulse: u64) -> Vec<(u64, Event)> {
        let Ok(mut entries) = self.entries.lock() else {
            return Vec::new();
        };
        let due = entries.partition_point(|(pulse, _)| *pulse <= current_pulse);
        entries.drain(..due).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ScheduledQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(pitch: u8) -> Event {
        Event::NoteOn { pitch, velocity: 100 }
    }

    fn off(pitch: u8) -> Event {
        Event::NoteOff { pitch, velocity: 0 }
    }

    #[test]
    fn drains_in_pulse_order() {
        let queue = ScheduledQueue::new();
        queue.push_many(vec![(30, on(62)), (10, on(60)), (20, on(61))]);

        let due = queue.drain_due(25);
        assert_eq!(due, vec![(10, on(60)), (20, on(61))]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn drain_due_is_idempotent() {
        let queue = ScheduledQueue::new();
        queue.push_many(vec![(5, on(60))]);
        assert_eq!(queue.drain_due(10).len(), 1);
        assert!(queue.drain_due(10).is_empty());
    }

    #[test]
    fn note_off_precedes_note_on_within_batch() {
        let queue = ScheduledQueue::new();
        queue.push_many(vec![(96, on(64)), (96, off(60))]);

        let due = queue.drain_due(96);
        assert_eq!(due, vec![(96, off(60)), (96, on(64))]);
    }

    #[test]
    fn ties_across_batches_keep_insertion_order() {
        let queue = ScheduledQueue::new();
        queue.push_many(vec![(50, on(60))]);
        queue.push_many(vec![(50, on(61))]);

        let due = queue.drain_due(50);
        assert_eq!(due, vec![(50, on(60)), (50, on(61))]);
    }

    #[test]
    fn interleaved_batches_stay_sorted() {
        let queue = ScheduledQueue::new();
        queue.push_many(vec![(40, on(60)), (80, off(60))]);
        queue.push_many(vec![(20, on(61)), (60, off(61))]);

        let pulses: Vec<u64> = queue.drain_due(100).into_iter().map(|(p, _)| p).collect();
        assert_eq!(pulses, vec![20, 40, 60, 80]);
    }

    #[test]
    fn clear_empties_the_queue() {
        let queue = ScheduledQueue::new();
        queue.push_many(vec![(10, on(60)), (20, on(61))]);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.drain_due(u64::MAX).is_empty());
    }
}
