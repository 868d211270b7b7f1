//! Superdense-time event queue.
//!
//! An ordered multimap from [`SuperdenseTime`] to [`Event`] over a balanced
//! tree, with handle-preserving re-keying (`shift_*`). Entries with equal
//! superdense time keep their insertion order through a monotonic sequence
//! counter carried in the key, which makes the simultaneous-batch drain
//! order deterministic across runs.
//!
//! The queue is strictly single-threaded: concurrent access would need
//! external locking, which is deliberately not provided.

use std::collections::BTreeMap;

use crate::{
    event::{Event, VarIndex},
    superdense_time::{Offset, SuperdenseTime},
};

/// Handle of one queue entry. Remains usable until the entry is shifted or
/// erased; shifting returns the replacement handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventHandle {
    time: SuperdenseTime,
    seq: u64,
}

impl EventHandle {
    /// Superdense time this handle is keyed at.
    pub fn time(&self) -> SuperdenseTime {
        self.time
    }
}

#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventHandle, Event>,
    seq: u64,
    /// Superdense time of the event being dispatched; zero-time cascades
    /// re-key at the next pass index relative to this.
    active: SuperdenseTime,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Any entry at this superdense time?
    pub fn has(&self, time: &SuperdenseTime) -> bool {
        self.range(time).next().is_some()
    }

    /// Number of entries at this superdense time.
    pub fn count(&self, time: &SuperdenseTime) -> usize {
        self.range(time).count()
    }

    /// Peek the earliest entry.
    pub fn top(&self) -> Option<(&EventHandle, &Event)> {
        self.events.first_key_value()
    }

    /// Real time of the earliest entry, infinity when empty.
    pub fn top_time(&self) -> f64 {
        self.top().map_or(f64::INFINITY, |(h, _)| h.time.t)
    }

    /// Superdense time of the earliest entry.
    pub fn top_superdense_time(&self) -> SuperdenseTime {
        self.top()
            .map_or(SuperdenseTime::at_time(f64::INFINITY), |(h, _)| h.time)
    }

    /// Target of the earliest entry.
    pub fn top_target(&self) -> Option<VarIndex> {
        self.top().map(|(_, e)| e.target())
    }

    /// Cache the top superdense time as the active dispatch instant.
    pub fn set_active_time(&mut self) {
        self.active = self.top_superdense_time();
    }

    pub fn active_time(&self) -> SuperdenseTime {
        self.active
    }

    /// Insert an event at an explicit superdense time.
    pub fn add(&mut self, time: SuperdenseTime, event: Event) -> EventHandle {
        self.seq += 1;
        let handle = EventHandle {
            time,
            seq: self.seq,
        };
        self.events.insert(handle, event);
        handle
    }

    pub fn add_qss(&mut self, t: f64, target: VarIndex) -> EventHandle {
        self.add(SuperdenseTime::new(t, 0, Offset::Qss), Event::qss(target))
    }

    pub fn add_qss_zc(&mut self, t: f64, target: VarIndex) -> EventHandle {
        self.add(
            SuperdenseTime::new(t, 0, Offset::QssZc),
            Event::qss_zc(target),
        )
    }

    pub fn add_discrete(&mut self, t: f64, target: VarIndex) -> EventHandle {
        self.add(
            SuperdenseTime::new(t, 0, Offset::Discrete),
            Event::discrete(target),
        )
    }

    pub fn add_zc(&mut self, t: f64, target: VarIndex) -> EventHandle {
        self.add(
            SuperdenseTime::new(t, 0, Offset::ZeroCrossing),
            Event::zero_crossing(target),
        )
    }

    /// Insert a handler event; at the active time it lands in the next
    /// pass, like a shift would.
    pub fn add_handler(&mut self, t: f64, value: f64, target: VarIndex) -> EventHandle {
        self.add(self.key(t, Offset::Handler), Event::handler(target, value))
    }

    /// Re-key an entry, preserving its event. The returned handle replaces
    /// the one passed in.
    pub fn shift(&mut self, time: SuperdenseTime, handle: EventHandle) -> EventHandle {
        let event = self.remove(handle);
        self.add(time, event)
    }

    pub fn shift_qss(&mut self, t: f64, handle: EventHandle) -> EventHandle {
        let target = self.remove(handle).target();
        self.add(self.key(t, Offset::Qss), Event::qss(target))
    }

    pub fn shift_qss_zc(&mut self, t: f64, handle: EventHandle) -> EventHandle {
        let target = self.remove(handle).target();
        self.add(self.key(t, Offset::QssZc), Event::qss_zc(target))
    }

    pub fn shift_zc(&mut self, t: f64, handle: EventHandle) -> EventHandle {
        let target = self.remove(handle).target();
        self.add(self.key(t, Offset::ZeroCrossing), Event::zero_crossing(target))
    }

    pub fn shift_conditional(&mut self, t: f64, handle: EventHandle) -> EventHandle {
        let target = self.remove(handle).target();
        self.add(self.key(t, Offset::Conditional), Event::conditional(target))
    }

    pub fn shift_handler(&mut self, t: f64, value: f64, handle: EventHandle) -> EventHandle {
        let target = self.remove(handle).target();
        self.add(self.key(t, Offset::Handler), Event::handler(target, value))
    }

    pub fn shift_discrete(&mut self, t: f64, handle: EventHandle) -> EventHandle {
        let target = self.remove(handle).target();
        self.add(self.key(t, Offset::Discrete), Event::discrete(target))
    }

    /// Remove and return the entry at `handle`.
    pub fn erase(&mut self, handle: EventHandle) -> Event {
        self.remove(handle)
    }

    /// Remove and return the earliest entry.
    pub fn pop(&mut self) -> Option<(SuperdenseTime, Event)> {
        self.events.pop_first().map(|(h, e)| (h.time, e))
    }

    /// At least two entries share the top superdense time?
    pub fn simultaneous(&self) -> bool {
        let mut it = self.events.keys();
        match (it.next(), it.next()) {
            (Some(a), Some(b)) => a.time == b.time,
            _ => false,
        }
    }

    /// All entries sharing the top superdense time, in insertion order.
    ///
    /// Entries are not removed: each trigger re-keys its own entry during
    /// its final advance stage.
    pub fn simultaneous_events(&self) -> Vec<(EventHandle, Event)> {
        let top = self.top_superdense_time();
        self.events
            .range(Self::time_range(&top))
            .map(|(h, e)| (*h, *e))
            .collect()
    }

    fn remove(&mut self, handle: EventHandle) -> Event {
        self.events
            .remove(&handle)
            .expect("event handle refers to a present queue entry")
    }

    /// Superdense key for a shift to time `t`: cascades at the active time
    /// land in the next pass.
    fn key(&self, t: f64, o: Offset) -> SuperdenseTime {
        let i = if t == self.active.t {
            self.active.i + 1
        } else {
            0
        };
        SuperdenseTime::new(t, i, o)
    }

    fn range(&self, time: &SuperdenseTime) -> impl Iterator<Item = (&EventHandle, &Event)> {
        self.events.range(Self::time_range(time))
    }

    fn time_range(time: &SuperdenseTime) -> std::ops::RangeInclusive<EventHandle> {
        EventHandle {
            time: *time,
            seq: 0,
        }..=EventHandle {
            time: *time,
            seq: u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_top_has_count() {
        let mut events = EventQueue::new();
        assert!(events.is_empty());
        assert_eq!(events.top_time(), f64::INFINITY);

        for i in 0..10 {
            events.add_qss(i as f64, i);
        }
        assert!(!events.is_empty());
        assert_eq!(events.len(), 10);
        assert_eq!(events.top_target(), Some(0));
        assert_eq!(events.top_time(), 0.0);

        for i in 0..10 {
            let s = SuperdenseTime::new(i as f64, 0, Offset::Qss);
            assert!(events.has(&s));
            assert_eq!(events.count(&s), 1);
        }
    }

    #[test]
    fn shift_rekeys_and_preserves_entry() {
        let mut events = EventQueue::new();
        let handles: Vec<_> = (0..10).map(|i| events.add_qss(i as f64, i)).collect();

        events.set_active_time();
        let shifted = events.shift_qss(2.0, handles[0]);
        assert_eq!(shifted.time(), SuperdenseTime::new(2.0, 0, Offset::Qss));
        assert_eq!(events.top_target(), Some(1));
        assert_eq!(events.top_time(), 1.0);
        assert_eq!(
            events.top_superdense_time(),
            SuperdenseTime::new(1.0, 0, Offset::Qss)
        );

        let s = SuperdenseTime::new(2.0, 0, Offset::Qss);
        assert_eq!(events.count(&s), 2);

        events.clear();
        assert!(events.is_empty());
    }

    #[test]
    fn shift_at_active_time_bumps_pass() {
        let mut events = EventQueue::new();
        let h = events.add_qss(1.0, 0);
        events.add_qss(2.0, 1);

        events.set_active_time();
        let h = events.shift_handler(1.0, 3.0, h);
        assert_eq!(
            h.time(),
            SuperdenseTime::new(1.0, 1, Offset::Handler)
        );
        // Away from the active time the pass resets
        let h = events.shift_qss(5.0, h);
        assert_eq!(h.time(), SuperdenseTime::new(5.0, 0, Offset::Qss));
    }

    #[test]
    fn simultaneous_preserves_insertion_order() {
        let mut events = EventQueue::new();
        events.add_qss(3.0, 7);
        events.add_qss(1.0, 4);
        events.add_qss(1.0, 2);
        events.add_qss(1.0, 9);

        assert!(events.simultaneous());
        let batch = events.simultaneous_events();
        let targets: Vec<_> = batch.iter().map(|(_, e)| e.target()).collect();
        assert_eq!(targets, vec![4, 2, 9]);
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn insert_then_erase_restores_queue() {
        let mut events = EventQueue::new();
        events.add_qss(1.0, 0);
        events.add_qss(2.0, 1);
        let before: Vec<_> = events.simultaneous_events();

        let h = events.add_discrete(0.5, 2);
        assert_eq!(events.top_target(), Some(2));
        events.erase(h);

        assert_eq!(events.len(), 2);
        assert_eq!(events.simultaneous_events(), before);
        assert_eq!(events.top_target(), Some(0));
    }

    #[test]
    fn offset_orders_same_instant() {
        let mut events = EventQueue::new();
        events.add(SuperdenseTime::new(1.0, 0, Offset::Qss), Event::qss(0));
        events.add(
            SuperdenseTime::new(1.0, 0, Offset::Discrete),
            Event::discrete(1),
        );
        events.add(
            SuperdenseTime::new(1.0, 0, Offset::Handler),
            Event::handler(2, 0.0),
        );

        assert_eq!(events.top_target(), Some(1));
        assert!(!events.simultaneous());
    }
}
