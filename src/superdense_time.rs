//! Superdense simulation time.
//!
//! Events at the same real time are disambiguated by a pass index (zero-time
//! cascades) and a category offset, giving a total order over all events.

use std::cmp::Ordering;

/// Event category subpriority within one `(time, pass)` instant.
///
/// The variant order is the dispatch order: discrete input events precede
/// zero-crossings precede handlers precede requantizations.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Offset {
    #[default]
    Discrete = 0,
    ZeroCrossing = 1,
    Conditional = 2,
    Handler = 3,
    Qss = 4,
    QssZc = 5,
}

/// Totally ordered event key `(t, i, o)`.
///
/// `t` is simulation time, `i` the pass counter disambiguating zero-time
/// cascades, `o` the category offset. Ordering is lexicographic.
#[derive(Debug, Default, Clone, Copy)]
pub struct SuperdenseTime {
    /// Simulation time
    pub t: f64,
    /// Pass index
    pub i: u64,
    /// Category offset
    pub o: Offset,
}

impl SuperdenseTime {
    pub const fn new(t: f64, i: u64, o: Offset) -> Self {
        Self { t, i, o }
    }

    /// Key at the start of pass 0 for time `t`.
    pub const fn at_time(t: f64) -> Self {
        Self {
            t,
            i: 0,
            o: Offset::Discrete,
        }
    }
}

impl PartialEq for SuperdenseTime {
    fn eq(&self, other: &Self) -> bool {
        self.t.total_cmp(&other.t) == Ordering::Equal && self.i == other.i && self.o == other.o
    }
}

impl Eq for SuperdenseTime {}

impl PartialOrd for SuperdenseTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SuperdenseTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.t
            .total_cmp(&other.t)
            .then_with(|| self.i.cmp(&other.i))
            .then_with(|| self.o.cmp(&other.o))
    }
}

impl PartialEq<f64> for SuperdenseTime {
    fn eq(&self, other: &f64) -> bool {
        self.t == *other
    }
}

impl PartialOrd<f64> for SuperdenseTime {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.t.partial_cmp(other)
    }
}

/// Same real time?
pub fn same_time(a: &SuperdenseTime, b: &SuperdenseTime) -> bool {
    a.t == b.t
}

/// Same real time and pass?
pub fn same_pass(a: &SuperdenseTime, b: &SuperdenseTime) -> bool {
    a.t == b.t && a.i == b.i
}
