//! Tagged event records dispatched by the simulation loop.

/// Stable handle of a variable: an index into the simulation-owned
/// variable vector.
pub type VarIndex = usize;

/// Event category, mirroring [`crate::superdense_time::Offset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Discrete input transition
    Discrete,
    /// Zero-crossing fired
    ZeroCrossing,
    /// Conditional evaluation
    Conditional,
    /// Handler re-initialization after a crossing
    Handler,
    /// Requantization
    Qss,
    /// Requantization of a zero-crossing variable
    QssZc,
}

/// One scheduled event: a type, a target variable, and (for handler events)
/// the value to set on re-entry.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    event_type: EventType,
    target: VarIndex,
    value: f64,
}

impl Event {
    pub fn new(event_type: EventType, target: VarIndex, value: f64) -> Self {
        Self {
            event_type,
            target,
            value,
        }
    }

    pub fn discrete(target: VarIndex) -> Self {
        Self::new(EventType::Discrete, target, 0.0)
    }

    pub fn zero_crossing(target: VarIndex) -> Self {
        Self::new(EventType::ZeroCrossing, target, 0.0)
    }

    pub fn conditional(target: VarIndex) -> Self {
        Self::new(EventType::Conditional, target, 0.0)
    }

    pub fn handler(target: VarIndex, value: f64) -> Self {
        Self::new(EventType::Handler, target, value)
    }

    pub fn qss(target: VarIndex) -> Self {
        Self::new(EventType::Qss, target, 0.0)
    }

    pub fn qss_zc(target: VarIndex) -> Self {
        Self::new(EventType::QssZc, target, 0.0)
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn target(&self) -> VarIndex {
        self.target
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_discrete(&self) -> bool {
        self.event_type == EventType::Discrete
    }

    pub fn is_zc(&self) -> bool {
        self.event_type == EventType::ZeroCrossing
    }

    pub fn is_conditional(&self) -> bool {
        self.event_type == EventType::Conditional
    }

    pub fn is_handler(&self) -> bool {
        self.event_type == EventType::Handler
    }

    pub fn is_qss(&self) -> bool {
        self.event_type == EventType::Qss
    }

    pub fn is_qss_zc(&self) -> bool {
        self.event_type == EventType::QssZc
    }
}

/// Equality ignores `value` for non-handler events: the queue's hinted
/// re-keying relies on this to locate entries.
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.event_type == other.event_type
            && self.target == other.target
            && (self.event_type != EventType::Handler || self.value == other.value)
    }
}
