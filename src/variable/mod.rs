//! The variable model: trajectory carriers and their kinds.
//!
//! One [`Variable`] struct carries the trajectory record shared by every
//! kind; [`VarKind`] tags the per-kind payload. The per-kind advance
//! formulas live in the sibling modules and are dispatched by the
//! simulation loop.

mod discrete;
mod input;
mod liqss;
mod qss;
mod zc;

pub use discrete::DiscreteKind;
pub use zc::{crossing_type, Crossing, CrossingSet, ZcData};

use crate::{
    event::VarIndex, event_queue::EventHandle, input::InputFunction, math, model::ValueRef,
    options::Options,
};

/// QSS method family.
///
/// `XQss`/`XLiqss` broadcast the full continuous trajectory instead of the
/// one-order-lower quantized one; `RQss` relaxes requantizations whose
/// slope sign flips; `Liqss` quantizes hysteretically for self-observing
/// (stiff) variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Qss,
    XQss,
    RQss,
    Liqss,
    XLiqss,
}

/// Method selection: family plus order 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Method {
    pub family: Family,
    pub order: u8,
}

impl Method {
    pub const fn new(family: Family, order: u8) -> Self {
        Self { family, order }
    }

    pub const fn qss1() -> Self {
        Self::new(Family::Qss, 1)
    }

    pub const fn qss2() -> Self {
        Self::new(Family::Qss, 2)
    }

    pub const fn qss3() -> Self {
        Self::new(Family::Qss, 3)
    }

    pub const fn liqss1() -> Self {
        Self::new(Family::Liqss, 1)
    }

    pub const fn liqss2() -> Self {
        Self::new(Family::Liqss, 2)
    }

    pub const fn liqss3() -> Self {
        Self::new(Family::Liqss, 3)
    }

    pub const fn xqss1() -> Self {
        Self::new(Family::XQss, 1)
    }

    pub const fn xqss2() -> Self {
        Self::new(Family::XQss, 2)
    }

    pub const fn xqss3() -> Self {
        Self::new(Family::XQss, 3)
    }

    pub const fn xliqss2() -> Self {
        Self::new(Family::XLiqss, 2)
    }

    pub const fn rqss2() -> Self {
        Self::new(Family::RQss, 2)
    }
}

/// Cheap copyable discriminant of [`VarKind`], for dispatch that must not
/// hold a borrow of the variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KindTag {
    State,
    Input,
    InputDiscrete(DiscreteKind),
    ZeroCrossing,
    Discrete(DiscreteKind),
}

/// Per-kind payload.
#[derive(Debug, Clone)]
pub enum VarKind {
    /// Continuous state integrated by a QSS-family method.
    State { family: Family },
    /// Smooth externally-driven input.
    Input { function: InputFunction },
    /// Discrete-valued input, order 0.
    InputDiscrete {
        function: InputFunction,
        value: DiscreteKind,
    },
    /// Zero-crossing event indicator.
    ZeroCrossing(ZcData),
    /// Handler-updated discrete value with no own dynamics.
    Discrete { value: DiscreteKind },
}

/// Trajectory carrier.
///
/// Continuous coefficients `x` are referenced at `tx`; quantized
/// coefficients `q` at `tq`. The invariants `tq <= tx <= te` and
/// `tq <= td` hold at every queue event.
#[derive(Debug)]
pub struct Variable {
    pub(crate) name: String,
    pub(crate) kind: VarKind,
    pub(crate) order: u8,
    pub(crate) rtol: f64,
    pub(crate) atol: f64,
    pub(crate) qtol: f64,
    /// Last requantization time
    pub(crate) tq: f64,
    /// Continuous-trajectory reference time
    pub(crate) tx: f64,
    /// Next requantization time
    pub(crate) te: f64,
    /// Next discrete event time
    pub(crate) td: f64,
    /// Last step size
    pub(crate) ts: f64,
    pub(crate) x: [f64; 4],
    pub(crate) q: [f64; 4],
    /// Deferred LIQSS quantized value, published at stage F
    pub(crate) l0: f64,
    /// Slope of the previous step, for relaxation
    pub(crate) x1_prev: f64,
    pub(crate) vr: ValueRef,
    pub(crate) observers: Vec<VarIndex>,
    pub(crate) observees: Vec<VarIndex>,
    pub(crate) self_observer: bool,
    pub connected_output: bool,
    pub connected_output_observer: bool,
    pub(crate) event: Option<EventHandle>,
    pub(crate) event_discrete: Option<EventHandle>,
    pub(crate) requantizations: u64,
}

impl Variable {
    fn new(name: impl Into<String>, kind: VarKind, order: u8, vr: ValueRef) -> Self {
        Self {
            name: name.into(),
            kind,
            order,
            rtol: 0.0,
            atol: 0.0,
            qtol: 0.0,
            tq: 0.0,
            tx: 0.0,
            te: f64::INFINITY,
            td: f64::INFINITY,
            ts: 0.0,
            x: [0.0; 4],
            q: [0.0; 4],
            l0: 0.0,
            x1_prev: 0.0,
            vr,
            observers: Vec::new(),
            observees: Vec::new(),
            self_observer: false,
            connected_output: false,
            connected_output_observer: false,
            event: None,
            event_discrete: None,
            requantizations: 0,
        }
    }

    pub(crate) fn state(name: impl Into<String>, method: Method, vr: ValueRef) -> Self {
        debug_assert!((1..=3).contains(&method.order));
        Self::new(
            name,
            VarKind::State {
                family: method.family,
            },
            method.order,
            vr,
        )
    }

    pub(crate) fn input(
        name: impl Into<String>,
        order: u8,
        function: InputFunction,
        vr: ValueRef,
    ) -> Self {
        debug_assert!((1..=3).contains(&order));
        Self::new(name, VarKind::Input { function }, order, vr)
    }

    pub(crate) fn input_discrete(
        name: impl Into<String>,
        value: DiscreteKind,
        function: InputFunction,
        vr: ValueRef,
    ) -> Self {
        Self::new(name, VarKind::InputDiscrete { function, value }, 0, vr)
    }

    pub(crate) fn zero_crossing(
        name: impl Into<String>,
        order: u8,
        zc: ZcData,
        vr: ValueRef,
    ) -> Self {
        debug_assert!((1..=3).contains(&order));
        Self::new(name, VarKind::ZeroCrossing(zc), order, vr)
    }

    pub(crate) fn discrete(name: impl Into<String>, value: DiscreteKind, vr: ValueRef) -> Self {
        Self::new(name, VarKind::Discrete { value }, 0, vr)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn order(&self) -> u8 {
        self.order
    }

    pub fn kind(&self) -> &VarKind {
        &self.kind
    }

    pub fn value_ref(&self) -> ValueRef {
        self.vr
    }

    pub fn observers(&self) -> &[VarIndex] {
        &self.observers
    }

    pub fn observees(&self) -> &[VarIndex] {
        &self.observees
    }

    pub fn is_self_observer(&self) -> bool {
        self.self_observer
    }

    /// Number of requantization events this variable has fired.
    pub fn requantization_count(&self) -> u64 {
        self.requantizations
    }

    /// Last requantization time.
    pub fn tq(&self) -> f64 {
        self.tq
    }

    /// Continuous-trajectory reference time.
    pub fn tx(&self) -> f64 {
        self.tx
    }

    /// Next requantization time.
    pub fn te(&self) -> f64 {
        self.te
    }

    /// Next discrete event time, infinity when none.
    pub fn td(&self) -> f64 {
        self.td
    }

    /// Current quantum.
    pub fn quantum(&self) -> f64 {
        self.qtol
    }

    pub fn is_state(&self) -> bool {
        matches!(self.kind, VarKind::State { .. })
    }

    pub fn is_zc(&self) -> bool {
        matches!(self.kind, VarKind::ZeroCrossing(_))
    }

    pub fn is_input(&self) -> bool {
        matches!(
            self.kind,
            VarKind::Input { .. } | VarKind::InputDiscrete { .. }
        )
    }

    pub(crate) fn tag(&self) -> KindTag {
        match &self.kind {
            VarKind::State { .. } => KindTag::State,
            VarKind::Input { .. } => KindTag::Input,
            VarKind::InputDiscrete { value, .. } => KindTag::InputDiscrete(*value),
            VarKind::ZeroCrossing(_) => KindTag::ZeroCrossing,
            VarKind::Discrete { value } => KindTag::Discrete(*value),
        }
    }

    pub(crate) fn family(&self) -> Option<Family> {
        match self.kind {
            VarKind::State { family } => Some(family),
            _ => None,
        }
    }

    /// Order of the quantized (broadcast) trajectory.
    pub(crate) fn q_order(&self) -> u8 {
        match self.kind {
            VarKind::State { family: Family::XQss | Family::XLiqss } => self.order,
            VarKind::InputDiscrete { .. } | VarKind::Discrete { .. } => 0,
            _ => self.order.saturating_sub(1),
        }
    }

    /// Continuous value at time `t` with `tx <= t <= te`.
    pub fn x_at(&self, t: f64) -> f64 {
        debug_assert!(self.tx <= t);
        let dt = t - self.tx;
        match self.order {
            0 => self.x[0],
            1 => self.x[0] + self.x[1] * dt,
            2 => self.x[0] + (self.x[1] + self.x[2] * dt) * dt,
            _ => self.x[0] + (self.x[1] + (self.x[2] + self.x[3] * dt) * dt) * dt,
        }
    }

    /// Continuous slope at time `t`.
    pub fn x1_at(&self, t: f64) -> f64 {
        let dt = t - self.tx;
        match self.order {
            0 => 0.0,
            1 => self.x[1],
            2 => self.x[1] + 2.0 * self.x[2] * dt,
            _ => self.x[1] + (2.0 * self.x[2] + 3.0 * self.x[3] * dt) * dt,
        }
    }

    /// Quantized (broadcast) value at time `t` with `tq <= t`.
    pub fn q_at(&self, t: f64) -> f64 {
        debug_assert!(self.tq <= t);
        let dt = t - self.tq;
        match self.q_order() {
            0 => self.q[0],
            1 => self.q[0] + self.q[1] * dt,
            2 => self.q[0] + (self.q[1] + self.q[2] * dt) * dt,
            _ => self.q[0] + (self.q[1] + (self.q[2] + self.q[3] * dt) * dt) * dt,
        }
    }

    /// Quantized slope at time `t`, the directional-derivative seed.
    pub fn q1_at(&self, t: f64) -> f64 {
        let dt = t - self.tq;
        match self.q_order() {
            0 => 0.0,
            1 => self.q[1],
            2 => self.q[1] + 2.0 * self.q[2] * dt,
            _ => self.q[1] + (2.0 * self.q[2] + 3.0 * self.q[3] * dt) * dt,
        }
    }

    /// Refresh the quantum from the current quantized value.
    pub(crate) fn set_qtol(&mut self) {
        self.qtol = f64::max(self.rtol * self.q[0].abs(), self.atol);
        debug_assert!(self.qtol > 0.0);
    }

    /// Next requantization time with `tq == tx` (trigger update).
    pub(crate) fn te_aligned(&self, options: &Options) -> f64 {
        debug_assert!(self.tq == self.tx);
        let n = self.order;
        let lead = self.x[n as usize];
        let mut te = if lead != 0.0 {
            let ratio = self.qtol / lead.abs();
            let dt = match n {
                1 => ratio,
                2 => ratio.sqrt(),
                _ => ratio.cbrt(),
            };
            self.tq + dt
        } else {
            f64::INFINITY
        };
        if options.inflection && n >= 2 {
            let below = self.x[(n - 1) as usize];
            if below != 0.0 && math::sign(below) != math::sign(lead) {
                // Give each monotone segment at least one requantization
                let ti = self.tx - below / (n as f64 * lead);
                if ti > self.tx {
                    te = te.min(ti);
                }
            }
        }
        self.clip_te(te, options)
    }

    /// Next requantization time with `tq < tx` (observer update).
    pub(crate) fn te_unaligned(&self, options: &Options) -> f64 {
        debug_assert!(self.tq <= self.tx);
        let dt = self.tx - self.tq;
        // Quantized trajectory re-referenced at tx
        let (qv0, qv1, qv2, qv3) = match self.q_order() {
            0 => (self.q[0], 0.0, 0.0, 0.0),
            1 => (self.q[0] + self.q[1] * dt, self.q[1], 0.0, 0.0),
            2 => (
                self.q[0] + (self.q[1] + self.q[2] * dt) * dt,
                self.q[1] + 2.0 * self.q[2] * dt,
                self.q[2],
                0.0,
            ),
            _ => (
                self.q[0] + (self.q[1] + (self.q[2] + self.q[3] * dt) * dt) * dt,
                self.q[1] + (2.0 * self.q[2] + 3.0 * self.q[3] * dt) * dt,
                self.q[2] + 3.0 * self.q[3] * dt,
                self.q[3],
            ),
        };
        let d0 = self.x[0] - qv0;
        let s = match self.order {
            1 => math::min_root_quadratic_both(0.0, self.x[1] - qv1, d0, self.qtol),
            2 => math::min_root_quadratic_both(self.x[2] - qv2, self.x[1] - qv1, d0, self.qtol),
            _ => math::min_root_cubic_both(
                self.x[3] - qv3,
                self.x[2] - qv2,
                self.x[1] - qv1,
                d0,
                self.qtol,
            ),
        };
        let te = if s.is_finite() { self.tx + s } else { f64::INFINITY };
        self.clip_te(te, options)
    }

    fn clip_te(&self, te: f64, options: &Options) -> f64 {
        let mut te = te;
        if options.dt_max.is_finite() {
            te = te.min(self.tq + options.dt_max);
        }
        if te.is_infinite() && options.dt_inf.is_finite() {
            te = self.tq + options.dt_inf;
        }
        te.max(self.tq + options.dt_min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    fn options() -> Options {
        Options::default()
    }

    fn state_var(method: Method) -> Variable {
        let mut v = Variable::state("x", method, 0);
        v.rtol = 1.0e-4;
        v.atol = 1.0e-6;
        v
    }

    #[test]
    fn aligned_te_per_order() {
        let mut v = state_var(Method::qss1());
        v.q[0] = 1.0;
        v.set_qtol();
        v.x = [1.0, -2.0, 0.0, 0.0];
        assert_approx_eq!(f64, v.te_aligned(&options()), v.qtol / 2.0);

        let mut v = state_var(Method::qss2());
        v.q[0] = 1.0;
        v.set_qtol();
        v.x = [1.0, -1.0, 0.5, 0.0];
        assert_approx_eq!(f64, v.te_aligned(&options()), (v.qtol / 0.5).sqrt());

        let mut v = state_var(Method::qss3());
        v.q[0] = 1.0;
        v.set_qtol();
        v.x = [1.0, -1.0, 0.5, -0.25];
        assert_approx_eq!(f64, v.te_aligned(&options()), (v.qtol / 0.25).cbrt());
    }

    #[test]
    fn zero_leading_coefficient_never_requantizes() {
        let mut v = state_var(Method::qss2());
        v.q[0] = 1.0;
        v.set_qtol();
        v.x = [1.0, -1.0, 0.0, 0.0];
        assert_eq!(v.te_aligned(&options()), f64::INFINITY);
    }

    #[test]
    fn unaligned_te_crosses_quantum() {
        // x(t) tracks 2t from tx = 0 while q is held at 0 since tq = 0
        let mut v = state_var(Method::qss2());
        v.q = [0.0, 0.0, 0.0, 0.0];
        v.atol = 1.0e-6;
        v.set_qtol();
        v.x = [0.0, 2.0, 0.0, 0.0];
        let te = v.te_unaligned(&options());
        assert_approx_eq!(f64, te, 5.0e-7, epsilon = 1e-12);
        // Deviation at te equals the quantum
        assert_approx_eq!(f64, (v.x_at(te) - v.q_at(te)).abs(), v.qtol);
    }

    #[test]
    fn quantized_order_tracks_family() {
        let v = state_var(Method::qss2());
        assert_eq!(v.q_order(), 1);
        let v = state_var(Method::xqss2());
        assert_eq!(v.q_order(), 2);
        let v = state_var(Method::liqss3());
        assert_eq!(v.q_order(), 2);
    }

    #[test]
    fn inflection_clips_te() {
        let mut v = state_var(Method::qss2());
        v.q[0] = 1.0;
        v.set_qtol();
        // Slope and curvature of opposite sign: extremum at t = 1e-3,
        // before the plain quantum crossing
        v.x = [1.0, 1.0e-3, -0.5, 0.0];
        let mut opts = options();
        let te_plain = v.te_aligned(&opts);
        opts.inflection = true;
        let te_clipped = v.te_aligned(&opts);
        assert!(te_clipped < te_plain);
        assert_approx_eq!(f64, te_clipped, 1.0e-3);
    }
}
