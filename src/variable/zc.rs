//! Zero-crossing classification and per-variable crossing state.
//!
//! The root-finding and crossing dispatch logic lives in the simulation
//! (it needs the model and the queue); this module holds the value types.

use crate::{event::VarIndex, math, model::Model, simulation::Simulation, variable::VarKind, Error};

/// Crossing classification by the signs of the indicator just before and
/// at the crossing. Negative values are downward crossings.
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    /// Positive to negative
    DnPN = -4,
    /// Positive to zero
    DnPZ = -3,
    /// Zero to negative
    DnZN = -2,
    /// Downward (generic)
    Dn = -1,
    /// No crossing
    Flat = 0,
    /// Upward (generic)
    Up = 1,
    /// Zero to positive
    UpZP = 2,
    /// Negative to zero
    UpNZ = 3,
    /// Negative to positive
    UpNP = 4,
}

/// Classify a crossing from the value sign just before (`s1`) and at/after
/// (`s2`) the crossing.
pub fn crossing_type(s1: i32, s2: i32) -> Crossing {
    match (s1.signum(), s2.signum()) {
        (-1, 0) => Crossing::UpNZ,
        (-1, 1) => Crossing::UpNP,
        (0, 1) => Crossing::UpZP,
        (0, -1) => Crossing::DnZN,
        (1, 0) => Crossing::DnPZ,
        (1, -1) => Crossing::DnPN,
        _ => Crossing::Flat,
    }
}

/// Classify a polynomial root from the trajectory slope at the root.
pub fn crossing_type_at_root(value_before: f64, slope_at_root: f64) -> Crossing {
    crossing_type(math::sign(value_before), math::sign(slope_at_root))
}

/// Set of crossing classes a zero-crossing variable handles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrossingSet(u16);

impl CrossingSet {
    const fn bit(crossing: Crossing) -> u16 {
        1 << ((crossing as i8 + 4) as u16)
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(mut self, crossing: Crossing) -> Self {
        self.0 |= Self::bit(crossing);
        self
    }

    /// All downward crossing classes.
    pub const fn down() -> Self {
        Self::empty()
            .with(Crossing::DnPN)
            .with(Crossing::DnPZ)
            .with(Crossing::DnZN)
            .with(Crossing::Dn)
    }

    /// All upward crossing classes.
    pub const fn up() -> Self {
        Self::empty()
            .with(Crossing::Up)
            .with(Crossing::UpZP)
            .with(Crossing::UpNZ)
            .with(Crossing::UpNP)
    }

    /// Every class except `Flat`.
    pub const fn non_flat() -> Self {
        Self(Self::down().0 | Self::up().0)
    }

    pub const fn all() -> Self {
        Self(Self::non_flat().0 | Self::bit(Crossing::Flat))
    }

    pub const fn contains(&self, crossing: Crossing) -> bool {
        self.0 & Self::bit(crossing) != 0
    }
}

/// Per-variable crossing state.
#[derive(Debug, Clone)]
pub struct ZcData {
    /// Crossing classes this variable handles
    pub crossings: CrossingSet,
    /// Anti-chatter magnitude guard: crossings fire only once the
    /// indicator magnitude has exceeded this since the last crossing
    pub ztol: f64,
    /// Pending crossing time, infinity when none
    pub tz: f64,
    /// Classification of the pending crossing
    pub crossing: Crossing,
    /// Largest indicator magnitude seen since the last crossing
    pub magnitude: f64,
    /// Variables whose handler fires on a crossing (reverse dependencies)
    pub handlers: Vec<VarIndex>,
}

impl ZcData {
    pub fn new(crossings: CrossingSet, ztol: f64) -> Self {
        Self {
            crossings,
            ztol,
            tz: f64::INFINITY,
            crossing: Crossing::Flat,
            magnitude: 0.0,
            handlers: Vec::new(),
        }
    }
}

impl<M: Model> Simulation<M> {
    /// Refresh the indicator polynomial of `v` at `t` by sampling the
    /// model's event indicator, forward differenced for the derivatives.
    /// Leaves the model set back to `t`.
    pub(crate) fn zc_coefficients(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let h = self.options.dt_nd;
        let order = self.vars[v].order;

        self.model.set_time(t);
        self.set_observees_at(v, t);
        let z0 = self.indicator(v)?;

        let mut x = [z0, 0.0, 0.0, 0.0];
        match order {
            1 => {
                let z1 = self.sample_indicator(v, t + h)?;
                x[1] = (z1 - z0) / h;
            }
            2 => {
                let z1 = self.sample_indicator(v, t + h)?;
                let z2 = self.sample_indicator(v, t + 2.0 * h)?;
                x[1] = (-3.0 * z0 + 4.0 * z1 - z2) / (2.0 * h);
                x[2] = (z0 - 2.0 * z1 + z2) / (2.0 * h * h);
            }
            _ => {
                let z1 = self.sample_indicator(v, t + h)?;
                let z2 = self.sample_indicator(v, t + 2.0 * h)?;
                let z3 = self.sample_indicator(v, t + 3.0 * h)?;
                x[1] = (-11.0 * z0 + 18.0 * z1 - 9.0 * z2 + 2.0 * z3) / (6.0 * h);
                x[2] = (2.0 * z0 - 5.0 * z1 + 4.0 * z2 - z3) / (2.0 * h * h);
                x[3] = (-z0 + 3.0 * z1 - 3.0 * z2 + z3) / (6.0 * h * h * h);
            }
        }
        self.restore_model_state(v, t);

        let var = &mut self.vars[v];
        var.x = x;
        var.q[0] = z0;
        for i in 1..=var.q_order() as usize {
            var.q[i] = x[i];
        }
        var.set_qtol();
        if let VarKind::ZeroCrossing(zc) = &mut var.kind {
            zc.magnitude = zc.magnitude.max(z0.abs());
        }
        Ok(())
    }

    fn sample_indicator(&mut self, v: VarIndex, tn: f64) -> Result<f64, Error> {
        self.model.set_time(tn);
        self.set_observees_at(v, tn);
        self.indicator(v)
    }

    /// Requantize the indicator polynomial at `t` and schedule the next
    /// crossing or requantization.
    pub(crate) fn zc_requantize(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let var = &mut self.vars[v];
        var.ts = t - var.tq;
        var.tq = t;
        var.tx = t;
        self.zc_coefficients(v, t)?;
        self.schedule_zc(v, t, false)
    }

    /// Find the next root of the indicator polynomial and insert either a
    /// crossing event at `tZ` or a requantization at `tE`.
    pub(crate) fn schedule_zc(&mut self, v: VarIndex, t: f64, init: bool) -> Result<(), Error> {
        let te = self.vars[v].te_aligned(&self.options);
        self.vars[v].te = te;

        let (mut tz, crossing) = self.zc_root(v);
        if tz < te && self.options.refine {
            tz = self.refine_root(v, tz, t)?;
        }

        let fire = tz < te;
        if let VarKind::ZeroCrossing(zc) = &mut self.vars[v].kind {
            zc.tz = if fire { tz } else { f64::INFINITY };
            zc.crossing = if fire { crossing } else { Crossing::Flat };
        }

        let handle = self.vars[v].event.take();
        self.vars[v].event = Some(match (handle, fire, init) {
            (None, true, _) => self.queue.add_zc(tz, v),
            (None, false, _) => self.queue.add_qss_zc(te, v),
            (Some(h), true, _) => self.queue.shift_zc(tz, h),
            (Some(h), false, _) => self.queue.shift_qss_zc(te, h),
        });
        debug_assert!(!init || handle.is_none());
        log::trace!(
            "zero-crossing {} scheduled: tZ = {tz}, tE = {te}",
            self.vars[v].name
        );
        Ok(())
    }

    /// Smallest strictly positive root of the indicator polynomial beyond
    /// `tx`, classified and filtered by the handled crossing set and the
    /// anti-chatter magnitude guard.
    fn zc_root(&self, v: VarIndex) -> (f64, Crossing) {
        let var = &self.vars[v];
        let zc = match &var.kind {
            VarKind::ZeroCrossing(zc) => zc,
            _ => unreachable!("zc_root on a non-ZC variable"),
        };
        let s = match var.order {
            1 => math::min_positive_root_linear(var.x[1], var.x[0]),
            2 => math::min_positive_root_quadratic(var.x[2], var.x[1], var.x[0]),
            _ => math::min_positive_root_cubic(var.x[3], var.x[2], var.x[1], var.x[0]),
        };
        if !s.is_finite() {
            return (f64::INFINITY, Crossing::Flat);
        }
        let tz = var.tx + s;

        // Sign just before the root; when the current value sits at zero,
        // probe the segment midpoint
        let sign_before = if var.x[0] != 0.0 {
            math::sign(var.x[0])
        } else {
            math::sign(var.x_at(var.tx + 0.5 * s))
        };
        let crossing = crossing_type(sign_before, math::sign(var.x1_at(tz)));

        if !zc.crossings.contains(crossing) {
            return (f64::INFINITY, Crossing::Flat);
        }
        if zc.magnitude < zc.ztol {
            // Excursion below the chatter guard: treat as flat
            return (f64::INFINITY, Crossing::Flat);
        }
        (tz, crossing)
    }

    /// Newton refinement of a closed-form root against the model's
    /// indicator, accepting the refined time only when it improves on the
    /// starting point and stays past `t_beg`.
    fn refine_root(&mut self, v: VarIndex, tz: f64, t_beg: f64) -> Result<f64, Error> {
        let mut t = tz;
        self.model.set_time(tz);
        self.set_observees_at(v, tz);
        let vz = self.indicator(v)?;
        let mut val = vz;
        let mut val_p = vz;
        let mut m = 1.0;
        let atol = self.vars[v].atol;
        for _ in 0..10 {
            if val.abs() <= atol && val.abs() >= val_p.abs() {
                break;
            }
            let d = self.vars[v].x1_at(t);
            if d == 0.0 {
                break;
            }
            t -= m * (val / d);
            self.model.set_time(t);
            self.set_observees_at(v, t);
            val = self.indicator(v)?;
            if val.abs() >= val_p.abs() {
                // Non-converging step: reduce step size
                m *= 0.5;
            }
            val_p = val;
        }
        self.restore_model_state(v, t_beg);
        if t >= t_beg && val.abs() < vz.abs() {
            Ok(t)
        } else {
            Ok(tz)
        }
    }

    /// Requantization event of a zero-crossing variable (no crossing in
    /// `(tQ, tE]`).
    pub(crate) fn advance_qss_zc(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        self.stats.num_qss_events += 1;
        self.vars[v].requantizations += 1;
        self.zc_requantize(v, t)
    }

    /// A crossing fired at `t = tZ`: schedule handler events on the
    /// reverse-dependency set in the next pass, then re-root from the
    /// crossing.
    pub(crate) fn advance_zc(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        self.stats.num_zc_events += 1;
        let (handlers, crossing) = match &mut self.vars[v].kind {
            VarKind::ZeroCrossing(zc) => {
                let out = (zc.handlers.clone(), zc.crossing);
                zc.magnitude = 0.0;
                zc.tz = f64::INFINITY;
                out
            }
            _ => unreachable!("advance_zc on a non-ZC variable"),
        };
        log::debug!(
            "zero-crossing {} fired at t = {t} ({crossing:?}), {} handler(s)",
            self.vars[v].name,
            handlers.len()
        );
        for &target in &handlers {
            match self.vars[target].event.take() {
                Some(h) => {
                    self.vars[target].event = Some(self.queue.shift_handler(t, 0.0, h));
                }
                None => {
                    self.vars[target].event = Some(self.queue.add_handler(t, 0.0, target));
                }
            }
        }
        self.zc_requantize(v, t)
    }

    /// Observer callback for a zero-crossing variable: an observee
    /// requantized, so the indicator polynomial is stale.
    pub(crate) fn advance_zc_observer(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        self.zc_requantize(v, t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert_eq!(crossing_type(-1, 1), Crossing::UpNP);
        assert_eq!(crossing_type(-1, 0), Crossing::UpNZ);
        assert_eq!(crossing_type(0, 1), Crossing::UpZP);
        assert_eq!(crossing_type(0, -1), Crossing::DnZN);
        assert_eq!(crossing_type(1, -1), Crossing::DnPN);
        assert_eq!(crossing_type(1, 0), Crossing::DnPZ);
        assert_eq!(crossing_type(1, 1), Crossing::Flat);
        assert_eq!(crossing_type(-1, -1), Crossing::Flat);
        assert_eq!(crossing_type(0, 0), Crossing::Flat);
    }

    #[test]
    fn crossing_sets() {
        let down = CrossingSet::down();
        assert!(down.contains(Crossing::DnPN));
        assert!(down.contains(Crossing::DnZN));
        assert!(!down.contains(Crossing::UpNP));
        assert!(!down.contains(Crossing::Flat));

        let all = CrossingSet::all();
        assert!(all.contains(Crossing::Flat));
        assert!(all.contains(Crossing::Up));
        assert!(all.contains(Crossing::DnPZ));

        assert!(!CrossingSet::empty().contains(Crossing::Flat));
    }

    #[test]
    fn root_classification_uses_slope() {
        // Falling through zero from above
        assert_eq!(crossing_type_at_root(1.0, -2.0), Crossing::DnPN);
        // Rising through zero from below
        assert_eq!(crossing_type_at_root(-0.5, 3.0), Crossing::UpNP);
        // Tangent root
        assert_eq!(crossing_type_at_root(1.0, 0.0), Crossing::DnPZ);
    }
}
