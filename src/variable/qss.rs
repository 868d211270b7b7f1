//! Requantization stages for the QSS state-variable families.
//!
//! The stage split matches the simultaneous-trigger protocol: stage 0 reads
//! and publishes the new quantized base value, stage 1 the slope, stage 2
//! the higher coefficients, and stage F sets the next requantization time
//! and re-keys the queue entry. Within a batch no stage-k write is read by
//! a peer before every trigger finished stage k.

use crate::{
    event::VarIndex,
    math,
    model::Model,
    simulation::{DerivMode, Simulation},
    variable::{Family, VarKind},
    Error,
};

impl<M: Model> Simulation<M> {
    /// Stage 0: advance the continuous base value to `t` and refresh the
    /// quantum. The new `q0` is visible to sibling triggers.
    pub(crate) fn advance_qss_stage_0(&mut self, v: VarIndex, t: f64) {
        let token = match &self.vars[v].kind {
            VarKind::State { .. } => None,
            // Inputs re-read their function rather than extrapolating
            VarKind::Input { function } => Some(function.eval(t)),
            _ => {
                debug_assert!(false, "QSS events target state and input variables");
                return;
            }
        };
        match token {
            None => {
                let x0 = self.vars[v].x_at(t);
                let var = &mut self.vars[v];
                var.x1_prev = var.x[1];
                var.ts = t - var.tq;
                var.tq = t;
                var.tx = t;
                var.x[0] = x0;
                var.q = [x0, 0.0, 0.0, 0.0];
                var.l0 = x0;
                var.set_qtol();
            }
            Some(token) => {
                let var = &mut self.vars[v];
                var.ts = t - var.tq;
                var.tq = t;
                var.tx = t;
                var.x = [0.0; 4];
                let order = var.order.min(token.order);
                for i in 0..=order as usize {
                    var.x[i] = token.coefficient(i as u8);
                }
                var.q = [var.x[0], 0.0, 0.0, 0.0];
                var.td = token.t_d;
                var.set_qtol();
            }
        }
    }

    /// Stage 1: first-order coefficient from the model. Self-observing
    /// LIQSS variables run their full hysteretic quantization here,
    /// deferring the quantized value into `l0`.
    pub(crate) fn advance_qss_stage_1(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        if !self.vars[v].is_state() {
            return Ok(());
        }
        let liqss = matches!(
            self.vars[v].family(),
            Some(Family::Liqss | Family::XLiqss)
        ) && self.vars[v].self_observer;
        if liqss {
            return self.advance_liqss_simultaneous(v, t);
        }
        self.model.set_time(t);
        self.set_observees_at(v, t);
        let x1 = self.derivative(v)?;
        let var = &mut self.vars[v];
        var.x[1] = x1;
        if var.q_order() >= 1 {
            var.q[1] = x1;
        }
        Ok(())
    }

    /// Stage 2: higher-order coefficients (second and, for order-3
    /// methods, third — both come from the same derivative samples).
    pub(crate) fn advance_qss_stage_2(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let var = &self.vars[v];
        let liqss_done = matches!(
            var.family(),
            Some(Family::Liqss | Family::XLiqss)
        ) && var.self_observer;
        if var.is_state() && var.order >= 2 && !liqss_done {
            self.state_higher_coefficients(v, t)?;
        }
        Ok(())
    }

    /// Stage F: publish the quantized trajectory, compute the next
    /// requantization time, and re-key the queue entry.
    pub(crate) fn advance_qss_stage_f(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        if let Some(family) = self.vars[v].family() {
            self.publish_quantized(v);

            let mut te = self.vars[v].te_aligned(&self.options);
            if family == Family::RQss {
                // Relax steps whose slope sign flipped
                let var = &self.vars[v];
                if te.is_finite() && math::sign(var.x[1]) * math::sign(var.x1_prev) == -1 {
                    te = var.tq + 2.0 * (te - var.tq);
                }
            }
            self.vars[v].te = te;

            if self.vars[v].self_observer
                && matches!(family, Family::Liqss | Family::XLiqss | Family::RQss)
                && self.step_ratio.check_ratio()
            {
                let ratio = self.liqss_qss_step_ratio(v, t)?;
                self.step_ratio.add(ratio);
            }
        } else if matches!(self.vars[v].kind, VarKind::Input { .. }) {
            self.publish_quantized(v);
            let te = self.vars[v].te_aligned(&self.options);
            self.vars[v].te = te;
            // Reconcile the discrete entry with the token's tD
            let td = self.vars[v].td;
            match (self.vars[v].event_discrete.take(), td.is_finite()) {
                (Some(h), true) => {
                    self.vars[v].event_discrete = Some(self.queue.shift_discrete(td, h));
                }
                (Some(h), false) => {
                    self.queue.erase(h);
                }
                (None, true) => {
                    self.vars[v].event_discrete = Some(self.queue.add_discrete(td, v));
                }
                (None, false) => {}
            }
        }
        let te = self.vars[v].te;
        let handle = self.vars[v].event.take().expect("trigger has a queue entry");
        self.vars[v].event = Some(self.queue.shift_qss(te, handle));
        self.vars[v].requantizations += 1;
        self.stats.num_qss_events += 1;
        log::trace!("requantized {} at t = {t}, tE = {te}", self.vars[v].name);
        Ok(())
    }

    /// Copy the continuous coefficients into the quantized trajectory
    /// according to the family, publishing the deferred LIQSS value.
    pub(crate) fn publish_quantized(&mut self, v: VarIndex) {
        let var = &mut self.vars[v];
        if var.self_observer
            && matches!(var.family(), Some(Family::Liqss | Family::XLiqss))
        {
            var.q[0] = var.l0;
        }
        for i in 1..=var.q_order() as usize {
            var.q[i] = var.x[i];
        }
    }

    /// Refresh `x1` (and the higher coefficients) of a state variable from
    /// the model at time `t`. Used by observer and handler advances; does
    /// not touch the quantized trajectory.
    pub(crate) fn state_coefficients(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        self.model.set_time(t);
        self.set_observees_at(v, t);
        let x1 = self.derivative(v)?;
        self.vars[v].x[1] = x1;
        if self.vars[v].order >= 2 {
            self.state_higher_coefficients(v, t)?;
        }
        Ok(())
    }

    /// Second- and third-order coefficients, by directional derivative when
    /// the model offers them and forward differencing otherwise.
    pub(crate) fn state_higher_coefficients(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        debug_assert!(self.vars[v].order >= 2);
        let h = self.options.dt_nd;
        let x1 = self.vars[v].x[1];

        if self.deriv_mode == DerivMode::Directional {
            let (knowns, seeds): (Vec<_>, Vec<_>) = {
                let var = &self.vars[v];
                var.observees
                    .iter()
                    .map(|&o| (self.vars[o].vr, self.vars[o].q1_at(t)))
                    .unzip()
            };
            let dd = self
                .model
                .get_directional_derivative(&knowns, &seeds, self.vars[v].vr)?;
            self.vars[v].x[2] = 0.5 * dd;
            if self.vars[v].order >= 3 {
                let x2 = self.vars[v].x[2];
                let x1_p = self.sample_derivative_forward(v, t, h)?;
                self.vars[v].x[3] = (x1_p - x1 - 2.0 * x2 * h) / (3.0 * h * h);
                self.restore_model_state(v, t);
            }
            return Ok(());
        }

        if self.vars[v].order == 2 {
            let x1_p = self.sample_derivative_forward(v, t, h)?;
            self.vars[v].x[2] = (x1_p - x1) * self.options.one_over_two_dt_nd();
        } else {
            let x1_p = self.sample_derivative_forward(v, t, h)?;
            let x1_pp = self.sample_derivative_forward(v, t, 2.0 * h)?;
            self.vars[v].x[2] =
                (-3.0 * x1 + 4.0 * x1_p - x1_pp) * self.options.one_over_four_dt_nd();
            self.vars[v].x[3] =
                (x1 - 2.0 * x1_p + x1_pp) * self.options.one_over_six_dt_nd_squared();
        }
        self.restore_model_state(v, t);
        Ok(())
    }

    /// Evaluate the derivative of `v` at `t + h` with observees advanced to
    /// `t + h` and the variable's own value propagated forward along its
    /// continuous slope.
    fn sample_derivative_forward(&mut self, v: VarIndex, t: f64, h: f64) -> Result<f64, Error> {
        let tn = t + h;
        self.model.set_time(tn);
        self.set_observees_at(v, tn);
        if self.vars[v].self_observer {
            let var = &self.vars[v];
            let fwd = var.x[0] + var.x[1] * h;
            self.model.set_real(var.vr, fwd);
        }
        self.derivative(v)
    }

    /// Reset the model time and observee values to `t` after sampling.
    pub(crate) fn restore_model_state(&mut self, v: VarIndex, t: f64) {
        self.model.set_time(t);
        self.set_observees_at(v, t);
    }
}
