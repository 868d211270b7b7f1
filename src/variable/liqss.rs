//! Hysteretic quantization for self-observing (stiff) variables.
//!
//! A self-observer evaluates its own derivative at the candidate quantized
//! values `q0 - qTol` and `q0 + qTol` and picks the one that keeps the sign
//! of the leading derivative monotone across the quantum; when the signs
//! disagree it interpolates the value where the leading derivative
//! vanishes. During simultaneous batches the chosen value is deferred into
//! `l0` so sibling stage-0/1 reads still see the previous quantized value.

use crate::{event::VarIndex, math, model::Model, simulation::Simulation, Error};

impl<M: Model> Simulation<M> {
    /// Quantize a self-observing LIQSS variable at time `t`, deferring the
    /// quantized value into `l0`. The model is left set to `t` with the
    /// centered value restored.
    pub(crate) fn advance_liqss_simultaneous(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        debug_assert!(self.vars[v].is_self_observer());
        debug_assert!(self.vars[v].qtol > 0.0);
        match self.vars[v].order {
            1 => self.advance_liqss_1(v, t),
            2 => self.advance_liqss_2(v, t),
            _ => self.advance_liqss_3(v, t),
        }
    }

    fn advance_liqss_1(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let (q_c, qtol, vr) = {
            let var = &self.vars[v];
            (var.q[0], var.qtol, var.vr)
        };
        let q_l = q_c - qtol;
        let q_u = q_c + qtol;

        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, q_l);
        let x1_l = self.derivative(v)?;
        self.model.set_real(vr, q_u);
        let x1_u = self.derivative(v)?;
        self.model.set_real(vr, q_c);

        let var = &mut self.vars[v];
        match (math::sign(x1_l), math::sign(x1_u)) {
            (-1, -1) => {
                var.l0 = q_l;
                var.x[1] = x1_l;
            }
            (1, 1) => {
                var.l0 = q_u;
                var.x[1] = x1_u;
            }
            (0, 0) => {
                var.l0 = q_c;
                var.x[1] = 0.0;
            }
            _ => {
                // Derivative changes sign across the quantum: quantize at
                // its interpolated zero
                var.l0 = (((q_l * x1_u) - (q_u * x1_l)) / (x1_u - x1_l)).clamp(q_l, q_u);
                var.x[1] = 0.0;
            }
        }
        Ok(())
    }

    fn advance_liqss_2(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let (q_c, qtol, vr) = {
            let var = &self.vars[v];
            (var.q[0], var.qtol, var.vr)
        };
        let q_l = q_c - qtol;
        let q_u = q_c + qtol;
        let h = self.options.dt_nd;

        // Derivative at the candidate values
        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, q_l);
        let x1_l = self.derivative(v)?;
        self.model.set_real(vr, q_u);
        let x1_u = self.derivative(v)?;

        // Second derivative at the candidate values, forward differenced
        let tn = t + h;
        self.model.set_time(tn);
        self.set_observees_at(v, tn);
        self.model.set_real(vr, q_l + (x1_l * h));
        let x2_l = (self.derivative(v)? - x1_l) * self.options.one_over_two_dt_nd();
        self.model.set_real(vr, q_u + (x1_u * h));
        let x2_u = (self.derivative(v)? - x1_u) * self.options.one_over_two_dt_nd();

        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, q_c);

        let var = &mut self.vars[v];
        match (math::sign(x2_l), math::sign(x2_u)) {
            (-1, -1) => {
                // Downward curving trajectory
                var.l0 = q_l;
                var.x[1] = x1_l;
                var.x[2] = x2_l;
            }
            (1, 1) => {
                // Upward curving trajectory
                var.l0 = q_u;
                var.x[1] = x1_u;
                var.x[2] = x2_u;
            }
            (0, 0) => {
                // Non-curving trajectory
                var.l0 = q_c;
                var.x[1] = 0.5 * (x1_l + x1_u);
                var.x[2] = 0.0;
            }
            _ => {
                // Straight trajectory: value where the second derivative
                // vanishes, clipped against roundoff
                var.l0 = (((q_l * x2_u) - (q_u * x2_l)) / (x2_u - x2_l)).clamp(q_l, q_u);
                var.x[1] =
                    (((q_u - var.l0) * x1_l) + ((var.l0 - q_l) * x1_u)) / (2.0 * qtol);
                var.x[2] = 0.0;
            }
        }
        Ok(())
    }

    fn advance_liqss_3(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let (q_c, qtol, vr) = {
            let var = &self.vars[v];
            (var.q[0], var.qtol, var.vr)
        };
        let q_l = q_c - qtol;
        let q_u = q_c + qtol;
        let h = self.options.dt_nd;

        let (x1_l, x2_l, x3_l) = self.liqss_candidate_coefficients(v, t, q_l)?;
        let (x1_u, x2_u, x3_u) = self.liqss_candidate_coefficients(v, t, q_u)?;

        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, q_c);

        let var = &mut self.vars[v];
        match (math::sign(x3_l), math::sign(x3_u)) {
            (-1, -1) => {
                var.l0 = q_l;
                var.x[1] = x1_l;
                var.x[2] = x2_l;
                var.x[3] = x3_l;
            }
            (1, 1) => {
                var.l0 = q_u;
                var.x[1] = x1_u;
                var.x[2] = x2_u;
                var.x[3] = x3_u;
            }
            (0, 0) => {
                var.l0 = q_c;
                var.x[1] = 0.5 * (x1_l + x1_u);
                var.x[2] = 0.5 * (x2_l + x2_u);
                var.x[3] = 0.0;
            }
            _ => {
                var.l0 = (((q_l * x3_u) - (q_u * x3_l)) / (x3_u - x3_l)).clamp(q_l, q_u);
                let w_l = (q_u - var.l0) / (2.0 * qtol);
                let w_u = (var.l0 - q_l) / (2.0 * qtol);
                var.x[1] = (w_l * x1_l) + (w_u * x1_u);
                var.x[2] = (w_l * x2_l) + (w_u * x2_u);
                var.x[3] = 0.0;
            }
        }
        Ok(())
    }

    /// First, second, and third derivative coefficients with the variable
    /// held at the candidate value `q_b`, forward differenced over two
    /// steps.
    fn liqss_candidate_coefficients(
        &mut self,
        v: VarIndex,
        t: f64,
        q_b: f64,
    ) -> Result<(f64, f64, f64), Error> {
        let vr = self.vars[v].vr;
        let h = self.options.dt_nd;

        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, q_b);
        let x1_0 = self.derivative(v)?;

        let tn = t + h;
        self.model.set_time(tn);
        self.set_observees_at(v, tn);
        self.model.set_real(vr, q_b + (x1_0 * h));
        let x1_1 = self.derivative(v)?;

        let tn = t + 2.0 * h;
        self.model.set_time(tn);
        self.set_observees_at(v, tn);
        self.model.set_real(vr, q_b + (x1_0 * 2.0 * h));
        let x1_2 = self.derivative(v)?;

        let x2 = (-3.0 * x1_0 + 4.0 * x1_1 - x1_2) * self.options.one_over_four_dt_nd();
        let x3 = (x1_0 - 2.0 * x1_1 + x1_2) * self.options.one_over_six_dt_nd_squared();
        Ok((x1_0, x2, x3))
    }

    /// Ratio of the hysteretic step to the plain QSS step, sampled
    /// periodically for self-observers. An unbounded hysteretic step with a
    /// bounded plain step reports infinity.
    pub(crate) fn liqss_qss_step_ratio(&mut self, v: VarIndex, t: f64) -> Result<f64, Error> {
        debug_assert!(self.vars[v].is_self_observer());
        let (n, qtol, vr, q0, x0) = {
            let var = &self.vars[v];
            (var.order, var.qtol, var.vr, var.q[0], var.x[0])
        };
        let lead = self.vars[v].x[n as usize];
        let dt_liqss = if lead != 0.0 {
            (qtol / lead.abs()).powf(1.0 / n as f64)
        } else {
            f64::INFINITY
        };

        // Plain QSS step: leading coefficient evaluated at the centered
        // value
        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, x0);
        let x1_c = self.derivative(v)?;
        let dt_qss = if n == 1 {
            if x1_c != 0.0 {
                qtol / x1_c.abs()
            } else {
                f64::INFINITY
            }
        } else {
            let h = self.options.dt_nd;
            let tn = t + h;
            self.model.set_time(tn);
            self.set_observees_at(v, tn);
            self.model.set_real(vr, x0 + (x1_c * h));
            let x2_c = (self.derivative(v)? - x1_c) * self.options.one_over_two_dt_nd();
            if x2_c != 0.0 {
                (qtol / x2_c.abs()).sqrt()
            } else {
                f64::INFINITY
            }
        };

        self.model.set_time(t);
        self.set_observees_at(v, t);
        self.model.set_real(vr, q0);

        let ratio = if !dt_qss.is_finite() {
            if dt_liqss.is_finite() {
                0.0
            } else {
                1.0
            }
        } else if dt_qss > 0.0 {
            dt_liqss / dt_qss
        } else if dt_liqss > 0.0 {
            f64::INFINITY
        } else {
            1.0
        };
        Ok(ratio)
    }
}
