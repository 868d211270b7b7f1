//! Discrete-event advances for input variables.
//!
//! Smooth inputs carry both a requantization entry (handled by the common
//! QSS stages) and a discrete entry at the function's next transition
//! time; order-0 inputs carry only the discrete entry.

use crate::{event::VarIndex, model::Model, simulation::Simulation, variable::VarKind, Error};

impl<M: Model> Simulation<M> {
    /// Discrete transition of an input variable at `t = tD`.
    pub(crate) fn advance_discrete(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        self.stats.num_discrete_events += 1;
        let (token, snap) = match &self.vars[v].kind {
            VarKind::Input { function } => (function.eval(t), None),
            VarKind::InputDiscrete { function, value } => (function.eval(t), Some(*value)),
            _ => {
                debug_assert!(false, "discrete events target input variables");
                return Ok(());
            }
        };

        match snap {
            None => {
                // Smooth input: the function may reset every coefficient
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
                self.publish_quantized(v);

                let te = self.vars[v].te_aligned(&self.options);
                self.vars[v].te = te;
                let handle = self.vars[v].event.take().expect("input has a QSS entry");
                self.vars[v].event = Some(self.queue.shift_qss(te, handle));
                self.reschedule_discrete(v);
                log::trace!(
                    "discrete input {} at t = {t}, next tD = {}",
                    self.vars[v].name,
                    self.vars[v].td
                );
                self.advance_observers(&[v], t)
            }
            Some(kind) => {
                let new = kind.snap(token.x0);
                let var = &mut self.vars[v];
                let changed = new != var.x[0];
                var.tq = t;
                var.tx = t;
                var.x[0] = new;
                var.q[0] = new;
                var.td = token.t_d;
                self.reschedule_discrete(v);
                if changed {
                    log::trace!("discrete input {} changed at t = {t}", self.vars[v].name);
                    self.advance_observers(&[v], t)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Move the discrete entry to the new `tD`, erasing it when the
    /// function has no further transitions.
    fn reschedule_discrete(&mut self, v: VarIndex) {
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
}
