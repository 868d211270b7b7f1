//! Simulation instance: variables, dependency graph, event queue, and the
//! dispatch loop.
//!
//! One `Simulation` owns everything for one model; independent simulations
//! share no state and can run on separate threads. The loop itself is
//! single-threaded and cooperative: every event handler runs to completion
//! synchronously.

use itertools::Itertools;

use crate::{
    event::{EventType, VarIndex},
    event_queue::EventQueue,
    input::InputFunction,
    model::{EventUpdate, Model},
    options::Options,
    step_ratio::StepRatio,
    variable::{CrossingSet, DiscreteKind, Family, KindTag, Method, VarKind, Variable, ZcData},
    Error, ValueRef,
};

/// How second- and third-order trajectory coefficients are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivMode {
    /// Forward differencing of first derivatives with step `dt_nd`
    NumericDiff,
    /// Directional-derivative evaluation by the model
    Directional,
}

/// Counters reported after a run.
#[derive(Debug, Default, Clone)]
pub struct SimStats {
    /// Dispatch-loop iterations
    pub num_steps: u64,
    /// Requantization events (including zero-crossing requantizations)
    pub num_qss_events: u64,
    /// Zero-crossing events fired
    pub num_zc_events: u64,
    /// Handler re-initializations
    pub num_handler_events: u64,
    /// Discrete input transitions
    pub num_discrete_events: u64,
    /// Observer re-evaluations
    pub num_observer_updates: u64,
    /// Time the loop stopped at
    pub end_time: f64,
}

/// Result of a single dispatch-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An event was processed
    Event,
    /// The queue is exhausted or the next event lies beyond the stop time
    Done,
    /// The model requested termination
    Terminated,
}

pub struct Simulation<M: Model> {
    pub(crate) model: M,
    pub(crate) options: Options,
    pub(crate) vars: Vec<Variable>,
    pub(crate) queue: EventQueue,
    pub(crate) deriv_mode: DerivMode,
    pub(crate) stats: SimStats,
    pub(crate) step_ratio: StepRatio,
    pub(crate) t: f64,
    initialized: bool,
    terminated: bool,
}

impl<M: Model> Simulation<M> {
    pub fn new(model: M, options: Options) -> Self {
        let deriv_mode = if model.provides_directional_derivatives() {
            DerivMode::Directional
        } else {
            DerivMode::NumericDiff
        };
        let t = options.t_start;
        Self {
            model,
            options,
            vars: Vec::new(),
            queue: EventQueue::new(),
            deriv_mode,
            stats: SimStats::default(),
            step_ratio: StepRatio::default(),
            t,
            initialized: false,
            terminated: false,
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Force numerical differencing even when the model offers directional
    /// derivatives.
    pub fn set_numeric_differentiation(&mut self) {
        self.deriv_mode = DerivMode::NumericDiff;
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Add a continuous state variable integrated by `method`.
    pub fn add_state(&mut self, name: impl Into<String>, method: Method, vr: ValueRef) -> VarIndex {
        let mut var = Variable::state(name, method, vr);
        var.rtol = self.options.rtol;
        var.atol = self.options.atol;
        self.push(var)
    }

    /// Add a state variable with tolerances overriding the simulation
    /// defaults.
    pub fn add_state_with_tolerance(
        &mut self,
        name: impl Into<String>,
        method: Method,
        vr: ValueRef,
        rtol: f64,
        atol: f64,
    ) -> VarIndex {
        let mut var = Variable::state(name, method, vr);
        var.rtol = rtol;
        var.atol = atol;
        self.push(var)
    }

    /// Add a smooth input variable of the given order.
    pub fn add_input(
        &mut self,
        name: impl Into<String>,
        order: u8,
        function: InputFunction,
        vr: ValueRef,
    ) -> VarIndex {
        let mut var = Variable::input(name, order, function, vr);
        var.rtol = self.options.rtol;
        var.atol = self.options.atol;
        self.push(var)
    }

    /// Add a discrete (order 0) input variable.
    pub fn add_discrete_input(
        &mut self,
        name: impl Into<String>,
        value: DiscreteKind,
        function: InputFunction,
        vr: ValueRef,
    ) -> VarIndex {
        let mut var = Variable::input_discrete(name, value, function, vr);
        var.rtol = self.options.rtol;
        var.atol = self.options.atol;
        self.push(var)
    }

    /// Add a zero-crossing variable over the model's event indicator `vr`.
    pub fn add_zero_crossing(
        &mut self,
        name: impl Into<String>,
        order: u8,
        crossings: CrossingSet,
        vr: ValueRef,
    ) -> VarIndex {
        let zc = ZcData::new(crossings, self.options.ztol);
        let mut var = Variable::zero_crossing(name, order, zc, vr);
        var.rtol = self.options.rtol;
        var.atol = self.options.atol;
        self.push(var)
    }

    /// Add a handler-updated discrete variable.
    pub fn add_discrete(
        &mut self,
        name: impl Into<String>,
        value: DiscreteKind,
        vr: ValueRef,
    ) -> VarIndex {
        let mut var = Variable::discrete(name, value, vr);
        var.rtol = self.options.rtol;
        var.atol = self.options.atol;
        self.push(var)
    }

    fn push(&mut self, var: Variable) -> VarIndex {
        debug_assert!(!self.initialized);
        self.vars.push(var);
        self.vars.len() - 1
    }

    /// Declare that `observer` depends on `observee` (its derivative or
    /// indicator reads the observee's value). Both edge directions are
    /// wired; observing oneself marks the variable as a self-observer.
    pub fn observe(&mut self, observer: VarIndex, observee: VarIndex) {
        if observer == observee {
            self.vars[observer].self_observer = true;
            if !self.vars[observer].observees.contains(&observee) {
                self.vars[observer].observees.push(observee);
            }
            return;
        }
        if !self.vars[observer].observees.contains(&observee) {
            self.vars[observer].observees.push(observee);
        }
        if !self.vars[observee].observers.contains(&observer) {
            self.vars[observee].observers.push(observer);
        }
    }

    /// Declare that the crossing of `zc` re-initializes `target` through a
    /// handler event.
    pub fn add_handler(&mut self, zc: VarIndex, target: VarIndex) -> Result<(), Error> {
        if self.vars[target].is_input() {
            return Err(Error::Setup(format!(
                "input variable '{}' cannot be a handler target",
                self.vars[target].name
            )));
        }
        match &mut self.vars[zc].kind {
            VarKind::ZeroCrossing(data) => {
                if !data.handlers.contains(&target) {
                    data.handlers.push(target);
                }
                Ok(())
            }
            _ => Err(Error::Setup(format!(
                "'{}' is not a zero-crossing variable",
                self.vars[zc].name
            ))),
        }
    }

    /// Detach a variable from the dependency graph, erasing the mirrored
    /// back-edges on all peers. Setup-time only.
    pub fn disconnect(&mut self, v: VarIndex) {
        debug_assert!(!self.initialized);
        let observees = std::mem::take(&mut self.vars[v].observees);
        for o in observees {
            self.vars[o].observers.retain(|&w| w != v);
        }
        let observers = std::mem::take(&mut self.vars[v].observers);
        for w in observers {
            self.vars[w].observees.retain(|&o| o != v);
        }
        self.vars[v].self_observer = false;
    }

    /// Look a variable up by name.
    pub fn variable_index(&self, name: &str) -> Option<VarIndex> {
        self.vars.iter().position(|v| v.name == name)
    }

    /// Look a variable up by name, erroring when the name is unknown.
    pub fn find_variable(&self, name: &str) -> Result<VarIndex, Error> {
        self.variable_index(name).ok_or(Error::UnknownVariable {
            name: name.to_string(),
        })
    }

    pub fn variable(&self, v: VarIndex) -> &Variable {
        &self.vars[v]
    }

    pub fn variables(&self) -> &[Variable] {
        &self.vars
    }

    // ------------------------------------------------------------------
    // Initialization
    // ------------------------------------------------------------------

    /// Validate the wiring and prepare queue structures. Must precede
    /// [`Self::init`].
    pub fn pre_simulate(&mut self) -> Result<(), Error> {
        for v in 0..self.vars.len() {
            let var = &self.vars[v];
            if var.is_input() && !var.observees.is_empty() {
                return Err(Error::Setup(format!(
                    "input variable '{}' cannot observe other variables",
                    var.name
                )));
            }
            if matches!(var.kind, VarKind::Discrete { .. }) && !var.observees.is_empty() {
                return Err(Error::Setup(format!(
                    "discrete variable '{}' cannot observe other variables",
                    var.name
                )));
            }
            // Back-edge symmetry
            for &o in &var.observees {
                if o != v && !self.vars[o].observers.contains(&v) {
                    return Err(Error::Setup(format!(
                        "dependency edges of '{}' are not mirrored",
                        var.name
                    )));
                }
            }
        }
        self.model.set_time(self.options.t_start);
        self.t = self.options.t_start;
        Ok(())
    }

    /// Run the staged initialization on every variable and populate the
    /// event queue with the first requantization events.
    pub fn init(&mut self) -> Result<(), Error> {
        let t0 = self.options.t_start;
        self.t = t0;
        self.model.set_time(t0);
        for v in 0..self.vars.len() {
            self.init_stage_0(v);
        }
        for v in 0..self.vars.len() {
            self.init_stage_1(v)?;
        }
        for v in 0..self.vars.len() {
            self.init_stage_2(v)?;
        }
        for v in 0..self.vars.len() {
            self.init_stage_f(v)?;
        }
        self.initialized = true;
        self.stats.end_time = t0;
        log::debug!(
            "Initialized {} variables, {} queue entries",
            self.vars.len(),
            self.queue.len()
        );
        Ok(())
    }

    fn init_stage_0(&mut self, v: VarIndex) {
        let t0 = self.options.t_start;
        let token = match &self.vars[v].kind {
            VarKind::Input { function } | VarKind::InputDiscrete { function, .. } => {
                Some(function.eval(t0))
            }
            _ => None,
        };
        let x0 = match (&self.vars[v].kind, &token) {
            (VarKind::Input { .. } | VarKind::InputDiscrete { .. }, Some(tok)) => tok.x0,
            (VarKind::ZeroCrossing(_), _) => 0.0, // set in stage 1
            _ => self.model.get_real(self.vars[v].vr),
        };
        let var = &mut self.vars[v];
        var.tq = t0;
        var.tx = t0;
        var.x[0] = x0;
        var.q[0] = x0;
        var.l0 = x0;
        if let Some(tok) = token {
            var.td = tok.t_d;
            let order = var.order.min(tok.order);
            for i in 1..=order as usize {
                var.x[i] = tok.coefficient(i as u8);
            }
        }
        if !var.is_zc() {
            var.set_qtol();
        }
    }

    fn init_stage_1(&mut self, v: VarIndex) -> Result<(), Error> {
        let t0 = self.options.t_start;
        if self.vars[v].is_zc() {
            return self.zc_coefficients(v, t0);
        }
        if !self.vars[v].is_state() {
            return Ok(());
        }
        let liqss = matches!(
            self.vars[v].family(),
            Some(Family::Liqss | Family::XLiqss)
        ) && self.vars[v].self_observer;
        if liqss {
            self.advance_liqss_simultaneous(v, t0)
        } else {
            self.model.set_time(t0);
            self.set_observees_at(v, t0);
            let x1 = self.derivative(v)?;
            self.vars[v].x[1] = x1;
            Ok(())
        }
    }

    fn init_stage_2(&mut self, v: VarIndex) -> Result<(), Error> {
        let skip_liqss = matches!(
            self.vars[v].family(),
            Some(Family::Liqss | Family::XLiqss)
        ) && self.vars[v].self_observer;
        if self.vars[v].is_state() && self.vars[v].order >= 2 && !skip_liqss {
            self.state_higher_coefficients(v, self.options.t_start)?;
        }
        Ok(())
    }

    fn init_stage_f(&mut self, v: VarIndex) -> Result<(), Error> {
        let t0 = self.options.t_start;
        match self.vars[v].tag() {
            KindTag::State => {
                self.publish_quantized(v);
                let te = self.vars[v].te_aligned(&self.options);
                self.vars[v].te = te;
                self.vars[v].event = Some(self.queue.add_qss(te, v));
            }
            KindTag::Input => {
                self.publish_quantized(v);
                let te = self.vars[v].te_aligned(&self.options);
                self.vars[v].te = te;
                self.vars[v].event = Some(self.queue.add_qss(te, v));
                let td = self.vars[v].td;
                if td < f64::INFINITY {
                    self.vars[v].event_discrete = Some(self.queue.add_discrete(td, v));
                }
            }
            KindTag::InputDiscrete(_) => {
                self.vars[v].te = f64::INFINITY;
                let td = self.vars[v].td;
                if td < f64::INFINITY {
                    self.vars[v].event_discrete = Some(self.queue.add_discrete(td, v));
                }
            }
            KindTag::ZeroCrossing => {
                self.schedule_zc(v, t0, true)?;
            }
            KindTag::Discrete(_) => {
                // No own dynamics: enters the queue only through handlers
                self.vars[v].te = f64::INFINITY;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dispatch loop
    // ------------------------------------------------------------------

    /// Real time of the next scheduled event, infinity when the queue is
    /// empty.
    pub fn next_event_time(&self) -> f64 {
        self.queue.top_time()
    }

    /// Process the top event (or simultaneous batch). Returns whether an
    /// event was processed, the run finished, or the model terminated.
    pub fn step(&mut self) -> Result<StepOutcome, Error> {
        debug_assert!(self.initialized);
        if self.terminated {
            return Ok(StepOutcome::Terminated);
        }
        let top = self.queue.top_superdense_time();
        if top.t > self.options.t_end {
            self.stats.end_time = self.options.t_end.min(top.t);
            return Ok(StepOutcome::Done);
        }
        self.queue.set_active_time();
        let t = top.t;
        self.t = t;
        self.stats.num_steps += 1;

        if !self.queue.simultaneous() {
            let event = *self
                .queue
                .top()
                .map(|(_, e)| e)
                .expect("queue verified non-empty");
            match event.event_type() {
                EventType::Qss => self.advance_qss_batch(&[event.target()], t)?,
                EventType::QssZc => self.advance_qss_zc(event.target(), t)?,
                EventType::ZeroCrossing => self.advance_zc(event.target(), t)?,
                EventType::Handler => self.advance_handler_batch(&[event.target()], t)?,
                EventType::Discrete => self.advance_discrete(event.target(), t)?,
                EventType::Conditional => self.drop_conditional(),
            }
        } else {
            let batch = self.queue.simultaneous_events();
            let targets: Vec<VarIndex> = batch.iter().map(|(_, e)| e.target()).collect();
            match batch[0].1.event_type() {
                EventType::Qss => self.advance_qss_batch(&targets, t)?,
                EventType::QssZc => {
                    for v in targets {
                        self.advance_qss_zc(v, t)?;
                    }
                }
                EventType::ZeroCrossing => {
                    for v in targets {
                        self.advance_zc(v, t)?;
                    }
                }
                EventType::Handler => self.advance_handler_batch(&targets, t)?,
                EventType::Discrete => {
                    for v in targets {
                        self.advance_discrete(v, t)?;
                    }
                }
                EventType::Conditional => self.drop_conditional(),
            }
        }

        if self.terminated {
            self.stats.end_time = self.t;
            Ok(StepOutcome::Terminated)
        } else {
            Ok(StepOutcome::Event)
        }
    }

    /// Run the dispatch loop to the stop time.
    pub fn run(&mut self) -> Result<SimStats, Error> {
        loop {
            match self.step()? {
                StepOutcome::Event => {}
                StepOutcome::Done | StepOutcome::Terminated => break,
            }
        }
        Ok(self.stats.clone())
    }

    fn drop_conditional(&mut self) {
        // Conditional events are reserved in the ordering but never
        // scheduled by this core.
        log::warn!("dropping unexpected conditional event");
        if let Some((h, _)) = self.queue.top() {
            let h = *h;
            self.queue.erase(h);
        }
    }

    // ------------------------------------------------------------------
    // Simultaneous-trigger stepping protocol
    // ------------------------------------------------------------------

    /// Advance a batch of requantization triggers in lock-step stages, then
    /// propagate to the union of their observers.
    pub(crate) fn advance_qss_batch(&mut self, targets: &[VarIndex], t: f64) -> Result<(), Error> {
        let max_order = targets
            .iter()
            .map(|&v| self.vars[v].order)
            .max()
            .unwrap_or(0);
        for &v in targets {
            self.advance_qss_stage_0(v, t);
        }
        for &v in targets {
            self.advance_qss_stage_1(v, t)?;
        }
        if max_order >= 2 {
            for &v in targets {
                self.advance_qss_stage_2(v, t)?;
            }
        }
        for &v in targets {
            self.advance_qss_stage_f(v, t)?;
        }
        self.advance_observers(targets, t)
    }

    /// Re-evaluate every observer of the triggers at time `t`.
    pub(crate) fn advance_observers(&mut self, triggers: &[VarIndex], t: f64) -> Result<(), Error> {
        let observers: Vec<VarIndex> = triggers
            .iter()
            .flat_map(|&v| self.vars[v].observers.iter().copied())
            .unique()
            .filter(|w| !triggers.contains(w))
            .collect();
        for w in observers {
            self.advance_observer(w, t)?;
        }
        Ok(())
    }

    /// Observer callback: refresh the continuous trajectory at `t` without
    /// requantizing.
    pub(crate) fn advance_observer(&mut self, w: VarIndex, t: f64) -> Result<(), Error> {
        self.stats.num_observer_updates += 1;
        if self.vars[w].is_zc() {
            return self.advance_zc_observer(w, t);
        }
        if !self.vars[w].is_state() {
            debug_assert!(false, "only state and zero-crossing variables observe");
            return Ok(());
        }
        let x0 = self.vars[w].x_at(t);
        let var = &mut self.vars[w];
        var.tx = t;
        var.x[0] = x0;
        self.state_coefficients(w, t)?;
        let te = self.vars[w].te_unaligned(&self.options);
        self.vars[w].te = te;
        let handle = self.vars[w].event.take().expect("observer has a queue entry");
        self.vars[w].event = Some(self.queue.shift_qss(te, handle));
        log::trace!(
            "observer {} advanced at t = {t}, tE = {te}",
            self.vars[w].name
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Handler events
    // ------------------------------------------------------------------

    /// Run the model's event-handling sequence and re-initialize the
    /// handler targets.
    pub(crate) fn advance_handler_batch(
        &mut self,
        targets: &[VarIndex],
        t: f64,
    ) -> Result<(), Error> {
        self.stats.num_handler_events += targets.len() as u64;
        self.model.set_time(t);
        // Present the pre-event continuous values to the model
        for &v in targets {
            if self.vars[v].is_state() {
                let x = self.vars[v].x_at(t);
                self.model.set_real(self.vars[v].vr, x);
            }
        }
        for &v in targets {
            self.set_observees_at(v, t);
        }

        self.model.enter_event_mode()?;
        let mut update = EventUpdate::default();
        let mut iterations = 0u32;
        loop {
            self.model.update_discrete_states(&mut update)?;
            if !update.discrete_states_need_update {
                break;
            }
            iterations += 1;
            if iterations > 16 {
                return Err(crate::model::ModelError::EventIteration.into());
            }
        }
        if update.terminate_simulation {
            log::info!("Termination requested by model at t = {t}");
            self.terminated = true;
        }

        for &v in targets {
            self.advance_handler_target(v, t)?;
        }
        self.model.enter_continuous_time_mode()?;
        self.advance_observers(targets, t)
    }

    fn advance_handler_target(&mut self, v: VarIndex, t: f64) -> Result<(), Error> {
        let value = self.model.get_real(self.vars[v].vr);
        log::trace!("handler {} at t = {t}, value = {value}", self.vars[v].name);
        match self.vars[v].tag() {
            KindTag::State => {
                let var = &mut self.vars[v];
                var.ts = t - var.tq;
                var.tq = t;
                var.tx = t;
                var.x = [value, 0.0, 0.0, 0.0];
                var.q = [value, 0.0, 0.0, 0.0];
                var.l0 = value;
                var.set_qtol();
                self.state_coefficients(v, t)?;
                self.publish_quantized(v);
                let te = self.vars[v].te_aligned(&self.options);
                self.vars[v].te = te;
                let handle = self.vars[v].event.take().expect("handler target has an entry");
                self.vars[v].event = Some(self.queue.shift_qss(te, handle));
            }
            KindTag::ZeroCrossing => {
                // Re-root from the post-event state
                self.zc_requantize(v, t)?;
            }
            KindTag::Discrete(kind) => {
                let snapped = kind.snap(value);
                let var = &mut self.vars[v];
                var.tq = t;
                var.tx = t;
                var.x[0] = snapped;
                var.q[0] = snapped;
                if let Some(handle) = var.event.take() {
                    self.queue.erase(handle);
                }
            }
            KindTag::Input | KindTag::InputDiscrete(_) => {
                debug_assert!(false, "input variables are rejected as handler targets");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Model access helpers
    // ------------------------------------------------------------------

    /// Write the quantized values of `v`'s observees into the model at
    /// time `t`.
    pub(crate) fn set_observees_at(&mut self, v: VarIndex, t: f64) {
        let Self { vars, model, .. } = self;
        for &o in &vars[v].observees {
            model.set_real(vars[o].vr, vars[o].q_at(t));
        }
    }

    pub(crate) fn derivative(&mut self, v: VarIndex) -> Result<f64, Error> {
        Ok(self.model.get_derivative(self.vars[v].vr)?)
    }

    pub(crate) fn indicator(&mut self, v: VarIndex) -> Result<f64, Error> {
        Ok(self.model.get_event_indicator(self.vars[v].vr)?)
    }

    // ------------------------------------------------------------------
    // Probes
    // ------------------------------------------------------------------

    /// Current simulation time (the time of the last dispatched event).
    pub fn time(&self) -> f64 {
        self.t
    }

    /// Continuous value of `v` at `t`, valid for `tx <= t <= te`.
    pub fn sample(&self, v: VarIndex, t: f64) -> f64 {
        self.vars[v].x_at(t)
    }

    /// Quantized value of `v` at `t`, valid for `tq <= t`.
    pub fn sample_quantized(&self, v: VarIndex, t: f64) -> f64 {
        self.vars[v].q_at(t)
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// LIQSS/QSS step-ratio metric accumulated over the run.
    pub fn step_ratio(&self) -> &StepRatio {
        &self.step_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelError;
    use float_cmp::assert_approx_eq;

    /// `dx/dt = -x + u` over two stored values (reference 0 is the state,
    /// reference 1 an optional input that defaults to zero).
    struct TestDecay {
        values: [f64; 2],
    }

    impl TestDecay {
        fn new(x0: f64) -> Self {
            Self { values: [x0, 0.0] }
        }
    }

    impl Model for TestDecay {
        fn set_time(&mut self, _t: f64) {}

        fn get_real(&self, vr: ValueRef) -> f64 {
            self.values[vr as usize]
        }

        fn set_real(&mut self, vr: ValueRef, value: f64) {
            self.values[vr as usize] = value;
        }

        fn get_derivative(&mut self, _vr: ValueRef) -> Result<f64, ModelError> {
            Ok(-self.values[0] + self.values[1])
        }

        fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
            Err(ModelError::UnknownValueRef(vr))
        }
    }

    /// A derivative that is identically zero.
    struct Frozen {
        x: f64,
    }

    impl Model for Frozen {
        fn set_time(&mut self, _t: f64) {}

        fn get_real(&self, _vr: ValueRef) -> f64 {
            self.x
        }

        fn set_real(&mut self, _vr: ValueRef, value: f64) {
            self.x = value;
        }

        fn get_derivative(&mut self, _vr: ValueRef) -> Result<f64, ModelError> {
            Ok(0.0)
        }

        fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
            Err(ModelError::UnknownValueRef(vr))
        }
    }

    fn options(t_end: f64) -> Options {
        Options {
            rtol: 1.0e-6,
            atol: 1.0e-6,
            t_end,
            ..Options::default()
        }
    }

    #[test]
    fn single_variable_loop_terminates() {
        let mut sim = Simulation::new(TestDecay::new(1.0), options(1.0));
        let x = sim.add_state("x", Method::qss2(), 0);
        sim.observe(x, x);
        sim.pre_simulate().unwrap();
        sim.init().unwrap();

        let stats = sim.run().unwrap();
        assert!(stats.num_qss_events > 0);
        assert_eq!(stats.end_time, 1.0);
        // Endpoint accuracy within a few quanta
        assert_approx_eq!(
            f64,
            sim.sample(x, 1.0),
            (-1.0f64).exp(),
            epsilon = 1.0e-5
        );
    }

    #[test]
    fn invariants_hold_at_every_event() {
        let mut sim = Simulation::new(TestDecay::new(1.0), options(2.0));
        let x = sim.add_state("x", Method::qss2(), 0);
        sim.observe(x, x);
        sim.pre_simulate().unwrap();
        sim.init().unwrap();

        while sim.step().unwrap() == StepOutcome::Event {
            let var = sim.variable(x);
            assert!(var.quantum() > 0.0);
            assert!(var.tq() <= var.tx());
            assert!(var.tx() <= var.te());
            assert!(var.tq() <= var.td());
            // The requantization lands where the deviation reaches the
            // quantum
            if var.te().is_finite() {
                let dev = (var.x_at(var.te()) - var.q_at(var.te())).abs();
                assert!(dev <= var.quantum() * (1.0 + 1.0e-9));
            }
        }
    }

    #[test]
    fn observer_edges_are_mirrored() {
        let mut sim = Simulation::new(TestDecay::new(1.0), options(1.0));
        let a = sim.add_state("a", Method::qss2(), 0);
        let b = sim.add_state("b", Method::qss2(), 1);
        sim.observe(a, b);
        sim.observe(b, a);
        for (u, w) in [(a, b), (b, a)] {
            assert!(sim.variable(u).observees().contains(&w));
            assert!(sim.variable(w).observers().contains(&u));
        }
        assert!(sim.pre_simulate().is_ok());

        sim.disconnect(a);
        assert!(sim.variable(a).observees().is_empty());
        assert!(sim.variable(b).observers().is_empty());
        assert!(sim.variable(b).observees().is_empty());
    }

    #[test]
    fn discrete_variable_stays_out_of_the_queue() {
        let mut sim = Simulation::new(TestDecay::new(1.0), options(1.0));
        let x = sim.add_state("x", Method::qss1(), 0);
        sim.observe(x, x);
        sim.add_discrete("flag", DiscreteKind::Bool, 1);
        sim.pre_simulate().unwrap();
        sim.init().unwrap();
        // Only the state's requantization entry is scheduled
        assert_eq!(sim.queue.len(), 1);
    }

    #[test]
    fn liqss_zero_derivative_never_requantizes() {
        let mut sim = Simulation::new(Frozen { x: 1.0 }, options(1.0));
        let x = sim.add_state("x", Method::liqss1(), 0);
        sim.observe(x, x);
        sim.pre_simulate().unwrap();
        sim.init().unwrap();

        assert_eq!(sim.variable(x).te(), f64::INFINITY);
        assert_eq!(sim.run().unwrap().num_qss_events, 0);
    }

    #[test]
    fn input_variable_schedules_discrete_events() {
        let mut sim = Simulation::new(TestDecay::new(1.0), options(2.5));
        let x = sim.add_state("x", Method::qss2(), 0);
        sim.observe(x, x);
        let u = sim.add_discrete_input(
            "u",
            DiscreteKind::Real,
            InputFunction::step(0.0, 1.0, 1.0),
            1,
        );
        sim.observe(x, u);
        sim.pre_simulate().unwrap();
        sim.init().unwrap();

        assert_eq!(sim.variable(u).td(), 1.0);
        let stats = sim.run().unwrap();
        // Transitions at t = 1 and t = 2
        assert_eq!(stats.num_discrete_events, 2);
        assert_eq!(sim.sample_quantized(u, sim.time()), 2.0);
    }
}
