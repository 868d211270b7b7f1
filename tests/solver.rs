//! Kernel integration tests over small hand-written models.

use float_cmp::assert_approx_eq;
use qss::{
    CrossingSet, DiscreteKind, EventUpdate, InputFunction, Method, Model, ModelError, Options,
    Simulation, StepOutcome, ValueRef,
};

fn options(tol: f64, t_end: f64) -> Options {
    Options {
        rtol: tol,
        atol: tol,
        t_end,
        ..Options::default()
    }
}

/// `dx/dt = -1` with an event indicator on `x` and a boolean flag set by
/// the crossing handler.
struct Ramp {
    values: [f64; 2],
}

impl Ramp {
    const X: ValueRef = 0;
    const FLAG: ValueRef = 1;
    const Z: ValueRef = 2;
}

impl Model for Ramp {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::X => Ok(-1.0),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::Z => Ok(self.values[Self::X as usize]),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn update_discrete_states(&mut self, update: &mut EventUpdate) -> Result<(), ModelError> {
        update.reset();
        if self.values[Self::X as usize] <= 1.0e-9 {
            self.values[Self::FLAG as usize] = 1.0;
        }
        Ok(())
    }
}

#[test_log::test]
fn crossing_fires_once_and_sets_flag() {
    let mut sim = Simulation::new(
        Ramp {
            values: [1.0, 0.0],
        },
        options(1.0e-6, 2.0),
    );
    let x = sim.add_state("x", Method::qss2(), Ramp::X);
    let flag = sim.add_discrete("flag", DiscreteKind::Bool, Ramp::FLAG);
    let z = sim.add_zero_crossing("z", 2, CrossingSet::down(), Ramp::Z);
    sim.observe(z, x);
    sim.add_handler(z, flag).unwrap();
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    while sim.stats().num_zc_events < 1 {
        assert_eq!(sim.step().unwrap(), StepOutcome::Event);
    }
    assert_approx_eq!(f64, sim.time(), 1.0, epsilon = 1.0e-6);

    let stats = sim.run().unwrap();
    // A root exactly at the crossing point does not re-fire
    assert_eq!(stats.num_zc_events, 1);
    assert_eq!(stats.num_handler_events, 1);
    assert_eq!(sim.sample_quantized(flag, sim.time()), 1.0);
}

/// Decay model shared by the remaining tests: `dx/dt = -x + u` with `u`
/// held in a second reference.
struct DrivenDecay {
    values: [f64; 2],
}

impl DrivenDecay {
    const X: ValueRef = 0;
    const U: ValueRef = 1;

    fn new(x0: f64) -> Self {
        Self { values: [x0, 0.0] }
    }
}

impl Model for DrivenDecay {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::X => Ok(-self.values[0] + self.values[1]),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        Err(ModelError::UnknownValueRef(vr))
    }
}

#[test_log::test]
fn xqss_broadcasts_the_continuous_trajectory() {
    let mut sim = Simulation::new(DrivenDecay::new(1.0), options(1.0e-6, 1.0));
    let x = sim.add_state("x", Method::xqss2(), DrivenDecay::X);
    sim.observe(x, x);
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    // Until the first requantization the broadcast track carries the full
    // continuous order, so both trajectories agree exactly
    let te = sim.variable(x).te();
    for t in [0.25 * te, 0.5 * te, te] {
        assert_eq!(
            sim.sample(x, t).to_bits(),
            sim.sample_quantized(x, t).to_bits()
        );
    }
    sim.run().unwrap();
}

#[test_log::test]
fn smooth_input_requantizes_without_discrete_events() {
    let mut sim = Simulation::new(DrivenDecay::new(0.0), options(1.0e-6, 5.0));
    let x = sim.add_state("x", Method::qss2(), DrivenDecay::X);
    let u = sim.add_input("u", 2, InputFunction::sin(1.0, 2.0, 0.0), DrivenDecay::U);
    sim.observe(x, x);
    sim.observe(x, u);
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    assert_eq!(sim.variable(u).td(), f64::INFINITY);
    let stats = sim.run().unwrap();
    assert_eq!(stats.num_discrete_events, 0);
    assert!(sim.variable(u).requantization_count() > 0);

    let t = sim.stats().end_time;
    assert_approx_eq!(f64, sim.sample(u, t), (2.0 * t).sin(), epsilon = 1.0e-4);
}

#[test_log::test]
fn toggle_input_alternates_and_notifies_observers() {
    let mut sim = Simulation::new(DrivenDecay::new(0.0), options(1.0e-6, 3.5));
    let x = sim.add_state("x", Method::qss2(), DrivenDecay::X);
    let u = sim.add_discrete_input(
        "u",
        DiscreteKind::Bool,
        InputFunction::toggle(0.0, 1.0, 1.0),
        DrivenDecay::U,
    );
    sim.observe(x, x);
    sim.observe(x, u);
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    let stats = sim.run().unwrap();
    // Transitions at t = 1, 2, 3
    assert_eq!(stats.num_discrete_events, 3);
    assert_eq!(sim.sample_quantized(u, sim.time()), 1.0);
    // The state saw the input flips
    assert!(stats.num_observer_updates > 0);
    assert!(sim.sample(x, 3.5) > 0.1);
}
