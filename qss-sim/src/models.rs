//! Built-in example systems.
//!
//! Each model implements [`qss::Model`] over a flat value store indexed by
//! value reference, plus a builder that wires a ready-to-run
//! [`Simulation`]: states, dependency edges, zero-crossings and handlers.

use qss::{
    CrossingSet, EventUpdate, InputFunction, Method, Model, ModelError, Options, Simulation,
    ValueRef,
};

/// Exponential decay: `dx/dt = -x`.
#[derive(Debug)]
pub struct Decay {
    values: [f64; 1],
}

impl Decay {
    pub const X: ValueRef = 0;

    pub fn new(x0: f64) -> Self {
        Self { values: [x0] }
    }
}

impl Model for Decay {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::X => Ok(-self.values[Self::X as usize]),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        Err(ModelError::UnknownValueRef(vr))
    }
}

pub fn decay(method: Method, options: Options) -> Simulation<Decay> {
    let mut sim = Simulation::new(Decay::new(1.0), options);
    let x = sim.add_state("x", method, Decay::X);
    sim.observe(x, x);
    sim
}

/// Exponential decay driven by a sinusoidal input:
/// `dx/dt = -x + u(t)` with `u(t) = 0.05 sin(0.5 t)`.
#[derive(Debug)]
pub struct DecaySine {
    values: [f64; 2],
}

impl DecaySine {
    pub const X: ValueRef = 0;
    pub const U: ValueRef = 1;

    pub fn new(x0: f64) -> Self {
        Self { values: [x0, 0.0] }
    }
}

impl Model for DecaySine {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::X => Ok(-self.values[Self::X as usize] + self.values[Self::U as usize]),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        Err(ModelError::UnknownValueRef(vr))
    }
}

pub fn decay_sine(method: Method, options: Options) -> Simulation<DecaySine> {
    let mut sim = Simulation::new(DecaySine::new(1.0), options);
    let x = sim.add_state("x", method, DecaySine::X);
    let u = sim.add_input(
        "u",
        method.order,
        InputFunction::sin(0.05, 0.5, 0.0),
        DecaySine::U,
    );
    sim.observe(x, x);
    sim.observe(x, u);
    sim
}

/// Achilles and the tortoise:
/// `dx1/dt = -0.5 x1 + 1.5 x2`, `dx2/dt = -x1`.
#[derive(Debug)]
pub struct Achilles {
    values: [f64; 2],
}

impl Achilles {
    pub const X1: ValueRef = 0;
    pub const X2: ValueRef = 1;

    pub fn new() -> Self {
        Self { values: [0.0, 2.0] }
    }
}

impl Default for Achilles {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for Achilles {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        let [x1, x2] = self.values;
        match vr {
            Self::X1 => Ok(-0.5 * x1 + 1.5 * x2),
            Self::X2 => Ok(-x1),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        Err(ModelError::UnknownValueRef(vr))
    }
}

pub fn achilles(method: Method, options: Options) -> Simulation<Achilles> {
    let mut sim = Simulation::new(Achilles::new(), options);
    let x1 = sim.add_state("x1", method, Achilles::X1);
    let x2 = sim.add_state("x2", method, Achilles::X2);
    sim.observe(x1, x1);
    sim.observe(x1, x2);
    sim.observe(x2, x1);
    sim
}

/// Two identical harmonic oscillators:
/// `dx/dt = -y`, `dy/dt = x` for each copy.
#[derive(Debug)]
pub struct Oscillators {
    values: [f64; 4],
}

impl Oscillators {
    pub const X1: ValueRef = 0;
    pub const Y1: ValueRef = 1;
    pub const X2: ValueRef = 2;
    pub const Y2: ValueRef = 3;

    pub fn new() -> Self {
        Self {
            values: [1.0, 0.0, 1.0, 0.0],
        }
    }
}

impl Default for Oscillators {
    fn default() -> Self {
        Self::new()
    }
}

impl Model for Oscillators {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        let [x1, y1, x2, y2] = self.values;
        match vr {
            Self::X1 => Ok(-y1),
            Self::Y1 => Ok(x1),
            Self::X2 => Ok(-y2),
            Self::Y2 => Ok(x2),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        Err(ModelError::UnknownValueRef(vr))
    }
}

pub fn oscillators(method: Method, options: Options) -> Simulation<Oscillators> {
    let mut sim = Simulation::new(Oscillators::new(), options);
    let x1 = sim.add_state("x1", method, Oscillators::X1);
    let y1 = sim.add_state("y1", method, Oscillators::Y1);
    let x2 = sim.add_state("x2", method, Oscillators::X2);
    let y2 = sim.add_state("y2", method, Oscillators::Y2);
    sim.observe(x1, y1);
    sim.observe(y1, x1);
    sim.observe(x2, y2);
    sim.observe(y2, x2);
    sim
}

/// Bouncing ball: `dh/dt = v`, `dv/dt = -g`, with a downward
/// zero-crossing at `h = 0` whose handler reflects the velocity.
#[derive(Debug)]
pub struct BouncingBall {
    values: [f64; 2],
}

impl BouncingBall {
    pub const H: ValueRef = 0;
    pub const V: ValueRef = 1;
    /// Event indicator reference: the height itself
    pub const Z: ValueRef = 2;

    pub const GRAVITY: f64 = 9.80665;
    pub const RESTITUTION: f64 = 0.8;
    /// Event location tolerance on the contact test
    const CONTACT_EPS: f64 = 1.0e-9;

    pub fn new(h0: f64, v0: f64) -> Self {
        Self { values: [h0, v0] }
    }
}

impl Model for BouncingBall {
    fn set_time(&mut self, _t: f64) {}

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::H => Ok(self.values[Self::V as usize]),
            Self::V => Ok(-Self::GRAVITY),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::Z => Ok(self.values[Self::H as usize]),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn update_discrete_states(&mut self, update: &mut EventUpdate) -> Result<(), ModelError> {
        update.reset();
        let h = self.values[Self::H as usize];
        let v = self.values[Self::V as usize];
        if h <= Self::CONTACT_EPS && v < 0.0 {
            self.values[Self::H as usize] = 0.0;
            self.values[Self::V as usize] = -Self::RESTITUTION * v;
            update.values_of_continuous_states_changed = true;
        }
        Ok(())
    }
}

pub fn bouncing_ball(method: Method, options: Options) -> Simulation<BouncingBall> {
    let mut sim = Simulation::new(BouncingBall::new(1.0, 0.0), options);
    let h = sim.add_state("h", method, BouncingBall::H);
    let v = sim.add_state("v", method, BouncingBall::V);
    sim.observe(h, v);
    let z = sim.add_zero_crossing("z", method.order, CrossingSet::down(), BouncingBall::Z);
    sim.observe(z, h);
    sim.add_handler(z, h).expect("z is a zero-crossing");
    sim.add_handler(z, v).expect("z is a zero-crossing");
    sim
}

/// Stiff decay with time-dependent forcing: `dx/dt = -x + sin(t)`.
///
/// The diagonal dependence makes this a self-observer, the intended
/// LIQSS showcase.
#[derive(Debug)]
pub struct Stiff {
    values: [f64; 1],
    t: f64,
}

impl Stiff {
    pub const X: ValueRef = 0;

    pub fn new(x0: f64) -> Self {
        Self {
            values: [x0],
            t: 0.0,
        }
    }
}

impl Model for Stiff {
    fn set_time(&mut self, t: f64) {
        self.t = t;
    }

    fn get_real(&self, vr: ValueRef) -> f64 {
        self.values[vr as usize]
    }

    fn set_real(&mut self, vr: ValueRef, value: f64) {
        self.values[vr as usize] = value;
    }

    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        match vr {
            Self::X => Ok(-self.values[Self::X as usize] + self.t.sin()),
            _ => Err(ModelError::UnknownValueRef(vr)),
        }
    }

    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError> {
        Err(ModelError::UnknownValueRef(vr))
    }
}

pub fn stiff(method: Method, options: Options) -> Simulation<Stiff> {
    let mut sim = Simulation::new(Stiff::new(0.0), options);
    let x = sim.add_state("x", method, Stiff::X);
    sim.observe(x, x);
    sim
}
