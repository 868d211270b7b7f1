//! Per-simulation solver configuration.
//!
//! Every simulation owns its options; there is no process-global state, so
//! independent simulations can run in parallel threads without sharing.

/// Solver knobs with the conventional defaults.
#[derive(Debug, Clone)]
pub struct Options {
    /// Relative quantization tolerance
    pub rtol: f64,
    /// Absolute quantization tolerance
    pub atol: f64,
    /// Zero-crossing anti-chatter tolerance
    pub ztol: f64,
    /// Minimum time step
    pub dt_min: f64,
    /// Maximum time step
    pub dt_max: f64,
    /// Inactivity time step: clamp applied when the next requantization
    /// would otherwise be at infinity
    pub dt_inf: f64,
    /// Numerical differentiation time step
    pub dt_nd: f64,
    /// Refine zero-crossing roots by Newton iteration
    pub refine: bool,
    /// Clip requantization steps at trajectory inflection points
    pub inflection: bool,
    /// Simulation start time
    pub t_start: f64,
    /// Simulation stop time
    pub t_end: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            rtol: 1.0e-4,
            atol: 1.0e-6,
            ztol: 1.0e-6,
            dt_min: 0.0,
            dt_max: f64::INFINITY,
            dt_inf: f64::INFINITY,
            dt_nd: 1.0e-4,
            refine: false,
            inflection: false,
            t_start: 0.0,
            t_end: 1.0,
        }
    }
}

impl Options {
    /// `1 / (2 dtND)`: forward-difference factor for second-order
    /// trajectory coefficients.
    pub fn one_over_two_dt_nd(&self) -> f64 {
        1.0 / (2.0 * self.dt_nd)
    }

    /// `1 / (4 dtND)`: centered-difference factor.
    pub fn one_over_four_dt_nd(&self) -> f64 {
        1.0 / (4.0 * self.dt_nd)
    }

    /// `1 / (6 dtND^2)`: third-order coefficient factor.
    pub fn one_over_six_dt_nd_squared(&self) -> f64 {
        1.0 / (6.0 * self.dt_nd * self.dt_nd)
    }
}
