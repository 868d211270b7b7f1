//! Input functions driving externally-set variables.
//!
//! Each function yields a [`SmoothToken`] at a requested time: the value,
//! its derivatives up to third order, and the time of the next discrete
//! transition (infinity when the function is smooth everywhere).

use crate::smooth_token::SmoothToken;

/// A time function for input variables.
#[derive(Debug, Clone)]
pub enum InputFunction {
    /// Constant value
    Constant { c: f64 },
    /// `a * sin(b*t) + c`
    Sin { a: f64, b: f64, c: f64 },
    /// Step of height `h` from initial value `h0` every `d` time units
    Step { h0: f64, h: f64, d: f64 },
    /// Value toggling between `h0` and `h0 + h` every `d` time units
    Toggle { h0: f64, h: f64, d: f64 },
}

impl InputFunction {
    pub fn constant(c: f64) -> Self {
        Self::Constant { c }
    }

    pub fn sin(a: f64, b: f64, c: f64) -> Self {
        Self::Sin { a, b, c }
    }

    pub fn step(h0: f64, h: f64, d: f64) -> Self {
        Self::Step { h0, h, d }
    }

    pub fn toggle(h0: f64, h: f64, d: f64) -> Self {
        Self::Toggle { h0, h, d }
    }

    /// State at time `t`.
    pub fn eval(&self, t: f64) -> SmoothToken {
        match *self {
            Self::Constant { c } => SmoothToken::order_0(c, f64::INFINITY),
            Self::Sin { a, b, c } => {
                let (sin_bt, cos_bt) = (b * t).sin_cos();
                SmoothToken::order_3(
                    a * sin_bt + c,
                    a * b * cos_bt,
                    -a * b * b * sin_bt,
                    -a * b * b * b * cos_bt,
                    f64::INFINITY,
                )
            }
            Self::Step { h0, h, d } => {
                let k = (t / d).floor();
                SmoothToken::order_0(h0 + h * k, d * (k + 1.0))
            }
            Self::Toggle { h0, h, d } => {
                let k = (t / d).floor();
                let on = (k as i64).rem_euclid(2) == 1;
                SmoothToken::order_0(if on { h0 + h } else { h0 }, d * (k + 1.0))
            }
        }
    }

    /// Value at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        self.eval(t).x0
    }

    /// Next discrete event strictly after time `t`, infinity when none.
    pub fn next_discrete(&self, t: f64) -> f64 {
        self.eval(t).t_d
    }
}
