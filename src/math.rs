//! Polynomial root utilities used by the trajectory algebra.
//!
//! All solvers are total: degenerate polynomials and root-free boundaries
//! yield [`f64::INFINITY`] rather than errors, which the callers treat as
//! "no event".

/// Sign of a value as an integer in `{-1, 0, +1}`.
pub fn sign(x: f64) -> i32 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

/// Smallest positive root of `b*s + c = 0`, or infinity.
pub fn min_positive_root_linear(b: f64, c: f64) -> f64 {
    if b == 0.0 {
        f64::INFINITY
    } else {
        let s = -c / b;
        if s > 0.0 {
            s
        } else {
            f64::INFINITY
        }
    }
}

/// Smallest positive root of `a*s^2 + b*s + c = 0`, or infinity.
///
/// Uses the product form for the second root to avoid cancellation when
/// `b^2 >> a*c`.
pub fn min_positive_root_quadratic(a: f64, b: f64, c: f64) -> f64 {
    if a == 0.0 {
        return min_positive_root_linear(b, c);
    }
    let disc = (b * b) - (4.0 * a * c);
    if disc < 0.0 {
        return f64::INFINITY;
    }
    if disc == 0.0 {
        let s = -b / (2.0 * a);
        return if s > 0.0 { s } else { f64::INFINITY };
    }
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    let (r1, r2) = (q / a, if q != 0.0 { c / q } else { f64::INFINITY });
    min_positive(r1, r2)
}

/// Smallest positive root of `a*s^3 + b*s^2 + c*s + d = 0`, or infinity.
///
/// Closed form: the depressed cubic is solved by the trigonometric method
/// when three real roots exist and by Cardano's formula otherwise.
pub fn min_positive_root_cubic(a: f64, b: f64, c: f64, d: f64) -> f64 {
    if a == 0.0 {
        return min_positive_root_quadratic(b, c, d);
    }
    // Normalize to s^3 + p*s^2 + q*s + r
    let p = b / a;
    let q = c / a;
    let r = d / a;
    // Depress with s = u - p/3: u^3 + m*u + n
    let p3 = p / 3.0;
    let m = q - (p * p3);
    let n = (2.0 * p3 * p3 * p3) - (p3 * q) + r;
    let disc = (0.25 * n * n) + (m * m * m / 27.0);
    let shift = -p3;
    if disc > 0.0 {
        // One real root
        let sq = disc.sqrt();
        let u = (-0.5 * n + sq).cbrt() + (-0.5 * n - sq).cbrt();
        let s = u + shift;
        if s > 0.0 {
            s
        } else {
            f64::INFINITY
        }
    } else if disc == 0.0 {
        // Repeated real roots
        let u = (-0.5 * n).cbrt();
        min_positive(2.0 * u + shift, -u + shift)
    } else {
        // Three distinct real roots: trigonometric form
        let rho = (-m * m * m / 27.0).sqrt();
        let theta = (-0.5 * n / rho).clamp(-1.0, 1.0).acos() / 3.0;
        let amp = 2.0 * (-m / 3.0).sqrt();
        let mut best = f64::INFINITY;
        for k in 0..3 {
            let s = amp * (theta - (2.0 * std::f64::consts::PI * k as f64 / 3.0)).cos() + shift;
            if s > 0.0 && s < best {
                best = s;
            }
        }
        best
    }
}

/// Smallest positive `s` with `|a*s^2 + b*s + c| = q` for `q > 0`.
///
/// The trajectory deviation polynomial can hit either boundary first, so
/// both `= +q` and `= -q` are solved and the earlier root wins.
pub fn min_root_quadratic_both(a: f64, b: f64, c: f64, q: f64) -> f64 {
    debug_assert!(q > 0.0);
    min_positive(
        min_positive_root_quadratic(a, b, c - q),
        min_positive_root_quadratic(a, b, c + q),
    )
}

/// Smallest positive `s` with `|a*s^3 + b*s^2 + c*s + d| = q` for `q > 0`.
pub fn min_root_cubic_both(a: f64, b: f64, c: f64, d: f64, q: f64) -> f64 {
    debug_assert!(q > 0.0);
    min_positive(
        min_positive_root_cubic(a, b, c, d - q),
        min_positive_root_cubic(a, b, c, d + q),
    )
}

fn min_positive(r1: f64, r2: f64) -> f64 {
    let lo = r1.min(r2);
    let hi = r1.max(r2);
    if lo > 0.0 {
        lo
    } else if hi > 0.0 {
        hi
    } else {
        f64::INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn linear_roots() {
        assert_eq!(min_positive_root_linear(2.0, -4.0), 2.0);
        assert_eq!(min_positive_root_linear(2.0, 4.0), f64::INFINITY);
        assert_eq!(min_positive_root_linear(0.0, 4.0), f64::INFINITY);
    }

    #[test]
    fn quadratic_roots() {
        // (s - 1)(s - 3) = s^2 - 4s + 3
        assert_approx_eq!(f64, min_positive_root_quadratic(1.0, -4.0, 3.0), 1.0);
        // (s + 1)(s - 3): negative root skipped
        assert_approx_eq!(f64, min_positive_root_quadratic(1.0, -2.0, -3.0), 3.0);
        // No real roots
        assert_eq!(
            min_positive_root_quadratic(1.0, 0.0, 1.0),
            f64::INFINITY
        );
        // Double root at zero is not a positive root
        assert_eq!(
            min_positive_root_quadratic(1.0, 0.0, 0.0),
            f64::INFINITY
        );
        // Degenerate to linear
        assert_approx_eq!(f64, min_positive_root_quadratic(0.0, 2.0, -1.0), 0.5);
    }

    #[test]
    fn cubic_roots() {
        // (s - 1)(s - 2)(s - 4) = s^3 - 7s^2 + 14s - 8
        assert_approx_eq!(
            f64,
            min_positive_root_cubic(1.0, -7.0, 14.0, -8.0),
            1.0,
            epsilon = 1e-12
        );
        // Single real root: s^3 - 1
        assert_approx_eq!(
            f64,
            min_positive_root_cubic(1.0, 0.0, 0.0, -1.0),
            1.0,
            epsilon = 1e-12
        );
        // All roots negative
        assert_eq!(
            min_positive_root_cubic(1.0, 6.0, 11.0, 6.0),
            f64::INFINITY
        );
    }

    #[test]
    fn both_boundaries() {
        // s^2 = 1e-6 first hit at s = 1e-3
        assert_approx_eq!(
            f64,
            min_root_quadratic_both(1.0, 0.0, 0.0, 1e-6),
            1e-3,
            epsilon = 1e-15
        );
        // Falling line from +q/2 hits -q before +q
        let s = min_root_quadratic_both(0.0, -1.0, 5e-7, 1e-6);
        assert_approx_eq!(f64, s, 1.5e-6, epsilon = 1e-18);
    }
}
