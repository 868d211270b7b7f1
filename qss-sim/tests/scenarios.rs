//! End-to-end scenarios over the built-in models.

use float_cmp::assert_approx_eq;
use qss::{Method, Model, Options, StepOutcome};
use qss_sim::{
    models,
    options::{MethodArg, ModelArg, QssSimOptions},
};

fn sim_options(model: ModelArg, method: MethodArg, tol: f64, stop: f64) -> QssSimOptions {
    QssSimOptions {
        model,
        method,
        rtol: Some(tol),
        atol: Some(tol),
        start_time: None,
        stop_time: Some(stop),
        output_interval: None,
        output_file: None,
        refine: false,
        inflection: false,
    }
}

fn solver_options(tol: f64, stop: f64) -> Options {
    Options {
        rtol: tol,
        atol: tol,
        t_end: stop,
        ..Options::default()
    }
}

/// Exponential decay integrated by QSS2 stays within a few quanta of the
/// analytic endpoint without an excessive event count.
#[test_log::test]
fn exponential_decay_endpoint() {
    let options = sim_options(ModelArg::Decay, MethodArg::Qss2, 1.0e-6, 10.0);
    let (output, stats) = qss_sim::simulate(&options).unwrap();

    let time = output
        .column_by_name("time")
        .unwrap()
        .as_any()
        .downcast_ref::<arrow::array::Float64Array>()
        .unwrap();
    let x = output
        .column_by_name("x")
        .unwrap()
        .as_any()
        .downcast_ref::<arrow::array::Float64Array>()
        .unwrap();

    let last = time.len() - 1;
    assert_eq!(time.value(last), 10.0);
    assert_approx_eq!(
        f64,
        x.value(last),
        (-10.0f64).exp(),
        epsilon = 1.0e-5
    );
    assert!(stats.num_qss_events < 5_000, "{} events", stats.num_qss_events);
}

/// Achilles and the tortoise against a fine fixed-step reference.
#[rstest::rstest]
#[case::qss2(Method::qss2())]
#[case::qss3(Method::qss3())]
#[test_log::test]
fn achilles_endpoint(#[case] method: Method) {
    let tol = 1.0e-3;
    let mut sim = models::achilles(method, solver_options(tol, 10.0));
    sim.pre_simulate().unwrap();
    sim.init().unwrap();
    sim.run().unwrap();

    let x1 = sim.find_variable("x1").unwrap();
    let x2 = sim.find_variable("x2").unwrap();

    // Runge-Kutta reference for the same system
    let (mut r1, mut r2) = (0.0f64, 2.0f64);
    let f = |x1: f64, x2: f64| (-0.5 * x1 + 1.5 * x2, -x1);
    let h = 1.0e-4;
    let steps = (10.0 / h) as usize;
    for _ in 0..steps {
        let (k1a, k1b) = f(r1, r2);
        let (k2a, k2b) = f(r1 + 0.5 * h * k1a, r2 + 0.5 * h * k1b);
        let (k3a, k3b) = f(r1 + 0.5 * h * k2a, r2 + 0.5 * h * k2b);
        let (k4a, k4b) = f(r1 + h * k3a, r2 + h * k3b);
        r1 += h / 6.0 * (k1a + 2.0 * k2a + 2.0 * k3a + k4a);
        r2 += h / 6.0 * (k1b + 2.0 * k2b + 2.0 * k3b + k4b);
    }

    assert_approx_eq!(f64, sim.sample(x1, 10.0), r1, epsilon = 5.0 * tol);
    assert_approx_eq!(f64, sim.sample(x2, 10.0), r2, epsilon = 5.0 * tol);

    // Coupled variables requantize at comparable rates
    let n1 = sim.variable(x1).requantization_count() as f64;
    let n2 = sim.variable(x2).requantization_count() as f64;
    assert!(n1 > 0.0 && n2 > 0.0);
    assert!(
        n1 / n2 < 2.0 && n2 / n1 < 2.0,
        "event counts diverged: {n1} vs {n2}"
    );
}

/// Bouncing ball: the first crossing lands on the analytic contact time
/// and the apex decays geometrically with the restitution.
#[test_log::test]
fn bouncing_ball_contact_and_decay() {
    let tol = 1.0e-9;
    let mut options = solver_options(tol, 10.0);
    options.refine = true;
    let mut sim = models::bouncing_ball(Method::qss2(), options);
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    // Run to the first crossing
    while sim.stats().num_zc_events < 1 {
        assert_eq!(sim.step().unwrap(), StepOutcome::Event);
    }
    let t_contact = (2.0 / models::BouncingBall::GRAVITY).sqrt();
    assert_approx_eq!(f64, sim.time(), t_contact, epsilon = 1.0e-7);

    // The handler runs in the next pass and reflects the velocity
    while sim.model().get_real(models::BouncingBall::V) <= 0.0 {
        assert_eq!(sim.step().unwrap(), StepOutcome::Event);
    }
    let v_impact = -models::BouncingBall::GRAVITY * t_contact;
    assert_approx_eq!(
        f64,
        sim.model().get_real(models::BouncingBall::V),
        -models::BouncingBall::RESTITUTION * v_impact,
        epsilon = 5.0e-3
    );

    // Run through the tenth bounce, then to the following apex
    let h = sim.find_variable("h").unwrap();
    while sim.stats().num_zc_events < 10 {
        assert_eq!(sim.step().unwrap(), StepOutcome::Event);
    }
    while sim.model().get_real(models::BouncingBall::V) <= 0.0 {
        assert_eq!(sim.step().unwrap(), StepOutcome::Event);
    }
    let mut apex: f64 = 0.0;
    while sim.model().get_real(models::BouncingBall::V) > 0.0 {
        assert_eq!(sim.step().unwrap(), StepOutcome::Event);
        apex = apex.max(sim.sample(h, sim.time()));
    }
    let expected = models::BouncingBall::RESTITUTION.powi(20);
    assert!(
        (apex - expected).abs() / expected < 1.0e-2,
        "apex after 10 bounces: {apex}, expected {expected}"
    );
}

/// Input-driven decay settles to the analytic periodic amplitude.
#[test_log::test]
fn input_driven_steady_state() {
    let tol = 1.0e-6;
    let mut options = sim_options(ModelArg::DecaySine, MethodArg::Qss2, tol, 50.0);
    options.output_interval = Some(0.01);
    let (output, _) = qss_sim::simulate(&options).unwrap();

    let time = output
        .column_by_name("time")
        .unwrap()
        .as_any()
        .downcast_ref::<arrow::array::Float64Array>()
        .unwrap();
    let x = output
        .column_by_name("x")
        .unwrap()
        .as_any()
        .downcast_ref::<arrow::array::Float64Array>()
        .unwrap();

    // Steady state: dx/dt = -x + 0.05 sin(0.5 t) has periodic amplitude
    // 0.05 / sqrt(1 + 0.25)
    let amplitude = 0.05 / 1.25f64.sqrt();
    let peak = time
        .iter()
        .zip(x.iter())
        .filter(|(t, _)| t.unwrap() >= 30.0)
        .map(|(_, v)| v.unwrap().abs())
        .fold(0.0f64, f64::max);
    assert_approx_eq!(f64, peak, amplitude, epsilon = 10.0 * tol);
}

/// Two identical oscillators advanced in the same batches stay bitwise
/// identical at every event.
#[test_log::test]
fn simultaneous_triggers_stay_bitwise_identical() {
    let mut sim = models::oscillators(Method::qss2(), solver_options(1.0e-4, 10.0));
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    let x1 = sim.find_variable("x1").unwrap();
    let y1 = sim.find_variable("y1").unwrap();
    let x2 = sim.find_variable("x2").unwrap();
    let y2 = sim.find_variable("y2").unwrap();

    while sim.step().unwrap() == StepOutcome::Event {
        let t = sim.time();
        for (a, b) in [(x1, x2), (y1, y2)] {
            assert_eq!(sim.sample(a, t).to_bits(), sim.sample(b, t).to_bits());
            assert_eq!(
                sim.sample_quantized(a, t).to_bits(),
                sim.sample_quantized(b, t).to_bits()
            );
            assert_eq!(sim.variable(a).te().to_bits(), sim.variable(b).te().to_bits());
        }
    }
}

/// Self-observing LIQSS2: the quantized track stays within the hysteresis
/// band and the step-ratio metric never saturates.
#[test_log::test]
fn liqss_self_observer_stays_in_band() {
    let mut sim = models::stiff(Method::liqss2(), solver_options(1.0e-6, 20.0));
    sim.pre_simulate().unwrap();
    sim.init().unwrap();

    let x = sim.find_variable("x").unwrap();
    while sim.step().unwrap() == StepOutcome::Event {
        let t = sim.time();
        let var = sim.variable(x);
        let dev = (sim.sample(x, t) - sim.sample_quantized(x, t)).abs();
        assert!(
            dev <= 2.0 * var.quantum() * (1.0 + 1.0e-9),
            "quantized track departed at t = {t}: {dev} > {}",
            var.quantum()
        );
    }

    assert_eq!(sim.step_ratio().ratio_inf_percent(), 0.0);
    assert!(sim.stats().num_qss_events > 0);
}
