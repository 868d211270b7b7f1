//! Driver for the `qss` solver core: built-in example models, a clap CLI,
//! and Arrow-based result recording.

#![deny(unsafe_code)]
#![deny(clippy::all)]

use arrow::record_batch::RecordBatch;
use qss::{Method, Model, Options, SimStats, Simulation, StepOutcome};

pub mod models;
pub mod options;
pub mod output;

use options::{ModelArg, QssSimOptions};
use output::OutputState;

/// Sim error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Solver(#[from] qss::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Simulate the selected example model parameterized by the given
/// top-level options.
///
/// # Returns
/// A tuple of the record batch of the simulation results and the
/// statistics of the simulation.
pub fn simulate(options: &QssSimOptions) -> Result<(RecordBatch, SimStats), Error> {
    let solver_options = solver_options(options);
    let method = Method::from(options.method);
    log::debug!(
        "Simulating {:?} with {:?} to t = {}",
        options.model,
        method,
        solver_options.t_end
    );

    match options.model {
        ModelArg::Decay => run(models::decay(method, solver_options), options),
        ModelArg::DecaySine => run(models::decay_sine(method, solver_options), options),
        ModelArg::Achilles => run(models::achilles(method, solver_options), options),
        ModelArg::Oscillators => run(models::oscillators(method, solver_options), options),
        ModelArg::BouncingBall => run(models::bouncing_ball(method, solver_options), options),
        ModelArg::Stiff => run(models::stiff(method, solver_options), options),
    }
}

fn solver_options(options: &QssSimOptions) -> Options {
    let mut solver_options = Options {
        t_start: options.start_time.unwrap_or(0.0),
        t_end: options.stop_time.unwrap_or(10.0),
        refine: options.refine,
        inflection: options.inflection,
        ..Options::default()
    };
    if let Some(rtol) = options.rtol {
        solver_options.rtol = rtol;
    }
    if let Some(atol) = options.atol {
        solver_options.atol = atol;
    }
    solver_options
}

/// Drive one simulation to its stop time, recording every event plus the
/// optional uniform samples.
fn run<M: Model>(
    mut sim: Simulation<M>,
    options: &QssSimOptions,
) -> Result<(RecordBatch, SimStats), Error> {
    sim.pre_simulate()?;
    sim.init()?;

    let recorded: Vec<_> = (0..sim.variables().len()).collect();
    let mut output = OutputState::new(&sim, recorded, options.output_interval);
    output.record(sim.options().t_start, &sim);

    let t_end = sim.options().t_end;
    let outcome = loop {
        let t_next = sim.next_event_time().min(t_end);
        output.record_samples_until(t_next, &sim);
        match sim.step()? {
            StepOutcome::Event => output.record(sim.time(), &sim),
            outcome => break outcome,
        }
    };
    if outcome == StepOutcome::Done {
        // Close the record at the stop time
        output.record_samples_until(t_end, &sim);
        output.record(t_end, &sim);
    }

    let stats = sim.stats().clone();
    Ok((output.finish()?, stats))
}
