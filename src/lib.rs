//! Quantized state system (QSS) solver core.
//!
//! Integrates systems of ordinary differential equations by quantizing
//! state values rather than time: each variable re-quantizes itself
//! independently when its continuous trajectory has deviated from its
//! broadcast quantized trajectory by more than a tolerance, triggering
//! re-evaluation only in the variables that depend on it.
//!
//! The core is a discrete-event kernel: a superdense-time event queue
//! orders requantizations, discrete input events, zero-crossings, and
//! handler re-initializations; a dependency graph links each variable to
//! the observers that must re-evaluate when it steps. Derivatives are
//! evaluated by an external collaborator behind the [`model::Model`]
//! trait.
//!
//! The kernel is single-threaded and cooperative. Independent simulations
//! own all of their state and may run concurrently with each other.

#![deny(unsafe_code)]
#![deny(clippy::all)]

pub mod event;
pub mod event_queue;
pub mod input;
pub mod math;
pub mod model;
pub mod options;
pub mod simulation;
pub mod smooth_token;
pub mod step_ratio;
pub mod superdense_time;
pub mod variable;

pub use event::{Event, EventType, VarIndex};
pub use event_queue::{EventHandle, EventQueue};
pub use input::InputFunction;
pub use model::{EventUpdate, Model, ModelError, ValueRef};
pub use options::Options;
pub use simulation::{DerivMode, SimStats, Simulation, StepOutcome};
pub use smooth_token::SmoothToken;
pub use superdense_time::{Offset, SuperdenseTime};
pub use variable::{Crossing, CrossingSet, DiscreteKind, Family, Method, VarKind, Variable};

/// Solver error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The external model failed to evaluate; the dispatch loop aborts and
    /// control returns to the driver.
    #[error(transparent)]
    ModelFailure(#[from] model::ModelError),

    /// A variable was referenced by a name the simulation does not know.
    #[error("unknown variable: {name}")]
    UnknownVariable { name: String },

    /// The wiring left the simulation under-specified.
    #[error("invalid setup: {0}")]
    Setup(String),
}
