//! The derivative-evaluating collaborator.
//!
//! The solver core never computes a derivative itself: it sets the model's
//! state (time plus the quantized values of the relevant variables) and asks
//! the model for the derivative or event indicator it needs. The model is
//! expected to be deterministic: identical set-state, identical returns.

/// Scalar value reference: the identity of one model variable.
pub type ValueRef = u32;

/// Model-side failure, surfaced to the driver as
/// [`crate::Error::ModelFailure`].
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown value reference: {0}")]
    UnknownValueRef(ValueRef),

    #[error("directional derivatives not provided by this model")]
    DirectionalDerivativesUnsupported,

    #[error("discrete state update did not converge")]
    EventIteration,

    #[error("model evaluation failed: {0}")]
    Evaluation(String),
}

/// Flags returned by [`Model::update_discrete_states`].
#[derive(Default, Debug, PartialEq)]
pub struct EventUpdate {
    /// The model requests another event iteration at the same superdense
    /// time instant.
    pub discrete_states_need_update: bool,
    /// The model requests termination of the simulation.
    pub terminate_simulation: bool,
    /// At least one continuous state was re-initialized during the update.
    pub values_of_continuous_states_changed: bool,
    /// Absolute time of the model's next time event, if any.
    pub next_event_time: Option<f64>,
}

impl EventUpdate {
    /// Reset all flags to their default state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Interface the solver core drives.
///
/// `get_derivative(vr)` evaluates dx/dt of the state variable identified by
/// `vr` at the currently-set input state; `get_event_indicator(vr)`
/// evaluates a zero-crossing indicator the same way.
pub trait Model {
    /// Tell the model the current simulation time.
    fn set_time(&mut self, t: f64);

    /// Scalar read by reference.
    fn get_real(&self, vr: ValueRef) -> f64;

    /// Scalar write by reference.
    fn set_real(&mut self, vr: ValueRef, value: f64);

    /// Derivative of the state variable `vr` at the currently-set state.
    fn get_derivative(&mut self, vr: ValueRef) -> Result<f64, ModelError>;

    /// Directional derivative of `unknown` along `seed` over `knowns` at the
    /// currently-set state.
    fn get_directional_derivative(
        &mut self,
        _knowns: &[ValueRef],
        _seed: &[f64],
        _unknown: ValueRef,
    ) -> Result<f64, ModelError> {
        Err(ModelError::DirectionalDerivativesUnsupported)
    }

    /// Whether directional derivatives are available. When they are not,
    /// higher trajectory coefficients fall back to numerical
    /// differentiation.
    fn provides_directional_derivatives(&self) -> bool {
        false
    }

    /// Current value of the event indicator `vr` at the currently-set state.
    fn get_event_indicator(&mut self, vr: ValueRef) -> Result<f64, ModelError>;

    /// First call of the event-handling sequence.
    fn enter_event_mode(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Second call of the event-handling sequence: apply discrete updates.
    fn update_discrete_states(&mut self, update: &mut EventUpdate) -> Result<(), ModelError> {
        update.reset();
        Ok(())
    }

    /// Third call of the event-handling sequence.
    fn enter_continuous_time_mode(&mut self) -> Result<(), ModelError> {
        Ok(())
    }
}
