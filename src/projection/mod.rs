//! Recursive projection of neglect scores
//!
//! A [`TemporalProjector`] predicts the next quarter from the current
//! [`ProjectionState`], then advances the state with that prediction.
//! Quarters within one year use the one-year models, later quarters the
//! two-year models.

mod horizon;
mod projector;
mod state;

pub use horizon::Horizon;
pub use projector::{ProjectionStep, StepPrediction, StepScores, TemporalProjector};
pub use state::{round_to, ProjectionState, SENS_CBPF, SENS_FUNDING, SENS_PIN};
