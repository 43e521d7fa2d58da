//! Ensemble methods module
//!
//! CV-weighted model averaging and model agreement.

mod blend;

pub use blend::{
    blend_scalar, blend_weights, clip_score, compute_agreement, weighted_average_ensemble, MIN_WEIGHT_SUM,
    SCORE_MAX, SCORE_MIN,
};
