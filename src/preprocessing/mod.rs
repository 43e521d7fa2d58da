//! Data preprocessing module
//!
//! Column-wise feature scaling for the temporal feature matrix.

mod scaler;

pub use scaler::{Scaler, ScalerType};
