//! Estimators module - mixed, back-propagated and ITCF accumulators.

mod mixed;
mod back_propagation;
mod itcf;
mod handler;

pub use mixed::MixedEstimator;
pub use back_propagation::{back_propagate, BackPropagated};
pub use itcf::Itcf;
pub use handler::Estimators;
