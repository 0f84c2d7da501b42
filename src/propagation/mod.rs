//! Propagation module - imaginary-time propagators.

mod traits;
mod hubbard_discrete;
mod null;

pub use traits::Propagator;
pub use hubbard_discrete::HubbardDiscrete;
pub use null::NullPropagator;
