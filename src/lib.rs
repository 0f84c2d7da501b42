//! AFQMC - zero temperature auxiliary-field quantum Monte Carlo in Rust
//!
//! This crate provides a constrained-path / free-projection AFQMC random
//! walk for the Hubbard model with mixed, back-propagated and imaginary-time
//! correlation function estimators, plus reblocking tools for the output.

pub mod error;
pub mod linalg;
pub mod io;
pub mod systems;
pub mod wavefunction;
pub mod walkers;
pub mod propagation;
pub mod estimators;
pub mod qmc;
pub mod analysis;

// Re-export commonly used types at crate root
pub use error::{AfqmcError, Result};
pub use io::{EstimatorFile, RunConfig};
pub use systems::{Hubbard, System};
pub use wavefunction::{Determinant, Trial, UhfSolver};
pub use walkers::{HistoryBuffer, Population, Walker, WEIGHT_THRESHOLD};
pub use propagation::{HubbardDiscrete, NullPropagator, Propagator};
pub use estimators::Estimators;
pub use qmc::Afqmc;
