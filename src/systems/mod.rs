//! Systems module - model Hamiltonians for AFQMC.

mod traits;
mod hubbard;

pub use traits::{EnergyComponents, System};
pub use hubbard::Hubbard;
