//! Wavefunction module - trial wavefunctions for AFQMC.

mod trial;
mod uhf;

pub use trial::{free_electron, hartree_fock, Determinant, Trial};
pub use uhf::{UhfSolution, UhfSolver};
