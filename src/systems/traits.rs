//! Model system interface consumed by the walk.

use nalgebra::DMatrix;

use crate::linalg::Complex64;

/// Local energy split as (total, kinetic, potential).
pub type EnergyComponents = (Complex64, Complex64, Complex64);

/// A lattice or molecular Hamiltonian in a finite one-particle basis.
pub trait System: Send + Sync {
    /// Number of one-particle basis functions (sites or orbitals).
    fn nbasis(&self) -> usize;

    fn nup(&self) -> usize;

    fn ndown(&self) -> usize;

    fn ne(&self) -> usize {
        self.nup() + self.ndown()
    }

    /// One-body matrices, one per spin channel.
    fn one_body(&self) -> &[DMatrix<f64>; 2];

    /// Local energy from the (mixed) Green's functions G = B (A†B)⁻¹ A†.
    fn local_energy(&self, g: &[DMatrix<Complex64>; 2]) -> EnergyComponents;
}
