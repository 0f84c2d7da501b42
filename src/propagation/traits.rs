//! Imaginary-time propagator interface.

use nalgebra::DMatrix;
use rand::Rng;

use crate::walkers::Walker;
use crate::wavefunction::{Determinant, Trial};

/// Advances walkers by one time step exp(-Δτ H) sampled over auxiliary
/// fields. The model is fixed when the propagator is built.
pub trait Propagator: Send + Sync {
    /// Propagate one walker in place, updating its determinant, weight,
    /// cached Green's functions and recorded fields.
    fn propagate_walker<R: Rng + ?Sized>(&self, walker: &mut Walker, trial: &Trial, rng: &mut R);

    /// Full one-step propagator B(x) per spin for a recorded field
    /// configuration. Used to replay a path for back-propagation and ITCF.
    fn step_matrices(&self, fields: &[f64]) -> Determinant;

    /// Propagator of the step a buffered walker snapshot records. A step
    /// that skipped the walker replays as the identity.
    fn replay(&self, walker: &Walker) -> Determinant {
        if walker.skipped {
            let n = walker.phi[0].nrows();
            let identity = DMatrix::identity(n, n);
            return [identity.clone(), identity];
        }
        self.step_matrices(&walker.fields)
    }

    /// True when the phase/sign problem is left unconstrained.
    fn free_projection(&self) -> bool;
}
