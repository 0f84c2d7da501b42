//! Propagator that leaves walkers untouched.

use nalgebra::DMatrix;
use rand::Rng;

use super::traits::Propagator;
use crate::linalg::Complex64;
use crate::walkers::Walker;
use crate::wavefunction::{Determinant, Trial};

/// B = I. Useful as a baseline for driver bookkeeping: the only weight
/// change left is the constant energy shift.
#[derive(Clone, Debug)]
pub struct NullPropagator {
    nbasis: usize,
}

impl NullPropagator {
    pub fn new(nbasis: usize) -> Self {
        Self { nbasis }
    }
}

impl Propagator for NullPropagator {
    fn propagate_walker<R: Rng + ?Sized>(&self, walker: &mut Walker, _trial: &Trial, _rng: &mut R) {
        walker.fields.clear();
    }

    fn step_matrices(&self, _fields: &[f64]) -> Determinant {
        let identity = DMatrix::<Complex64>::identity(self.nbasis, self.nbasis);
        [identity.clone(), identity]
    }

    fn free_projection(&self) -> bool {
        false
    }
}
