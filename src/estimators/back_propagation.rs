//! Back-propagated estimators.
//!
//! The trial state is propagated backwards through the auxiliary-field
//! path a walker sampled over a block,
//!
//!   ⟨Ψ_L(τ_k)| = ⟨Ψ_T| B(x_n) ... B(x_{k+1}),
//!
//! giving an improved left state. Observables then use the Green's
//! function between that left state and the walker at the start of the
//! path, weighted by the walker weight at the end of the path.

use log::debug;
use nalgebra::DMatrix;

use crate::io::{BackPropagatedRow, MatrixRecord};
use crate::linalg::{gab, reortho, Complex64, ZERO};
use crate::propagation::Propagator;
use crate::systems::System;
use crate::walkers::Walker;
use crate::wavefunction::{Determinant, Trial};

/// Back-propagate the trial state along walker `index`'s path.
///
/// `path[j]` holds the snapshot whose recorded fields took the state from
/// time j to time j + 1 (relative to the start of the path). The returned
/// vector has `path.len() + 1` left states, entry j being the state at
/// time j; the last entry is the trial determinant itself.
pub fn back_propagate<P: Propagator>(
    propagator: &P,
    trial: &Trial,
    path: &[Vec<Walker>],
    index: usize,
) -> Vec<Determinant> {
    let mut left = vec![trial.psi[0].clone(); path.len() + 1];
    for j in (0..path.len()).rev() {
        let b = propagator.replay(&path[j][index]);
        for spin in 0..2 {
            let mut psi = b[spin].adjoint() * &left[j + 1][spin];
            // only the column space matters; degenerate states are kept as is
            reortho(&mut psi);
            left[j][spin] = psi;
        }
    }
    left
}

#[derive(Debug, Clone)]
pub struct BackPropagated {
    /// Depth of the back-propagation path
    pub nback_prop: usize,
    pub rows: Vec<BackPropagatedRow>,
}

impl BackPropagated {
    pub fn new(nback_prop: usize) -> Self {
        Self {
            nback_prop,
            rows: Vec::new(),
        }
    }

    /// Accumulate one block.
    ///
    /// `end` supplies the weights, `start` the right-hand states and
    /// `left[i]` the back-propagated state for walker i at the start time.
    pub fn update<S: System>(
        &mut self,
        system: &S,
        step: usize,
        end: &[Walker],
        start: &[Walker],
        left: &[&Determinant],
    ) -> BackPropagatedRow {
        let nbasis = system.nbasis();
        let mut denom = ZERO;
        let mut energies = [ZERO; 3];
        let mut rdm = [DMatrix::<Complex64>::zeros(nbasis, nbasis), DMatrix::zeros(nbasis, nbasis)];

        for ((final_walker, initial), psi_left) in end.iter().zip(start).zip(left) {
            let w = final_walker.weight;
            if !final_walker.alive || w == ZERO {
                continue;
            }
            let greens = match (gab(&psi_left[0], &initial.phi[0]), gab(&psi_left[1], &initial.phi[1])) {
                (Ok((g_up, _)), Ok((g_dn, _))) => [g_up, g_dn],
                _ => {
                    debug!("Back-propagated state orthogonal to walker, skipping");
                    continue;
                }
            };
            let (e, t, v) = system.local_energy(&greens);
            energies[0] += w * e;
            energies[1] += w * t;
            energies[2] += w * v;
            for spin in 0..2 {
                rdm[spin] += &greens[spin] * w;
            }
            denom += w;
        }

        let scale = if denom.norm() > 0.0 { denom.inv() } else { ZERO };
        let row = BackPropagatedRow {
            step,
            weight: denom.re,
            etotal: (energies[0] * scale).re,
            ekinetic: (energies[1] * scale).re,
            epotential: (energies[2] * scale).re,
            rdm: [
                MatrixRecord::from_matrix(&(&rdm[0] * scale)),
                MatrixRecord::from_matrix(&(&rdm[1] * scale)),
            ],
        };
        self.rows.push(row.clone());
        row
    }
}
