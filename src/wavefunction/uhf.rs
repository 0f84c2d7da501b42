//! Unrestricted Hartree-Fock trial wavefunction for the Hubbard model.
//!
//! Self-consistently solves the mean-field Hamiltonian
//!
//!   H^σ = T^σ + U_eff Σ_i n_{iσ} ⟨n_{iσ̄}⟩
//!
//! starting from several random densities and keeps the lowest distinct
//! minimum. The effective interaction U_eff is usually much smaller than the
//! physical U; a reduced U_eff gives trial states with better nodal
//! structure for constrained-path walks.

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::error::{AfqmcError, Result};
use crate::linalg::{diagonalise_sorted, to_complex, Complex64};
use crate::systems::{Hubbard, System};

/// Settings for the self-consistent UHF search.
#[derive(Clone, Debug)]
pub struct UhfSolver {
    /// Number of random starting points
    pub ninitial: usize,
    /// Maximum number of self-consistency iterations per start
    pub nconv: usize,
    /// Effective interaction strength of the mean-field Hamiltonian
    pub ueff: f64,
    /// Energy convergence threshold; densities use sqrt(deps)
    pub deps: f64,
    /// Fraction of the old density kept when mixing
    pub alpha: f64,
}

impl Default for UhfSolver {
    fn default() -> Self {
        Self {
            ninitial: 10,
            nconv: 5000,
            ueff: 0.4,
            deps: 1e-8,
            alpha: 0.5,
        }
    }
}

/// Converged UHF state.
#[derive(Clone, Debug)]
pub struct UhfSolution {
    /// Occupied orbitals per spin
    pub psi: [DMatrix<Complex64>; 2],
    /// Mean-field energy at U_eff
    pub emin: f64,
    /// Converged site densities per spin
    pub densities: [DVector<f64>; 2],
}

struct MeanFieldState {
    orbitals: [DMatrix<f64>; 2],
    densities: [DVector<f64>; 2],
}

impl UhfSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ueff(mut self, ueff: f64) -> Self {
        self.ueff = ueff;
        self
    }

    pub fn with_ninitial(mut self, n: usize) -> Self {
        self.ninitial = n;
        self
    }

    /// Site densities diag(ψ ψ†) of a set of occupied orbitals.
    fn density(orbitals: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_iterator(
            orbitals.nrows(),
            orbitals.row_iter().map(|row| row.norm_squared()),
        )
    }

    fn random_orbitals<R: Rng>(nbasis: usize, nocc: usize, rng: &mut R) -> (DMatrix<f64>, f64) {
        let random = DMatrix::from_fn(nbasis, nbasis, |_, _| rng.gen::<f64>());
        let symmetric = (&random + random.transpose()) * 0.5;
        let (eigs, vecs) = diagonalise_sorted(&symmetric);
        let occupied = vecs.columns(0, nocc).into_owned();
        (occupied, eigs.rows(0, nocc).sum())
    }

    /// Diagonalise the mean-field Hamiltonians built from the given densities.
    fn diagonalise_mean_field(&self, system: &Hubbard, densities: &[DVector<f64>; 2]) -> MeanFieldState {
        let nocc = [system.nup(), system.ndown()];
        let t = system.one_body();
        let mut orbitals = [DMatrix::zeros(0, 0), DMatrix::zeros(0, 0)];
        for spin in 0..2 {
            // each spin feels the density of the other
            let field = &densities[1 - spin] * self.ueff;
            let hmf = &t[spin] + DMatrix::from_diagonal(&field);
            let (_, vectors) = diagonalise_sorted(&hmf);
            orbitals[spin] = vectors.columns(0, nocc[spin]).into_owned();
        }
        let densities = [Self::density(&orbitals[0]), Self::density(&orbitals[1])];
        MeanFieldState { orbitals, densities }
    }

    /// Energy of the mean-field state evaluated with U_eff.
    fn energy(&self, system: &Hubbard, state: &MeanFieldState) -> f64 {
        let t = system.one_body();
        let kinetic: f64 = (0..2)
            .map(|s| {
                let g = &state.orbitals[s] * state.orbitals[s].transpose();
                t[s].component_mul(&g).sum()
            })
            .sum();
        kinetic + self.ueff * state.densities[0].dot(&state.densities[1])
    }

    fn converged(
        &self,
        enew: f64,
        eold: f64,
        new: &[DVector<f64>; 2],
        old: &[DVector<f64>; 2],
    ) -> bool {
        let depsn = self.deps.sqrt();
        let ediff = (enew - eold).abs();
        let nbasis = new[0].len() as f64;
        let dn_up = (&new[0] - &old[0]).abs().sum() / nbasis;
        let dn_down = (&new[1] - &old[1]).abs().sum() / nbasis;
        debug!("# de: {:.10e} dniu: {:.10e} dnid: {:.10e}", ediff, dn_up, dn_down);
        ediff < self.deps && dn_up < depsn && dn_down < depsn
    }

    /// Run the full search. Fails when no starting point converges.
    pub fn solve<R: Rng>(&self, system: &Hubbard, rng: &mut R) -> Result<UhfSolution> {
        let nbasis = system.nbasis();
        let mut minima: Vec<f64> = Vec::new();
        let mut accepted: Option<UhfSolution> = None;
        let mut last_delta = f64::INFINITY;

        for attempt in 0..self.ninitial {
            let (up, e_up) = Self::random_orbitals(nbasis, system.nup(), rng);
            let (down, e_down) = Self::random_orbitals(nbasis, system.ndown(), rng);
            let mut eold = e_up + e_down;
            let mut densities = [Self::density(&up), Self::density(&down)];
            let mut old_densities = densities.clone();

            let mut it = 0;
            while it < self.nconv {
                let state = self.diagonalise_mean_field(system, &densities);
                let enew = self.energy(system, &state);
                debug!("# {} {} {}", it, enew, eold);
                last_delta = enew - eold;
                if self.converged(enew, eold, &state.densities, &old_densities) {
                    let lowest = minima.iter().all(|&m| m - enew > self.deps);
                    if lowest {
                        minima.push(enew);
                        accepted = Some(UhfSolution {
                            psi: [to_complex(&state.orbitals[0]), to_complex(&state.orbitals[1])],
                            emin: enew,
                            densities: state.densities.clone(),
                        });
                    }
                    break;
                }
                let mixed = [
                    &state.densities[0] * (1.0 - self.alpha) + &old_densities[0] * self.alpha,
                    &state.densities[1] * (1.0 - self.alpha) + &old_densities[1] * self.alpha,
                ];
                old_densities = state.densities;
                densities = mixed;
                eold = enew;
                it += 1;
            }
            info!(
                "# SCF cycle: {:3}. After {:4} steps the minimum UHF energy found is: {: >8.6}",
                attempt, it, eold
            );
        }

        match accepted {
            Some(solution) => {
                info!("# Minimum energy found: {: >8.6}", solution.emin);
                Ok(solution)
            }
            None => {
                warn!("No UHF wavefunction found. Delta E: {:e}", last_delta);
                Err(AfqmcError::TrialNotConverged {
                    attempts: self.ninitial,
                    delta_e: last_delta,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_uhf_at_zero_interaction_is_free_electron() {
        let system = Hubbard::new(6, 1, 1.0, 4.0, 3, 3);
        let mut rng = StdRng::seed_from_u64(11);
        let solution = UhfSolver::new().with_ueff(0.0).with_ninitial(2).solve(&system, &mut rng).unwrap();
        // -2 - 1 - 1 per spin
        assert_relative_eq!(solution.emin, -8.0, epsilon = 1e-6);
    }

    #[test]
    fn test_uhf_conserves_particle_number() {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 1);
        let mut rng = StdRng::seed_from_u64(3);
        let solution = UhfSolver::new().with_ueff(1.0).with_ninitial(3).solve(&system, &mut rng).unwrap();
        assert_relative_eq!(solution.densities[0].sum(), 2.0, epsilon = 1e-8);
        assert_relative_eq!(solution.densities[1].sum(), 1.0, epsilon = 1e-8);
        assert_eq!(solution.psi[0].shape(), (4, 2));
        assert_eq!(solution.psi[1].shape(), (4, 1));
    }

    #[test]
    fn test_uhf_failure_is_reported() {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        let mut rng = StdRng::seed_from_u64(5);
        let solver = UhfSolver { nconv: 1, ..UhfSolver::new().with_ueff(4.0).with_ninitial(1) };
        assert!(matches!(
            solver.solve(&system, &mut rng),
            Err(AfqmcError::TrialNotConverged { attempts: 1, .. })
        ));
    }
}
