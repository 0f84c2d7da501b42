//! Trial wavefunctions.
//!
//! A trial state is an expansion Σ_k c_k |Ψ_k⟩ over Slater determinants.
//! It guides importance sampling, defines the mixed estimator and provides
//! the starting point of back-propagation. The different constructions are
//! selected by the `name` tag of the trial section of the run file.

use log::info;
use nalgebra::DMatrix;
use rand::Rng;

use super::uhf::UhfSolver;
use crate::error::{AfqmcError, Result};
use crate::io::{read_complex_numbers, read_determinant, InitialWavefunction, TrialConfig};
use crate::linalg::{diagonalise_sorted, gab, to_complex, Complex64, ZERO};
use crate::systems::{Hubbard, System};

/// Determinant pair (spin up, spin down).
pub type Determinant = [DMatrix<Complex64>; 2];

#[derive(Clone, Debug)]
pub struct Trial {
    /// Tag of the construction that produced this state
    pub name: String,
    /// Determinants of the expansion
    pub psi: Vec<Determinant>,
    /// Expansion coefficients, one per determinant
    pub coeffs: Vec<Complex64>,
    /// Variational energy ⟨Ψ_T|H|Ψ_T⟩ / ⟨Ψ_T|Ψ_T⟩
    pub energy: f64,
    /// Determinant the walkers are initialised with
    pub initial: Determinant,
}

impl Trial {
    /// Single-determinant trial state.
    pub fn single<S: System>(name: &str, psi: Determinant, system: &S) -> Result<Self> {
        Self::expansion(name, vec![psi], vec![Complex64::new(1.0, 0.0)], system)
    }

    pub fn expansion<S: System>(
        name: &str,
        psi: Vec<Determinant>,
        coeffs: Vec<Complex64>,
        system: &S,
    ) -> Result<Self> {
        if psi.is_empty() || psi.len() != coeffs.len() {
            return Err(AfqmcError::InvalidConfig(format!(
                "trial expansion has {} determinants and {} coefficients",
                psi.len(),
                coeffs.len()
            )));
        }
        let energy = variational_energy(system, &psi, &coeffs)?;
        let initial = psi[0].clone();
        Ok(Self {
            name: name.to_string(),
            psi,
            coeffs,
            energy,
            initial,
        })
    }

    pub fn ndets(&self) -> usize {
        self.psi.len()
    }

    /// Reference energy seeding the energy shift.
    pub fn reference_energy(&self) -> f64 {
        self.energy
    }

    pub fn initial_determinant(&self) -> &Determinant {
        &self.initial
    }

    pub fn with_initial(mut self, initial: Determinant) -> Self {
        self.initial = initial;
        self
    }

    /// Build the trial state described by the configuration.
    pub fn from_config<R: Rng>(config: &TrialConfig, system: &Hubbard, rng: &mut R) -> Result<Self> {
        let trial = match config {
            TrialConfig::FreeElectron { reference, read_in, .. } => {
                info!("# Constructing free electron trial wavefunction");
                let psi = match read_in {
                    Some(filename) => {
                        info!("# Reading trial wavefunction from {}", filename);
                        read_determinant(filename, system.nbasis(), system.nup(), system.ndown())?
                    }
                    None => free_electron(system, reference.as_deref())?,
                };
                Trial::single("free_electron", psi, system)?
            }
            TrialConfig::Uhf { ninitial, nconv, ueff, deps, alpha, .. } => {
                info!("# Constructing UHF trial wavefunction");
                let solver = UhfSolver {
                    ninitial: *ninitial,
                    nconv: *nconv,
                    ueff: *ueff,
                    deps: *deps,
                    alpha: *alpha,
                };
                let solution = solver.solve(system, rng)?;
                Trial::single("uhf", solution.psi, system)?
            }
            TrialConfig::MultiDeterminant { ndets, orbitals, coefficients, .. } => {
                info!("# Reading multi-determinant trial wavefunction from {}", coefficients);
                let (psi, coeffs) = read_multi_determinant(system, *ndets, orbitals, coefficients)?;
                Trial::expansion("multi_determinant", psi, coeffs, system)?
            }
            TrialConfig::HartreeFock { .. } => {
                info!("# Constructing Hartree-Fock trial wavefunction");
                Trial::single("hartree_fock", hartree_fock(system), system)?
            }
        };

        let trial = match config.initial_wavefunction() {
            InitialWavefunction::Trial => trial,
            InitialWavefunction::FreeElectron => {
                let initial = free_electron(system, None)?;
                trial.with_initial(initial)
            }
        };
        info!("# Trial wavefunction energy: {:.8}", trial.energy);
        Ok(trial)
    }
}

/// Lowest (or `reference`) eigenvectors of the one-body Hamiltonian.
pub fn free_electron<S: System>(system: &S, reference: Option<&[usize]>) -> Result<Determinant> {
    let nocc = [system.nup(), system.ndown()];
    let t = system.one_body();
    let mut psi = [DMatrix::zeros(0, 0), DMatrix::zeros(0, 0)];
    for spin in 0..2 {
        let (_, vecs) = diagonalise_sorted(&t[spin]);
        let columns: Vec<usize> = match reference {
            Some(indices) => indices.iter().copied().take(nocc[spin]).collect(),
            None => (0..nocc[spin]).collect(),
        };
        if columns.len() != nocc[spin] || columns.iter().any(|&c| c >= system.nbasis()) {
            return Err(AfqmcError::InvalidConfig(format!(
                "reference orbitals {:?} cannot hold {} electrons",
                reference, nocc[spin]
            )));
        }
        psi[spin] = to_complex(&vecs.select_columns(columns.iter()));
    }
    Ok(psi)
}

/// Occupy the first nup / ndown basis functions.
pub fn hartree_fock<S: System>(system: &S) -> Determinant {
    let nbasis = system.nbasis();
    let identity = |n: usize| {
        DMatrix::from_fn(nbasis, n, |i, j| if i == j { Complex64::new(1.0, 0.0) } else { ZERO })
    };
    [identity(system.nup()), identity(system.ndown())]
}

/// Orbitals file: ndets blocks of nbasis × ne column-major coefficients,
/// the first nup columns spin up. Coefficients file: one per determinant.
fn read_multi_determinant<S: System>(
    system: &S,
    ndets: usize,
    orbitals: &str,
    coefficients: &str,
) -> Result<(Vec<Determinant>, Vec<Complex64>)> {
    let coeffs = read_complex_numbers(coefficients)?;
    if coeffs.len() < ndets {
        return Err(AfqmcError::parse(
            coefficients,
            format!("expected {} coefficients, found {}", ndets, coeffs.len()),
        ));
    }
    let data = read_complex_numbers(orbitals)?;
    let (nbasis, nup, ne) = (system.nbasis(), system.nup(), system.ne());
    let skip = nbasis * ne;
    if data.len() < ndets * skip {
        return Err(AfqmcError::parse(
            orbitals,
            format!("expected {} orbital coefficients, found {}", ndets * skip, data.len()),
        ));
    }
    let psi = data
        .chunks(skip)
        .take(ndets)
        .map(|chunk| {
            let block = DMatrix::from_column_slice(nbasis, ne, chunk);
            [block.columns(0, nup).into_owned(), block.columns(nup, ne - nup).into_owned()]
        })
        .collect();
    Ok((psi, coeffs[..ndets].to_vec()))
}

/// ⟨Ψ|H|Ψ⟩ / ⟨Ψ|Ψ⟩ for a (possibly non-orthogonal) expansion.
fn variational_energy<S: System>(system: &S, psi: &[Determinant], coeffs: &[Complex64]) -> Result<f64> {
    let mut numerator = ZERO;
    let mut denominator = ZERO;
    for (a, ca) in psi.iter().zip(coeffs) {
        for (b, cb) in psi.iter().zip(coeffs) {
            let (g_up, o_up) = gab(&a[0], &b[0])?;
            let (g_dn, o_dn) = gab(&a[1], &b[1])?;
            let w = ca.conj() * cb * o_up * o_dn;
            let (e, _, _) = system.local_energy(&[g_up, g_dn]);
            numerator += w * e;
            denominator += w;
        }
    }
    Ok((numerator / denominator).re)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_free_electron_trial_energy() {
        let system = Hubbard::new(6, 1, 1.0, 0.0, 3, 3);
        let mut rng = StdRng::seed_from_u64(1);
        let config = TrialConfig::FreeElectron { reference: None, read_in: None, initial_wavefunction: None };
        let trial = Trial::from_config(&config, &system, &mut rng).unwrap();
        assert_eq!(trial.ndets(), 1);
        assert_relative_eq!(trial.reference_energy(), -8.0, epsilon = 1e-10);
        assert_eq!(trial.initial_determinant()[0], trial.psi[0][0]);
    }

    #[test]
    fn test_bad_reference_is_rejected() {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        assert!(free_electron(&system, Some(&[0])).is_err());
        assert!(free_electron(&system, Some(&[0, 9])).is_err());
    }

    #[test]
    fn test_hartree_fock_occupies_first_sites() {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 1);
        let psi = hartree_fock(&system);
        assert_eq!(psi[0].shape(), (4, 2));
        assert_eq!(psi[1].shape(), (4, 1));
        assert_eq!(psi[0][(1, 1)].re, 1.0);
        assert_eq!(psi[0][(2, 1)].re, 0.0);
        // localised electrons: no hopping energy, one doubly occupied site
        let trial = Trial::single("hartree_fock", psi, &system).unwrap();
        assert_relative_eq!(trial.energy, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_duplicated_expansion_has_single_determinant_energy() {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        let psi = free_electron(&system, None).unwrap();
        let single = Trial::single("free_electron", psi.clone(), &system).unwrap();
        let double = Trial::expansion(
            "multi_determinant",
            vec![psi.clone(), psi],
            vec![Complex64::new(0.3, 0.0), Complex64::new(0.7, 0.0)],
            &system,
        )
        .unwrap();
        assert_relative_eq!(single.energy, double.energy, epsilon = 1e-10);
    }

    #[test]
    fn test_multi_determinant_initial_state_is_free_electron() {
        let config = TrialConfig::MultiDeterminant {
            ndets: 1,
            orbitals: "o".into(),
            coefficients: "c".into(),
            initial_wavefunction: None,
        };
        assert_eq!(config.initial_wavefunction(), InitialWavefunction::FreeElectron);
    }
}
