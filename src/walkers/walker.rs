//! A single AFQMC walker.
//!
//! The walker carries one Slater determinant (a matrix per spin), a complex
//! weight and the Green's functions / overlaps with every determinant of
//! the trial expansion. The cached quantities are kept consistent with the
//! determinant after every propagation and orthogonalisation step.

use log::debug;
use nalgebra::DMatrix;

use crate::linalg::{gab, reortho, Complex64, ONE, ZERO};
use crate::systems::{EnergyComponents, System};
use crate::wavefunction::{Determinant, Trial};

/// Walkers with |w| at or below this are not propagated.
pub const WEIGHT_THRESHOLD: f64 = 1e-8;

#[derive(Clone, Debug)]
pub struct Walker {
    /// Determinant per spin, nbasis × nσ
    pub phi: Determinant,
    /// Multiplicative weight
    pub weight: Complex64,
    /// Cleared when the walker hits a numerical degeneracy
    pub alive: bool,
    /// Overlap ⟨Ψ_T|φ⟩ with the full trial expansion
    pub ot: Complex64,
    /// Auxiliary fields sampled during the last propagation step
    pub fields: Vec<f64>,
    /// Set when the last step left the walker untouched
    pub skipped: bool,
    /// Per trial determinant: Green's function per spin
    pub(crate) gk: Vec<Determinant>,
    /// Per trial determinant: overlap per spin
    pub(crate) ok: Vec<[Complex64; 2]>,
    /// Mixed Green's function per spin
    g: Determinant,
}

impl Walker {
    /// Walker with unit weight in state `phi`.
    pub fn new(trial: &Trial, phi: Determinant) -> Self {
        let ndets = trial.ndets();
        let nbasis = phi[0].nrows();
        let empty = || [DMatrix::zeros(nbasis, nbasis), DMatrix::zeros(nbasis, nbasis)];
        let mut walker = Self {
            phi,
            weight: ONE,
            alive: true,
            ot: ONE,
            fields: Vec::new(),
            skipped: false,
            gk: (0..ndets).map(|_| empty()).collect(),
            ok: vec![[ONE, ONE]; ndets],
            g: empty(),
        };
        walker.update_greens_function(trial);
        walker
    }

    /// Strictly above the weight threshold and not deactivated.
    pub fn is_active(&self) -> bool {
        self.weight.norm() > WEIGHT_THRESHOLD && self.alive
    }

    /// Remove the walker from the random walk. It stays in the population
    /// with zero weight until population control drops it.
    pub fn deactivate(&mut self) {
        self.alive = false;
        self.weight = ZERO;
    }

    /// Record that this step did not propagate the walker, so replaying
    /// the step is the identity.
    pub fn skip_step(&mut self) {
        self.fields.clear();
        self.skipped = true;
    }

    pub fn greens_function(&self) -> &Determinant {
        &self.g
    }

    /// Recompute Green's functions and overlaps from scratch.
    pub fn update_greens_function(&mut self, trial: &Trial) {
        for (k, psi) in trial.psi.iter().enumerate() {
            for spin in 0..2 {
                match gab(&psi[spin], &self.phi[spin]) {
                    Ok((g, o)) => {
                        self.gk[k][spin] = g;
                        self.ok[k][spin] = o;
                    }
                    Err(_) => {
                        // orthogonal to this determinant, it drops out of the mixture
                        self.gk[k][spin].fill(ZERO);
                        self.ok[k][spin] = ZERO;
                    }
                }
            }
        }
        self.combine(trial);
    }

    /// Refresh the total overlap and the mixed Green's function from the
    /// per-determinant quantities.
    pub(crate) fn combine(&mut self, trial: &Trial) {
        let weights: Vec<Complex64> = trial
            .coeffs
            .iter()
            .zip(&self.ok)
            .map(|(c, o)| c.conj() * o[0] * o[1])
            .collect();
        self.ot = weights.iter().sum();
        if trial.ndets() == 1 {
            self.g = self.gk[0].clone();
            return;
        }
        for spin in 0..2 {
            let mut g = DMatrix::zeros(self.g[spin].nrows(), self.g[spin].ncols());
            if self.ot.norm() > 0.0 {
                for (gk, w) in self.gk.iter().zip(&weights) {
                    g += &gk[spin] * (*w / self.ot);
                }
            }
            self.g[spin] = g;
        }
    }

    /// Ratio ⟨Ψ_T|B_i(a,b)|φ⟩ / ⟨Ψ_T|φ⟩ for the diagonal update that scales
    /// row `i` of the up determinant by `a` and of the down determinant by `b`.
    pub fn site_overlap_ratio(&self, trial: &Trial, i: usize, factors: [Complex64; 2]) -> Complex64 {
        if self.ot.norm() == 0.0 {
            return ZERO;
        }
        let total: Complex64 = trial
            .coeffs
            .iter()
            .zip(self.gk.iter().zip(&self.ok))
            .map(|(c, (g, o))| {
                let r_up = ONE + (factors[0] - ONE) * g[0][(i, i)];
                let r_dn = ONE + (factors[1] - ONE) * g[1][(i, i)];
                c.conj() * o[0] * o[1] * r_up * r_dn
            })
            .sum();
        total / self.ot
    }

    /// Scale row `i` of each spin's determinant and update every cached
    /// Green's function with a rank-one (Sherman-Morrison) correction.
    pub fn apply_site_update(&mut self, trial: &Trial, i: usize, factors: [Complex64; 2]) {
        for spin in 0..2 {
            let d = factors[spin] - ONE;
            if d == ZERO {
                continue;
            }
            let mut row = self.phi[spin].row_mut(i);
            row *= factors[spin];
            for k in 0..trial.ndets() {
                let g = &mut self.gk[k][spin];
                let ratio = ONE + d * g[(i, i)];
                self.ok[k][spin] *= ratio;
                if ratio.norm() == 0.0 {
                    g.fill(ZERO);
                    continue;
                }
                let col = g.column(i).into_owned();
                let row = g.row(i).into_owned();
                // G' = (I + d e_i e_iᵀ) [G - d G[:, i] G[i, :] / (1 + d G_ii)]
                *g -= (&col * &row) * (d / ratio);
                let mut gi = g.row_mut(i);
                gi *= factors[spin];
            }
        }
        self.combine(trial);
    }

    /// Local energy from the mixed Green's function.
    pub fn local_energy<S: System + ?Sized>(&self, system: &S) -> EnergyComponents {
        system.local_energy(&self.g)
    }

    /// Orthonormalise both determinants.
    ///
    /// Returns det(R) over both spins. Without importance sampling the
    /// factor is folded into the weight; with importance sampling it is
    /// folded into the cached overlaps, since the weight there is defined
    /// relative to ⟨Ψ_T|φ⟩. A degenerate determinant deactivates the walker.
    pub fn reortho(&mut self, trial: &Trial, importance_sampling: bool) -> f64 {
        let mut det_r = 1.0;
        for spin in 0..2 {
            let mut phi = self.phi[spin].clone();
            let d = reortho(&mut phi);
            if d == 0.0 {
                debug!("Degenerate determinant in reorthogonalisation, deactivating walker");
                self.deactivate();
                return 0.0;
            }
            self.phi[spin] = phi;
            for k in 0..trial.ndets() {
                self.ok[k][spin] /= d;
            }
            det_r *= d;
        }
        if !importance_sampling {
            self.weight *= det_r;
        }
        // Green's functions depend only on the column space
        self.combine(trial);
        det_r
    }
}
