//! Imaginary-time one-particle correlation function
//!
//!   G^>_{ij}(τ) = ⟨c_i(τ) c_j^†(0)⟩
//!
//! computed over the first `tmax` slots of each block. The unstable form
//! multiplies the raw propagators onto I - G(0); the stable form inserts
//! the equal-time projector I - G(τ_k) every `nstblz` slices, with G(τ_k)
//! built from the back-propagated left state and the buffered walker.

use log::debug;
use nalgebra::DMatrix;

use crate::io::{ItcfRow, MatrixRecord};
use crate::linalg::{gab, Complex64, ZERO};
use crate::propagation::Propagator;
use crate::walkers::HistoryBuffer;
use crate::wavefunction::Determinant;

#[derive(Debug, Clone)]
pub struct Itcf {
    /// Number of time slices
    pub tmax: usize,
    pub stable: bool,
    /// Projector insertion interval for the stable algorithm
    pub nstblz: usize,
    pub rows: Vec<ItcfRow>,
}

impl Itcf {
    pub fn new(tmax: usize, stable: bool, nstblz: usize) -> Self {
        Self {
            tmax,
            stable,
            nstblz: nstblz.max(1),
            rows: Vec::new(),
        }
    }

    fn hole(left: &Determinant, right: &Determinant, spin: usize) -> Option<DMatrix<Complex64>> {
        let (g, _) = gab(&left[spin], &right[spin]).ok()?;
        let n = g.nrows();
        Some(DMatrix::identity(n, n) - g)
    }

    /// G^>(τ, 0) for τ = 0..=tmax along walker `index`'s path, or `None`
    /// if an equal-time Green's function is singular.
    fn walker_itcf<P: Propagator>(
        &self,
        propagator: &P,
        history: &HistoryBuffer,
        left: &[Determinant],
        index: usize,
    ) -> Option<[Vec<DMatrix<Complex64>>; 2]> {
        let anchor = &history.anchor()[index].phi;
        let mut series = [Vec::with_capacity(self.tmax + 1), Vec::with_capacity(self.tmax + 1)];
        let mut acc = [Self::hole(&left[0], anchor, 0)?, Self::hole(&left[0], anchor, 1)?];
        for spin in 0..2 {
            series[spin].push(acc[spin].clone());
        }
        for k in 1..=self.tmax {
            let walker = &history.slot(k)[index];
            let b = propagator.replay(walker);
            for spin in 0..2 {
                acc[spin] = &b[spin] * &acc[spin];
                if self.stable && k % self.nstblz == 0 {
                    acc[spin] = Self::hole(&left[k], &walker.phi, spin)? * &acc[spin];
                }
                series[spin].push(acc[spin].clone());
            }
        }
        Some(series)
    }

    /// Accumulate one block. `left[i]` holds walker i's back-propagated
    /// states at every time of the block; weights come from slot `end`.
    pub fn update<P: Propagator>(
        &mut self,
        propagator: &P,
        step: usize,
        history: &HistoryBuffer,
        left: &[Vec<Determinant>],
        end: usize,
    ) -> ItcfRow {
        let nbasis = history.anchor().first().map_or(0, |w| w.phi[0].nrows());
        let zero = || vec![DMatrix::<Complex64>::zeros(nbasis, nbasis); self.tmax + 1];
        let mut sums = [zero(), zero()];
        let mut denom = ZERO;

        for (index, walker) in history.slot(end).iter().enumerate() {
            let w = walker.weight;
            if !walker.alive || w == ZERO {
                continue;
            }
            let Some(series) = self.walker_itcf(propagator, history, &left[index], index) else {
                debug!("Singular equal-time Green's function in ITCF, skipping walker {}", index);
                continue;
            };
            for spin in 0..2 {
                for (total, g) in sums[spin].iter_mut().zip(&series[spin]) {
                    *total += g * w;
                }
            }
            denom += w;
        }

        let scale = if denom.norm() > 0.0 { denom.inv() } else { ZERO };
        let records = |spin: usize| -> Vec<MatrixRecord> {
            sums[spin].iter().map(|g| MatrixRecord::from_matrix(&(g * scale))).collect()
        };
        let row = ItcfRow {
            step,
            up: records(0),
            down: records(1),
        };
        self.rows.push(row.clone());
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::back_propagation::back_propagate;
    use crate::propagation::{HubbardDiscrete, NullPropagator};
    use crate::systems::{Hubbard, System};
    use crate::walkers::Population;
    use crate::wavefunction::{free_electron, Trial};
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn setup() -> (Hubbard, Trial) {
        let system = Hubbard::new(6, 1, 1.0, 2.0, 3, 3);
        let psi = free_electron(&system, None).unwrap();
        let trial = Trial::single("free_electron", psi, &system).unwrap();
        (system, trial)
    }

    fn run_block<P: Propagator>(propagator: &P, trial: &Trial, block: usize) -> (HistoryBuffer, Vec<Vec<Determinant>>) {
        let mut rng = StdRng::seed_from_u64(13);
        let mut population = Population::new(trial, 3);
        let mut history = HistoryBuffer::new(&population, block);
        for step in 1..=block {
            for walker in population.iter_mut() {
                propagator.propagate_walker(walker, trial, &mut rng);
            }
            if step % 2 == 0 {
                population.orthogonalise(trial, true);
            }
            history.record(step, &population);
        }
        let left = (0..population.len())
            .map(|i| back_propagate(propagator, trial, history.path(0, block), i))
            .collect();
        (history, left)
    }

    #[test]
    fn test_null_propagator_gives_constant_hole_function() {
        let (system, trial) = setup();
        let propagator = NullPropagator::new(system.nbasis());
        let (history, left) = run_block(&propagator, &trial, 4);
        let mut itcf = Itcf::new(3, true, 1);
        let row = itcf.update(&propagator, 4, &history, &left, 4);
        assert_eq!(row.up.len(), 4);
        let (g, _) = gab(&trial.psi[0][0], &trial.psi[0][0]).unwrap();
        let expected = DMatrix::identity(6, 6) - g;
        for record in &row.up {
            let m = record.to_matrix().unwrap();
            assert_relative_eq!((m - &expected).norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_stable_and_unstable_agree_on_short_paths() {
        let (system, trial) = setup();
        let propagator = HubbardDiscrete::new(&system, 0.05, false);
        let (history, left) = run_block(&propagator, &trial, 6);
        let stable = Itcf::new(4, true, 2).update(&propagator, 6, &history, &left, 6);
        let unstable = Itcf::new(4, false, 2).update(&propagator, 6, &history, &left, 6);
        for (a, b) in stable.down.iter().zip(&unstable.down) {
            let diff = a.to_matrix().unwrap() - b.to_matrix().unwrap();
            assert_relative_eq!(diff.norm(), 0.0, epsilon = 1e-8);
        }
        // equal time: I - G has trace nbasis - nσ
        let g0 = stable.up[0].to_matrix().unwrap();
        assert_relative_eq!(g0.trace().re, 3.0, epsilon = 1e-8);
    }
}
