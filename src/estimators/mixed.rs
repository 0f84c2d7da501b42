//! Mixed estimator ⟨Ψ_T|H|φ⟩ / ⟨Ψ_T|φ⟩.
//!
//! Sums are accumulated every step and averaged over the measurement
//! interval when a row is written. Under importance sampling each walker
//! enters with its weight w; with free projection the overlap is not
//! absorbed into the weight so the walker enters with w⟨Ψ_T|φ⟩.

use std::time::Instant;

use rayon::prelude::*;

use crate::io::MixedRow;
use crate::linalg::{Complex64, ZERO};
use crate::systems::{EnergyComponents, System};
use crate::walkers::Population;

#[derive(Debug, Clone, Default)]
struct Sums {
    weight: f64,
    denom: Complex64,
    etotal: Complex64,
    ekinetic: Complex64,
    epotential: Complex64,
}

impl Sums {
    fn add(&mut self, factor: Complex64, (e, t, v): EnergyComponents) {
        self.denom += factor;
        self.etotal += factor * e;
        self.ekinetic += factor * t;
        self.epotential += factor * v;
    }

    fn energy(&self) -> Option<f64> {
        if self.denom.norm() > 0.0 {
            Some((self.etotal / self.denom).re)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct MixedEstimator {
    free_projection: bool,
    /// Sums over the current measurement interval
    block: Sums,
    /// Sums of the most recent step only
    last: Sums,
    timer: Instant,
    pub rows: Vec<MixedRow>,
}

impl MixedEstimator {
    pub fn new(free_projection: bool) -> Self {
        Self {
            free_projection,
            block: Sums::default(),
            last: Sums::default(),
            timer: Instant::now(),
            rows: Vec::new(),
        }
    }

    /// Add this step's population. Local energies are evaluated in
    /// parallel; the sums are reduced on the calling thread.
    pub fn update<S: System>(&mut self, system: &S, population: &Population) {
        let free_projection = self.free_projection;
        let contributions: Vec<(f64, Complex64, EnergyComponents)> = population
            .walkers
            .par_iter()
            .filter(|w| w.alive && w.weight != ZERO)
            .map(|w| {
                let factor = if free_projection { w.weight * w.ot } else { w.weight };
                (w.weight.norm(), factor, w.local_energy(system))
            })
            .collect();

        let mut step = Sums::default();
        for (weight, factor, energies) in contributions {
            step.weight += weight;
            step.add(factor, energies);
        }
        self.block.weight += step.weight;
        self.block.denom += step.denom;
        self.block.etotal += step.etotal;
        self.block.ekinetic += step.ekinetic;
        self.block.epotential += step.epotential;
        self.last = step;
    }

    /// Energy averaged over the current interval. Falls back to the last
    /// step when nothing has been accumulated.
    pub fn projected_energy(&self) -> Option<f64> {
        self.block.energy().or_else(|| self.last.energy())
    }

    /// Energy of the most recent step.
    pub fn instantaneous_energy(&self) -> Option<f64> {
        self.last.energy()
    }

    /// Close the interval of `interval` steps ending at `step`, store the
    /// row and reset the sums. Energies of an interval without any live
    /// walker are written as zero with a zero denominator.
    pub fn finalise_block(&mut self, step: usize, interval: usize) -> MixedRow {
        let n = interval.max(1) as f64;
        let sums = std::mem::take(&mut self.block);
        let ratio = |x: Complex64| {
            if sums.denom.norm() > 0.0 { (x / sums.denom).re } else { 0.0 }
        };
        let row = MixedRow {
            step,
            weight: sums.weight / n,
            e_num: sums.etotal.re / n,
            e_denom: sums.denom.re / n,
            etotal: ratio(sums.etotal),
            ekinetic: ratio(sums.ekinetic),
            epotential: ratio(sums.epotential),
            time: self.timer.elapsed().as_secs_f64() / n,
        };
        self.timer = Instant::now();
        self.rows.push(row.clone());
        row
    }

    pub fn print_header() {
        println!(
            "# {:>8} {:>16} {:>16} {:>16} {:>16} {:>16} {:>16} {:>12}",
            "iteration", "Weight", "E_num", "E_denom", "E", "EKin", "EPot", "time"
        );
    }

    pub fn print_row(row: &MixedRow) {
        println!(
            "  {:>8} {:>16.8e} {:>16.8e} {:>16.8e} {:>16.8e} {:>16.8e} {:>16.8e} {:>12.6e}",
            row.step, row.weight, row.e_num, row.e_denom, row.etotal, row.ekinetic, row.epotential, row.time
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::Hubbard;
    use crate::wavefunction::{free_electron, Trial};
    use approx::assert_relative_eq;

    fn setup() -> (Hubbard, Trial, Population) {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        let psi = free_electron(&system, None).unwrap();
        let trial = Trial::single("free_electron", psi, &system).unwrap();
        let population = Population::new(&trial, 3);
        (system, trial, population)
    }

    #[test]
    fn test_trial_population_gives_trial_energy() {
        let (system, trial, mut population) = setup();
        population.walkers[1].weight = Complex64::new(2.5, 0.0);
        let mut mixed = MixedEstimator::new(false);
        mixed.update(&system, &population);
        mixed.update(&system, &population);
        assert_relative_eq!(mixed.instantaneous_energy().unwrap(), trial.energy, epsilon = 1e-10);
        let row = mixed.finalise_block(2, 2);
        assert_relative_eq!(row.etotal, trial.energy, epsilon = 1e-10);
        assert_relative_eq!(row.ekinetic + row.epotential, row.etotal, epsilon = 1e-10);
        assert_relative_eq!(row.weight, 4.5, epsilon = 1e-12);
        assert_relative_eq!(row.e_denom, 4.5, epsilon = 1e-12);
        assert_eq!(mixed.rows.len(), 1);
    }

    #[test]
    fn test_dead_walkers_are_ignored() {
        let (system, trial, mut population) = setup();
        population.walkers[0].deactivate();
        population.walkers[2].weight = ZERO;
        let mut mixed = MixedEstimator::new(false);
        mixed.update(&system, &population);
        let row = mixed.finalise_block(1, 1);
        assert_relative_eq!(row.weight, 1.0, epsilon = 1e-12);
        assert_relative_eq!(row.etotal, trial.energy, epsilon = 1e-10);
    }

    #[test]
    fn test_free_projection_weights_by_overlap() {
        let (system, trial, mut population) = setup();
        for walker in population.iter_mut() {
            walker.ot = Complex64::new(-0.5, 0.0);
        }
        let mut mixed = MixedEstimator::new(true);
        mixed.update(&system, &population);
        let row = mixed.finalise_block(1, 1);
        assert_relative_eq!(row.e_denom, -1.5, epsilon = 1e-12);
        assert_relative_eq!(row.etotal, trial.energy, epsilon = 1e-10);
    }

    #[test]
    fn test_block_resets_after_finalise() {
        let (system, _, population) = setup();
        let mut mixed = MixedEstimator::new(false);
        mixed.update(&system, &population);
        mixed.finalise_block(1, 1);
        assert!(mixed.block.energy().is_none());
        // last step still available for the shift
        assert!(mixed.projected_energy().is_some());
    }
}
