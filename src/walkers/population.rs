//! Walker population and comb population control.

use log::debug;
use rand::Rng;

use super::history::HistoryBuffer;
use super::walker::Walker;
use crate::error::{AfqmcError, Result};
use crate::linalg::Complex64;
use crate::wavefunction::Trial;

/// All walkers of the run. The size only changes inside population
/// control, which always restores the nominal size.
#[derive(Clone, Debug)]
pub struct Population {
    pub walkers: Vec<Walker>,
    /// Target number of walkers
    pub nominal: usize,
}

impl Population {
    /// `nwalkers` copies of the trial's initial determinant, unit weight.
    pub fn new(trial: &Trial, nwalkers: usize) -> Self {
        let walker = Walker::new(trial, trial.initial_determinant().clone());
        Self {
            walkers: vec![walker; nwalkers],
            nominal: nwalkers,
        }
    }

    pub fn len(&self) -> usize {
        self.walkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walkers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Walker> {
        self.walkers.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Walker> {
        self.walkers.iter_mut()
    }

    /// Σ |w|
    pub fn total_weight(&self) -> f64 {
        self.walkers.iter().map(|w| w.weight.norm()).sum()
    }

    /// Reorthogonalise every walker, see [`Walker::reortho`].
    pub fn orthogonalise(&mut self, trial: &Trial, importance_sampling: bool) {
        for walker in self.walkers.iter_mut().filter(|w| w.alive) {
            walker.reortho(trial, importance_sampling);
        }
    }

    /// Comb resampling back to the nominal size.
    ///
    /// The same selection is applied to every slot of `history` so each
    /// walker's buffered path follows it through duplication. Returns the
    /// selected parent indices.
    pub fn pop_control<R: Rng>(
        &mut self,
        step: usize,
        rng: &mut R,
        history: Option<&mut HistoryBuffer>,
    ) -> Result<Vec<usize>> {
        let weights: Vec<f64> = self.walkers.iter().map(|w| w.weight.norm()).collect();
        let total: f64 = weights.iter().sum();
        let selection = comb(&weights, self.nominal, rng).ok_or(AfqmcError::PopulationCollapse(step))?;

        let uniform = total / self.nominal as f64;
        let walkers: Vec<Walker> = selection
            .iter()
            .map(|&i| {
                let mut walker = self.walkers[i].clone();
                let phase = walker.weight / walker.weight.norm();
                walker.weight = phase * Complex64::new(uniform, 0.0);
                walker
            })
            .collect();
        debug!(
            "Population control at step {}: {} distinct parents of {}",
            step,
            count_distinct(&selection),
            self.walkers.len()
        );
        self.walkers = walkers;
        if let Some(history) = history {
            history.select(&selection);
        }
        Ok(selection)
    }
}

fn count_distinct(selection: &[usize]) -> usize {
    let mut sorted = selection.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.len()
}

/// Systematic ("comb") resampling.
///
/// Places `target` evenly spaced teeth with one common random offset over
/// the cumulative weight and returns, for each tooth, the index of the
/// walker whose interval it falls in. `None` if the total weight is zero
/// or not finite.
pub fn comb<R: Rng>(weights: &[f64], target: usize, rng: &mut R) -> Option<Vec<usize>> {
    let total: f64 = weights.iter().sum();
    if weights.is_empty() || !(total > 0.0) || !total.is_finite() {
        return None;
    }
    let last_positive = weights.iter().rposition(|&w| w > 0.0)?;
    let offset: f64 = rng.gen();
    let spacing = total / target as f64;

    let mut selection = Vec::with_capacity(target);
    let mut index = 0;
    let mut cumulative = weights[0];
    for k in 0..target {
        let tooth = (k as f64 + offset) * spacing;
        while tooth >= cumulative && index < last_positive {
            index += 1;
            cumulative += weights[index];
        }
        selection.push(index);
    }
    Some(selection)
}
