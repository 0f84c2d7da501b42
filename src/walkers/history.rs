//! Rolling history of population snapshots for back-propagation and ITCF.
//!
//! Slot layout for a block of `block_size` steps:
//!
//! ```text
//! slot 0      anchor: population at the last block boundary
//! slot k      population after step k of the block, k = 1..=block_size
//! ```
//!
//! Step `n` of the run lands in slot `(n - 1) % block_size + 1`. Snapshots
//! are deep copies; nothing in the buffer aliases the live population.

use super::population::Population;
use super::walker::Walker;

#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    block_size: usize,
    slots: Vec<Vec<Walker>>,
}

impl HistoryBuffer {
    /// Allocate `block_size + 1` slots, all holding the current population.
    pub fn new(population: &Population, block_size: usize) -> Self {
        assert!(block_size > 0, "history buffer needs at least one slot per block");
        Self {
            block_size,
            slots: vec![population.walkers.clone(); block_size + 1],
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Slot written at (1-based) step `step`.
    pub fn slot_for_step(&self, step: usize) -> usize {
        (step - 1) % self.block_size + 1
    }

    /// True on the last step of a block.
    pub fn is_block_end(&self, step: usize) -> bool {
        step % self.block_size == 0
    }

    /// Store a deep copy of the population for this step.
    pub fn record(&mut self, step: usize, population: &Population) -> usize {
        let slot = self.slot_for_step(step);
        self.slots[slot].clone_from(&population.walkers);
        slot
    }

    /// New reference point for the next block.
    pub fn reset_anchor(&mut self, population: &Population) {
        self.slots[0].clone_from(&population.walkers);
    }

    pub fn slot(&self, index: usize) -> &[Walker] {
        &self.slots[index]
    }

    pub fn anchor(&self) -> &[Walker] {
        &self.slots[0]
    }

    /// Snapshots carrying the auxiliary fields that take the state at slot
    /// `start` to the state at slot `end`, i.e. slots `start + 1 ..= end`.
    /// Slot `start` itself is the pre-field reference and is excluded.
    pub fn path(&self, start: usize, end: usize) -> &[Vec<Walker>] {
        &self.slots[start + 1..=end]
    }

    /// Apply a population-control selection to every slot.
    pub fn select(&mut self, selection: &[usize]) {
        for slot in self.slots.iter_mut() {
            let resampled: Vec<Walker> = selection.iter().map(|&i| slot[i].clone()).collect();
            *slot = resampled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Complex64;
    use crate::systems::Hubbard;
    use crate::wavefunction::{free_electron, Trial};

    fn setup(nwalkers: usize) -> Population {
        let system = Hubbard::new(4, 1, 1.0, 4.0, 2, 2);
        let psi = free_electron(&system, None).unwrap();
        let trial = Trial::single("free_electron", psi, &system).unwrap();
        Population::new(&trial, nwalkers)
    }

    fn tag(population: &mut Population, step: usize) {
        for (i, walker) in population.iter_mut().enumerate() {
            walker.fields = vec![step as f64, i as f64];
        }
    }

    #[test]
    fn test_slot_indexing_wraps_per_block() {
        let pop = setup(1);
        let history = HistoryBuffer::new(&pop, 4);
        let slots: Vec<usize> = (1..=9).map(|s| history.slot_for_step(s)).collect();
        assert_eq!(slots, vec![1, 2, 3, 4, 1, 2, 3, 4, 1]);
        assert!(history.is_block_end(8));
        assert!(!history.is_block_end(9));
    }

    #[test]
    fn test_path_consumes_exactly_depth_snapshots() {
        let mut pop = setup(2);
        let depth = 5;
        let mut history = HistoryBuffer::new(&pop, depth);
        for step in 1..=depth {
            tag(&mut pop, step);
            history.record(step, &pop);
        }
        let path = history.path(0, depth);
        assert_eq!(path.len(), depth);
        for (k, snapshot) in path.iter().enumerate() {
            assert_eq!(snapshot[0].fields[0], (k + 1) as f64);
        }
        // partial path for a depth-3 window at the end of the block
        let window = history.path(depth - 3, depth);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0][1].fields[0], 3.0);
    }

    #[test]
    fn test_snapshots_do_not_alias_live_walkers() {
        let mut pop = setup(2);
        let mut history = HistoryBuffer::new(&pop, 3);
        tag(&mut pop, 1);
        history.record(1, &pop);
        pop.walkers[0].weight = Complex64::new(42.0, 0.0);
        pop.walkers[0].fields[0] = -1.0;
        assert_eq!(history.slot(1)[0].weight.re, 1.0);
        assert_eq!(history.slot(1)[0].fields[0], 1.0);
    }

    #[test]
    fn test_anchor_tracks_last_block_boundary() {
        let mut pop = setup(2);
        let mut history = HistoryBuffer::new(&pop, 2);
        for step in 1..=4 {
            tag(&mut pop, step);
            history.record(step, &pop);
            if history.is_block_end(step) {
                history.reset_anchor(&pop);
            }
        }
        assert_eq!(history.anchor()[1].fields, vec![4.0, 1.0]);
    }

    #[test]
    fn test_select_follows_walkers_through_duplication() {
        let mut pop = setup(3);
        let mut history = HistoryBuffer::new(&pop, 2);
        for step in 1..=2 {
            tag(&mut pop, step);
            history.record(step, &pop);
        }
        history.select(&[2, 2, 0]);
        for slot in 1..=2 {
            let ids: Vec<f64> = history.slot(slot).iter().map(|w| w.fields[1]).collect();
            assert_eq!(ids, vec![2.0, 2.0, 0.0]);
        }
        assert_eq!(history.anchor().len(), 3);
    }
}
