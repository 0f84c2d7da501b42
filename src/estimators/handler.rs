//! Estimator handler: owns every active estimator and the output file.

use log::info;
use rayon::prelude::*;

use super::back_propagation::{back_propagate, BackPropagated};
use super::itcf::Itcf;
use super::mixed::MixedEstimator;
use crate::error::Result;
use crate::io::{EstimatorFile, Metadata, MixedRow, RunConfig};
use crate::propagation::Propagator;
use crate::systems::System;
use crate::walkers::{HistoryBuffer, Population};
use crate::wavefunction::{Determinant, Trial};

#[derive(Debug, Clone)]
pub struct Estimators {
    pub mixed: MixedEstimator,
    pub back_propagated: Option<BackPropagated>,
    pub itcf: Option<Itcf>,
    /// Output file written by [`Estimators::finalise`]
    pub filename: String,
}

impl Estimators {
    pub fn new(config: &RunConfig) -> Self {
        let estimates = &config.estimates;
        let back_propagated = estimates
            .back_propagation
            .as_ref()
            .map(|bp| BackPropagated::new(bp.nback_prop));
        let itcf = estimates
            .itcf
            .as_ref()
            .map(|itcf| Itcf::new(itcf.tmax, itcf.stable, config.qmc.nstblz));
        if let Some(bp) = &back_propagated {
            info!("# Back-propagation depth: {}", bp.nback_prop);
        }
        if let Some(itcf) = &itcf {
            info!("# ITCF over {} slices (stable: {})", itcf.tmax, itcf.stable);
        }
        Self {
            mixed: MixedEstimator::new(config.propagator.free_projection),
            back_propagated,
            itcf,
            filename: estimates.filename.clone(),
        }
    }

    pub fn update_mixed<S: System>(&mut self, system: &S, population: &Population) {
        self.mixed.update(system, population);
    }

    /// Back-propagated and ITCF estimates for the block that ends at
    /// `step`. Consumes the full history; slot 0 must still hold the
    /// population at the start of the block.
    pub fn update_block<S: System, P: Propagator>(
        &mut self,
        system: &S,
        propagator: &P,
        trial: &Trial,
        history: &HistoryBuffer,
        step: usize,
    ) {
        if self.back_propagated.is_none() && self.itcf.is_none() {
            return;
        }
        let end = history.block_size();
        let path = history.path(0, end);
        let left: Vec<Vec<Determinant>> = (0..history.slot(end).len())
            .into_par_iter()
            .map(|index| back_propagate(propagator, trial, path, index))
            .collect();

        if let Some(bp) = self.back_propagated.as_mut() {
            let start = end - bp.nback_prop;
            let left_start: Vec<&Determinant> = left.iter().map(|states| &states[start]).collect();
            let row = bp.update(system, step, history.slot(end), history.slot(start), &left_start);
            info!("# Back-propagated energy at step {}: {:.8}", step, row.etotal);
        }
        if let Some(itcf) = self.itcf.as_mut() {
            itcf.update(propagator, step, history, &left, end);
        }
    }

    pub fn projected_energy(&self) -> Option<f64> {
        self.mixed.projected_energy()
    }

    pub fn instantaneous_energy(&self) -> Option<f64> {
        self.mixed.instantaneous_energy()
    }

    pub fn print_header(&self) {
        MixedEstimator::print_header();
    }

    /// Close the current measurement interval and print its row.
    pub fn print_step(&mut self, step: usize, interval: usize) -> MixedRow {
        let row = self.mixed.finalise_block(step, interval);
        MixedEstimator::print_row(&row);
        row
    }

    /// Assemble the output document and write it to [`Self::filename`].
    pub fn finalise(&self, metadata: Metadata) -> Result<EstimatorFile> {
        let file = EstimatorFile {
            metadata,
            mixed: self.mixed.rows.clone(),
            back_propagated: self.back_propagated.as_ref().map_or_else(Vec::new, |bp| bp.rows.clone()),
            itcf: self.itcf.as_ref().map_or_else(Vec::new, |itcf| itcf.rows.clone()),
        };
        file.write(&self.filename)?;
        info!("# Estimates written to {}", self.filename);
        Ok(file)
    }
}
