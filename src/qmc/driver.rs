//! Open-ended AFQMC random walk.

use std::time::Instant;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::analysis::reblock_mixed;
use crate::error::Result;
use crate::estimators::Estimators;
use crate::io::{EstimatorFile, Metadata, RunConfig};
use crate::propagation::{HubbardDiscrete, Propagator};
use crate::systems::{Hubbard, System};
use crate::walkers::{HistoryBuffer, Population};
use crate::wavefunction::Trial;

/// Driver state: the immutable run description plus everything the walk
/// mutates.
pub struct Afqmc<S: System, P: Propagator> {
    pub config: RunConfig,
    pub system: S,
    pub trial: Trial,
    pub propagator: P,
    pub population: Population,
    /// Present when back-propagation or ITCF is requested
    pub history: Option<HistoryBuffer>,
    pub estimators: Estimators,
    pub seed: u64,
    /// Energy shift E_T
    pub energy_shift: f64,
    rng: StdRng,
    timer: Instant,
}

impl Afqmc<Hubbard, HubbardDiscrete> {
    /// Build the Hubbard calculation described by `config`.
    pub fn from_config(config: RunConfig) -> Result<Self> {
        let seed = config.qmc.rng_seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!("# random number seed: {}", seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let system = Hubbard::from_config(&config.model);
        info!(
            "# Hubbard model: {}x{} sites, t = {}, U = {}, nup = {}, ndown = {}",
            system.nx, system.ny, system.t, system.u, system.nup, system.ndown
        );
        let trial = Trial::from_config(&config.trial, &system, &mut rng)?;
        let propagator = HubbardDiscrete::from_config(&system, config.qmc.dt, &config.propagator);
        Ok(Self::with_rng(config, system, trial, propagator, seed, rng))
    }
}

impl<S: System, P: Propagator> Afqmc<S, P> {
    pub fn new(config: RunConfig, system: S, trial: Trial, propagator: P, seed: u64) -> Self {
        Self::with_rng(config, system, trial, propagator, seed, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RunConfig, system: S, trial: Trial, propagator: P, seed: u64, rng: StdRng) -> Self {
        let population = Population::new(&trial, config.qmc.nwalkers);
        let history = if config.estimates.needs_history() {
            Some(HistoryBuffer::new(&population, config.estimates.block_size()))
        } else {
            None
        };
        let estimators = Estimators::new(&config);
        let energy_shift = trial.reference_energy();
        Self {
            config,
            system,
            trial,
            propagator,
            population,
            history,
            estimators,
            seed,
            energy_shift,
            rng,
            timer: Instant::now(),
        }
    }

    /// Run `nsteps` steps of the random walk.
    pub fn run(&mut self) -> Result<()> {
        let qmc = self.config.qmc.clone();
        let importance_sampling = !self.propagator.free_projection();

        let (e0, _, _) = self.population.walkers[0].local_energy(&self.system);
        self.energy_shift = e0.re;
        self.estimators.update_mixed(&self.system, &self.population);
        self.estimators.print_header();
        self.estimators.print_step(0, 1);

        for step in 1..=qmc.nsteps {
            let factor = (qmc.dt * self.energy_shift).exp();
            for walker in self.population.iter_mut() {
                if walker.is_active() {
                    walker.skipped = false;
                    self.propagator.propagate_walker(walker, &self.trial, &mut self.rng);
                } else {
                    walker.skip_step();
                }
                walker.weight *= factor;
            }
            self.estimators.update_mixed(&self.system, &self.population);

            if step % qmc.nstblz == 0 {
                self.population.orthogonalise(&self.trial, importance_sampling);
                let dead = self.population.iter().filter(|w| !w.alive).count();
                if dead > 0 {
                    warn!("{} walkers deactivated at step {}", dead, step);
                }
            }

            if let Some(history) = self.history.as_mut() {
                history.record(step, &self.population);
                // One trigger for both estimators: every window they read,
                // slots end - nback_prop ..= end and 0 ..= tmax, lies inside
                // the current block and slot 0 is still its anchor.
                if history.is_block_end(step) {
                    self.estimators
                        .update_block(&self.system, &self.propagator, &self.trial, history, step);
                    // next block starts from the current population
                    history.reset_anchor(&self.population);
                }
            }

            if step % qmc.nmeasure == 0 {
                if let Some(energy) = self.estimators.projected_energy() {
                    self.energy_shift = energy;
                }
                self.estimators.print_step(step, qmc.nmeasure);
            }
            if step < qmc.nequilibrate {
                if let Some(energy) = self.estimators.instantaneous_energy() {
                    self.energy_shift = energy;
                }
            }

            if step % qmc.npop_control == 0 {
                self.population.pop_control(step, &mut self.rng, self.history.as_mut())?;
            }
            debug!(
                "Step {}: total weight {:.8e}, E_T {:.8}",
                step,
                self.population.total_weight(),
                self.energy_shift
            );
        }
        Ok(())
    }

    pub fn metadata(&self) -> Metadata {
        Metadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            seed: self.seed,
            nbasis: self.system.nbasis(),
            config: self.config.clone(),
        }
    }

    /// Write the estimator file and report the reblocked mixed energy.
    pub fn finalise(&self) -> Result<EstimatorFile> {
        let file = self.estimators.finalise(self.metadata())?;
        let analysis = reblock_mixed(&file.mixed, self.config.qmc.nequilibrate);
        match analysis.first().and_then(|energy| energy.summary) {
            Some((mean, error)) => println!("# Mixed estimate for total energy: {:.8} +/- {:.8}", mean, error),
            None => info!("# Too few measurements to reblock the mixed energy"),
        }
        println!("# Running time : {:.6} seconds", self.timer.elapsed().as_secs_f64());
        Ok(file)
    }
}
