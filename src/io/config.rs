//! Run configuration, read from a YAML file.
//!
//! ```yaml
//! model:
//!   name: hubbard
//!   nx: 4
//!   ny: 1
//!   t: 1.0
//!   u: 4.0
//!   nup: 2
//!   ndown: 2
//! qmc:
//!   dt: 0.05
//!   nsteps: 2000
//!   nwalkers: 50
//!   nstblz: 5
//!   npop_control: 10
//!   nmeasure: 10
//!   nequilibrate: 100
//!   rng_seed: 7
//! trial:
//!   name: uhf
//!   ueff: 0.4
//! estimates:
//!   back_propagation:
//!     nback_prop: 20
//!   itcf:
//!     tmax: 10
//!     stable: true
//!   filename: estimates.json
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{AfqmcError, Result};

/// Full description of a calculation. Immutable once the run starts.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub qmc: QmcOptions,
    pub trial: TrialConfig,
    #[serde(default)]
    pub propagator: PropagatorConfig,
    #[serde(default)]
    pub estimates: EstimatorConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ModelConfig {
    Hubbard {
        nx: usize,
        #[serde(default = "default_one")]
        ny: usize,
        #[serde(default = "default_hopping")]
        t: f64,
        u: f64,
        nup: usize,
        ndown: usize,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QmcOptions {
    /// Imaginary time step
    pub dt: f64,
    /// Total number of steps
    pub nsteps: usize,
    /// Nominal population size
    pub nwalkers: usize,
    /// Reorthogonalisation interval
    #[serde(default = "default_interval")]
    pub nstblz: usize,
    /// Population control interval
    #[serde(default = "default_interval")]
    pub npop_control: usize,
    /// Measurement / energy shift update interval
    #[serde(default = "default_interval")]
    pub nmeasure: usize,
    /// Steps during which E_T follows the instantaneous estimate
    #[serde(default)]
    pub nequilibrate: usize,
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InitialWavefunction {
    Trial,
    FreeElectron,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum TrialConfig {
    FreeElectron {
        /// Orbital indices to occupy instead of the lowest ones
        #[serde(default)]
        reference: Option<Vec<usize>>,
        /// Read orbitals from file instead of diagonalising
        #[serde(default)]
        read_in: Option<String>,
        #[serde(default)]
        initial_wavefunction: Option<InitialWavefunction>,
    },
    Uhf {
        #[serde(default = "default_ninitial")]
        ninitial: usize,
        #[serde(default = "default_nconv")]
        nconv: usize,
        #[serde(default = "default_ueff")]
        ueff: f64,
        #[serde(default = "default_deps")]
        deps: f64,
        #[serde(default = "default_alpha")]
        alpha: f64,
        #[serde(default)]
        initial_wavefunction: Option<InitialWavefunction>,
    },
    MultiDeterminant {
        ndets: usize,
        orbitals: String,
        coefficients: String,
        #[serde(default)]
        initial_wavefunction: Option<InitialWavefunction>,
    },
    HartreeFock {
        #[serde(default)]
        initial_wavefunction: Option<InitialWavefunction>,
    },
}

impl TrialConfig {
    /// Where walkers start from. Multi-determinant expansions start from
    /// the free-electron determinant unless told otherwise.
    pub fn initial_wavefunction(&self) -> InitialWavefunction {
        match self {
            TrialConfig::FreeElectron { initial_wavefunction, .. }
            | TrialConfig::Uhf { initial_wavefunction, .. }
            | TrialConfig::HartreeFock { initial_wavefunction } => {
                initial_wavefunction.unwrap_or(InitialWavefunction::Trial)
            }
            TrialConfig::MultiDeterminant { initial_wavefunction, .. } => {
                initial_wavefunction.unwrap_or(InitialWavefunction::FreeElectron)
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HubbardStratonovich {
    #[default]
    Discrete,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PropagatorConfig {
    #[serde(default)]
    pub hubbard_stratonovich: HubbardStratonovich,
    /// Sample fields without the constraint / importance function
    #[serde(default)]
    pub free_projection: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackPropagationConfig {
    /// Number of steps the left-hand state is propagated backwards
    pub nback_prop: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ItcfConfig {
    /// Number of imaginary time slices of the correlation function
    pub tmax: usize,
    #[serde(default = "default_true")]
    pub stable: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub back_propagation: Option<BackPropagationConfig>,
    #[serde(default)]
    pub itcf: Option<ItcfConfig>,
    #[serde(default = "default_filename")]
    pub filename: String,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            back_propagation: None,
            itcf: None,
            filename: default_filename(),
        }
    }
}

impl EstimatorConfig {
    pub fn nback_prop(&self) -> usize {
        self.back_propagation.as_ref().map_or(0, |bp| bp.nback_prop)
    }

    pub fn nitcf(&self) -> usize {
        self.itcf.as_ref().map_or(0, |itcf| itcf.tmax)
    }

    /// Length of one back-propagation block, i.e. history buffer capacity.
    /// Zero when neither estimator needs history.
    pub fn block_size(&self) -> usize {
        self.nback_prop() + self.nitcf()
    }

    pub fn needs_history(&self) -> bool {
        self.block_size() > 0
    }
}

fn default_one() -> usize { 1 }
fn default_hopping() -> f64 { 1.0 }
fn default_interval() -> usize { 10 }
fn default_ninitial() -> usize { 10 }
fn default_nconv() -> usize { 5000 }
fn default_ueff() -> f64 { 0.4 }
fn default_deps() -> f64 { 1e-8 }
fn default_alpha() -> f64 { 0.5 }
fn default_true() -> bool { true }
fn default_filename() -> String { "estimates.json".to_string() }

impl RunConfig {
    /// Read and validate a YAML run file.
    pub fn from_file(filename: &str) -> Result<Self> {
        let file = std::fs::File::open(filename)?;
        let reader = std::io::BufReader::new(file);
        let config: RunConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: RunConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let qmc = &self.qmc;
        if !(qmc.dt > 0.0) {
            return Err(AfqmcError::InvalidConfig(format!("dt must be positive, got {}", qmc.dt)));
        }
        if qmc.nwalkers == 0 {
            return Err(AfqmcError::InvalidConfig("nwalkers must be at least 1".to_string()));
        }
        for (name, value) in [
            ("nstblz", qmc.nstblz),
            ("npop_control", qmc.npop_control),
            ("nmeasure", qmc.nmeasure),
        ] {
            if value == 0 {
                return Err(AfqmcError::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        if let Some(bp) = &self.estimates.back_propagation {
            if bp.nback_prop == 0 {
                return Err(AfqmcError::InvalidConfig("nback_prop must be at least 1".to_string()));
            }
        }
        if let Some(itcf) = &self.estimates.itcf {
            if itcf.tmax == 0 {
                return Err(AfqmcError::InvalidConfig("itcf tmax must be at least 1".to_string()));
            }
        }
        match &self.model {
            ModelConfig::Hubbard { nx, ny, nup, ndown, .. } => {
                let nbasis = nx * ny;
                if nbasis == 0 || *nup > nbasis || *ndown > nbasis {
                    return Err(AfqmcError::InvalidConfig(format!(
                        "cannot place {}+{} electrons on {} sites",
                        nup, ndown, nbasis
                    )));
                }
            }
        }
        if let TrialConfig::MultiDeterminant { ndets, .. } = &self.trial {
            if *ndets == 0 {
                return Err(AfqmcError::InvalidConfig("ndets must be at least 1".to_string()));
            }
        }
        Ok(())
    }
}
