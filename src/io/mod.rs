//! IO module - run configuration, wavefunction files and estimator output.

pub mod config;
mod orbitals;
mod output;

pub use config::{
    BackPropagationConfig, EstimatorConfig, HubbardStratonovich, InitialWavefunction, ItcfConfig,
    ModelConfig, PropagatorConfig, QmcOptions, RunConfig, TrialConfig,
};
pub use orbitals::{read_complex_numbers, read_determinant, write_determinant, DeterminantRecord};
pub use output::{BackPropagatedRow, EstimatorFile, ItcfRow, MatrixRecord, Metadata, MixedRow};
