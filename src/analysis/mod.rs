//! Analysis module - post-processing of estimator files.

mod blocking;
mod extraction;

pub use blocking::{
    analyse_estimates, autocorrelation_time, average_tau, optimal_block, reblock, reblock_mixed, summary,
    BackPropagatedAnalysis, MixedAnalysis, ReblockRow, TauAverage,
};
pub use extraction::{extract_metadata, format_metadata, load_files};
