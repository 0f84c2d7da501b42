//! Reblocking analysis of correlated Monte Carlo series.
//!
//! Successive pairwise averaging (Flyvbjerg & Petersen) of a time series;
//! the standard error grows with the block length until blocks are
//! uncorrelated. The optimal level is the smallest block length B with
//!
//!   B³ > 2 N (σ_B / σ_0)⁴
//!
//! where N is the number of data points and σ_B the standard error
//! estimated with blocks of length B.

use nalgebra::DMatrix;

use crate::io::{EstimatorFile, MixedRow};

/// Statistics at one reblocking level.
#[derive(Debug, Clone, PartialEq)]
pub struct ReblockRow {
    /// Number of original points per block, 2^level
    pub block_size: usize,
    pub nblocks: usize,
    pub mean: f64,
    pub std_err: f64,
    /// Error of the standard error estimate
    pub std_err_err: f64,
    pub optimal: bool,
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

/// Unbiased sample variance.
fn variance(data: &[f64], mean: f64) -> f64 {
    data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / (data.len() - 1) as f64
}

/// Reblock `data` until fewer than two blocks remain. The optimal level,
/// if any, is flagged.
pub fn reblock(data: &[f64]) -> Vec<ReblockRow> {
    let mut rows = Vec::new();
    let mut blocks = data.to_vec();
    let mut block_size = 1;
    while blocks.len() >= 2 {
        let n = blocks.len();
        let m = mean(&blocks);
        let std_err = (variance(&blocks, m) / n as f64).sqrt();
        rows.push(ReblockRow {
            block_size,
            nblocks: n,
            mean: m,
            std_err,
            std_err_err: std_err / (2.0 * (n - 1) as f64).sqrt(),
            optimal: false,
        });
        blocks = blocks.chunks_exact(2).map(|pair| 0.5 * (pair[0] + pair[1])).collect();
        block_size *= 2;
    }
    if let Some(index) = optimal_block(&rows, data.len()) {
        rows[index].optimal = true;
    }
    rows
}

/// Index of the smallest level meeting the optimal-block criterion.
pub fn optimal_block(rows: &[ReblockRow], ndata: usize) -> Option<usize> {
    let sigma0 = rows.first()?.std_err;
    if sigma0 == 0.0 {
        return Some(0);
    }
    rows.iter().position(|row| {
        let b = row.block_size as f64;
        b.powi(3) > 2.0 * ndata as f64 * (row.std_err / sigma0).powi(4)
    })
}

/// (mean, standard error) at the optimal level, `None` if the series is
/// too short for the criterion to be met.
pub fn summary(data: &[f64]) -> Option<(f64, f64)> {
    let rows = reblock(data);
    rows.iter().find(|row| row.optimal).map(|row| (row.mean, row.std_err))
}

/// Integrated autocorrelation time from the initial positive sequence of
/// the normalised autocorrelation function.
pub fn autocorrelation_time(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 1.0;
    }
    let m = mean(data);
    let var = data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / n as f64;
    if var == 0.0 {
        return 1.0;
    }
    let mut tau = 1.0;
    for t in 1..n / 2 {
        let rho = data[..n - t]
            .iter()
            .zip(&data[t..])
            .map(|(&x, &y)| (x - m) * (y - m))
            .sum::<f64>()
            / ((n - t) as f64 * var);
        if rho < 0.0 {
            break;
        }
        tau += 2.0 * rho;
    }
    tau
}

/// Reblocked mixed-estimator columns.
#[derive(Debug, Clone)]
pub struct MixedAnalysis {
    pub name: &'static str,
    pub rows: Vec<ReblockRow>,
    pub summary: Option<(f64, f64)>,
    pub autocorrelation_time: f64,
}

/// Reblock E, T and V of the mixed series from `start` onwards.
pub fn reblock_mixed(rows: &[MixedRow], start: usize) -> Vec<MixedAnalysis> {
    let kept: Vec<&MixedRow> = rows
        .iter()
        .filter(|r| r.step >= start && r.e_denom != 0.0 && r.etotal.is_finite())
        .collect();
    let columns: [(&'static str, fn(&MixedRow) -> f64); 3] = [
        ("E", |r| r.etotal),
        ("EKin", |r| r.ekinetic),
        ("EPot", |r| r.epotential),
    ];
    columns
        .into_iter()
        .map(|(name, column)| {
            let data: Vec<f64> = kept.iter().map(|r| column(r)).collect();
            let rows = reblock(&data);
            let summary = rows.iter().find(|row| row.optimal).map(|row| (row.mean, row.std_err));
            MixedAnalysis {
                name,
                rows,
                summary,
                autocorrelation_time: autocorrelation_time(&data),
            }
        })
        .collect()
}

/// Per-step average of the mixed energy over independent runs.
#[derive(Debug, Clone, PartialEq)]
pub struct TauAverage {
    pub step: usize,
    pub mean: f64,
    pub std_err: f64,
    pub nruns: usize,
}

/// Average E over runs at every measured step. With `tail` only the last
/// row of each run is used.
pub fn average_tau(files: &[EstimatorFile], tail: bool) -> Vec<TauAverage> {
    let mut steps: Vec<usize> = files
        .iter()
        .flat_map(|f| f.mixed.iter().map(|r| r.step))
        .collect();
    steps.sort_unstable();
    steps.dedup();
    if tail {
        steps = steps.last().copied().into_iter().collect();
    }
    steps
        .into_iter()
        .filter_map(|step| {
            let values: Vec<f64> = files
                .iter()
                .filter_map(|f| f.mixed.iter().find(|r| r.step == step))
                .map(|r| r.etotal)
                .filter(|e| e.is_finite())
                .collect();
            if values.is_empty() {
                return None;
            }
            let m = mean(&values);
            let std_err = if values.len() > 1 {
                (variance(&values, m) / values.len() as f64).sqrt()
            } else {
                0.0
            };
            Some(TauAverage {
                step,
                mean: m,
                std_err,
                nruns: values.len(),
            })
        })
        .collect()
}

/// Back-propagated estimates pooled over files.
#[derive(Debug, Clone)]
pub struct BackPropagatedAnalysis {
    pub nsamples: usize,
    /// (mean, standard error) of E, T, V
    pub energies: [(f64, f64); 3],
    /// Mean one-body density matrix per spin (real part)
    pub rdm: [DMatrix<f64>; 2],
    /// Standard error of each RDM element
    pub rdm_error: [DMatrix<f64>; 2],
}

/// Mean and standard error of the back-propagated series from `start`
/// onwards, treating blocks as independent samples.
pub fn analyse_estimates(files: &[EstimatorFile], start: usize) -> Option<BackPropagatedAnalysis> {
    let rows: Vec<_> = files
        .iter()
        .flat_map(|f| f.back_propagated.iter())
        .filter(|r| r.step >= start && r.etotal.is_finite())
        .collect();
    if rows.is_empty() {
        return None;
    }
    let stats = |data: Vec<f64>| {
        let m = mean(&data);
        let err = if data.len() > 1 { (variance(&data, m) / data.len() as f64).sqrt() } else { 0.0 };
        (m, err)
    };
    let energies = [
        stats(rows.iter().map(|r| r.etotal).collect()),
        stats(rows.iter().map(|r| r.ekinetic).collect()),
        stats(rows.iter().map(|r| r.epotential).collect()),
    ];

    let mut rdm = [DMatrix::zeros(0, 0), DMatrix::zeros(0, 0)];
    let mut rdm_error = [DMatrix::zeros(0, 0), DMatrix::zeros(0, 0)];
    for spin in 0..2 {
        let samples: Vec<DMatrix<f64>> = rows
            .iter()
            .filter_map(|r| r.rdm[spin].to_matrix())
            .map(|m| m.map(|z| z.re))
            .collect();
        let Some(first) = samples.first() else {
            continue;
        };
        let n = samples.len() as f64;
        let mut sum = DMatrix::zeros(first.nrows(), first.ncols());
        for s in &samples {
            sum += s;
        }
        let m = sum / n;
        let mut spread = DMatrix::zeros(m.nrows(), m.ncols());
        if samples.len() > 1 {
            for s in &samples {
                spread += (s - &m).map(|x| x * x);
            }
            spread = (spread / ((n - 1.0) * n)).map(f64::sqrt);
        }
        rdm[spin] = m;
        rdm_error[spin] = spread;
    }
    Some(BackPropagatedAnalysis {
        nsamples: rows.len(),
        energies,
        rdm,
        rdm_error,
    })
}
