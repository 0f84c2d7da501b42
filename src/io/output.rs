//! Estimator output file.
//!
//! One JSON document per run with three datasets: `mixed` (one row per
//! measurement), `back_propagated` (energies and one-body density matrices
//! per block) and `itcf` (one correlation function per block), plus the
//! `metadata` record holding the full run configuration.

use std::fs::File;
use std::io::{BufReader, BufWriter};

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::io::config::RunConfig;
use crate::linalg::Complex64;

/// Column-major complex matrix in a serde-friendly layout.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MatrixRecord {
    pub nrows: usize,
    pub ncols: usize,
    pub re: Vec<f64>,
    pub im: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_matrix(m: &DMatrix<Complex64>) -> Self {
        Self {
            nrows: m.nrows(),
            ncols: m.ncols(),
            re: m.iter().map(|z| z.re).collect(),
            im: m.iter().map(|z| z.im).collect(),
        }
    }

    /// `None` when the data length does not match the declared shape.
    pub fn to_matrix(&self) -> Option<DMatrix<Complex64>> {
        let n = self.nrows * self.ncols;
        if self.re.len() != n || self.im.len() != n {
            return None;
        }
        Some(DMatrix::from_iterator(
            self.nrows,
            self.ncols,
            self.re.iter().zip(&self.im).map(|(&re, &im)| Complex64::new(re, im)),
        ))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Metadata {
    pub version: String,
    pub seed: u64,
    pub nbasis: usize,
    pub config: RunConfig,
}

/// One row of the mixed estimator series.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MixedRow {
    pub step: usize,
    pub weight: f64,
    pub e_num: f64,
    pub e_denom: f64,
    pub etotal: f64,
    pub ekinetic: f64,
    pub epotential: f64,
    pub time: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackPropagatedRow {
    pub step: usize,
    pub weight: f64,
    pub etotal: f64,
    pub ekinetic: f64,
    pub epotential: f64,
    pub rdm: [MatrixRecord; 2],
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ItcfRow {
    pub step: usize,
    /// Spin-resolved G>(τ) for τ = 0..=tmax
    pub up: Vec<MatrixRecord>,
    pub down: Vec<MatrixRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EstimatorFile {
    pub metadata: Metadata,
    pub mixed: Vec<MixedRow>,
    #[serde(default)]
    pub back_propagated: Vec<BackPropagatedRow>,
    #[serde(default)]
    pub itcf: Vec<ItcfRow>,
}

impl EstimatorFile {
    pub fn write(&self, filename: &str) -> Result<()> {
        let writer = BufWriter::new(File::create(filename)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn read(filename: &str) -> Result<Self> {
        let reader = BufReader::new(File::open(filename)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_record_preserves_layout() {
        let m = DMatrix::from_fn(2, 3, |i, j| Complex64::new(i as f64, j as f64));
        let record = MatrixRecord::from_matrix(&m);
        assert_eq!(record.re, vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0]);
        assert_eq!(record.to_matrix().unwrap(), m);
    }

    #[test]
    fn test_matrix_record_rejects_bad_shape() {
        let record = MatrixRecord { nrows: 2, ncols: 2, re: vec![1.0], im: vec![0.0] };
        assert!(record.to_matrix().is_none());
    }
}
