//! Reading externally supplied wavefunction data.
//!
//! The native format is a YAML file with one `MatrixRecord` per spin:
//!
//! ```yaml
//! up:   { nrows: 4, ncols: 2, re: [...], im: [...] }
//! down: { nrows: 4, ncols: 2, re: [...], im: [...] }
//! ```
//!
//! The legacy format is flat text with one complex number per line written
//! as `(re, im)`, column-major, as produced by Fortran GHF codes.

use std::fs;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::output::MatrixRecord;
use crate::error::{AfqmcError, Result};
use crate::linalg::Complex64;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeterminantRecord {
    pub up: MatrixRecord,
    pub down: MatrixRecord,
}

/// Parse `(re, im)` per line. Blank lines are skipped.
pub fn read_complex_numbers(filename: &str) -> Result<Vec<Complex64>> {
    let content = fs::read_to_string(filename)?;
    parse_complex_numbers(filename, &content)
}

fn parse_complex_numbers(filename: &str, content: &str) -> Result<Vec<Complex64>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(lineno, line)| {
            let inner = line
                .strip_prefix('(')
                .and_then(|l| l.strip_suffix(')'))
                .ok_or_else(|| AfqmcError::parse(filename, format!("line {}: expected (re, im)", lineno + 1)))?;
            let mut parts = inner.split(',').map(str::trim);
            let mut next = || -> Result<f64> {
                parts
                    .next()
                    .and_then(|p| p.replace(['d', 'D'], "e").parse::<f64>().ok())
                    .ok_or_else(|| AfqmcError::parse(filename, format!("line {}: bad number", lineno + 1)))
            };
            let re = next()?;
            let im = next()?;
            Ok(Complex64::new(re, im))
        })
        .collect()
}

fn read_native(filename: &str, nbasis: usize, nup: usize, ndown: usize) -> Result<[DMatrix<Complex64>; 2]> {
    let file = fs::File::open(filename)?;
    let record: DeterminantRecord = serde_yaml::from_reader(std::io::BufReader::new(file))?;
    let up = record.up.to_matrix();
    let down = record.down.to_matrix();
    match (up, down) {
        (Some(up), Some(down))
            if up.shape() == (nbasis, nup) && down.shape() == (nbasis, ndown) =>
        {
            Ok([up, down])
        }
        _ => Err(AfqmcError::parse(filename, "determinant shape does not match the system")),
    }
}

/// Split a GHF orbital block (2 nbasis × ne) into spin-up and spin-down
/// determinants. Columns with no vanishing spin-up component are taken as
/// spin-up orbitals.
fn split_ghf(
    filename: &str,
    orbitals: &[Complex64],
    nbasis: usize,
    nup: usize,
    ndown: usize,
) -> Result<[DMatrix<Complex64>; 2]> {
    let ne = nup + ndown;
    if orbitals.len() != 2 * nbasis * ne {
        return Err(AfqmcError::parse(
            filename,
            format!("expected {} coefficients, found {}", 2 * nbasis * ne, orbitals.len()),
        ));
    }
    let block = DMatrix::from_column_slice(2 * nbasis, ne, orbitals);
    let (ups, downs): (Vec<usize>, Vec<usize>) = (0..ne)
        .partition(|&j| (0..nbasis).all(|i| block[(i, j)].norm() > 1e-10));
    if ups.len() != nup || downs.len() != ndown {
        return Err(AfqmcError::parse(
            filename,
            format!("found {} spin-up and {} spin-down orbitals", ups.len(), downs.len()),
        ));
    }
    let up = DMatrix::from_fn(nbasis, nup, |i, j| block[(i, ups[j])]);
    let down = DMatrix::from_fn(nbasis, ndown, |i, j| block[(nbasis + i, downs[j])]);
    Ok([up, down])
}

/// Read a single determinant, native format first, legacy text second.
pub fn read_determinant(filename: &str, nbasis: usize, nup: usize, ndown: usize) -> Result<[DMatrix<Complex64>; 2]> {
    match read_native(filename, nbasis, nup, ndown) {
        Ok(phi) => Ok(phi),
        Err(err) => {
            log::info!("{} is not in native format ({}), assuming legacy GHF text", filename, err);
            let orbitals = read_complex_numbers(filename)?;
            split_ghf(filename, &orbitals, nbasis, nup, ndown)
        }
    }
}

pub fn write_determinant(filename: &str, phi: &[DMatrix<Complex64>; 2]) -> Result<()> {
    let record = DeterminantRecord {
        up: MatrixRecord::from_matrix(&phi[0]),
        down: MatrixRecord::from_matrix(&phi[1]),
    };
    let file = fs::File::create(filename)?;
    serde_yaml::to_writer(std::io::BufWriter::new(file), &record)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scratch(name: &str) -> String {
        std::env::temp_dir()
            .join(format!("afqmc-orbitals-{}-{}", std::process::id(), name))
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn test_parse_fortran_complex_numbers() {
        let values = parse_complex_numbers("inline", "(1.0, -2.5)\n\n( 0.5d0 , 1D-1 )\n").unwrap();
        assert_eq!(values.len(), 2);
        assert_relative_eq!(values[0].im, -2.5);
        assert_relative_eq!(values[1].re, 0.5);
        assert_relative_eq!(values[1].im, 0.1);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_complex_numbers("inline", "1.0 2.0\n").is_err());
    }

    #[test]
    fn test_native_round_trip() {
        let path = scratch("native.yml");
        let phi = [
            DMatrix::from_fn(3, 2, |i, j| Complex64::new((i + j) as f64, 0.0)),
            DMatrix::from_fn(3, 1, |i, _| Complex64::new(0.0, i as f64)),
        ];
        write_determinant(&path, &phi).unwrap();
        let back = read_determinant(&path, 3, 2, 1).unwrap();
        assert_eq!(back[0], phi[0]);
        assert_eq!(back[1], phi[1]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_falls_back_to_legacy_ghf_text() {
        // nbasis = 2, one up and one down orbital
        let path = scratch("legacy.txt");
        let text = "(0.6, 0)\n(0.8, 0)\n(0, 0)\n(0, 0)\n\
                    (0, 0)\n(0, 0)\n(1.0, 0)\n(0, 0)\n";
        std::fs::write(&path, text).unwrap();
        let phi = read_determinant(&path, 2, 1, 1).unwrap();
        assert_relative_eq!(phi[0][(1, 0)].re, 0.8);
        assert_relative_eq!(phi[1][(0, 0)].re, 1.0);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_missing_file_is_fatal() {
        assert!(read_determinant("/nonexistent/afqmc/orbitals", 2, 1, 1).is_err());
    }
}
