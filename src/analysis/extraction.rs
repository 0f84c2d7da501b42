//! Reading estimator files back for analysis.

use log::warn;

use crate::error::Result;
use crate::io::{EstimatorFile, Metadata};

/// Load every file, skipping (with a warning) the ones that fail to parse.
pub fn load_files(filenames: &[String]) -> Vec<EstimatorFile> {
    filenames
        .iter()
        .filter_map(|name| match EstimatorFile::read(name) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                None
            }
        })
        .collect()
}

pub fn extract_metadata(filename: &str) -> Result<Metadata> {
    Ok(EstimatorFile::read(filename)?.metadata)
}

/// Pretty-printed YAML of the run configuration stored in the metadata.
pub fn format_metadata(metadata: &Metadata) -> Result<String> {
    let config = serde_yaml::to_string(&metadata.config)?;
    Ok(format!(
        "# version: {}\n# seed: {}\n# nbasis: {}\n{}",
        metadata.version, metadata.seed, metadata.nbasis, config
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{MixedRow, RunConfig};

    fn file() -> EstimatorFile {
        let config = RunConfig::from_yaml(
            "model: {name: hubbard, nx: 4, u: 4.0, nup: 2, ndown: 2}\nqmc: {dt: 0.05, nsteps: 10, nwalkers: 2}\ntrial: {name: free_electron}\n",
        )
        .unwrap();
        let row = |step| MixedRow {
            step,
            weight: 2.0,
            e_num: -4.0,
            e_denom: 2.0,
            etotal: -2.0,
            ekinetic: -4.0,
            epotential: 2.0,
            time: 0.0,
        };
        EstimatorFile {
            metadata: Metadata { version: "0.1.0".into(), seed: 7, nbasis: 4, config },
            mixed: vec![row(0), row(10), row(20)],
            back_propagated: Vec::new(),
            itcf: Vec::new(),
        }
    }

    #[test]
    fn test_written_file_reads_back() {
        let path = std::env::temp_dir().join("afqmc_extraction_test.json");
        let name = path.to_string_lossy().to_string();
        file().write(&name).unwrap();
        let metadata = extract_metadata(&name).unwrap();
        assert_eq!(metadata.seed, 7);
        let text = format_metadata(&metadata).unwrap();
        assert!(text.contains("name: hubbard"));
        assert_eq!(load_files(&[name.clone(), "missing.json".to_string()]).len(), 1);
        std::fs::remove_file(path).unwrap();
    }
}
