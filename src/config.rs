//! Configuration of the coding pipeline and of the spike store.
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::SpikeCodeError;
use crate::{
    DEFAULT_BIN_SIZE_MS, DEFAULT_DURATION_MS, DEFAULT_PHASE_SATURATION, DEFAULT_RATE_PHASE_ANGLE,
};

/// Parameters of the binning and encoding steps.
///
/// # Examples
///
/// ```rust
/// use spike_codes::config::CodingConfig;
///
/// let config: CodingConfig = serde_json::from_str(r#"{"bin_size_ms": 50.0}"#).unwrap();
/// assert_eq!(config.n_bins(), 40);
/// assert!(!config.fill_empty_phase);
/// ```
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodingConfig {
    /// The width of a time bin (in ms).
    pub bin_size_ms: f64,
    /// The duration of the simulation (in ms).
    pub duration_ms: f64,
    /// Whether empty bins take the mean of all nonzero phases instead of a zero phase.
    pub fill_empty_phase: bool,
    /// The constant angle on which the rate code is projected (in rad).
    pub rate_phase_angle: f64,
    /// The constant magnitude of every active bin in the phase code.
    pub phase_saturation: f64,
}

impl Default for CodingConfig {
    fn default() -> Self {
        CodingConfig {
            bin_size_ms: DEFAULT_BIN_SIZE_MS,
            duration_ms: DEFAULT_DURATION_MS,
            fill_empty_phase: false,
            rate_phase_angle: DEFAULT_RATE_PHASE_ANGLE,
            phase_saturation: DEFAULT_PHASE_SATURATION,
        }
    }
}

impl CodingConfig {
    /// Create a configuration with the given bin size and duration, and default encoding parameters.
    pub fn new(bin_size_ms: f64, duration_ms: f64) -> Self {
        CodingConfig {
            bin_size_ms,
            duration_ms,
            ..Default::default()
        }
    }

    /// The number of (complete) time bins covering the simulation.
    pub fn n_bins(&self) -> usize {
        n_bins(self.bin_size_ms, self.duration_ms)
    }

    /// Check that the configuration describes a valid binning and encoding.
    pub fn validate(&self) -> Result<(), SpikeCodeError> {
        validate_binning(self.bin_size_ms, self.duration_ms)?;
        if !self.rate_phase_angle.is_finite() {
            return Err(SpikeCodeError::InvalidArgument(
                "The rate phase angle must be finite".to_string(),
            ));
        }
        if !self.phase_saturation.is_finite() {
            return Err(SpikeCodeError::InvalidArgument(
                "The phase saturation must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Save the configuration to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SpikeCodeError> {
        save_json(self, path)
    }

    /// Load a configuration from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SpikeCodeError> {
        let config: CodingConfig = load_json(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Locations of the raw simulation stores and of the consolidated stores.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// The directory holding one `seed_<grid_seed>` subdirectory of raw stores per grid seed.
    pub source_dir: PathBuf,
    /// The directory where consolidated stores are written.
    pub collective_dir: PathBuf,
}

impl StoreConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source_dir: P, collective_dir: Q) -> Self {
        StoreConfig {
            source_dir: source_dir.into(),
            collective_dir: collective_dir.into(),
        }
    }

    /// The directory holding the raw stores of a grid seed.
    pub fn seed_dir(&self, grid_seed: u64) -> PathBuf {
        self.source_dir.join(format!("seed_{}", grid_seed))
    }

    /// Save the configuration to a file.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SpikeCodeError> {
        save_json(self, path)
    }

    /// Load a configuration from a file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SpikeCodeError> {
        load_json(path)
    }
}

/// The number of complete bins of size `bin_size_ms` in `duration_ms`; a fractional remainder is dropped.
pub fn n_bins(bin_size_ms: f64, duration_ms: f64) -> usize {
    (duration_ms / bin_size_ms).floor() as usize
}

/// Check that the bin size is positive and the duration non-negative, both finite.
pub fn validate_binning(bin_size_ms: f64, duration_ms: f64) -> Result<(), SpikeCodeError> {
    if !(bin_size_ms.is_finite() && bin_size_ms > 0.0) {
        return Err(SpikeCodeError::InvalidArgument(format!(
            "The bin size must be positive and finite, got {}",
            bin_size_ms
        )));
    }
    if !(duration_ms.is_finite() && duration_ms >= 0.0) {
        return Err(SpikeCodeError::InvalidArgument(format!(
            "The duration must be non-negative and finite, got {}",
            duration_ms
        )));
    }
    Ok(())
}

fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<(), SpikeCodeError> {
    let file = File::create(path).map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))
}

fn load_json<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> Result<T, SpikeCodeError> {
    let file = File::open(path).map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CodingConfig::default();
        assert_eq!(config.bin_size_ms, 100.0);
        assert_eq!(config.duration_ms, 2000.0);
        assert_eq!(config.n_bins(), 20);
        assert_eq!(config.phase_saturation, 3.0);
        assert_eq!(config.rate_phase_angle, std::f64::consts::FRAC_PI_4);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_n_bins_drops_remainder() {
        assert_eq!(n_bins(100.0, 2050.0), 20);
        assert_eq!(n_bins(100.0, 99.0), 0);
        assert_eq!(n_bins(30.0, 90.0), 3);
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            CodingConfig::new(0.0, 2000.0).validate(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            CodingConfig::new(100.0, -1.0).validate(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            CodingConfig::new(f64::NAN, 2000.0).validate(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        let config = CodingConfig {
            phase_saturation: f64::INFINITY,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_save_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coding.json");

        let config = CodingConfig {
            fill_empty_phase: true,
            ..CodingConfig::new(50.0, 1000.0)
        };
        config.save_to(&path).unwrap();
        assert_eq!(CodingConfig::load_from(&path).unwrap(), config);

        let store_config = StoreConfig::new("/data/trajectories", "/data/collective");
        let path = dir.path().join("store.json");
        store_config.save_to(&path).unwrap();
        assert_eq!(StoreConfig::load_from(&path).unwrap(), store_config);
        assert_eq!(
            store_config.seed_dir(3),
            PathBuf::from("/data/trajectories/seed_3")
        );
    }

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CodingConfig::load_from(dir.path().join("missing.json")),
            Err(SpikeCodeError::StorageFailure(_))
        ));
    }
}
