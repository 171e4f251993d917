//! Error module for the spike codes library.
use std::error::Error;
use std::fmt;

/// Error types for the library.
#[derive(Debug, PartialEq, Clone)]
pub enum SpikeCodeError {
    /// Error for invalid arguments, e.g., unknown cell type, unknown shuffling label, or too many samples requested.
    InvalidArgument(String),
    /// Error for missing data, e.g., a consolidated store that cannot be rebuilt from raw simulation files.
    MissingData(String),
    /// Error for storage operations, e.g., a key-value store that cannot be opened, read or written.
    StorageFailure(String),
    /// Error for a consolidation run where some trajectories could not be consolidated.
    /// Each entry holds the trajectory key and the corresponding failure.
    ConsolidationFailed(Vec<(String, SpikeCodeError)>),
}

impl fmt::Display for SpikeCodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpikeCodeError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            SpikeCodeError::MissingData(e) => write!(f, "Missing data: {}", e),
            SpikeCodeError::StorageFailure(e) => write!(f, "Storage failure: {}", e),
            SpikeCodeError::ConsolidationFailed(failures) => {
                write!(f, "Consolidation failed for {} trajectories:", failures.len())?;
                for (traj_key, e) in failures {
                    write!(f, " [{}] {};", traj_key, e)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for SpikeCodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_consolidation_failed() {
        let error = SpikeCodeError::ConsolidationFailed(vec![
            ("75".to_string(), SpikeCodeError::MissingData("no grid spikes".to_string())),
            ("74.5".to_string(), SpikeCodeError::StorageFailure("disk full".to_string())),
        ]);
        assert_eq!(
            error.to_string(),
            "Consolidation failed for 2 trajectories: [75] Missing data: no grid spikes; [74.5] Storage failure: disk full;"
        );
    }
}
