//! Spike train related structures.
//!
//! Spike times are expressed in milliseconds. The spike trains of one sample (one Poisson seed) are stored
//! cell by cell, and samples are grouped by trajectory.
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SpikeCodeError;

/// The spike trains of one sample, i.e., one sequence of firing times (in ms) per cell.
pub type SpikeTrains = Vec<Vec<f64>>;

/// A collection of samples per trajectory.
/// For every trajectory, the samples are ordered as the Poisson seeds used to generate them.
pub type SpikeCollection = BTreeMap<Trajectory, Vec<SpikeTrains>>;

/// A trajectory label, e.g., `75` or `74.5` for a trajectory slightly shifted from the baseline.
///
/// Trajectories are totally ordered so that they can be used as map keys.
/// Their string form (`75`, `74.5`) is the key under which they are stored.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory(f64);

impl Trajectory {
    pub fn new(label: f64) -> Self {
        Trajectory(label)
    }

    /// Returns the numeric label of the trajectory.
    pub fn label(&self) -> f64 {
        self.0
    }

    /// Returns the key under which the trajectory is stored.
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl From<f64> for Trajectory {
    fn from(label: f64) -> Self {
        Trajectory(label)
    }
}

impl From<u32> for Trajectory {
    fn from(label: u32) -> Self {
        Trajectory(label as f64)
    }
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parse a trajectory from its label, with or without surrounding brackets, e.g., `75`, `[74.5]`.
impl FromStr for Trajectory {
    type Err = SpikeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim();
        let label = label
            .strip_prefix('[')
            .and_then(|label| label.strip_suffix(']'))
            .unwrap_or(label);
        match label.parse::<f64>() {
            Ok(label) if label.is_finite() => Ok(Trajectory(label)),
            _ => Err(SpikeCodeError::InvalidArgument(format!(
                "Invalid trajectory label: {}",
                s
            ))),
        }
    }
}

impl PartialEq for Trajectory {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Trajectory {}

impl PartialOrd for Trajectory {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Trajectory {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Trajectory {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// The population a spike train belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    /// Grid cells, i.e., the input population.
    Grid,
    /// Granule cells, i.e., the population receiving grid cell inputs.
    Granule,
}

impl CellType {
    /// Returns the key under which the spikes of this population are stored.
    pub fn spikes_key(&self) -> &'static str {
        match self {
            CellType::Grid => "grid_spikes",
            CellType::Granule => "granule_spikes",
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CellType::Grid => write!(f, "grid"),
            CellType::Granule => write!(f, "granule"),
        }
    }
}

impl FromStr for CellType {
    type Err = SpikeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grid" => Ok(CellType::Grid),
            "granule" => Ok(CellType::Granule),
            _ => Err(SpikeCodeError::InvalidArgument(format!(
                "Cell type does not exist: {}",
                s
            ))),
        }
    }
}

/// The preprocessing mode of the grid cell inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shuffling {
    Shuffled,
    NonShuffled,
}

impl fmt::Display for Shuffling {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Shuffling::Shuffled => write!(f, "shuffled"),
            Shuffling::NonShuffled => write!(f, "non-shuffled"),
        }
    }
}

impl FromStr for Shuffling {
    type Err = SpikeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shuffled" => Ok(Shuffling::Shuffled),
            "non-shuffled" => Ok(Shuffling::NonShuffled),
            _ => Err(SpikeCodeError::InvalidArgument(format!(
                "Shuffling is not defined: {}",
                s
            ))),
        }
    }
}

/// Returns the number of cells shared by all samples, or an error if the samples disagree.
pub fn num_cells<'a, I>(samples: I) -> Result<Option<usize>, SpikeCodeError>
where
    I: IntoIterator<Item = &'a SpikeTrains>,
{
    let mut num_cells: Option<usize> = None;
    for (sample_id, spike_trains) in samples.into_iter().enumerate() {
        match num_cells {
            None => num_cells = Some(spike_trains.len()),
            Some(n) if n != spike_trains.len() => {
                return Err(SpikeCodeError::InvalidArgument(format!(
                    "Mismatched number of cells: sample {} has {} cells, expected {}",
                    sample_id,
                    spike_trains.len(),
                    n
                )));
            }
            Some(_) => {}
        }
    }
    Ok(num_cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trajectory_key() {
        assert_eq!(Trajectory::new(75.0).key(), "75");
        assert_eq!(Trajectory::new(74.5).key(), "74.5");
        assert_eq!(Trajectory::from(0_u32).key(), "0");
    }

    #[test]
    fn test_trajectory_from_str() {
        assert_eq!("75".parse::<Trajectory>(), Ok(Trajectory::new(75.0)));
        assert_eq!("[74.5]".parse::<Trajectory>(), Ok(Trajectory::new(74.5)));
        assert!(matches!(
            "[abc]".parse::<Trajectory>(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            "inf".parse::<Trajectory>(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_trajectory_ordering() {
        let mut trajectories = vec![
            Trajectory::new(75.0),
            Trajectory::new(60.0),
            Trajectory::new(74.5),
        ];
        trajectories.sort();
        assert_eq!(
            trajectories,
            vec![
                Trajectory::new(60.0),
                Trajectory::new(74.5),
                Trajectory::new(75.0)
            ]
        );
    }

    #[test]
    fn test_cell_type_from_str() {
        assert_eq!("grid".parse::<CellType>(), Ok(CellType::Grid));
        assert_eq!("granule".parse::<CellType>(), Ok(CellType::Granule));
        assert!(matches!(
            "mossy".parse::<CellType>(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        assert_eq!(CellType::Granule.spikes_key(), "granule_spikes");
    }

    #[test]
    fn test_shuffling_from_str() {
        assert_eq!("shuffled".parse::<Shuffling>(), Ok(Shuffling::Shuffled));
        assert_eq!(
            "non-shuffled".parse::<Shuffling>(),
            Ok(Shuffling::NonShuffled)
        );
        assert_eq!(Shuffling::NonShuffled.to_string(), "non-shuffled");
        assert!(matches!(
            "semi-shuffled".parse::<Shuffling>(),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_num_cells() {
        let samples: Vec<SpikeTrains> = vec![vec![vec![1.0], vec![]], vec![vec![], vec![2.0]]];
        assert_eq!(num_cells(&samples), Ok(Some(2)));
        assert_eq!(num_cells(&Vec::<SpikeTrains>::new()), Ok(None));

        let samples: Vec<SpikeTrains> = vec![vec![vec![1.0], vec![]], vec![vec![]]];
        assert!(matches!(
            num_cells(&samples),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }
}
