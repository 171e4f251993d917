//! Storage and retrieval of simulated spike times.
//!
//! The simulator writes one raw store per (grid seed, trajectory, Poisson seed range, duration, shuffling, tuning)
//! under `<source_dir>/seed_<grid_seed>/`, named e.g.
//! `grid-seed_trajectory_poisson-seeds_duration_shuffling_tuning_5_[74.5]_300-319_2000_shuffled_tuned`.
//! A raw store holds the keys `grid_spikes` and `granule_spikes` (trajectory → Poisson seed → spike trains)
//! and `parameters`.
//!
//! Consolidation merges all trajectories of a (grid seed, duration, shuffling, tuning) group into one store,
//! e.g. `grid-seed_duration_shuffling_tuning_5_2000_shuffled_tuned`, keyed by trajectory.
//! Consolidating the same group from two processes at once is not supported.
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::StoreConfig;
use crate::error::SpikeCodeError;
use crate::spike_train::{CellType, Shuffling, SpikeCollection, SpikeTrains, Trajectory};
use crate::store::KvStore;

/// Spike trains per Poisson seed.
pub type SeedSpikes = BTreeMap<u64, SpikeTrains>;

type RecordSnapshot = Result<TrajectoryRecord, SpikeCodeError>;
type GroupFailure = (ConsolidatedName, String, SpikeCodeError);

const PARAMETERS_KEY: &str = "parameters";
const RAW_STORE_HEADER: &str = "grid-seed_trajectory_poisson-seeds_duration_shuffling_tuning";
const CONSOLIDATED_STORE_HEADER: &str = "grid-seed_duration_shuffling_tuning";

/// The parameters of a simulation.
/// Only the Poisson seeds are interpreted, the other parameters are kept as they are.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// The Poisson seeds of the samples, in sample order.
    pub poisson_seeds: Vec<u64>,
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

impl SimulationParameters {
    pub fn new(poisson_seeds: Vec<u64>) -> Self {
        SimulationParameters {
            poisson_seeds,
            other: serde_json::Map::new(),
        }
    }
}

/// The spikes and parameters of a trajectory in a consolidated store.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub grid_spikes: SeedSpikes,
    pub granule_spikes: SeedSpikes,
    pub parameters: SimulationParameters,
}

impl TrajectoryRecord {
    /// The spikes of the given population.
    pub fn spikes(&self, cell_type: CellType) -> &SeedSpikes {
        match cell_type {
            CellType::Grid => &self.grid_spikes,
            CellType::Granule => &self.granule_spikes,
        }
    }

    /// The spike trains of the first `n_samples` samples of the given population, in Poisson seed order.
    pub fn samples(
        &self,
        cell_type: CellType,
        n_samples: usize,
    ) -> Result<Vec<SpikeTrains>, SpikeCodeError> {
        let poisson_seeds = &self.parameters.poisson_seeds;
        if n_samples < 1 {
            return Err(SpikeCodeError::InvalidArgument(
                "n_samples should be larger than 0".to_string(),
            ));
        }
        if n_samples > poisson_seeds.len() {
            return Err(SpikeCodeError::InvalidArgument(format!(
                "Too many samples requested: {} requested, {} available",
                n_samples,
                poisson_seeds.len()
            )));
        }

        let spikes = self.spikes(cell_type);
        poisson_seeds[..n_samples]
            .iter()
            .map(|seed| {
                spikes.get(seed).cloned().ok_or_else(|| {
                    SpikeCodeError::MissingData(format!(
                        "No {} cell spikes for Poisson seed {}",
                        cell_type, seed
                    ))
                })
            })
            .collect()
    }
}

/// The name of a raw store, as written by the simulator.
#[derive(Debug, PartialEq, Clone)]
pub struct RawStoreName {
    pub grid_seed: u64,
    pub trajectory: Trajectory,
    /// The first and last Poisson seeds of the store.
    pub poisson_seeds: (u64, u64),
    pub duration_ms: u64,
    pub shuffling: Shuffling,
    pub tuning: String,
}

impl fmt::Display for RawStoreName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}_{}_[{}]_{}-{}_{}_{}_{}",
            RAW_STORE_HEADER,
            self.grid_seed,
            self.trajectory,
            self.poisson_seeds.0,
            self.poisson_seeds.1,
            self.duration_ms,
            self.shuffling,
            self.tuning
        )
    }
}

/// Parse a raw store name from its last six underscore-delimited fields.
impl FromStr for RawStoreName {
    type Err = SpikeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SpikeCodeError::InvalidArgument(format!("Invalid raw store name: {}", s));
        let fields: Vec<&str> = s.split('_').collect();
        if fields.len() < 6 {
            return Err(invalid());
        }
        let fields = &fields[fields.len() - 6..];

        let trajectory = fields[1];
        if !(trajectory.starts_with('[') && trajectory.ends_with(']')) {
            return Err(invalid());
        }
        let (first_seed, last_seed) = fields[2].split_once('-').ok_or_else(invalid)?;

        Ok(RawStoreName {
            grid_seed: fields[0].parse().map_err(|_| invalid())?,
            trajectory: trajectory.parse()?,
            poisson_seeds: (
                first_seed.parse().map_err(|_| invalid())?,
                last_seed.parse().map_err(|_| invalid())?,
            ),
            duration_ms: fields[3].parse().map_err(|_| invalid())?,
            shuffling: fields[4].parse()?,
            tuning: fields[5].to_string(),
        })
    }
}

/// The name of a consolidated store.
#[derive(Debug, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub struct ConsolidatedName {
    pub grid_seed: u64,
    pub duration_ms: u64,
    pub shuffling: String,
    pub tuning: String,
}

impl ConsolidatedName {
    pub fn new(grid_seed: u64, duration_ms: u64, shuffling: Shuffling, tuning: &str) -> Self {
        ConsolidatedName {
            grid_seed,
            duration_ms,
            shuffling: shuffling.to_string(),
            tuning: tuning.to_string(),
        }
    }

    /// Parse the name of a consolidated store from its path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SpikeCodeError> {
        let path = path.as_ref();
        path.file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                SpikeCodeError::InvalidArgument(format!(
                    "Invalid consolidated store path: {}",
                    path.display()
                ))
            })?
            .parse()
    }
}

impl fmt::Display for ConsolidatedName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}",
            CONSOLIDATED_STORE_HEADER, self.grid_seed, self.duration_ms, self.shuffling, self.tuning
        )
    }
}

/// Parse a consolidated store name from its last four underscore-delimited fields.
/// The shuffling label is kept as it is, it is only checked when consolidating.
impl FromStr for ConsolidatedName {
    type Err = SpikeCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid =
            || SpikeCodeError::InvalidArgument(format!("Invalid consolidated store name: {}", s));
        let fields: Vec<&str> = s.split('_').collect();
        if fields.len() < 4 {
            return Err(invalid());
        }
        let fields = &fields[fields.len() - 4..];
        Ok(ConsolidatedName {
            grid_seed: fields[0].parse().map_err(|_| invalid())?,
            duration_ms: fields[1].parse().map_err(|_| invalid())?,
            shuffling: fields[2].to_string(),
            tuning: fields[3].to_string(),
        })
    }
}

/// Access to raw and consolidated spike stores.
#[derive(Debug, PartialEq, Clone)]
pub struct SpikeStore {
    config: StoreConfig,
}

impl SpikeStore {
    pub fn new(config: StoreConfig) -> Self {
        SpikeStore { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The path of a consolidated store.
    pub fn consolidated_path(&self, name: &ConsolidatedName) -> PathBuf {
        self.config.collective_dir.join(name.to_string())
    }

    /// Load the spike trains of the first `n_samples` Poisson seeds of every trajectory from a consolidated store.
    ///
    /// If the store does not exist, it is first consolidated from the raw stores, the grid seed, duration and
    /// shuffling being read from its name. All tunings of that group are consolidated, but only the failures
    /// of the requested store are returned, those of the other stores are logged.
    pub fn load_spikes<P: AsRef<Path>>(
        &self,
        path: P,
        cell_type: CellType,
        trajectories: &[Trajectory],
        n_samples: usize,
    ) -> Result<SpikeCollection, SpikeCodeError> {
        let path = path.as_ref();
        if n_samples < 1 {
            return Err(SpikeCodeError::InvalidArgument(
                "n_samples should be larger than 0".to_string(),
            ));
        }

        if !KvStore::exists(path) {
            let name = ConsolidatedName::from_path(path).map_err(|e| {
                SpikeCodeError::MissingData(format!(
                    "{} does not exist and cannot be consolidated: {}",
                    path.display(),
                    e
                ))
            })?;
            info!("{} does not exist, consolidating raw stores...", path.display());
            let (_, failures) =
                self.consolidate_groups(name.grid_seed, name.shuffling.parse()?, name.duration_ms)?;
            let failures: Vec<(String, SpikeCodeError)> = failures
                .into_iter()
                .filter(|(failed_name, _, _)| *failed_name == name)
                .map(|(_, traj_key, e)| (traj_key, e))
                .collect();
            if !failures.is_empty() {
                return Err(SpikeCodeError::ConsolidationFailed(failures));
            }
            if !KvStore::exists(path) {
                return Err(SpikeCodeError::MissingData(format!(
                    "{} could not be consolidated from {}",
                    path.display(),
                    self.config.source_dir.display()
                )));
            }
        }

        let store = KvStore::open(path)?;
        let mut spikes = SpikeCollection::new();
        for traj in trajectories {
            let record: TrajectoryRecord = store.get(&traj.key())?;
            let samples = record.samples(cell_type, n_samples).map_err(|e| match e {
                SpikeCodeError::InvalidArgument(msg) => {
                    SpikeCodeError::InvalidArgument(format!("Trajectory {}: {}", traj, msg))
                }
                e => e,
            })?;
            debug!("Loaded {} samples of trajectory {}", samples.len(), traj);
            spikes.insert(*traj, samples);
        }
        Ok(spikes)
    }

    /// The raw stores of a grid seed matching the shuffling and duration, sorted by decreasing name.
    pub fn raw_stores(
        &self,
        grid_seed: u64,
        shuffling: Shuffling,
        duration_ms: u64,
    ) -> Result<Vec<(RawStoreName, PathBuf)>, SpikeCodeError> {
        let seed_dir = self.config.seed_dir(grid_seed);
        let entries = fs::read_dir(&seed_dir).map_err(|e| {
            SpikeCodeError::MissingData(format!("Cannot list {}: {}", seed_dir.display(), e))
        })?;

        let mut raw_stores = vec![];
        for entry in entries {
            let path = entry
                .map_err(|e| SpikeCodeError::StorageFailure(e.to_string()))?
                .path();
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            match file_name.parse::<RawStoreName>() {
                Ok(name)
                    if name.grid_seed == grid_seed
                        && name.shuffling == shuffling
                        && name.duration_ms == duration_ms =>
                {
                    raw_stores.push((name, path));
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        raw_stores.sort_by(|(_, path_1), (_, path_2)| path_2.cmp(path_1));
        Ok(raw_stores)
    }

    /// Merge the raw stores of a (grid seed, duration, shuffling) into one consolidated store per tuning.
    ///
    /// Every trajectory is first read and copied out of its raw store, then written under its key in the
    /// consolidated store, replacing any previous record. If several raw stores hold the same trajectory,
    /// the one whose name sorts first is kept.
    ///
    /// A trajectory that fails does not prevent the others from being written; all failures are reported
    /// together at the end. Returns the paths of the consolidated stores.
    pub fn consolidate(
        &self,
        grid_seed: u64,
        shuffling: Shuffling,
        duration_ms: u64,
    ) -> Result<Vec<PathBuf>, SpikeCodeError> {
        let (paths, failures) = self.consolidate_groups(grid_seed, shuffling, duration_ms)?;
        if !failures.is_empty() {
            return Err(SpikeCodeError::ConsolidationFailed(
                failures
                    .into_iter()
                    .map(|(_, traj_key, e)| (traj_key, e))
                    .collect(),
            ));
        }

        info!("Consolidation completed successfully!");
        Ok(paths)
    }

    /// Consolidate every tuning group and return the written stores along with the failed trajectories.
    /// A group without any readable trajectory is not created.
    fn consolidate_groups(
        &self,
        grid_seed: u64,
        shuffling: Shuffling,
        duration_ms: u64,
    ) -> Result<(Vec<PathBuf>, Vec<GroupFailure>), SpikeCodeError> {
        let raw_stores = self.raw_stores(grid_seed, shuffling, duration_ms)?;
        if raw_stores.is_empty() {
            return Err(SpikeCodeError::MissingData(format!(
                "No {} raw store of {} ms for grid seed {} in {}",
                shuffling,
                duration_ms,
                grid_seed,
                self.config.seed_dir(grid_seed).display()
            )));
        }

        info!(
            "Consolidating {} raw stores (grid seed {}, {} ms, {})...",
            raw_stores.len(),
            grid_seed,
            duration_ms,
            shuffling
        );

        // Read and copy every trajectory record out of the raw stores.
        let mut snapshots: BTreeMap<ConsolidatedName, BTreeMap<String, RecordSnapshot>> =
            BTreeMap::new();
        for (name, path) in raw_stores.iter() {
            let traj_key = name.trajectory.key();
            let record = read_raw_record(path, &traj_key);
            if let Err(e) = &record {
                warn!("Cannot read trajectory {} from {}: {}", traj_key, path.display(), e);
            }
            snapshots
                .entry(ConsolidatedName::new(grid_seed, duration_ms, shuffling, &name.tuning))
                .or_default()
                .insert(traj_key, record);
        }

        // Write every record under its trajectory key.
        let mut failures = vec![];
        let mut paths = vec![];
        for (name, records) in snapshots {
            let path = self.consolidated_path(&name);
            if records.values().all(|record| record.is_err()) {
                error!("Nothing to write to {}", path.display());
                for (traj_key, record) in records {
                    if let Err(e) = record {
                        failures.push((name.clone(), traj_key, e));
                    }
                }
                continue;
            }

            let store = match KvStore::create(&path) {
                Ok(store) => store,
                Err(e) => {
                    error!("Cannot create {}: {}", path.display(), e);
                    for traj_key in records.into_keys() {
                        failures.push((name.clone(), traj_key, e.clone()));
                    }
                    continue;
                }
            };
            for (traj_key, record) in records {
                match record.and_then(|record| store.put(&traj_key, &record)) {
                    Ok(()) => debug!("Trajectory {} written to {}", traj_key, path.display()),
                    Err(e) => {
                        error!("Trajectory {} not consolidated: {}", traj_key, e);
                        failures.push((name.clone(), traj_key, e));
                    }
                }
            }
            paths.push(path);
        }

        Ok((paths, failures))
    }
}

/// Copy the spikes and parameters of a trajectory out of a raw store.
fn read_raw_record(path: &Path, traj_key: &str) -> Result<TrajectoryRecord, SpikeCodeError> {
    let raw_store = KvStore::open(path)?;
    let population = |cell_type: CellType| -> Result<SeedSpikes, SpikeCodeError> {
        let mut spikes: BTreeMap<String, SeedSpikes> = raw_store.get(cell_type.spikes_key())?;
        spikes.remove(traj_key).ok_or_else(|| {
            SpikeCodeError::MissingData(format!(
                "No {} cell spikes for trajectory {} in {}",
                cell_type,
                traj_key,
                path.display()
            ))
        })
    };
    let grid_spikes = population(CellType::Grid)?;
    let granule_spikes = population(CellType::Granule)?;
    let parameters: SimulationParameters = raw_store.get(PARAMETERS_KEY)?;

    Ok(TrajectoryRecord {
        grid_spikes,
        granule_spikes,
        parameters,
    })
}
