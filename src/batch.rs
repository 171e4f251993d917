//! Batch encoding of many samples and trajectories into aligned tensors.
use log::{info, trace};
use ndarray::{s, Array3, Array4};
use rayon::prelude::*;

use crate::binning::{bin_counts_and_phases, CountMatrix, PhaseMatrix};
use crate::config::CodingConfig;
use crate::encoding::{encode, NeuralCodes};
use crate::error::SpikeCodeError;
use crate::spike_train::{num_cells, SpikeCollection, SpikeTrains, Trajectory};
use crate::MIN_PARALLEL_SLOTS;

/// The binned spikes and codes of every (sample, trajectory) pair of a batch.
///
/// Tensors are indexed by `[cell, bin, sample, trajectory]` and code matrices by `[code, sample, trajectory]`,
/// where the code dimension has length `2 * n_cells * n_bins`.
#[derive(Debug, PartialEq, Clone)]
pub struct BatchCodes {
    pub counts: Array4<u32>,
    pub phases: Array4<f64>,
    pub rate_code: Array3<f64>,
    pub phase_code: Array3<f64>,
    pub polar_code: Array3<f64>,
}

impl BatchCodes {
    fn zeros(n_cells: usize, n_bins: usize, n_samples: usize, n_trajectories: usize) -> Self {
        let code_len = 2 * n_cells * n_bins;
        BatchCodes {
            counts: Array4::zeros((n_cells, n_bins, n_samples, n_trajectories)),
            phases: Array4::zeros((n_cells, n_bins, n_samples, n_trajectories)),
            rate_code: Array3::zeros((code_len, n_samples, n_trajectories)),
            phase_code: Array3::zeros((code_len, n_samples, n_trajectories)),
            polar_code: Array3::zeros((code_len, n_samples, n_trajectories)),
        }
    }

    pub fn n_cells(&self) -> usize {
        self.counts.dim().0
    }

    pub fn n_bins(&self) -> usize {
        self.counts.dim().1
    }

    pub fn n_samples(&self) -> usize {
        self.counts.dim().2
    }

    pub fn n_trajectories(&self) -> usize {
        self.counts.dim().3
    }

    /// Write the output of one (sample, trajectory) slot.
    fn assign(&mut self, sample_id: usize, traj_id: usize, slot: &Slot) {
        let (counts, phases, codes) = slot;
        for cell_id in 0..counts.nrows() {
            for bin_id in 0..counts.ncols() {
                self.counts[[cell_id, bin_id, sample_id, traj_id]] = counts[(cell_id, bin_id)];
                self.phases[[cell_id, bin_id, sample_id, traj_id]] = phases[(cell_id, bin_id)];
            }
        }

        for (dst, src) in [
            (&mut self.rate_code, &codes.rate),
            (&mut self.phase_code, &codes.phase),
            (&mut self.polar_code, &codes.polar),
        ] {
            dst.slice_mut(s![.., sample_id, traj_id])
                .iter_mut()
                .zip(src.iter())
                .for_each(|(dst, src)| *dst = *src);
        }
    }
}

type Slot = (CountMatrix, PhaseMatrix, NeuralCodes);

/// Bin and encode a single sample.
pub fn encode_sample(
    spike_trains: &SpikeTrains,
    config: &CodingConfig,
) -> Result<Slot, SpikeCodeError> {
    let (counts, phases) = bin_counts_and_phases(
        spike_trains,
        config.bin_size_ms,
        config.duration_ms,
        config.fill_empty_phase,
    )?;
    let codes = encode(
        &counts,
        &phases,
        config.rate_phase_angle,
        config.phase_saturation,
    )?;
    Ok((counts, phases, codes))
}

/// Bin and encode the first `n_samples` samples of every trajectory.
///
/// Every (sample, trajectory) slot is computed independently and written to its own place in the output tensors,
/// in parallel when there are enough slots.
///
/// # Examples
///
/// ```rust
/// use std::collections::BTreeMap;
/// use spike_codes::batch::batch_encode;
/// use spike_codes::config::CodingConfig;
/// use spike_codes::spike_train::Trajectory;
///
/// let mut collection = BTreeMap::new();
/// collection.insert(Trajectory::new(75.0), vec![vec![vec![50.0], vec![]], vec![vec![], vec![250.0]]]);
/// collection.insert(Trajectory::new(74.5), vec![vec![vec![150.0], vec![350.0]], vec![vec![], vec![]]]);
///
/// let trajectories = [Trajectory::new(75.0), Trajectory::new(74.5)];
/// let codes = batch_encode(&collection, &trajectories, 2, &CodingConfig::new(100.0, 400.0)).unwrap();
///
/// assert_eq!(codes.counts.dim(), (2, 4, 2, 2));
/// assert_eq!(codes.rate_code.dim(), (16, 2, 2));
/// assert_eq!(codes.counts[[1, 2, 1, 0]], 1);
/// assert_eq!(codes.counts[[0, 1, 0, 1]], 1);
/// ```
pub fn batch_encode(
    collection: &SpikeCollection,
    trajectories: &[Trajectory],
    n_samples: usize,
    config: &CodingConfig,
) -> Result<BatchCodes, SpikeCodeError> {
    batch_encode_with(
        collection,
        trajectories,
        n_samples,
        config,
        trajectories.len() * n_samples >= MIN_PARALLEL_SLOTS,
    )
}

fn batch_encode_with(
    collection: &SpikeCollection,
    trajectories: &[Trajectory],
    n_samples: usize,
    config: &CodingConfig,
    parallel: bool,
) -> Result<BatchCodes, SpikeCodeError> {
    config.validate()?;

    if trajectories.is_empty() {
        return Err(SpikeCodeError::InvalidArgument(
            "At least one trajectory is required".to_string(),
        ));
    }
    if n_samples < 1 {
        return Err(SpikeCodeError::InvalidArgument(
            "n_samples should be larger than 0".to_string(),
        ));
    }

    let mut samples: Vec<&[SpikeTrains]> = Vec::with_capacity(trajectories.len());
    for traj in trajectories {
        let traj_samples = collection.get(traj).ok_or_else(|| {
            SpikeCodeError::InvalidArgument(format!("Trajectory {} is not in the collection", traj))
        })?;
        if n_samples > traj_samples.len() {
            return Err(SpikeCodeError::InvalidArgument(format!(
                "Too many samples requested for trajectory {}: {} requested, {} available",
                traj,
                n_samples,
                traj_samples.len()
            )));
        }
        samples.push(&traj_samples[..n_samples]);
    }

    let n_cells = num_cells(samples.iter().flat_map(|traj_samples| traj_samples.iter()))?
        .unwrap_or(0);
    let n_bins = config.n_bins();

    info!(
        "Encoding {} samples of {} trajectories ({} cells, {} bins)",
        n_samples,
        trajectories.len(),
        n_cells,
        n_bins
    );

    let slot_ids: Vec<(usize, usize)> = (0..trajectories.len())
        .flat_map(|traj_id| (0..n_samples).map(move |sample_id| (sample_id, traj_id)))
        .collect();

    let compute = |&(sample_id, traj_id): &(usize, usize)| {
        trace!(
            "Encoding sample {} of trajectory {}",
            sample_id,
            trajectories[traj_id]
        );
        encode_sample(&samples[traj_id][sample_id], config)
    };

    let slots: Vec<Slot> = if parallel {
        slot_ids.par_iter().map(compute).collect::<Result<_, _>>()?
    } else {
        slot_ids.iter().map(compute).collect::<Result<_, _>>()?
    };

    let mut batch = BatchCodes::zeros(n_cells, n_bins, n_samples, trajectories.len());
    for (&(sample_id, traj_id), slot) in slot_ids.iter().zip(slots.iter()) {
        batch.assign(sample_id, traj_id, slot);
    }

    info!("Encoding completed successfully!");

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    const SEED: u64 = 42;

    fn rand_collection(
        trajectories: &[Trajectory],
        n_samples: usize,
        n_cells: usize,
        rng: &mut StdRng,
    ) -> SpikeCollection {
        trajectories
            .iter()
            .map(|&traj| {
                let samples: Vec<SpikeTrains> = (0..n_samples)
                    .map(|_| {
                        (0..n_cells)
                            .map(|_| {
                                let num_spikes = rng.gen_range(0..10);
                                let mut times: Vec<f64> = (0..num_spikes)
                                    .map(|_| rng.gen_range(0.0..2000.0))
                                    .collect();
                                times.sort_by(|a, b| a.partial_cmp(b).unwrap());
                                times
                            })
                            .collect::<SpikeTrains>()
                    })
                    .collect();
                (traj, samples)
            })
            .collect()
    }

    #[test]
    fn test_batch_matches_single_samples() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let trajectories = vec![
            Trajectory::new(75.0),
            Trajectory::new(74.5),
            Trajectory::new(60.0),
        ];
        let collection = rand_collection(&trajectories, 4, 7, &mut rng);
        let config = CodingConfig::default();

        let batch = batch_encode(&collection, &trajectories, 3, &config).unwrap();
        assert_eq!(batch.counts.dim(), (7, 20, 3, 3));
        assert_eq!(batch.n_cells(), 7);
        assert_eq!(batch.n_bins(), 20);
        assert_eq!(batch.n_samples(), 3);
        assert_eq!(batch.n_trajectories(), 3);
        assert_eq!(batch.phases.dim(), (7, 20, 3, 3));
        assert_eq!(batch.rate_code.dim(), (280, 3, 3));
        assert_eq!(batch.phase_code.dim(), (280, 3, 3));
        assert_eq!(batch.polar_code.dim(), (280, 3, 3));

        for (traj_id, traj) in trajectories.iter().enumerate() {
            for sample_id in 0..3 {
                let (counts, phases, codes) =
                    encode_sample(&collection[traj][sample_id], &config).unwrap();
                for cell_id in 0..7 {
                    for bin_id in 0..20 {
                        assert_eq!(
                            batch.counts[[cell_id, bin_id, sample_id, traj_id]],
                            counts[(cell_id, bin_id)]
                        );
                        assert_eq!(
                            batch.phases[[cell_id, bin_id, sample_id, traj_id]],
                            phases[(cell_id, bin_id)]
                        );
                    }
                }
                for k in 0..280 {
                    assert_eq!(batch.rate_code[[k, sample_id, traj_id]], codes.rate[k]);
                    assert_eq!(batch.phase_code[[k, sample_id, traj_id]], codes.phase[k]);
                    assert_eq!(batch.polar_code[[k, sample_id, traj_id]], codes.polar[k]);
                }
            }
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let trajectories: Vec<Trajectory> =
            (0..6).map(|i| Trajectory::from(70 + i as u32)).collect();
        let collection = rand_collection(&trajectories, 5, 10, &mut rng);
        let config = CodingConfig::default();

        let parallel = batch_encode_with(&collection, &trajectories, 5, &config, true).unwrap();
        let sequential = batch_encode_with(&collection, &trajectories, 5, &config, false).unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_batch_code_layout() {
        let mut collection = BTreeMap::new();
        collection.insert(
            Trajectory::new(75.0),
            vec![vec![vec![50.0, 150.0, 155.0], vec![]]],
        );
        let config = CodingConfig::new(100.0, 200.0);
        let batch = batch_encode(&collection, &[Trajectory::new(75.0)], 1, &config).unwrap();

        // raster order: cell 0 (bins 0, 1), cell 1 (bins 0, 1), then the y-coordinates
        let polar: Vec<f64> = batch.polar_code.slice(s![.., 0, 0]).to_vec();
        assert_eq!(polar.len(), 8);
        assert_relative_eq!(polar[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(polar[1], 2.0 * (1.05 * std::f64::consts::PI).cos(), epsilon = 1e-12);
        assert_eq!(&polar[2..4], &[0.0, 0.0]);
        assert_relative_eq!(polar[4], 0.0, epsilon = 1e-12);
        assert_relative_eq!(polar[5], 2.0 * (1.05 * std::f64::consts::PI).sin(), epsilon = 1e-12);
        assert_eq!(&polar[6..8], &[0.0, 0.0]);
    }

    #[test]
    fn test_too_many_samples() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let trajectories = vec![Trajectory::new(75.0), Trajectory::new(74.5)];
        let collection = rand_collection(&trajectories, 2, 3, &mut rng);
        assert!(matches!(
            batch_encode(&collection, &trajectories, 3, &CodingConfig::default()),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            batch_encode(&collection, &trajectories, 0, &CodingConfig::default()),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_missing_or_empty_trajectories() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let collection = rand_collection(&[Trajectory::new(75.0)], 2, 3, &mut rng);
        assert!(matches!(
            batch_encode(&collection, &[], 1, &CodingConfig::default()),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
        assert!(matches!(
            batch_encode(&collection, &[Trajectory::new(60.0)], 1, &CodingConfig::default()),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mismatched_cells() {
        let mut collection = BTreeMap::new();
        collection.insert(Trajectory::new(75.0), vec![vec![vec![10.0], vec![20.0]]]);
        collection.insert(Trajectory::new(74.5), vec![vec![vec![10.0]]]);
        assert!(matches!(
            batch_encode(
                &collection,
                &[Trajectory::new(75.0), Trajectory::new(74.5)],
                1,
                &CodingConfig::default()
            ),
            Err(SpikeCodeError::InvalidArgument(_))
        ));

        // samples beyond n_samples are not inspected
        let mut collection = BTreeMap::new();
        collection.insert(
            Trajectory::new(75.0),
            vec![vec![vec![10.0], vec![20.0]], vec![vec![10.0]]],
        );
        let config = CodingConfig::default();
        let batch = batch_encode(&collection, &[Trajectory::new(75.0)], 1, &config).unwrap();
        assert_eq!(batch.n_cells(), 2);
        assert!(matches!(
            batch_encode(&collection, &[Trajectory::new(75.0)], 2, &CodingConfig::default()),
            Err(SpikeCodeError::InvalidArgument(_))
        ));
    }
}
