//! Binning of spike trains into spike counts and spike phases.
//!
//! A spike at time `t` falls into bin `i` if `bin_size * i < t < bin_size * (i + 1)`.
//! Both inequalities are strict: a spike lying exactly on a bin edge is counted in neither neighboring bin.
use log::{debug, trace};
use nalgebra::DMatrix;

use crate::config::{n_bins, validate_binning};
use crate::error::SpikeCodeError;
use crate::utils::{cycle_angle, mean};

/// Spike counts per cell (rows) and time bin (columns).
pub type CountMatrix = DMatrix<u32>;
/// Mean spike phases (in rad) per cell (rows) and time bin (columns).
pub type PhaseMatrix = DMatrix<f64>;

/// Returns the bin strictly containing the time, if any.
pub fn bin_index(time: f64, bin_size_ms: f64, n_bins: usize) -> Option<usize> {
    if !(time.is_finite() && time > 0.0) {
        return None;
    }
    // The floor of the ratio can be off by one due to rounding, check the neighbors with the exact bounds.
    let guess = (time / bin_size_ms).floor() as usize;
    (guess.saturating_sub(1)..=guess.saturating_add(1))
        .take_while(|&i| i < n_bins)
        .find(|&i| bin_size_ms * (i as f64) < time && time < bin_size_ms * ((i + 1) as f64))
}

/// Count the spikes and compute their mean phase in every time bin, for every cell of a sample.
///
/// The phase of a spike is its position within its bin, as an angle in [0, 2π).
/// Empty bins have a zero phase, unless `fill_empty_phase` is set, in which case they take the mean of all nonzero phases of the sample.
///
/// # Examples
///
/// ```rust
/// use approx::assert_relative_eq;
/// use spike_codes::binning::bin_counts_and_phases;
///
/// let spike_trains = vec![vec![50.0, 150.0, 155.0], vec![]];
/// let (counts, phases) = bin_counts_and_phases(&spike_trains, 100.0, 2000.0, false).unwrap();
///
/// assert_eq!(counts.shape(), (2, 20));
/// assert_eq!(counts[(0, 0)], 1);
/// assert_eq!(counts[(0, 1)], 2);
/// assert_relative_eq!(phases[(0, 0)], std::f64::consts::PI);
/// assert_relative_eq!(phases[(0, 1)], 1.05 * std::f64::consts::PI, epsilon = 1e-12);
/// assert_eq!(counts.row(1).iter().sum::<u32>(), 0);
/// ```
pub fn bin_counts_and_phases(
    spike_trains: &[Vec<f64>],
    bin_size_ms: f64,
    duration_ms: f64,
    fill_empty_phase: bool,
) -> Result<(CountMatrix, PhaseMatrix), SpikeCodeError> {
    validate_binning(bin_size_ms, duration_ms)?;

    let n_bins = n_bins(bin_size_ms, duration_ms);
    let n_cells = spike_trains.len();

    let mut counts = CountMatrix::zeros(n_cells, n_bins);
    let mut phase_sums = PhaseMatrix::zeros(n_cells, n_bins);

    for (cell_id, times) in spike_trains.iter().enumerate() {
        for &time in times.iter() {
            if let Some(bin_id) = bin_index(time, bin_size_ms, n_bins) {
                counts[(cell_id, bin_id)] += 1;
                phase_sums[(cell_id, bin_id)] += cycle_angle(time, bin_size_ms);
            }
        }
    }

    let mut phases = phase_sums.zip_map(&counts, |sum, count| {
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    });

    if fill_empty_phase {
        fill_empty_phases(&mut phases);
    }

    trace!(
        "{} spikes binned over {} cells and {} bins",
        counts.iter().map(|&count| count as usize).sum::<usize>(),
        n_cells,
        n_bins
    );

    Ok((counts, phases))
}

/// Replace every zero phase by the mean of all nonzero phases of the matrix.
/// The matrix is left untouched if it has no nonzero phase.
pub fn fill_empty_phases(phases: &mut PhaseMatrix) {
    match mean(phases.iter().copied().filter(|&phase| phase != 0.0)) {
        Some(mean_phase) => phases
            .iter_mut()
            .filter(|phase| **phase == 0.0)
            .for_each(|phase| *phase = mean_phase),
        None => debug!("No nonzero phase to fill the empty bins with"),
    }
}
