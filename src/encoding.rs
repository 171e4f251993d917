//! Population codes built from binned spike counts and phases.
//!
//! Every code embeds the (magnitude, angle) pair of each (cell, bin) in the plane and concatenates
//! all x-coordinates followed by all y-coordinates, the pairs being visited in raster order (cell after cell).
//! A code of `n_cells` cells and `n_bins` bins thus has length `2 * n_cells * n_bins`.
//!
//! - The rate code uses the spike count as magnitude and a constant angle.
//! - The phase code uses a constant magnitude for every active bin and the mean spike phase as angle.
//! - The polar code uses the spike count as magnitude and the mean spike phase as angle.
use itertools::Itertools;
use nalgebra::DVector;

use crate::binning::{CountMatrix, PhaseMatrix};
use crate::error::SpikeCodeError;
use crate::utils::raster;

/// The three codes of a sample.
#[derive(Debug, PartialEq, Clone)]
pub struct NeuralCodes {
    /// Spike counts projected on a constant angle.
    pub rate: DVector<f64>,
    /// Saturated activity projected on the spike phases.
    pub phase: DVector<f64>,
    /// Spike counts projected on the spike phases.
    pub polar: DVector<f64>,
}

impl NeuralCodes {
    /// The length shared by the three codes.
    pub fn len(&self) -> usize {
        self.rate.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rate.is_empty()
    }
}

/// Encode the spike counts and phases of a sample into its rate, phase and polar codes.
///
/// # Examples
///
/// ```rust
/// use approx::assert_relative_eq;
/// use nalgebra::DMatrix;
/// use spike_codes::encoding::encode;
///
/// let counts = DMatrix::from_row_slice(1, 2, &[2_u32, 0]);
/// let phases = DMatrix::from_row_slice(1, 2, &[std::f64::consts::PI, 0.0]);
/// let codes = encode(&counts, &phases, std::f64::consts::FRAC_PI_4, 3.0).unwrap();
///
/// assert_eq!(codes.len(), 4);
/// assert_relative_eq!(codes.rate[0], 2.0_f64.sqrt());
/// assert_relative_eq!(codes.phase[0], -3.0);
/// assert_relative_eq!(codes.polar[0], -2.0);
/// assert_eq!(codes.polar[1], 0.0);
/// ```
pub fn encode(
    counts: &CountMatrix,
    phases: &PhaseMatrix,
    rate_phase_angle: f64,
    phase_saturation: f64,
) -> Result<NeuralCodes, SpikeCodeError> {
    if counts.shape() != phases.shape() {
        return Err(SpikeCodeError::InvalidArgument(format!(
            "Counts and phases must have the same shape, got {:?} and {:?}",
            counts.shape(),
            phases.shape()
        )));
    }

    let magnitudes: Vec<f64> = raster(counts).map(|count| count as f64).collect();
    let angles: Vec<f64> = raster(phases).collect();

    let rate = cartesian(magnitudes.iter().map(|&magnitude| (magnitude, rate_phase_angle)));
    let phase = cartesian(magnitudes.iter().zip_eq(angles.iter()).map(|(&magnitude, &angle)| {
        if magnitude != 0.0 {
            (phase_saturation, angle)
        } else {
            (0.0, angle)
        }
    }));
    let polar = cartesian(
        magnitudes
            .iter()
            .zip_eq(angles.iter())
            .map(|(&magnitude, &angle)| (magnitude, angle)),
    );

    Ok(NeuralCodes { rate, phase, polar })
}

/// Concatenate the x- and y-coordinates of the polar pairs (magnitude, angle).
fn cartesian<I: Iterator<Item = (f64, f64)>>(pairs: I) -> DVector<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = pairs
        .map(|(magnitude, angle)| (magnitude * angle.cos(), magnitude * angle.sin()))
        .unzip();
    DVector::from_iterator(xs.len() + ys.len(), xs.into_iter().chain(ys))
}
