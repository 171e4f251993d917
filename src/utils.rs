//! Utility functions.
use core::f64;

use nalgebra::{DMatrix, Scalar};

/// Iterate over a cell × bin matrix in raster order, i.e., all bins of the first cell, then all bins of the second cell, etc.
pub fn raster<T: Scalar + Copy>(matrix: &DMatrix<T>) -> impl Iterator<Item = T> + '_ {
    (0..matrix.nrows()).flat_map(move |i| (0..matrix.ncols()).map(move |j| matrix[(i, j)]))
}

/// Returns the position of a time within its cycle of length `period`, as an angle in [0, 2π).
pub fn cycle_angle(time: f64, period: f64) -> f64 {
    time.rem_euclid(period) / period * 2.0 * f64::consts::PI
}

/// Returns the arithmetic mean of the values, or `None` if there are none.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0_usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
