//! This crate provides tools for turning simulated grid and granule cell spike times into population codes.
//!
//! # Encoding Samples
//!
//! The spike trains of a sample are binned into spike counts and mean spike phases, from which three codes are built:
//! a rate code, a phase code, and a polar code.
//!
//! ```rust
//! use spike_codes::batch::encode_sample;
//! use spike_codes::config::CodingConfig;
//!
//! // Two cells observed during 2 s, binned in 100 ms windows
//! let spike_trains = vec![vec![50.0, 150.0, 155.0], vec![1234.5]];
//! let (counts, _phases, codes) = encode_sample(&spike_trains, &CodingConfig::default()).unwrap();
//!
//! assert_eq!(counts.shape(), (2, 20));
//! assert_eq!(codes.polar.len(), 2 * 2 * 20);
//! ```
//!
//! # Encoding Batches
//!
//! ```rust
//! use spike_codes::batch::batch_encode;
//! use spike_codes::config::CodingConfig;
//! use spike_codes::spike_train::{SpikeCollection, Trajectory};
//!
//! let mut spikes = SpikeCollection::new();
//! spikes.insert(Trajectory::new(75.0), vec![vec![vec![50.0], vec![]], vec![vec![], vec![730.0]]]);
//! spikes.insert(Trajectory::new(74.5), vec![vec![vec![], vec![]], vec![vec![60.0], vec![]]]);
//!
//! let trajectories = [Trajectory::new(75.0), Trajectory::new(74.5)];
//! let codes = batch_encode(&spikes, &trajectories, 2, &CodingConfig::default()).unwrap();
//!
//! // counts are indexed by [cell, bin, sample, trajectory], codes by [feature, sample, trajectory]
//! assert_eq!(codes.counts.dim(), (2, 20, 2, 2));
//! assert_eq!(codes.counts[[1, 7, 1, 0]], 1);
//! assert_eq!(codes.rate_code.dim(), (80, 2, 2));
//! ```
//!
//! # Loading Spikes
//!
//! Spike times are read from consolidated stores, see [`spike_store::SpikeStore`].
//! A missing consolidated store is built from the raw simulation stores on first access.

pub mod batch;
pub mod binning;
pub mod config;
pub mod encoding;
pub mod error;
pub mod spike_store;
pub mod spike_train;
pub mod store;
pub mod utils;

/// The default width of a time bin (in ms).
pub const DEFAULT_BIN_SIZE_MS: f64 = 100.0;
/// The default duration of a simulation (in ms).
pub const DEFAULT_DURATION_MS: f64 = 2000.0;
/// The default angle of the rate code.
pub const DEFAULT_RATE_PHASE_ANGLE: f64 = std::f64::consts::FRAC_PI_4;
/// The default magnitude of an active bin in the phase code.
pub const DEFAULT_PHASE_SATURATION: f64 = 3.0;
/// The minimum number of (sample, trajectory) slots for a batch to be encoded in parallel.
pub const MIN_PARALLEL_SLOTS: usize = 16;
