//! # Inverse model
//!
//! Decoding runs in three independent stages:
//!
//! 1. [`estimate_channel_responses`] inverts the fitted forward weights: for
//!    every trial it solves `Wᵀ · b ≈ x` for the channel activation vector `b`.
//! 2. [`response_curves`] projects those activations onto the channel basis,
//!    giving one response per domain sample.
//! 3. [`decode_argmax`] picks the domain value with the largest response.

use crate::faer_ndarray::{FaerLinalgError, fast_ab, least_squares};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};

/// Per-trial channel responses, `[n_trials, n_channels]`.
///
/// `weights` is the forward model `[n_channels, n_units]` and `observations`
/// is `[n_trials, n_units]`. Each trial is an independent right-hand side of
/// the no-intercept least-squares system with design `weightsᵀ`.
pub fn estimate_channel_responses<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    weights: &ArrayBase<S1, Ix2>,
    observations: &ArrayBase<S2, Ix2>,
) -> Result<Array2<f64>, FaerLinalgError> {
    let solution = least_squares(&weights.t(), &observations.t())?;
    if solution.is_rank_deficient() {
        log::warn!(
            "[IEM] inverse model design is rank deficient (rank {} of {} channels); using minimum-norm responses",
            solution.rank,
            weights.nrows()
        );
    }
    Ok(solution.coefficients.reversed_axes())
}

/// Responses over the sampled domain, `[n_trials, channel_density]`.
pub fn response_curves<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    channel_responses: &ArrayBase<S1, Ix2>,
    channels: &ArrayBase<S2, Ix2>,
) -> Array2<f64> {
    fast_ab(channel_responses, channels)
}

/// Domain value at the maximum of each row of `curves`.
///
/// The first maximum wins on ties. Decoded values are always members of `domain`.
pub fn decode_argmax<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    curves: &ArrayBase<S1, Ix2>,
    domain: &ArrayBase<S2, Ix1>,
) -> Array1<f64> {
    debug_assert_eq!(curves.ncols(), domain.len());
    curves
        .axis_iter(Axis(0))
        .map(|row| domain[argmax(row.iter().copied())])
        .collect()
}

fn argmax(values: impl Iterator<Item = f64>) -> usize {
    let mut best_idx = 0usize;
    let mut best = f64::NEG_INFINITY;
    for (idx, value) in values.enumerate() {
        if value > best {
            best = value;
            best_idx = idx;
        }
    }
    best_idx
}
