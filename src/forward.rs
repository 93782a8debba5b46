//! Forward model: channel activations → observations.

use crate::faer_ndarray::{FaerLinalgError, least_squares};
use ndarray::{Array2, ArrayBase, Data, Ix2};

/// Solve `activations · W ≈ observations` for `W` by ordinary least squares
/// with no intercept.
///
/// `activations` is `[n_trials, n_channels]` and `observations` is
/// `[n_trials, n_units]`; the returned weight matrix is `[n_channels, n_units]`,
/// so column `u` holds the channel weights of unit `u`.
pub fn fit_forward_weights<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    activations: &ArrayBase<S1, Ix2>,
    observations: &ArrayBase<S2, Ix2>,
) -> Result<Array2<f64>, FaerLinalgError> {
    let solution = least_squares(activations, observations)?;
    if solution.is_rank_deficient() {
        log::warn!(
            "[IEM] forward model design is rank deficient (rank {} of {} channels); using the minimum-norm weights",
            solution.rank,
            activations.ncols()
        );
    } else {
        log::debug!(
            "[IEM] forward model solved: {} channels -> {} units",
            activations.ncols(),
            observations.ncols()
        );
    }
    Ok(solution.coefficients)
}
