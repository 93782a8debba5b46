use ndarray::{ArrayBase, Data, Ix1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("Cannot score an empty set of predictions.")]
    Empty,

    #[error("Prediction count ({predicted}) does not match target count ({expected}).")]
    LengthMismatch { expected: usize, predicted: usize },

    #[error("Targets have zero variance; the coefficient of determination is undefined.")]
    ConstantTarget,
}

/// `1 - Σ(y - ŷ)² / Σ(y - ȳ)²`.
///
/// 1 for perfect predictions, 0 for always predicting the mean, negative when
/// worse than the mean.
pub fn coefficient_of_determination<S1: Data<Elem = f64>, S2: Data<Elem = f64>>(
    targets: &ArrayBase<S1, Ix1>,
    predictions: &ArrayBase<S2, Ix1>,
) -> Result<f64, ScoreError> {
    if targets.len() != predictions.len() {
        return Err(ScoreError::LengthMismatch {
            expected: targets.len(),
            predicted: predictions.len(),
        });
    }
    let mean = targets.mean().ok_or(ScoreError::Empty)?;

    let residual: f64 = targets
        .iter()
        .zip(predictions.iter())
        .map(|(y, p)| (y - p) * (y - p))
        .sum();
    let total: f64 = targets.iter().map(|y| (y - mean) * (y - mean)).sum();
    if total == 0.0 {
        return Err(ScoreError::ConstantTarget);
    }
    Ok(1.0 - residual / total)
}
