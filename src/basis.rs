//! # Channel basis
//!
//! Idealized tuning curves ("channels") over a circular feature domain. Each
//! channel is a half-wave cosine raised to [`CHANNEL_EXPONENT`], sampled at
//! [`CHANNEL_DENSITY`] points from 0 to π and shifted so that the channel
//! centers tile `[0, π - π/n)` evenly. The sampled points map linearly onto the
//! feature domain `[range_start, range_stop]`.

use crate::types::EncodingParams;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2};
use std::f64::consts::PI;
use thiserror::Error;

/// Number of samples per channel across the feature domain.
pub const CHANNEL_DENSITY: usize = 180;

/// Even power applied to each half-wave cosine.
pub const CHANNEL_EXPONENT: i32 = 6;

/// Largest allowed spread of the summed channels, as a fraction of the domain
/// width in radians.
pub const COVERAGE_TOLERANCE_FRACTION: f64 = 0.1;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BasisError {
    #[error("Insufficient channels: at least 2 are required, but {0} were requested.")]
    InsufficientChannels(usize),

    #[error(
        "Feature range is invalid: start ({0}) and stop ({1}) must be finite with start strictly less than stop."
    )]
    InvalidRange(f64, f64),

    #[error(
        "Insufficient channel coverage: summed channel response varies by {spread:.4e} across the domain, above the tolerance of {tolerance:.4e}."
    )]
    InsufficientCoverage { spread: f64, tolerance: f64 },
}

/// Sampled channel basis `C` together with its domain `C_D`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBasis {
    channels: Array2<f64>,
    domain: Array1<f64>,
}

impl ChannelBasis {
    /// `[n_channels, channel_density]`
    pub fn channels(&self) -> ArrayView2<'_, f64> {
        self.channels.view()
    }

    /// Feature value of every basis sample, `[channel_density]`.
    pub fn domain(&self) -> ArrayView1<'_, f64> {
        self.domain.view()
    }

    pub fn n_channels(&self) -> usize {
        self.channels.nrows()
    }

    pub fn density(&self) -> usize {
        self.domain.len()
    }

    /// Spacing between adjacent domain samples; the decoding resolution.
    pub fn resolution(&self) -> f64 {
        match (self.domain.first(), self.domain.last()) {
            (Some(first), Some(last)) if self.domain.len() > 1 => {
                (last - first) / (self.domain.len() - 1) as f64
            }
            _ => 0.0,
        }
    }

    /// Index of the domain sample closest to `feature` under squared distance.
    /// Ties resolve to the lowest index.
    pub fn nearest_domain_index(&self, feature: f64) -> usize {
        let mut best_idx = 0usize;
        let mut best_dist = f64::INFINITY;
        for (idx, &value) in self.domain.iter().enumerate() {
            let dist = (feature - value) * (feature - value);
            if dist < best_dist {
                best_dist = dist;
                best_idx = idx;
            }
        }
        best_idx
    }

    /// Channel activation matrix `F` of shape `[n_features, n_channels]`.
    ///
    /// Row `i` is the basis column at the domain sample nearest `features[i]`,
    /// a soft assignment drawn from the continuous curves rather than a one-hot code.
    pub fn channel_activations<S: Data<Elem = f64>>(
        &self,
        features: &ArrayBase<S, Ix1>,
    ) -> Array2<f64> {
        let mut activations = Array2::<f64>::zeros((features.len(), self.n_channels()));
        for (mut row, &feature) in activations.axis_iter_mut(Axis(0)).zip(features.iter()) {
            let k = self.nearest_domain_index(feature);
            row.assign(&self.channels.column(k));
        }
        activations
    }
}

/// Evenly spaced channel centers over `[0, π - π/n_channels]`.
pub fn channel_shifts(n_channels: usize) -> Array1<f64> {
    Array1::linspace(0.0, PI - PI / n_channels as f64, n_channels)
}

/// Max minus min of the per-sample channel sums.
pub fn coverage_spread<S: Data<Elem = f64>>(channels: &ArrayBase<S, Ix2>) -> f64 {
    let sums = channels.sum_axis(Axis(0));
    let max = sums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = sums.iter().copied().fold(f64::INFINITY, f64::min);
    max - min
}

pub(crate) fn validate_channel_count(n_channels: usize) -> Result<(), BasisError> {
    if n_channels < 2 {
        return Err(BasisError::InsufficientChannels(n_channels));
    }
    Ok(())
}

/// Build `(C, C_D)` for `params`, rejecting bases whose summed response is not
/// close to flat over the domain.
pub fn build_channel_basis(params: &EncodingParams) -> Result<ChannelBasis, BasisError> {
    validate_channel_count(params.n_channels)?;
    let (start, stop) = (params.range_start, params.range_stop);
    if !start.is_finite() || !stop.is_finite() || start >= stop {
        return Err(BasisError::InvalidRange(start, stop));
    }

    let samples = Array1::linspace(0.0, PI, CHANNEL_DENSITY);
    let shifts = channel_shifts(params.n_channels);
    let mut channels = Array2::<f64>::zeros((params.n_channels, CHANNEL_DENSITY));
    for (mut row, &shift) in channels.axis_iter_mut(Axis(0)).zip(shifts.iter()) {
        row.zip_mut_with(&samples, |c, &x| *c = (x - shift).cos().powi(CHANNEL_EXPONENT));
    }

    let spread = coverage_spread(&channels);
    let tolerance = params.range_width().to_radians() * COVERAGE_TOLERANCE_FRACTION;
    log::debug!(
        "[IEM] channel basis: {} channels x {} samples, coverage spread {:.3e} (tolerance {:.3e})",
        params.n_channels,
        CHANNEL_DENSITY,
        spread,
        tolerance
    );
    if spread > tolerance {
        return Err(BasisError::InsufficientCoverage { spread, tolerance });
    }

    Ok(ChannelBasis {
        channels,
        domain: Array1::linspace(start, stop, CHANNEL_DENSITY),
    })
}
