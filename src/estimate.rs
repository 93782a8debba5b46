//! # Inverted encoding model estimation
//!
//! [`InvertedEncoding`] holds the hyperparameters and, once fit, an immutable
//! [`FittedEncoding`] with the channel basis and forward weights. Fitting is a
//! forward regression from idealized channel activations to observations;
//! prediction inverts that regression on new observations and decodes the
//! feature value with the largest basis response.
//!
//! All input validation runs before any state is replaced, so a failed `fit`
//! leaves a previously fitted model untouched.

use crate::basis::{BasisError, ChannelBasis, build_channel_basis, validate_channel_count};
use crate::faer_ndarray::FaerLinalgError;
use crate::forward::fit_forward_weights;
use crate::inverse::{decode_argmax, estimate_channel_responses, response_curves};
use crate::metrics::{ScoreError, coefficient_of_determination};
use crate::types::{EncodingParams, ParamMap, ParamValue, ParameterError};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Dimension, Ix1, Ix2};
use thiserror::Error;

#[derive(Error)]
pub enum EncodingError {
    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(
        "Not enough data: observations must be a 2-D [trials, units] matrix, but {ndim} dimension(s) were provided."
    )]
    NotEnoughData { ndim: usize },

    #[error(
        "Data matrix ill-conditioned: the number of trials ({n_trials}) must exceed the number of units ({n_units})."
    )]
    IllConditioned { n_trials: usize, n_units: usize },

    #[error(
        "Mismatched data samples and label samples: {n_trials} trials but {n_labels} feature labels."
    )]
    LabelMismatch { n_trials: usize, n_labels: usize },

    #[error("Unit count mismatch: the model was fit on {expected} units but the data has {found}.")]
    UnitCountMismatch { expected: usize, found: usize },

    #[error("Input contains non-finite values in {0}.")]
    NonFiniteInput(&'static str),

    #[error("The model has not been fit; call fit() before predict() or score().")]
    NotFitted,

    #[error("A least-squares solve failed: {0}")]
    LinearSystemSolveFailed(#[from] FaerLinalgError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Scoring failed: {0}")]
    Score(#[from] ScoreError),
}

// Debug delegates to Display so `expect` shows the readable message.
impl core::fmt::Debug for EncodingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Shape checks shared by fit and predict: 2-D and strictly more trials than units.
fn validate_observations<S, D>(x: &ArrayBase<S, D>) -> Result<ArrayView2<'_, f64>, EncodingError>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    if x.ndim() != 2 {
        return Err(EncodingError::NotEnoughData { ndim: x.ndim() });
    }
    let x = x
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| EncodingError::NotEnoughData { ndim: x.ndim() })?;
    let (n_trials, n_units) = x.dim();
    if n_trials <= n_units {
        return Err(EncodingError::IllConditioned { n_trials, n_units });
    }
    Ok(x)
}

fn validate_labels<S: Data<Elem = f64>>(
    n_trials: usize,
    y: &ArrayBase<S, Ix1>,
) -> Result<ArrayView1<'_, f64>, EncodingError> {
    if y.len() != n_trials {
        return Err(EncodingError::LabelMismatch {
            n_trials,
            n_labels: y.len(),
        });
    }
    Ok(y.view())
}

fn ensure_finite<S: Data<Elem = f64>, D: Dimension>(
    values: &ArrayBase<S, D>,
    what: &'static str,
) -> Result<(), EncodingError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(EncodingError::NonFiniteInput(what))
    }
}

/// Result of a successful fit: channel basis `C`, its domain `C_D`, and the
/// forward weights `W`. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedEncoding {
    basis: ChannelBasis,
    weights: Array2<f64>,
}

impl FittedEncoding {
    /// Fit the forward model. `x` is `[n_trials, n_units]`, `y` holds one
    /// feature value per trial.
    pub fn fit(
        params: &EncodingParams,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<Self, EncodingError> {
        let basis = build_channel_basis(params)?;
        let activations = basis.channel_activations(&y);
        let weights = fit_forward_weights(&activations, &x)?;
        Ok(Self { basis, weights })
    }

    pub fn basis(&self) -> &ChannelBasis {
        &self.basis
    }

    /// Forward weights `[n_channels, n_units]`.
    pub fn weights(&self) -> ArrayView2<'_, f64> {
        self.weights.view()
    }

    pub fn n_channels(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_units(&self) -> usize {
        self.weights.ncols()
    }

    fn check_units(&self, x: &ArrayView2<'_, f64>) -> Result<(), EncodingError> {
        if x.ncols() != self.n_units() {
            return Err(EncodingError::UnitCountMismatch {
                expected: self.n_units(),
                found: x.ncols(),
            });
        }
        Ok(())
    }

    /// Estimated channel activations `[n_trials, n_channels]`.
    pub fn channel_responses(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, EncodingError> {
        self.check_units(&x)?;
        ensure_finite(&x, "observations")?;
        Ok(estimate_channel_responses(&self.weights, &x)?)
    }

    /// Responses over the sampled domain `[n_trials, channel_density]`.
    pub fn response_curves(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, EncodingError> {
        let responses = self.channel_responses(x)?;
        Ok(response_curves(&responses, &self.basis.channels()))
    }

    /// Decoded feature value per trial; each is a sample of the channel domain.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, EncodingError> {
        let curves = self.response_curves(x)?;
        Ok(decode_argmax(&curves, &self.basis.domain()))
    }
}

/// Inverted encoding model over a circular (or half-circular) feature domain.
///
/// `fit` takes `&mut self`, so concurrent refits of one instance need external
/// synchronization; a fitted instance is read-only for `predict` and `score`.
#[derive(Debug, Clone, Default)]
pub struct InvertedEncoding {
    params: EncodingParams,
    fitted: Option<FittedEncoding>,
}

impl InvertedEncoding {
    pub fn new(params: EncodingParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    pub fn params(&self) -> &EncodingParams {
        &self.params
    }

    pub fn get_params(&self) -> ParamMap {
        self.params.to_param_map()
    }

    /// Update hyperparameters by name. Either every update applies or none does.
    ///
    /// A previous fit is kept as is: after changing parameters the caller must
    /// call `fit` again before `predict`/`score` reflect the new configuration.
    pub fn set_params<I, K>(&mut self, updates: I) -> Result<&mut Self, EncodingError>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        self.params = self.params.updated(updates)?;
        Ok(self)
    }

    pub fn fitted(&self) -> Option<&FittedEncoding> {
        self.fitted.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fit on `x` `[n_trials, n_units]` and feature labels `y` `[n_trials]`.
    ///
    /// Checked in order: channel count, dimensionality, `n_trials > n_units`,
    /// label count, finiteness, feature range, channel coverage.
    pub fn fit<S1, S2, D>(
        &mut self,
        x: &ArrayBase<S1, D>,
        y: &ArrayBase<S2, Ix1>,
    ) -> Result<&mut Self, EncodingError>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
    {
        validate_channel_count(self.params.n_channels)?;
        let x = validate_observations(x)?;
        let y = validate_labels(x.nrows(), y)?;
        ensure_finite(&x, "observations")?;
        ensure_finite(&y, "feature labels")?;

        log::debug!(
            "[IEM] fitting {} channels on {} trials x {} units over [{}, {}]",
            self.params.n_channels,
            x.nrows(),
            x.ncols(),
            self.params.range_start,
            self.params.range_stop
        );
        let fitted = FittedEncoding::fit(&self.params, x, y)?;
        self.fitted = Some(fitted);
        Ok(self)
    }

    fn fitted_for<'a, S, D>(
        &self,
        x: &'a ArrayBase<S, D>,
    ) -> Result<(&FittedEncoding, ArrayView2<'a, f64>), EncodingError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let x = validate_observations(x)?;
        let fitted = self.fitted.as_ref().ok_or(EncodingError::NotFitted)?;
        Ok((fitted, x))
    }

    /// Decoded feature value for every trial of `x`.
    pub fn predict<S, D>(&self, x: &ArrayBase<S, D>) -> Result<Array1<f64>, EncodingError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let (fitted, x) = self.fitted_for(x)?;
        log::debug!("[IEM] decoding {} trials", x.nrows());
        fitted.predict(x)
    }

    /// Channel activations estimated by inverting the forward model.
    pub fn predict_channel_responses<S, D>(
        &self,
        x: &ArrayBase<S, D>,
    ) -> Result<Array2<f64>, EncodingError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let (fitted, x) = self.fitted_for(x)?;
        fitted.channel_responses(x)
    }

    /// Basis response of every trial at every domain sample.
    pub fn predict_response_curves<S, D>(
        &self,
        x: &ArrayBase<S, D>,
    ) -> Result<Array2<f64>, EncodingError>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let (fitted, x) = self.fitted_for(x)?;
        fitted.response_curves(x)
    }

    /// Coefficient of determination of the decoded features against `y`.
    pub fn score<S1, S2, D>(
        &self,
        x: &ArrayBase<S1, D>,
        y: &ArrayBase<S2, Ix1>,
    ) -> Result<f64, EncodingError>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
    {
        let (fitted, x) = self.fitted_for(x)?;
        let y = validate_labels(x.nrows(), y)?;
        let predicted = fitted.predict(x)?;
        Ok(coefficient_of_determination(&y, &predicted)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::CHANNEL_DENSITY;
    use ndarray::{Array, Array2, array};

    fn tall_data(n_trials: usize, n_units: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n_trials, n_units), |(i, j)| {
            ((i * 31 + j * 17) % 23) as f64 / 23.0 - 0.5
        });
        let y = Array1::from_shape_fn(n_trials, |i| (i * 10 % 180) as f64);
        (x, y)
    }

    #[test]
    fn fit_rejects_insufficient_channels_first() {
        let mut model = InvertedEncoding::new(EncodingParams::default().with_n_channels(1));
        // Even with malformed data the channel count is reported.
        let x = Array1::<f64>::zeros(3);
        let y = Array1::<f64>::zeros(3);
        let err = model.fit(&x, &y).expect_err("one channel is not enough");
        assert!(matches!(
            err,
            EncodingError::Basis(BasisError::InsufficientChannels(1))
        ));
        assert!(!model.is_fitted());
    }

    #[test]
    fn fit_rejects_one_and_three_dimensional_data() {
        let mut model = InvertedEncoding::default();
        let y = Array1::<f64>::zeros(4);
        let flat = Array1::<f64>::zeros(4);
        assert!(matches!(
            model.fit(&flat, &y),
            Err(EncodingError::NotEnoughData { ndim: 1 })
        ));
        let cube = Array::<f64, _>::zeros((4, 2, 2));
        assert!(matches!(
            model.fit(&cube, &y),
            Err(EncodingError::NotEnoughData { ndim: 3 })
        ));
    }

    #[test]
    fn fit_rejects_square_and_wide_data() {
        let mut model = InvertedEncoding::default();
        let (square, y) = tall_data(6, 6);
        assert!(matches!(
            model.fit(&square, &y),
            Err(EncodingError::IllConditioned {
                n_trials: 6,
                n_units: 6
            })
        ));
    }

    #[test]
    fn fit_rejects_label_mismatch_and_non_finite_values() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(12, 4);
        let short = y.slice(ndarray::s![..10]).to_owned();
        assert!(matches!(
            model.fit(&x, &short),
            Err(EncodingError::LabelMismatch {
                n_trials: 12,
                n_labels: 10
            })
        ));

        let mut bad_x = x.clone();
        bad_x[[3, 1]] = f64::NAN;
        assert!(matches!(
            model.fit(&bad_x, &y),
            Err(EncodingError::NonFiniteInput("observations"))
        ));
        let mut bad_y = y.clone();
        bad_y[0] = f64::INFINITY;
        assert!(matches!(
            model.fit(&x, &bad_y),
            Err(EncodingError::NonFiniteInput("feature labels"))
        ));
    }

    #[test]
    fn failed_refit_keeps_previous_model() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(20, 8);
        model.fit(&x, &y).expect("fit should succeed");
        let before = model.fitted().cloned();

        let (wide, wide_y) = tall_data(5, 8);
        assert!(model.fit(&wide, &wide_y).is_err());
        model
            .set_params([("n_channels", ParamValue::Int(2))])
            .expect("update should apply");
        assert!(matches!(
            model.fit(&x, &y),
            Err(EncodingError::Basis(BasisError::InsufficientCoverage { .. }))
        ));
        assert_eq!(model.fitted().cloned(), before);

        let flat = Array1::<f64>::zeros(20);
        model
            .set_params([("n_channels", ParamValue::Int(5))])
            .expect("update should apply");
        assert!(matches!(
            model.fit(&flat, &y),
            Err(EncodingError::NotEnoughData { ndim: 1 })
        ));
        assert_eq!(model.fitted().cloned(), before);

        let short = y.slice(ndarray::s![..15]).to_owned();
        assert!(matches!(
            model.fit(&x, &short),
            Err(EncodingError::LabelMismatch { .. })
        ));
        assert_eq!(model.fitted().cloned(), before);

        model
            .set_params([("n_channels", ParamValue::Int(1))])
            .expect("update should apply");
        assert!(matches!(
            model.fit(&x, &y),
            Err(EncodingError::Basis(BasisError::InsufficientChannels(1)))
        ));
        assert_eq!(model.fitted().cloned(), before);
    }

    #[test]
    fn predict_rejects_non_finite_observations() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(20, 8);
        model.fit(&x, &y).expect("fit should succeed");

        let mut bad = x.clone();
        bad[[4, 2]] = f64::NAN;
        assert!(matches!(
            model.predict(&bad),
            Err(EncodingError::NonFiniteInput("observations"))
        ));
        assert!(matches!(
            model.predict_channel_responses(&bad),
            Err(EncodingError::NonFiniteInput("observations"))
        ));
        bad[[4, 2]] = f64::NEG_INFINITY;
        assert!(matches!(
            model.score(&bad, &y),
            Err(EncodingError::NonFiniteInput("observations"))
        ));
    }

    #[test]
    fn fit_stores_basis_and_weights() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(20, 8);
        model.fit(&x, &y).expect("fit should succeed");
        let fitted = model.fitted().expect("fitted");
        assert_eq!(fitted.basis().channels().dim(), (5, CHANNEL_DENSITY));
        assert_eq!(fitted.basis().domain().len(), CHANNEL_DENSITY);
        assert_eq!(fitted.weights().dim(), (5, 8));
        assert_eq!(fitted.n_units(), 8);
        assert_eq!(fitted.n_channels(), 5);
    }

    #[test]
    fn predict_requires_fit_and_matching_units() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(20, 8);
        assert!(matches!(model.predict(&x), Err(EncodingError::NotFitted)));
        assert!(matches!(model.score(&x, &y), Err(EncodingError::NotFitted)));

        model.fit(&x, &y).expect("fit should succeed");
        let (other, _) = tall_data(20, 6);
        assert!(matches!(
            model.predict(&other),
            Err(EncodingError::UnitCountMismatch {
                expected: 8,
                found: 6
            })
        ));
        let (wide, _) = tall_data(6, 8);
        assert!(matches!(
            model.predict(&wide),
            Err(EncodingError::IllConditioned { .. })
        ));
    }

    #[test]
    fn predict_stages_have_consistent_shapes() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(20, 8);
        model.fit(&x, &y).expect("fit should succeed");

        let responses = model.predict_channel_responses(&x).expect("responses");
        assert_eq!(responses.dim(), (20, 5));
        let curves = model.predict_response_curves(&x).expect("curves");
        assert_eq!(curves.dim(), (20, CHANNEL_DENSITY));

        let decoded = model.predict(&x).expect("predict");
        let domain = model.fitted().expect("fitted").basis().domain().to_owned();
        for (row, value) in curves.rows().into_iter().zip(decoded.iter()) {
            let peak = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let idx = domain
                .iter()
                .position(|d| d == value)
                .expect("decoded value is a domain sample");
            assert_eq!(row[idx], peak);
        }
    }

    #[test]
    fn score_checks_label_count() {
        let mut model = InvertedEncoding::default();
        let (x, y) = tall_data(20, 8);
        model.fit(&x, &y).expect("fit should succeed");
        assert!(matches!(
            model.score(&x, &array![1.0, 2.0]),
            Err(EncodingError::LabelMismatch { .. })
        ));
    }

    #[test]
    fn set_params_is_atomic() {
        let mut model = InvertedEncoding::default();
        let err = model
            .set_params([
                ("range_stop", ParamValue::Float(360.0)),
                ("bogus", ParamValue::Int(1)),
            ])
            .expect_err("unknown parameter");
        assert!(matches!(
            err,
            EncodingError::Parameter(ParameterError::Unknown(_))
        ));
        assert_eq!(model.params(), &EncodingParams::default());
    }

    #[test]
    fn errors_format_readably() {
        let err = EncodingError::IllConditioned {
            n_trials: 3,
            n_units: 8,
        };
        assert_eq!(format!("{err:?}"), format!("{err}"));
        assert!(format!("{err}").contains("ill-conditioned"));
    }
}
