#![deny(dead_code)]
#![deny(unused_imports)]

//! Inverted encoding models.
//!
//! Reconstructs a circular feature (for example stimulus orientation) from
//! multivariate responses. A fixed bank of idealized tuning curves is regressed
//! onto the observations during [`InvertedEncoding::fit`]; prediction inverts
//! that regression and decodes the feature value with the strongest basis
//! response.
//!
//! ```no_run
//! use iem::{EncodingParams, InvertedEncoding};
//! use ndarray::{Array1, Array2};
//!
//! # fn main() -> Result<(), iem::EncodingError> {
//! let x = Array2::from_shape_fn((40, 12), |(i, j)| ((i * 7 + j * 3) % 11) as f64);
//! let y = Array1::from_shape_fn(40, |i| i as f64 * 4.5);
//! let mut model = InvertedEncoding::new(EncodingParams::default().with_n_channels(6));
//! model.fit(&x, &y)?;
//! let decoded = model.predict(&x)?;
//! let r2 = model.score(&x, &y)?;
//! # let _ = (decoded, r2);
//! # Ok(())
//! # }
//! ```

pub mod basis;
pub mod estimate;
pub mod faer_ndarray;
pub mod forward;
pub mod inverse;
pub mod metrics;
pub mod types;

pub use basis::{
    BasisError, CHANNEL_DENSITY, CHANNEL_EXPONENT, ChannelBasis, build_channel_basis,
    channel_shifts, coverage_spread,
};
pub use estimate::{EncodingError, FittedEncoding, InvertedEncoding};
pub use faer_ndarray::{FaerLinalgError, LeastSquaresSolution, least_squares};
pub use forward::fit_forward_weights;
pub use inverse::{decode_argmax, estimate_channel_responses, response_curves};
pub use metrics::{ScoreError, coefficient_of_determination};
pub use types::{EncodingParams, ParamMap, ParamValue, ParameterError};
