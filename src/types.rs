use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const N_CHANNELS: &str = "n_channels";
pub const RANGE_START: &str = "range_start";
pub const RANGE_STOP: &str = "range_stop";

pub fn default_n_channels() -> usize {
    5
}

pub fn default_range_stop() -> f64 {
    180.0
}

/// Estimator hyperparameters.
///
/// The feature domain is `[range_start, range_stop]`, usually in degrees; the
/// default is the half circle `[0, 180]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EncodingParams {
    #[serde(default = "default_n_channels")]
    pub n_channels: usize,
    #[serde(default)]
    pub range_start: f64,
    #[serde(default = "default_range_stop")]
    pub range_stop: f64,
}

impl Default for EncodingParams {
    fn default() -> Self {
        Self {
            n_channels: default_n_channels(),
            range_start: 0.0,
            range_stop: default_range_stop(),
        }
    }
}

impl EncodingParams {
    pub fn new(n_channels: usize, range_start: f64, range_stop: f64) -> Self {
        Self {
            n_channels,
            range_start,
            range_stop,
        }
    }

    pub fn with_n_channels(mut self, n_channels: usize) -> Self {
        self.n_channels = n_channels;
        self
    }

    pub fn with_range(mut self, range_start: f64, range_stop: f64) -> Self {
        self.range_start = range_start;
        self.range_stop = range_stop;
        self
    }

    pub fn range_width(&self) -> f64 {
        self.range_stop - self.range_start
    }

    pub fn to_param_map(&self) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert(
            N_CHANNELS.to_string(),
            ParamValue::Int(self.n_channels as i64),
        );
        params.insert(RANGE_START.to_string(), ParamValue::Float(self.range_start));
        params.insert(RANGE_STOP.to_string(), ParamValue::Float(self.range_stop));
        params
    }

    /// Returns a copy with `updates` applied by name.
    ///
    /// Fails on the first unknown name or ill-typed value; `self` is never touched.
    pub fn updated<I, K>(&self, updates: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = (K, ParamValue)>,
        K: AsRef<str>,
    {
        let mut next = *self;
        for (name, value) in updates {
            match name.as_ref() {
                N_CHANNELS => next.n_channels = value.as_count(N_CHANNELS)?,
                RANGE_START => next.range_start = value.as_f64(),
                RANGE_STOP => next.range_stop = value.as_f64(),
                other => return Err(ParameterError::Unknown(other.to_string())),
            }
        }
        Ok(next)
    }
}

/// A single hyperparameter value in a [`ParamMap`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            ParamValue::Int(v) => v as f64,
            ParamValue::Float(v) => v,
        }
    }

    fn as_count(self, name: &str) -> Result<usize, ParameterError> {
        match self {
            ParamValue::Int(v) => usize::try_from(v).map_err(|_| ParameterError::InvalidValue {
                name: name.to_string(),
                value: self,
                reason: "expected a non-negative integer",
            }),
            ParamValue::Float(_) => Err(ParameterError::InvalidValue {
                name: name.to_string(),
                value: self,
                reason: "expected an integer",
            }),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

/// Name → value view of the hyperparameters.
pub type ParamMap = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("Unknown parameter '{0}'; expected one of n_channels, range_start, range_stop.")]
    Unknown(String),

    #[error("Invalid value {value} for parameter '{name}': {reason}.")]
    InvalidValue {
        name: String,
        value: ParamValue,
        reason: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_half_circle_five_channels() {
        let params = EncodingParams::default();
        assert_eq!(params.n_channels, 5);
        assert_eq!(params.range_start, 0.0);
        assert_eq!(params.range_stop, 180.0);
        assert_eq!(params.range_width(), 180.0);
    }

    #[test]
    fn param_map_round_trip_is_identity() {
        let params = EncodingParams::new(7, -90.0, 90.0);
        let same = params
            .updated(params.to_param_map())
            .expect("own parameters should apply");
        assert_eq!(same, params);
    }

    #[test]
    fn update_accepts_integer_range_bounds() {
        let params = EncodingParams::default()
            .updated([(RANGE_STOP, ParamValue::from(360)), (N_CHANNELS, 9usize.into())])
            .expect("update should apply");
        assert_eq!(params.range_stop, 360.0);
        assert_eq!(params.n_channels, 9);
    }

    #[test]
    fn update_rejects_unknown_and_ill_typed_values() {
        let params = EncodingParams::default();
        assert_eq!(
            params.updated([("n_chanels", ParamValue::Int(3))]),
            Err(ParameterError::Unknown("n_chanels".to_string()))
        );
        assert!(matches!(
            params.updated([(N_CHANNELS, ParamValue::Float(4.0))]),
            Err(ParameterError::InvalidValue { .. })
        ));
        assert!(matches!(
            params.updated([(N_CHANNELS, ParamValue::Int(-2))]),
            Err(ParameterError::InvalidValue { .. })
        ));
    }

    #[test]
    fn update_allows_configurations_rejected_later_at_fit_time() {
        let params = EncodingParams::default()
            .updated([(N_CHANNELS, ParamValue::Int(1))])
            .expect("channel count is validated by fit, not by update");
        assert_eq!(params.n_channels, 1);
    }
}
