use crate::util::{EnsembleSize, OutDim};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Mlp`](super::Mlp) and [`Mlp2`](super::Mlp2).
pub struct MlpConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) out_dim: i64,
    pub(super) activation_out: bool,

    /// If `true`, [`Mlp2`](super::Mlp2) outputs a log standard deviation which
    /// is a parameter independent of the input.
    #[serde(default)]
    pub(super) state_independent_std: bool,
}

impl MlpConfig {
    /// Creates configuration of MLP.
    ///
    /// * `activation_out` - If `true`, activation function is added in the final layer.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: i64, activation_out: bool) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            activation_out,
            state_independent_std: false,
        }
    }

    /// Sets if the log standard deviation of [`Mlp2`](super::Mlp2) is independent of the input.
    pub fn state_independent_std(mut self, v: bool) -> Self {
        self.state_independent_std = v;
        self
    }
}

impl OutDim for MlpConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: i64) {
        self.out_dim = out_dim;
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`EnsembleMlp`](super::EnsembleMlp).
///
/// `in_dim` is the sum of the dimensions of the two inputs.
pub struct EnsembleMlpConfig {
    pub(super) in_dim: i64,
    pub(super) units: Vec<i64>,
    pub(super) out_dim: i64,
    pub(super) ensemble_size: i64,
}

impl EnsembleMlpConfig {
    /// Creates configuration of an ensemble of MLPs.
    pub fn new(in_dim: i64, units: Vec<i64>, out_dim: i64, ensemble_size: i64) -> Self {
        Self {
            in_dim,
            units,
            out_dim,
            ensemble_size,
        }
    }
}

impl OutDim for EnsembleMlpConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, out_dim: i64) {
        self.out_dim = out_dim;
    }
}

impl EnsembleSize for EnsembleMlpConfig {
    fn ensemble_size(&self) -> i64 {
        self.ensemble_size
    }
}
