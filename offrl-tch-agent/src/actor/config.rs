use crate::{opt::OptimizerConfig, util::OutDim};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// How samples of a Gaussian are mapped into the action range `[-1, 1]`.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub enum Squashing {
    /// `tanh` is applied to samples. The log probability includes the
    /// log-determinant of the Jacobian of `tanh`.
    Tanh,

    /// `tanh` is applied to the mean and samples are clipped.
    Clip,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`GaussianActor`](super::GaussianActor).
pub struct GaussianActorConfig<P: OutDim> {
    pub pi_config: Option<P>,
    pub opt_config: OptimizerConfig,
    pub min_lstd: f64,
    pub max_lstd: f64,
    pub squashing: Squashing,
    pub epsilon: f64,
}

impl<P: OutDim> Default for GaussianActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0 },
            min_lstd: -20.0,
            max_lstd: 2.0,
            squashing: Squashing::Tanh,
            epsilon: 1e-6,
        }
    }
}

impl<P> GaussianActorConfig<P>
where
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets configurations for the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets output dimension of the model.
    pub fn out_dim(mut self, v: i64) -> Self {
        if let Some(pi_config) = &mut self.pi_config {
            pi_config.set_out_dim(v);
        }
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the range of the log standard deviation.
    pub fn lstd_range(mut self, min: f64, max: f64) -> Self {
        self.min_lstd = min;
        self.max_lstd = max;
        self
    }

    /// Sets how actions are squashed.
    pub fn squashing(mut self, v: Squashing) -> Self {
        self.squashing = v;
        self
    }

    /// Constructs [`GaussianActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`GaussianActorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`DeterministicActor`](super::DeterministicActor).
pub struct DeterministicActorConfig<P> {
    pub pi_config: Option<P>,
    pub opt_config: OptimizerConfig,
}

impl<P> Default for DeterministicActorConfig<P> {
    fn default() -> Self {
        Self {
            pi_config: None,
            opt_config: OptimizerConfig::Adam { lr: 0.0 },
        }
    }
}

impl<P> DeterministicActorConfig<P>
where
    P: DeserializeOwned + Serialize,
{
    /// Sets configurations for the policy network.
    pub fn pi_config(mut self, v: P) -> Self {
        self.pi_config = Some(v);
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`DeterministicActorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DeterministicActorConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
