//! Configuration of InAC agent.
use crate::{
    actor::{GaussianActorConfig, Squashing},
    critic::CriticConfig,
    util::{CriticLoss, OutDim},
    Device,
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Inac`](super::Inac).
///
/// `Q`, `P` and `V` are the configurations of the critic, the policies
/// and the state-value function.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct InacConfig<Q, P, V>
where
    P: OutDim,
{
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the behavior policy estimated from the dataset.
    pub behavior_config: GaussianActorConfig<P>,

    pub critic_config: CriticConfig<Q>,
    pub value_config: CriticConfig<V>,

    /// Temperature of the in-sample softmax.
    pub temperature: f64,

    pub gamma: f64,
    pub tau: f64,

    /// Lower bound of actor loss weights.
    pub eps: f64,

    /// Upper bound of actor loss weights.
    pub exp_threshold: f64,

    pub batch_size: usize,
    pub train: bool,
    pub critic_loss: CriticLoss,
    pub seed: Option<i64>,
    pub device: Option<Device>,
}

fn clipped_gaussian<P: OutDim>() -> GaussianActorConfig<P> {
    GaussianActorConfig {
        min_lstd: -6.0,
        max_lstd: 0.0,
        squashing: Squashing::Clip,
        ..Default::default()
    }
}

impl<Q, P: OutDim, V> Default for InacConfig<Q, P, V> {
    fn default() -> Self {
        Self {
            actor_config: clipped_gaussian(),
            behavior_config: clipped_gaussian(),
            critic_config: Default::default(),
            value_config: Default::default(),
            temperature: 0.01,
            gamma: 0.99,
            tau: 0.005,
            eps: 1e-8,
            exp_threshold: 10000.0,
            batch_size: 256,
            train: false,
            critic_loss: CriticLoss::Mse,
            seed: None,
            device: None,
        }
    }
}

impl<Q, P, V> InacConfig<Q, P, V>
where
    Q: Serialize,
    P: OutDim + Serialize,
    V: Serialize,
{
    /// Configuration of actor.
    pub fn actor_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Configuration of behavior policy.
    pub fn behavior_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.behavior_config = v;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
        self
    }

    /// Configuration of state-value function.
    pub fn value_config(mut self, v: CriticConfig<V>) -> Self {
        self.value_config = v;
        self
    }

    /// Sets the temperature.
    pub fn temperature(mut self, v: f64) -> Self {
        self.temperature = v;
        self
    }

    /// Discount factor.
    pub fn discount_factor(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the range of actor loss weights.
    pub fn weight_range(mut self, eps: f64, exp_threshold: f64) -> Self {
        self.eps = eps;
        self.exp_threshold = exp_threshold;
        self
    }

    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Random seed.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Device.
    pub fn device(mut self, device: tch::Device) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Saves [`InacConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of InAC agent into {:?}", path_);
        Ok(())
    }
}

impl<Q, P, V> InacConfig<Q, P, V>
where
    Q: serde::de::DeserializeOwned,
    P: OutDim + serde::de::DeserializeOwned,
    V: serde::de::DeserializeOwned,
{
    /// Constructs [`InacConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of InAC agent from {:?}", path_);
        Ok(b)
    }
}
