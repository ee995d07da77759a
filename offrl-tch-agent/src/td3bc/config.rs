//! Configuration of TD3+BC agent.
use crate::{
    actor::DeterministicActorConfig, critic::CriticConfig, util::CriticLoss, Device,
};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Td3bc`](super::Td3bc).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Td3bcConfig<Q, P> {
    pub actor_config: DeterministicActorConfig<P>,
    pub critic_config: CriticConfig<Q>,
    pub gamma: f64,
    pub tau: f64,

    /// Trade-off between the Q value and behavior cloning.
    pub alpha: f64,

    /// The actor is updated once in this number of critic updates.
    pub actor_update_interval: usize,

    /// Standard deviation of the noise added to target actions.
    pub policy_noise: f64,

    /// Range of the noise added to target actions.
    pub noise_clip: f64,

    pub max_action: f64,
    pub batch_size: usize,
    pub train: bool,
    pub critic_loss: CriticLoss,
    pub seed: Option<i64>,
    pub device: Option<Device>,
}

impl<Q, P> Default for Td3bcConfig<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            tau: 0.005,
            alpha: 2.5,
            actor_update_interval: 2,
            policy_noise: 0.2,
            noise_clip: 0.5,
            max_action: 1.0,
            batch_size: 256,
            train: false,
            critic_loss: CriticLoss::Mse,
            seed: None,
            device: None,
        }
    }
}

impl<Q, P> Td3bcConfig<Q, P>
where
    Q: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize,
{
    /// Configuration of actor.
    pub fn actor_config(mut self, v: DeterministicActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
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

    /// Sets the weight of the Q value relative to behavior cloning.
    pub fn alpha(mut self, v: f64) -> Self {
        self.alpha = v;
        self
    }

    /// Sets the interval of actor updates.
    pub fn actor_update_interval(mut self, v: usize) -> Self {
        self.actor_update_interval = v;
        self
    }

    /// Sets the standard deviation of target policy noise.
    pub fn policy_noise(mut self, v: f64) -> Self {
        self.policy_noise = v;
        self
    }

    /// Sets the clip range of target policy noise.
    pub fn noise_clip(mut self, v: f64) -> Self {
        self.noise_clip = v;
        self
    }

    /// Sets the scale of actions.
    pub fn max_action(mut self, v: f64) -> Self {
        self.max_action = v;
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

    /// Constructs [`Td3bcConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of TD3+BC agent from {:?}", path_);
        Ok(b)
    }

    /// Saves [`Td3bcConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of TD3+BC agent into {:?}", path_);
        Ok(())
    }
}
