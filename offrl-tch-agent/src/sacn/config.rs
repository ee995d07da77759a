//! Configuration of SAC-N agent.
use super::EntCoefMode;
use crate::{
    actor::GaussianActorConfig, critic::CriticConfig, util::CriticLoss, util::OutDim, Device,
};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Sacn`](super::Sacn).
///
/// `Q` and `P` are the configurations of the critic and the actor models.
/// Setting `eta` adds the diversity penalty to the critic loss (EDAC).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SacnConfig<Q, P>
where
    P: OutDim,
{
    pub actor_config: GaussianActorConfig<P>,
    pub critic_config: CriticConfig<Q>,
    pub gamma: f64,
    pub tau: f64,
    pub ent_coef_mode: EntCoefMode,
    pub eta: Option<f64>,
    pub do_reverse_update: bool,
    pub batch_size: usize,
    pub train: bool,
    pub critic_loss: CriticLoss,
    pub reward_scale: f32,
    pub seed: Option<i64>,
    pub device: Option<Device>,
}

impl<Q, P: OutDim> Default for SacnConfig<Q, P> {
    fn default() -> Self {
        Self {
            actor_config: Default::default(),
            critic_config: Default::default(),
            gamma: 0.99,
            tau: 0.005,
            ent_coef_mode: EntCoefMode::Fix(0.2),
            eta: None,
            do_reverse_update: false,
            batch_size: 256,
            train: false,
            critic_loss: CriticLoss::Mse,
            reward_scale: 1.0,
            seed: None,
            device: None,
        }
    }
}

impl<Q, P> SacnConfig<Q, P>
where
    Q: Serialize,
    P: OutDim + Serialize,
{
    /// Batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
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

    /// SAC-alpha.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Weight of the diversity penalty. `None` gives SAC-N.
    pub fn eta(mut self, v: Option<f64>) -> Self {
        self.eta = v;
        self
    }

    /// Updates the actor and the entropy coefficient before the critic.
    pub fn do_reverse_update(mut self, v: bool) -> Self {
        self.do_reverse_update = v;
        self
    }

    /// Reward scale.
    ///
    /// It works for obtaining target values, not the values in logs.
    pub fn reward_scale(mut self, v: f32) -> Self {
        self.reward_scale = v;
        self
    }

    /// Critic loss.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Configuration of actor.
    pub fn actor_config(mut self, actor_config: GaussianActorConfig<P>) -> Self {
        self.actor_config = actor_config;
        self
    }

    /// Configuration of critic.
    pub fn critic_config(mut self, critic_config: CriticConfig<Q>) -> Self {
        self.critic_config = critic_config;
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

    /// Saves [`SacnConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of SAC-N agent into {:?}", path_);
        Ok(())
    }
}

impl<Q, P> SacnConfig<Q, P>
where
    Q: serde::de::DeserializeOwned,
    P: OutDim + serde::de::DeserializeOwned,
{
    /// Constructs [`SacnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of SAC-N agent from {:?}", path_);
        Ok(b)
    }
}
