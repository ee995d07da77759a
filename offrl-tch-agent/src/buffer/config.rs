use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`TransitionBuffer`](super::TransitionBuffer).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TransitionBufferConfig {
    /// Seed of the random number generator used for sampling.
    pub seed: u64,

    /// Normalizes observations with the mean and standard deviation of the dataset.
    pub normalize_obs: bool,

    /// Scales rewards with the range of episode returns, or the standard
    /// deviation of rewards when episode boundaries are not given.
    pub normalize_reward: bool,

    /// Drops the last transition of episodes which end without a terminal state.
    pub discard_last: bool,
}

impl Default for TransitionBufferConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            normalize_obs: false,
            normalize_reward: false,
            discard_last: false,
        }
    }
}

impl TransitionBufferConfig {
    /// Sets the random seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets if observations are normalized.
    pub fn normalize_obs(mut self, v: bool) -> Self {
        self.normalize_obs = v;
        self
    }

    /// Sets if rewards are normalized.
    pub fn normalize_reward(mut self, v: bool) -> Self {
        self.normalize_reward = v;
        self
    }

    /// Sets if the last transitions of truncated episodes are dropped.
    pub fn discard_last(mut self, v: bool) -> Self {
        self.discard_last = v;
        self
    }

    /// Loads [`TransitionBufferConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TransitionBufferConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
