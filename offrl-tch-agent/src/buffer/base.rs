use super::TransitionBufferConfig;
use crate::{
    error::AgentError,
    util::{array1_to_tensor, array2_to_tensor},
    TensorBatch,
};
use anyhow::Result;
use log::info;
use ndarray::{Array1, Array2, Axis};
use offrl_core::ReplayBufferBase;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tch::Tensor;

/// An offline dataset held in memory.
///
/// Transitions are stored row-wise. `episode_end` marks the last transition
/// of each episode, including episodes ending with a terminal state.
pub struct Dataset {
    /// Observations `[n, obs_dim]`.
    pub obs: Array2<f32>,

    /// Actions `[n, act_dim]`.
    pub act: Array2<f32>,

    /// Next observations `[n, obs_dim]`.
    pub next_obs: Array2<f32>,

    /// Rewards.
    pub reward: Array1<f32>,

    /// Flags of terminal states.
    pub terminal: Array1<bool>,

    /// Flags of the ends of episodes.
    pub episode_end: Option<Array1<bool>>,
}

impl Dataset {
    fn len(&self) -> usize {
        self.reward.len()
    }

    fn check(&self) -> Result<()> {
        let n = self.len();
        if n == 0 {
            return Err(AgentError::EmptyDataset.into());
        }
        let sizes = [
            ("obs", self.obs.nrows()),
            ("act", self.act.nrows()),
            ("next_obs", self.next_obs.nrows()),
            ("terminal", self.terminal.len()),
            ("episode_end", self.episode_end.as_ref().map_or(n, |e| e.len())),
        ];
        for (name, size) in sizes.iter() {
            if *size != n {
                return Err(AgentError::BatchShape(format!(
                    "{} has {} rows, but reward has {}",
                    name, size, n
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Returns the indices of transitions kept in the buffer.
    fn kept_indices(&self, discard_last: bool) -> Vec<usize> {
        match (&self.episode_end, discard_last) {
            (Some(end), true) => (0..self.len())
                .filter(|&i| !end[i] || self.terminal[i])
                .collect(),
            _ => (0..self.len()).collect(),
        }
    }

    /// Returns the returns of complete episodes.
    fn episode_returns(&self) -> Option<Vec<f32>> {
        let end = self.episode_end.as_ref()?;
        let mut returns = vec![];
        let mut ret = 0f32;
        for i in 0..self.len() {
            ret += self.reward[i];
            if end[i] || self.terminal[i] {
                returns.push(ret);
                ret = 0.0;
            }
        }
        Some(returns)
    }

    fn reward_scale(&self) -> f32 {
        if let Some(returns) = self.episode_returns() {
            let max = returns.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let min = returns.iter().copied().fold(f32::INFINITY, f32::min);
            if max > min {
                return 1000.0 / (max - min);
            }
        }
        let std = self.reward.std(0.0);
        match std > 0.0 {
            true => 1.0 / std,
            false => 1.0,
        }
    }
}

/// A buffer holding an offline dataset.
///
/// Batches are sampled uniformly with replacement.
pub struct TransitionBuffer {
    obs: Tensor,
    act: Tensor,
    next_obs: Tensor,
    reward: Vec<f32>,
    is_terminal: Vec<i8>,
    obs_stats: Option<(Array1<f32>, Array1<f32>)>,
    reward_scale: f32,
    rng: StdRng,
}

impl TransitionBuffer {
    /// Constructs a buffer from a dataset.
    pub fn build(config: TransitionBufferConfig, dataset: Dataset) -> Result<Self> {
        dataset.check()?;

        let reward_scale = match config.normalize_reward {
            true => dataset.reward_scale(),
            false => 1.0,
        };

        let obs_stats = match config.normalize_obs {
            true => {
                let mean = dataset
                    .obs
                    .mean_axis(Axis(0))
                    .ok_or(AgentError::EmptyDataset)?;
                let std = dataset.obs.std_axis(Axis(0), 0.0).mapv(|v| v.max(1e-3));
                Some((mean, std))
            }
            false => None,
        };

        let ixs = dataset.kept_indices(config.discard_last);
        if ixs.is_empty() {
            return Err(AgentError::EmptyDataset.into());
        }
        let select = |a: &Array2<f32>| a.select(Axis(0), &ixs);
        let (mut obs, act, mut next_obs) = (
            select(&dataset.obs),
            select(&dataset.act),
            select(&dataset.next_obs),
        );
        if let Some((mean, std)) = &obs_stats {
            obs = (&obs - mean) / std;
            next_obs = (&next_obs - mean) / std;
        }
        let reward = ixs
            .iter()
            .map(|&i| dataset.reward[i] * reward_scale)
            .collect::<Vec<_>>();
        let is_terminal = ixs
            .iter()
            .map(|&i| dataset.terminal[i] as i8)
            .collect::<Vec<_>>();

        info!(
            "Construct transition buffer with {} transitions (reward scale = {})",
            reward.len(),
            reward_scale
        );

        Ok(Self {
            obs: array2_to_tensor(&obs),
            act: array2_to_tensor(&act),
            next_obs: array2_to_tensor(&next_obs),
            reward,
            is_terminal,
            obs_stats,
            reward_scale,
            rng: StdRng::seed_from_u64(config.seed),
        })
    }

    /// Returns the mean and the standard deviation of observations used for
    /// normalization.
    pub fn obs_stats(&self) -> Option<&(Array1<f32>, Array1<f32>)> {
        self.obs_stats.as_ref()
    }

    /// Normalizes observations `[batch_size, obs_dim]` as the buffer does.
    ///
    /// This is used to feed observations from an environment to a trained agent.
    pub fn normalize_obs(&self, obs: &Tensor) -> Tensor {
        match &self.obs_stats {
            Some((mean, std)) => {
                let device = obs.device();
                (obs - array1_to_tensor(mean).to(device)) / array1_to_tensor(std).to(device)
            }
            None => obs.shallow_clone(),
        }
    }

    /// Returns the factor multiplied to rewards in the dataset.
    pub fn reward_scale(&self) -> f32 {
        self.reward_scale
    }
}

impl ReplayBufferBase for TransitionBuffer {
    type Config = TransitionBufferConfig;
    type Batch = TensorBatch;

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn batch(&mut self, size: usize) -> Result<TensorBatch> {
        let n = self.len();
        let ixs = (0..size)
            .map(|_| self.rng.gen_range(0..n))
            .collect::<Vec<_>>();
        let index = Tensor::from_slice(&ixs.iter().map(|&i| i as i64).collect::<Vec<_>>());

        TensorBatch::new(
            self.obs.index_select(0, &index),
            self.act.index_select(0, &index),
            self.next_obs.index_select(0, &index),
            ixs.iter().map(|&i| self.reward[i]).collect(),
            ixs.iter().map(|&i| self.is_terminal[i]).collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use offrl_core::TransitionBatch;

    // Two episodes: [0, 1, 2] ends with a terminal state, [3, 4] is truncated.
    fn dataset() -> Dataset {
        Dataset {
            obs: arr2(&[[0.0, 1.0], [1.0, 1.0], [2.0, 1.0], [3.0, 1.0], [4.0, 1.0]]),
            act: arr2(&[[0.1], [0.2], [0.3], [0.4], [0.5]]),
            next_obs: arr2(&[[1.0, 1.0], [2.0, 1.0], [3.0, 1.0], [4.0, 1.0], [5.0, 1.0]]),
            reward: arr1(&[1.0, 1.0, 1.0, 2.0, 2.0]),
            terminal: arr1(&[false, false, true, false, false]),
            episode_end: Some(arr1(&[false, false, true, false, true])),
        }
    }

    #[test]
    fn test_batch() -> Result<()> {
        let mut buffer = TransitionBuffer::build(TransitionBufferConfig::default(), dataset())?;
        assert_eq!(buffer.len(), 5);

        let batch = buffer.batch(16)?;
        assert_eq!(batch.len(), 16);
        assert_eq!(batch.obs().size(), [16, 2]);
        assert_eq!(batch.act().size(), [16, 1]);

        // next_obs[:, 0] = obs[:, 0] + 1 for every sampled transition
        let (obs, _, next_obs, reward, _) = batch.unpack();
        let diff = Vec::<f32>::try_from(&(next_obs - obs).select(1, 0))?;
        assert!(diff.iter().all(|&d| (d - 1.0).abs() < 1e-6));
        assert!(reward.iter().all(|&r| r == 1.0 || r == 2.0));
        Ok(())
    }

    #[test]
    fn test_sampling_is_reproducible() -> Result<()> {
        let config = TransitionBufferConfig::default().seed(7);
        let mut b1 = TransitionBuffer::build(config.clone(), dataset())?;
        let mut b2 = TransitionBuffer::build(config, dataset())?;
        let a1 = Vec::<f32>::try_from(&b1.batch(32)?.act().flatten(0, -1))?;
        let a2 = Vec::<f32>::try_from(&b2.batch(32)?.act().flatten(0, -1))?;
        assert_eq!(a1, a2);
        Ok(())
    }

    #[test]
    fn test_reward_normalization_with_episodes() -> Result<()> {
        // Episode returns are 3 and 4
        let config = TransitionBufferConfig::default().normalize_reward(true);
        let buffer = TransitionBuffer::build(config, dataset())?;
        assert!((buffer.reward_scale() - 1000.0).abs() < 1e-3);
        Ok(())
    }

    #[test]
    fn test_reward_normalization_without_episodes() -> Result<()> {
        let mut d = dataset();
        d.episode_end = None;
        let config = TransitionBufferConfig::default().normalize_reward(true);
        let buffer = TransitionBuffer::build(config, d)?;
        // std of [1, 1, 1, 2, 2] is sqrt(0.24)
        assert!((buffer.reward_scale() - 1.0 / 0.24f32.sqrt()).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_obs_normalization() -> Result<()> {
        let config = TransitionBufferConfig::default().normalize_obs(true);
        let buffer = TransitionBuffer::build(config, dataset())?;
        let (mean, std) = buffer.obs_stats().ok_or(AgentError::EmptyDataset)?;
        assert_eq!(mean, &arr1(&[2.0, 1.0]));
        assert!((std[0] - 2f32.sqrt()).abs() < 1e-6);
        // Constant dimension is floored
        assert_eq!(std[1], 1e-3);

        let obs = Tensor::from_slice(&[2f32, 1.0]).reshape([1, 2]);
        let normalized = Vec::<f32>::try_from(&buffer.normalize_obs(&obs).flatten(0, -1))?;
        assert_eq!(normalized, vec![0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn test_discard_last() -> Result<()> {
        let config = TransitionBufferConfig::default().discard_last(true);
        let buffer = TransitionBuffer::build(config, dataset())?;
        // The last transition of the truncated episode is dropped
        assert_eq!(buffer.len(), 4);
        Ok(())
    }

    #[test]
    fn test_inconsistent_dataset() {
        let mut d = dataset();
        d.reward = arr1(&[1.0, 1.0]);
        assert!(TransitionBuffer::build(TransitionBufferConfig::default(), d).is_err());
    }
}
