//! Synthetic offline dataset shared by the integration tests.
#![allow(dead_code)]
use anyhow::Result;
use ndarray::{Array1, Array2};
use offrl_core::ReplayBufferBase;
use offrl_tch_agent::{
    buffer::{Dataset, TransitionBuffer, TransitionBufferConfig},
    util::{unpack_batch, BatchTensors},
};
use tch::Device;

pub const OBS_DIM: i64 = 3;
pub const ACT_DIM: i64 = 2;
pub const N_TRANSITIONS: usize = 64;
pub const EPISODE_LEN: usize = 16;

/// Transitions of a point moving toward the origin. Actions are in `[-1, 1]`.
pub fn dataset() -> Dataset {
    let n = N_TRANSITIONS;
    let obs = Array2::from_shape_fn((n, OBS_DIM as usize), |(i, j)| {
        ((i * 7 + j * 3) as f32 * 0.1).sin()
    });
    let act = Array2::from_shape_fn((n, ACT_DIM as usize), |(i, j)| {
        ((i * 5 + j) as f32 * 0.3).cos() * 0.9
    });
    let next_obs = Array2::from_shape_fn((n, OBS_DIM as usize), |(i, j)| 0.9 * obs[[i, j]]);
    let reward = Array1::from_shape_fn(n, |i| -obs.row(i).mapv(f32::abs).sum());
    let episode_end = Array1::from_shape_fn(n, |i| (i + 1) % EPISODE_LEN == 0);
    let terminal = Array1::from_shape_fn(n, |i| i + 1 == n);

    Dataset {
        obs,
        act,
        next_obs,
        reward,
        terminal,
        episode_end: Some(episode_end),
    }
}

pub fn buffer() -> Result<TransitionBuffer> {
    TransitionBuffer::build(TransitionBufferConfig::default().seed(7), dataset())
}

pub fn batch(buffer: &mut TransitionBuffer, size: usize) -> Result<BatchTensors> {
    Ok(unpack_batch(buffer.batch(size)?, Device::Cpu))
}

/// Deep copy of a batch so that two agents can be updated with the same data.
pub fn copy_batch(batch: &BatchTensors) -> BatchTensors {
    BatchTensors {
        obs: batch.obs.copy(),
        act: batch.act.copy(),
        next_obs: batch.next_obs.copy(),
        reward: batch.reward.copy(),
        is_terminal: batch.is_terminal.copy(),
    }
}
