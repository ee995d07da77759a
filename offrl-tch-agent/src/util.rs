//! Utilities.
use crate::error::AgentError;
use anyhow::Result;
use log::trace;
use ndarray::{Array1, Array2};
use num_traits::cast::AsPrimitive;
use offrl_core::TransitionBatch;
use serde::{Deserialize, Serialize};
use tch::{nn::VarStore, Device, Kind, Reduction, Tensor};

/// Critic loss type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

impl CriticLoss {
    /// Loss of an ensemble of predictions `[E, B]` given targets `[B]`.
    ///
    /// The elementwise loss is summed over the ensemble and averaged over the batch.
    pub fn ensemble_loss(&self, preds: &Tensor, tgt: &Tensor) -> Tensor {
        let tgt = tgt.unsqueeze(0).expand_as(preds);
        let loss = match self {
            Self::Mse => (preds - tgt).square(),
            Self::SmoothL1 => preds.smooth_l1_loss(&tgt, Reduction::None, 1.0),
        };
        loss.sum_dim_intlist(Some([0i64].as_slice()), false, Kind::Float)
            .mean(Kind::Float)
    }
}

/// Apply soft update on variables.
///
/// Variables are identified by their names.
///
/// dest = tau * src + (1.0 - tau) * dest
pub fn track(dest: &VarStore, src: &VarStore, tau: f64) -> Result<()> {
    let src = src.variables();
    let mut dest = dest.variables();
    debug_assert_eq!(src.len(), dest.len());

    tch::no_grad(|| -> Result<()> {
        for (name, src) in src.iter() {
            let dest = dest
                .get_mut(name)
                .ok_or_else(|| AgentError::VariableNotFound(name.clone()))?;
            dest.copy_(&(tau * src + (1.0 - tau) * &*dest));
        }
        Ok(())
    })?;
    trace!("soft update");
    Ok(())
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the  output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Configurations of models consisting of an ensemble of networks.
pub trait EnsembleSize {
    /// Returns the number of members in the ensemble.
    fn ensemble_size(&self) -> i64;
}

/// Tensors of a batch of transitions.
pub struct BatchTensors {
    /// Observations `[batch_size, obs_dim]`.
    pub obs: Tensor,
    /// Actions `[batch_size, act_dim]`.
    pub act: Tensor,
    /// Next observations `[batch_size, obs_dim]`.
    pub next_obs: Tensor,
    /// Rewards `[batch_size]`.
    pub reward: Tensor,
    /// `1.0` for terminal transitions, otherwise `0.0` `[batch_size]`.
    pub is_terminal: Tensor,
}

impl BatchTensors {
    /// Checks that observations and actions are `[batch_size, dim]` and
    /// rewards and terminal flags are `[batch_size]`.
    pub fn check(&self) -> Result<()> {
        let n = self.reward.size();
        let batch_size = match n.as_slice() {
            [b] => *b,
            _ => {
                return Err(AgentError::BatchShape(format!("reward has shape {:?}", n)).into());
            }
        };
        let shapes = [
            ("obs", self.obs.size(), 2),
            ("act", self.act.size(), 2),
            ("next_obs", self.next_obs.size(), 2),
            ("is_terminal", self.is_terminal.size(), 1),
        ];
        for (name, shape, dim) in shapes.iter() {
            if shape.len() != *dim || shape[0] != batch_size {
                return Err(AgentError::BatchShape(format!(
                    "{} has shape {:?}, but the batch size is {}",
                    name, shape, batch_size
                ))
                .into());
            }
        }
        Ok(())
    }
}

/// Unpacks a batch into tensors on `device`.
pub fn unpack_batch<B>(batch: B, device: Device) -> BatchTensors
where
    B: TransitionBatch,
    B::ObsBatch: Into<Tensor>,
    B::ActBatch: Into<Tensor>,
{
    let (obs, act, next_obs, reward, is_terminal) = batch.unpack();
    BatchTensors {
        obs: obs.into().to(device),
        act: act.into().to(device),
        next_obs: next_obs.into().to(device),
        reward: vec_to_tensor::<_, f32>(&reward).to(device),
        is_terminal: vec_to_tensor::<_, f32>(&is_terminal).to(device),
    }
}

/// Converts a scalar tensor to `f32` for records.
pub fn to_scalar(t: &Tensor) -> Result<f32> {
    Ok(f32::try_from(t.detach())?)
}

/// Converts a slice to a 1-dimensional [`Tensor`] of element type `T2`.
pub fn vec_to_tensor<T1, T2>(v: &[T1]) -> Tensor
where
    T1: AsPrimitive<T2>,
    T2: Copy + 'static + tch::kind::Element,
{
    let v = v.iter().map(|e| e.as_()).collect::<Vec<T2>>();
    Tensor::from_slice(&v)
}

/// Converts [`ndarray::Array2`] to a 2-dimensional [`Tensor`].
pub fn array2_to_tensor(a: &Array2<f32>) -> Tensor {
    let (n, d) = a.dim();
    let v = a.iter().copied().collect::<Vec<_>>();
    Tensor::from_slice(&v).reshape([n as i64, d as i64])
}

/// Converts [`ndarray::Array1`] to a 1-dimensional [`Tensor`].
pub fn array1_to_tensor(a: &Array1<f32>) -> Tensor {
    vec_to_tensor::<_, f32>(&a.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn, Device};

    fn var_store_with(v: f64) -> (VarStore, Tensor) {
        let vs = VarStore::new(Device::Cpu);
        let x = vs.root().var("x", &[3], nn::Init::Const(v));
        (vs, x)
    }

    #[test]
    fn test_track() -> Result<()> {
        let (src, _) = var_store_with(1.0);
        let (dest, x) = var_store_with(3.0);
        track(&dest, &src, 0.25)?;
        let v = Vec::<f32>::try_from(&x.detach())?;
        for e in v {
            assert!((e - (0.25 * 1.0 + 0.75 * 3.0)).abs() < 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_track_with_tau_one_copies() -> Result<()> {
        let (src, y) = var_store_with(-2.5);
        let (dest, x) = var_store_with(7.0);
        track(&dest, &src, 1.0)?;
        assert_eq!(
            Vec::<f32>::try_from(&x.detach())?,
            Vec::<f32>::try_from(&y.detach())?
        );
        Ok(())
    }

    #[test]
    fn test_track_missing_variable() {
        let (src, _) = var_store_with(1.0);
        let dest = VarStore::new(Device::Cpu);
        let _ = dest.root().var("y", &[3], nn::Init::Const(0.0));
        assert!(track(&dest, &src, 0.5).is_err());
    }

    #[test]
    fn test_ensemble_loss() -> Result<()> {
        // Two members, batch of two
        let preds = Tensor::from_slice(&[1f32, 2.0, 3.0, 4.0]).reshape([2, 2]);
        let tgt = Tensor::from_slice(&[1f32, 1.0]);
        let loss = CriticLoss::Mse.ensemble_loss(&preds, &tgt);
        // ((0 + 4) + (1 + 9)) / 2
        assert!((to_scalar(&loss)? - 7.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_terminal_flags_to_float() -> Result<()> {
        let t = vec_to_tensor::<i8, f32>(&[0, 1, 1]);
        assert_eq!(t.kind(), Kind::Float);
        assert_eq!(Vec::<f32>::try_from(&t)?, vec![0.0, 1.0, 1.0]);
        Ok(())
    }

    fn batch_tensors(reward_size: i64) -> BatchTensors {
        BatchTensors {
            obs: Tensor::zeros([4, 3], tch::kind::FLOAT_CPU),
            act: Tensor::zeros([4, 2], tch::kind::FLOAT_CPU),
            next_obs: Tensor::zeros([4, 3], tch::kind::FLOAT_CPU),
            reward: Tensor::zeros([reward_size], tch::kind::FLOAT_CPU),
            is_terminal: Tensor::zeros([4], tch::kind::FLOAT_CPU),
        }
    }

    #[test]
    fn test_batch_tensors_check() {
        assert!(batch_tensors(4).check().is_ok());

        // A reward of a single element would broadcast in the Bellman target
        let err = batch_tensors(1).check().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::BatchShape(_))
        ));

        let mut batch = batch_tensors(4);
        batch.is_terminal = Tensor::zeros([4, 1], tch::kind::FLOAT_CPU);
        assert!(batch.check().is_err());
    }
}
