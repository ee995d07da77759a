use crate::error::AgentError;
use anyhow::Result;
use offrl_core::TransitionBatch;
use tch::Tensor;

/// A batch of transitions stored as tensors.
///
/// Observations and actions are `[batch_size, dim]`; rewards and terminal
/// flags are vectors of length `batch_size`.
pub struct TensorBatch {
    obs: Tensor,
    act: Tensor,
    next_obs: Tensor,
    reward: Vec<f32>,
    is_terminal: Vec<i8>,
}

impl TensorBatch {
    /// Constructs a batch, checking that all elements share the batch size.
    pub fn new(
        obs: Tensor,
        act: Tensor,
        next_obs: Tensor,
        reward: Vec<f32>,
        is_terminal: Vec<i8>,
    ) -> Result<Self> {
        let n = reward.len() as i64;
        let sizes = [
            ("obs", obs.size().first().copied()),
            ("act", act.size().first().copied()),
            ("next_obs", next_obs.size().first().copied()),
            ("is_terminal", Some(is_terminal.len() as i64)),
        ];
        for (name, size) in sizes.iter() {
            if *size != Some(n) {
                return Err(AgentError::BatchShape(format!(
                    "{} has leading dimension {:?}, but reward has {}",
                    name, size, n
                ))
                .into());
            }
        }

        Ok(Self {
            obs,
            act,
            next_obs,
            reward,
            is_terminal,
        })
    }
}

impl TransitionBatch for TensorBatch {
    type ObsBatch = Tensor;
    type ActBatch = Tensor;

    fn unpack(self) -> (Tensor, Tensor, Tensor, Vec<f32>, Vec<i8>) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminal,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Tensor {
        &self.obs
    }

    fn act(&self) -> &Tensor {
        &self.act
    }

    fn next_obs(&self) -> &Tensor {
        &self.next_obs
    }

    fn reward(&self) -> &Vec<f32> {
        &self.reward
    }

    fn is_terminal(&self) -> &Vec<i8> {
        &self.is_terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::kind::FLOAT_CPU;

    #[test]
    fn test_batch_shape() {
        let batch = TensorBatch::new(
            Tensor::zeros([4, 3], FLOAT_CPU),
            Tensor::zeros([4, 2], FLOAT_CPU),
            Tensor::zeros([4, 3], FLOAT_CPU),
            vec![0.0; 4],
            vec![0; 4],
        );
        assert_eq!(batch.map(|b| b.len()).ok(), Some(4));

        let batch = TensorBatch::new(
            Tensor::zeros([4, 3], FLOAT_CPU),
            Tensor::zeros([5, 2], FLOAT_CPU),
            Tensor::zeros([4, 3], FLOAT_CPU),
            vec![0.0; 4],
            vec![0; 4],
        );
        let err = batch.err().map(|e| e.downcast::<AgentError>().is_ok());
        assert_eq!(err, Some(true));
    }
}
