//! Optimizers.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tch::{
    nn::{Adam, AdamW, Optimizer as Optimizer_, OptimizerConfig as OptimizerConfig_, VarStore},
    Tensor,
};

/// Configures an optimizer for training neural networks in an RL agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },

    /// AdamW optimizer.
    AdamW {
        /// Learning rate.
        lr: f64,
        /// Coefficient of the running average of gradients.
        beta1: f64,
        /// Coefficient of the running average of squared gradients.
        beta2: f64,
        /// Weight decay.
        wd: f64,
        /// Term added to the denominator.
        eps: f64,
        /// Use the AMSGrad variant.
        amsgrad: bool,
    },
}

impl OptimizerConfig {
    /// Constructs an optimizer.
    pub fn build(&self, vs: &VarStore) -> Result<Optimizer> {
        match &self {
            OptimizerConfig::Adam { lr } => {
                let opt = Adam::default().build(vs, *lr)?;
                Ok(Optimizer::Adam(opt))
            }
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                wd,
                eps,
                amsgrad,
            } => {
                let opt = AdamW {
                    beta1: *beta1,
                    beta2: *beta2,
                    wd: *wd,
                    eps: *eps,
                    amsgrad: *amsgrad,
                }
                .build(vs, *lr)?;
                Ok(Optimizer::AdamW(opt))
            }
        }
    }

    /// Returns the learning rate.
    pub fn learning_rate(&self) -> f64 {
        match self {
            Self::Adam { lr } => *lr,
            Self::AdamW { lr, .. } => *lr,
        }
    }
}

/// Optimizers.
///
/// This is a thin wrapper of [tch::nn::Optimizer].
///
/// [tch::nn::Optimizer]: https://docs.rs/tch/0.16.0/tch/nn/struct.Optimizer.html
pub enum Optimizer {
    /// Adam optimizer.
    Adam(Optimizer_),

    /// AdamW optimizer.
    AdamW(Optimizer_),
}

impl Optimizer {
    fn inner(&mut self) -> &mut Optimizer_ {
        match self {
            Self::Adam(opt) => opt,
            Self::AdamW(opt) => opt,
        }
    }

    /// Zeroes the gradients, computes new ones from `loss` and updates the
    /// parameters.
    pub fn backward_step(&mut self, loss: &Tensor) {
        self.inner().backward_step(loss);
    }

    /// Zeroes the gradients of the parameters.
    pub fn zero_grad(&mut self) {
        self.inner().zero_grad();
    }

    /// Updates the parameters with the current gradients.
    pub fn step(&mut self) {
        self.inner().step();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{nn, Device, Kind};

    #[test]
    fn test_backward_step_decreases_loss() -> Result<()> {
        let vs = nn::VarStore::new(Device::Cpu);
        let x = vs.root().var("x", &[1], nn::Init::Const(3.0));
        let mut opt = OptimizerConfig::Adam { lr: 0.1 }.build(&vs)?;
        let loss0 = f32::try_from(&x.square().sum(Kind::Float))?;
        for _ in 0..10 {
            let loss = x.square().sum(Kind::Float);
            opt.backward_step(&loss);
        }
        let loss1 = f32::try_from(&x.square().sum(Kind::Float))?;
        assert!(loss1 < loss0);
        Ok(())
    }

    #[test]
    fn test_serde_optimizer_config() -> Result<()> {
        let config = OptimizerConfig::AdamW {
            lr: 3e-4,
            beta1: 0.9,
            beta2: 0.999,
            wd: 0.01,
            eps: 1e-8,
            amsgrad: false,
        };
        let s = serde_yaml::to_string(&config)?;
        let config_: OptimizerConfig = serde_yaml::from_str(&s)?;
        assert_eq!(config, config_);
        assert_eq!(config_.learning_rate(), 3e-4);
        Ok(())
    }
}
