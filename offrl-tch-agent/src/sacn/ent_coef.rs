//! Entropy coefficient of SAC.
use anyhow::Result;
use log::{info, trace};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};

/// Mode of the entropy coefficient of SAC.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum EntCoefMode {
    /// Use a constant as alpha.
    Fix(f64),
    /// Automatic tuning given `(target_entropy, learning_rate)`.
    Auto(f64, f64),
}

impl EntCoefMode {
    /// Automatic tuning with the target entropy `-act_dim`.
    pub fn auto_for_action_dim(act_dim: i64, learning_rate: f64) -> Self {
        Self::Auto(-(act_dim as f64), learning_rate)
    }
}

/// The entropy coefficient of SAC.
pub struct EntCoef {
    var_store: nn::VarStore,
    log_alpha: Tensor,
    target_entropy: Option<f64>,
    opt: Option<nn::Optimizer>,
}

impl EntCoef {
    /// Constructs an instance of `EntCoef`.
    pub fn new(mode: EntCoefMode, device: tch::Device) -> Result<Self> {
        let var_store = nn::VarStore::new(device);
        let path = &var_store.root();
        let (log_alpha, target_entropy, opt) = match mode {
            EntCoefMode::Fix(alpha) => {
                let init = nn::Init::Const(alpha.ln());
                let log_alpha = path.var("log_alpha", &[1], init);
                (log_alpha, None, None)
            }
            EntCoefMode::Auto(target_entropy, learning_rate) => {
                let init = nn::Init::Const(0.0);
                let log_alpha = path.var("log_alpha", &[1], init);
                let opt = nn::Adam::default().build(&var_store, learning_rate)?;
                (log_alpha, Some(target_entropy), Some(opt))
            }
        };

        Ok(Self {
            var_store,
            log_alpha,
            opt,
            target_entropy,
        })
    }

    /// Returns the entropy coefficient.
    pub fn alpha(&self) -> Tensor {
        self.log_alpha.detach().exp()
    }

    /// Updates the parameter given log probabilities of actions sampled from the policy.
    ///
    /// Returns the loss if the coefficient is tuned automatically.
    pub fn update(&mut self, logp: &Tensor) -> Option<Tensor> {
        let target_entropy = self.target_entropy?;
        let loss = -(&self.log_alpha * (logp + target_entropy).detach()).mean(Kind::Float);
        if let Some(opt) = &mut self.opt {
            opt.backward_step(&loss);
        }
        Some(loss)
    }

    /// Save the parameter into a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        self.var_store.save(path)?;
        info!("Save entropy coefficient to {:?}", path);
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    /// Load the parameter from a file.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.var_store.load(path)?;
        info!("Load entropy coefficient from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::to_scalar;
    use tch::{kind::FLOAT_CPU, Device};

    #[test]
    fn test_fixed_alpha() -> Result<()> {
        let mut ent_coef = EntCoef::new(EntCoefMode::Fix(0.2), Device::Cpu)?;
        assert!((to_scalar(&ent_coef.alpha().sum(Kind::Float))? - 0.2).abs() < 1e-6);
        assert!(ent_coef.update(&Tensor::zeros([4], FLOAT_CPU)).is_none());
        Ok(())
    }

    #[test]
    fn test_auto_alpha_decreases_with_high_entropy() -> Result<()> {
        let mode = EntCoefMode::auto_for_action_dim(2, 0.1);
        assert_eq!(mode, EntCoefMode::Auto(-2.0, 0.1));
        let mut ent_coef = EntCoef::new(mode, Device::Cpu)?;

        // log_pi + target_entropy < 0 means the entropy is higher than the target
        let logp = Tensor::full([4], -5.0, FLOAT_CPU);
        for _ in 0..5 {
            ent_coef.update(&logp);
        }
        assert!(to_scalar(&ent_coef.alpha().sum(Kind::Float))? < 1.0);
        Ok(())
    }
}
