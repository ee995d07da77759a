use super::{GaussianActorConfig, Squashing};
use crate::{
    model::{ModelBase, SubModel},
    opt::Optimizer,
    util::OutDim,
};
use anyhow::{Context, Result};
use log::{info, trace};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tch::{nn, Device, Kind, Tensor};

/// Log density of a diagonal Gaussian, summed over the last axis.
pub fn normal_logp(x: &Tensor, mean: &Tensor, lstd: &Tensor) -> Tensor {
    let z = (x - mean) * (-lstd).exp();
    let logp: Tensor = -0.5 * z.square() - lstd - 0.5 * (2.0 * std::f64::consts::PI).ln();
    logp.sum_dim_intlist(Some([-1i64].as_slice()), false, Kind::Float)
}

/// Stochastic policy with a Gaussian distribution squashed into `[-1, 1]`.
///
/// Samples are reparameterized, so gradients flow from actions and log
/// probabilities to the parameters of the policy network.
pub struct GaussianActor<P>
where
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    device: Device,
    var_store: nn::VarStore,

    // Dimension of the action vector.
    out_dim: i64,

    // Outputs the mean and log std
    pi: P,

    opt: Optimizer,
    min_lstd: f64,
    max_lstd: f64,
    squashing: Squashing,
    epsilon: f64,
}

impl<P> GaussianActor<P>
where
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    /// Constructs [`GaussianActor`].
    pub fn build(config: GaussianActorConfig<P::Config>, device: Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let out_dim = pi_config.get_out_dim();
        let var_store = nn::VarStore::new(device);
        let pi = P::build(&var_store, pi_config);
        let opt = config.opt_config.build(&var_store)?;

        Ok(Self {
            device,
            var_store,
            out_dim,
            pi,
            opt,
            min_lstd: config.min_lstd,
            max_lstd: config.max_lstd,
            squashing: config.squashing,
            epsilon: config.epsilon,
        })
    }

    /// Returns the dimension of actions.
    pub fn out_dim(&self) -> i64 {
        self.out_dim
    }

    /// Outputs the mean and the log standard deviation given observations.
    ///
    /// The log standard deviation is clamped. With [`Squashing::Clip`] the mean
    /// is squashed by `tanh`.
    pub fn forward(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let (mean, lstd) = self.pi.forward(&obs.to(self.device));
        debug_assert_eq!(mean.size().last().copied(), Some(self.out_dim));
        let lstd = lstd.clamp(self.min_lstd, self.max_lstd);
        match self.squashing {
            Squashing::Tanh => (mean, lstd),
            Squashing::Clip => (mean.tanh(), lstd),
        }
    }

    /// Samples actions and returns them with their log probabilities.
    ///
    /// If `deterministic` is `true`, the mode of the distribution is returned
    /// instead of a sample.
    pub fn sample(&self, obs: &Tensor, deterministic: bool) -> (Tensor, Tensor) {
        let (mean, lstd) = self.forward(obs);
        let x = match deterministic {
            true => mean.shallow_clone(),
            false => &mean + lstd.exp() * mean.randn_like(),
        };

        match self.squashing {
            Squashing::Tanh => {
                let act = x.tanh();
                let logp = normal_logp(&x, &mean, &lstd) - self.log_det_jacobian(&act);
                (act, logp)
            }
            Squashing::Clip => {
                let act = x.clamp(-1.0, 1.0);
                let logp = normal_logp(&act, &mean, &lstd);
                (act, logp)
            }
        }
    }

    /// Returns the log probabilities of the given actions.
    pub fn log_prob(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let (mean, lstd) = self.forward(obs);
        let act = act.to(self.device);

        match self.squashing {
            Squashing::Tanh => {
                let bound = 1.0 - self.epsilon;
                let act = act.clamp(-bound, bound);
                let x = act.atanh();
                normal_logp(&x, &mean, &lstd) - self.log_det_jacobian(&act)
            }
            Squashing::Clip => normal_logp(&act, &mean, &lstd),
        }
    }

    fn log_det_jacobian(&self, act: &Tensor) -> Tensor {
        let t: Tensor = 1.0 - act.square() + self.epsilon;
        t.log().sum_dim_intlist(
            Some([-1i64].as_slice()),
            false,
            Kind::Float,
        )
    }
}

impl<P> ModelBase for GaussianActor<P>
where
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    fn backward_step(&mut self, loss: &Tensor) {
        self.opt.backward_step(loss);
    }

    fn get_var_store_mut(&mut self) -> &mut nn::VarStore {
        &mut self.var_store
    }

    fn get_var_store(&self) -> &nn::VarStore {
        &self.var_store
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.var_store.save(path)?;
        info!("Save actor to {:?}", path);
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.var_store.load(path)?;
        info!("Load actor from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mlp::{Mlp2, MlpConfig};
    use crate::opt::OptimizerConfig;
    use crate::util::to_scalar;
    use tch::kind::FLOAT_CPU;

    fn actor(squashing: Squashing) -> Result<GaussianActor<Mlp2>> {
        let config = GaussianActorConfig::default()
            .pi_config(MlpConfig::new(3, vec![16], 2, false))
            .opt_config(OptimizerConfig::Adam { lr: 1e-3 })
            .squashing(squashing);
        GaussianActor::build(config, Device::Cpu)
    }

    #[test]
    fn test_normal_logp() -> Result<()> {
        // Standard normal at zero in two dimensions
        let x = Tensor::zeros([1, 2], FLOAT_CPU);
        let logp = normal_logp(&x, &x, &x);
        let expected = -(2.0 * std::f32::consts::PI).ln();
        assert!((to_scalar(&logp.sum(Kind::Float))? - expected).abs() < 1e-5);

        // Scale with std = e
        let lstd = Tensor::ones([1, 2], FLOAT_CPU);
        let logp = normal_logp(&x, &x, &lstd);
        assert!((to_scalar(&logp.sum(Kind::Float))? - (expected - 2.0)).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_sample_tanh() -> Result<()> {
        tch::manual_seed(0);
        let actor = actor(Squashing::Tanh)?;
        let obs = Tensor::randn([64, 3], FLOAT_CPU);
        let (act, logp) = actor.sample(&obs, false);
        assert_eq!(act.size(), [64, 2]);
        assert_eq!(logp.size(), [64]);
        assert!(to_scalar(&act.abs().max())? <= 1.0);

        // The log probability of the sampled actions is recovered
        let logp_ = actor.log_prob(&obs, &act);
        let diff = to_scalar(&(logp - logp_).abs().max())?;
        assert!(diff < 1e-2, "{}", diff);
        Ok(())
    }

    #[test]
    fn test_sample_clip() -> Result<()> {
        tch::manual_seed(0);
        let actor = actor(Squashing::Clip)?;
        let obs = Tensor::randn([64, 3], FLOAT_CPU);
        let (act, logp) = actor.sample(&obs, false);
        assert!(to_scalar(&act.abs().max())? <= 1.0);
        let logp_ = actor.log_prob(&obs, &act);
        assert!(to_scalar(&(logp - logp_).abs().max())? < 1e-5);
        Ok(())
    }

    #[test]
    fn test_deterministic_sample() -> Result<()> {
        let actor = actor(Squashing::Tanh)?;
        let obs = Tensor::randn([8, 3], FLOAT_CPU);
        let (a1, _) = actor.sample(&obs, true);
        let (a2, _) = actor.sample(&obs, true);
        assert_eq!(to_scalar(&(a1 - a2).abs().sum(Kind::Float))?, 0.0);
        Ok(())
    }

    #[test]
    fn test_reparameterized_gradient() -> Result<()> {
        let actor = actor(Squashing::Tanh)?;
        let obs = Tensor::randn([8, 3], FLOAT_CPU);
        let (act, logp) = actor.sample(&obs, false);
        (act.sum(Kind::Float) + logp.sum(Kind::Float)).backward();
        let n_grads = actor
            .get_var_store()
            .trainable_variables()
            .iter()
            .filter(|v| v.grad().defined())
            .count();
        assert!(n_grads > 0);
        Ok(())
    }
}
