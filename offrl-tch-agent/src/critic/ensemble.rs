use super::CriticConfig;
use crate::{
    model::{ModelBase, SubModel2},
    opt::Optimizer,
    util::{track, EnsembleSize},
};
use anyhow::{Context, Result};
use log::{info, trace};
use std::path::Path;
use tch::{nn, Device, Tensor};

/// An ensemble of action-value functions with a target network.
///
/// The model `Q` evaluates all members at once and returns
/// `[ensemble_size, batch_size, 1]`. It accepts observations and actions
/// either as `[batch_size, dim]` or as `[ensemble_size, batch_size, dim]`.
///
/// The target network is updated only with [`EnsembleCritic::soft_update`]
/// and is never given to the optimizer.
pub struct EnsembleCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
{
    device: Device,
    var_store: nn::VarStore,
    var_store_tgt: nn::VarStore,
    ensemble_size: i64,
    q: Q,
    q_tgt: Q,
    opt: Optimizer,
}

impl<Q> EnsembleCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: EnsembleSize,
{
    /// Constructs [`EnsembleCritic`]. The target network starts as a copy.
    pub fn build(config: CriticConfig<Q::Config>, device: Device) -> Result<Self> {
        let q_config = config.q_config.context("q_config is not set.")?;
        let ensemble_size = q_config.ensemble_size();
        let var_store = nn::VarStore::new(device);
        let q = Q::build(&var_store, q_config);
        let mut var_store_tgt = nn::VarStore::new(device);
        let q_tgt = q.clone_with_var_store(&var_store_tgt);
        var_store_tgt.copy(&var_store)?;
        let opt = config.opt_config.build(&var_store)?;

        Ok(Self {
            device,
            var_store,
            var_store_tgt,
            ensemble_size,
            q,
            q_tgt,
            opt,
        })
    }

    /// Returns the number of members.
    pub fn ensemble_size(&self) -> i64 {
        self.ensemble_size
    }

    /// Returns the device of the parameters.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Returns action values `[ensemble_size, batch_size, 1]`.
    pub fn forward(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        let q = self.q.forward(&obs.to(self.device), &act.to(self.device));
        debug_assert_eq!(q.size().first().copied(), Some(self.ensemble_size));
        q
    }

    /// Returns action values `[ensemble_size, batch_size]`.
    pub fn qvals(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        self.forward(obs, act).squeeze_dim(-1)
    }

    /// Returns action values of the target network `[ensemble_size, batch_size]`.
    pub fn qvals_tgt(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        self.q_tgt
            .forward(&obs.to(self.device), &act.to(self.device))
            .squeeze_dim(-1)
    }

    /// Returns the minimum of action values over members `[batch_size]`.
    pub fn qvals_min(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        self.qvals(obs, act).min_dim(0, false).0
    }

    /// Returns the minimum of target action values over members `[batch_size]`.
    pub fn qvals_min_tgt(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        self.qvals_tgt(obs, act).min_dim(0, false).0
    }

    /// Moves the target network toward the online network with rate `tau`.
    pub fn soft_update(&mut self, tau: f64) -> Result<()> {
        trace!("Soft update of critic with tau = {}", tau);
        track(&self.var_store_tgt, &self.var_store, tau)
    }

    /// Saves the target network.
    pub fn save_tgt(&self, path: &Path) -> Result<()> {
        self.var_store_tgt.save(path)?;
        info!("Save target critic to {:?}", path);
        Ok(())
    }

    /// Loads the target network.
    pub fn load_tgt(&mut self, path: &Path) -> Result<()> {
        self.var_store_tgt.load(path)?;
        info!("Load target critic from {:?}", path);
        Ok(())
    }
}

impl<Q> ModelBase for EnsembleCritic<Q>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
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
        info!("Save critic to {:?}", path);
        for (name, _) in self.var_store.variables().iter() {
            trace!("Save variable {}", name);
        }
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.var_store.load(path)?;
        info!("Load critic from {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{EnsembleMlp, EnsembleMlpConfig},
        opt::OptimizerConfig,
        util::to_scalar,
    };
    use tch::{kind::FLOAT_CPU, Kind};

    fn critic(lr: f64) -> Result<EnsembleCritic<EnsembleMlp>> {
        let config = CriticConfig::default()
            .q_config(EnsembleMlpConfig::new(5, vec![16], 1, 3))
            .opt_config(OptimizerConfig::Adam { lr });
        EnsembleCritic::build(config, Device::Cpu)
    }

    #[test]
    fn test_qvals() -> Result<()> {
        let critic = critic(1e-3)?;
        let obs = Tensor::randn([4, 3], FLOAT_CPU);
        let act = Tensor::randn([4, 2], FLOAT_CPU);
        assert_eq!(critic.ensemble_size(), 3);
        assert_eq!(critic.forward(&obs, &act).size(), [3, 4, 1]);

        let qvals = critic.qvals(&obs, &act);
        assert_eq!(qvals.size(), [3, 4]);
        let qvals_min = critic.qvals_min(&obs, &act);
        assert_eq!(qvals_min.size(), [4]);
        let gap = qvals - qvals_min.unsqueeze(0);
        assert!(to_scalar(&gap.min())? >= 0.0);

        // Initial target is a copy
        let diff = (critic.qvals(&obs, &act) - critic.qvals_tgt(&obs, &act)).abs();
        assert_eq!(to_scalar(&diff.sum(Kind::Float))?, 0.0);
        Ok(())
    }

    #[test]
    fn test_soft_update() -> Result<()> {
        let mut critic = critic(1e-2)?;
        let obs = Tensor::randn([4, 3], FLOAT_CPU);
        let act = Tensor::randn([4, 2], FLOAT_CPU);

        let before = Vec::<f32>::try_from(&critic.qvals_tgt(&obs, &act).flatten(0, -1))?;
        let loss = critic.qvals(&obs, &act).sum(Kind::Float);
        critic.backward_step(&loss);

        // tau = 0 keeps the target
        critic.soft_update(0.0)?;
        let after = Vec::<f32>::try_from(&critic.qvals_tgt(&obs, &act).flatten(0, -1))?;
        assert_eq!(before, after);

        // Target parameters are the interpolation of online and target parameters
        let online = critic.get_var_store().variables();
        let target_before = critic
            .var_store_tgt
            .variables()
            .into_iter()
            .map(|(k, v)| (k, v.copy()))
            .collect::<std::collections::HashMap<_, _>>();
        critic.soft_update(0.3)?;
        let target_after = critic.var_store_tgt.variables();
        for (name, v) in online.iter() {
            let expected: Tensor = 0.3 * v + 0.7 * &target_before[name];
            let diff = (&target_after[name] - expected).abs().max();
            assert!(to_scalar(&diff)? < 1e-6);
        }
        Ok(())
    }
}
