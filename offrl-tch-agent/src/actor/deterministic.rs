use super::DeterministicActorConfig;
use crate::{
    model::{ModelBase, SubModel},
    opt::Optimizer,
    util::track,
};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use tch::{nn, Device, Tensor};

/// Deterministic policy `tanh(pi(obs))` with a target network.
pub struct DeterministicActor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
{
    device: Device,
    var_store: nn::VarStore,
    var_store_tgt: nn::VarStore,
    pi: P,
    pi_tgt: P,
    opt: Optimizer,
}

impl<P> DeterministicActor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
{
    /// Constructs [`DeterministicActor`]. The target network starts as a copy.
    pub fn build(config: DeterministicActorConfig<P::Config>, device: Device) -> Result<Self> {
        let pi_config = config.pi_config.context("pi_config is not set.")?;
        let var_store = nn::VarStore::new(device);
        let pi = P::build(&var_store, pi_config);
        let mut var_store_tgt = nn::VarStore::new(device);
        let pi_tgt = pi.clone_with_var_store(&var_store_tgt);
        var_store_tgt.copy(&var_store)?;
        let opt = config.opt_config.build(&var_store)?;

        Ok(Self {
            device,
            var_store,
            var_store_tgt,
            pi,
            pi_tgt,
            opt,
        })
    }

    /// Returns actions in `[-1, 1]`.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        self.pi.forward(&obs.to(self.device)).tanh()
    }

    /// Returns actions of the target network.
    pub fn forward_tgt(&self, obs: &Tensor) -> Tensor {
        self.pi_tgt.forward(&obs.to(self.device)).tanh()
    }

    /// Moves the target network toward the online network with rate `tau`.
    pub fn soft_update(&mut self, tau: f64) -> Result<()> {
        track(&self.var_store_tgt, &self.var_store, tau)
    }

    /// Saves the target network.
    pub fn save_tgt(&self, path: &Path) -> Result<()> {
        self.var_store_tgt.save(path)?;
        info!("Save target actor to {:?}", path);
        Ok(())
    }

    /// Loads the target network.
    pub fn load_tgt(&mut self, path: &Path) -> Result<()> {
        self.var_store_tgt.load(path)?;
        info!("Load target actor from {:?}", path);
        Ok(())
    }
}

impl<P> ModelBase for DeterministicActor<P>
where
    P: SubModel<Input = Tensor, Output = Tensor>,
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
    use crate::{
        mlp::{Mlp, MlpConfig},
        opt::OptimizerConfig,
        util::to_scalar,
    };
    use tch::{kind::FLOAT_CPU, Kind};

    #[test]
    fn test_target_follows_online() -> Result<()> {
        let config = DeterministicActorConfig::default()
            .pi_config(MlpConfig::new(3, vec![8], 2, false))
            .opt_config(OptimizerConfig::Adam { lr: 1e-2 });
        let mut actor = DeterministicActor::<Mlp>::build(config, Device::Cpu)?;
        let obs = Tensor::randn([4, 3], FLOAT_CPU);
        let diff = |actor: &DeterministicActor<Mlp>| {
            to_scalar(&(actor.forward(&obs) - actor.forward_tgt(&obs)).abs().sum(Kind::Float))
        };

        // Initialized as a copy
        assert_eq!(diff(&actor)?, 0.0);
        assert!(to_scalar(&actor.forward(&obs).abs().max())? <= 1.0);

        let loss = actor.forward(&obs).sum(Kind::Float);
        actor.backward_step(&loss);
        assert!(diff(&actor)? > 0.0);

        actor.soft_update(1.0)?;
        assert_eq!(diff(&actor)?, 0.0);
        Ok(())
    }
}
