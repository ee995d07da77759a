use super::CriticConfig;
use crate::{
    model::{ModelBase, SubModel},
    opt::Optimizer,
};
use anyhow::{Context, Result};
use log::info;
use std::path::Path;
use tch::{nn, Device, Tensor};

/// State-value function.
pub struct Value<V>
where
    V: SubModel<Input = Tensor, Output = Tensor>,
{
    device: Device,
    var_store: nn::VarStore,
    v: V,
    opt: Optimizer,
}

impl<V> Value<V>
where
    V: SubModel<Input = Tensor, Output = Tensor>,
{
    /// Constructs [`Value`].
    pub fn build(config: CriticConfig<V::Config>, device: Device) -> Result<Self> {
        let v_config = config.q_config.context("q_config is not set.")?;
        let var_store = nn::VarStore::new(device);
        let v = V::build(&var_store, v_config);
        let opt = config.opt_config.build(&var_store)?;

        Ok(Self {
            device,
            var_store,
            v,
            opt,
        })
    }

    /// Returns state values `[batch_size]`.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        self.v.forward(&obs.to(self.device)).squeeze_dim(-1)
    }
}

impl<V> ModelBase for Value<V>
where
    V: SubModel<Input = Tensor, Output = Tensor>,
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
        info!("Save value function to {:?}", path);
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.var_store.load(path)?;
        info!("Load value function from {:?}", path);
        Ok(())
    }
}
