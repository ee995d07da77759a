use super::InacConfig;
use crate::{
    actor::GaussianActor,
    critic::{EnsembleCritic, Value},
    model::{ModelBase, SubModel, SubModel2},
    util::{to_scalar, unpack_batch, BatchTensors, CriticLoss, EnsembleSize, OutDim},
};
use anyhow::Result;
use log::{info, trace};
use offrl_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Policy, ReplayBufferBase, TransitionBatch,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fmt::Debug,
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};
use tch::{no_grad, Kind, Tensor};

/// `clip(exp(adv / temperature - logp_beh), eps, exp_threshold)`.
pub fn in_sample_weights(
    adv: &Tensor,
    logp_beh: &Tensor,
    temperature: f64,
    eps: f64,
    exp_threshold: f64,
) -> Tensor {
    (adv / temperature - logp_beh)
        .exp()
        .clamp(eps, exp_threshold)
}

/// In-sample actor critic.
///
/// The policy is improved only with actions in the dataset, weighted by the
/// in-sample softmax of advantages relative to the estimated behavior policy.
/// Each update runs the behavior policy, value, critic and actor steps in this
/// order and then the soft update of the target critic.
pub struct Inac<Q, P, V, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
    V: SubModel<Input = Tensor, Output = Tensor>,
{
    critic: EnsembleCritic<Q>,
    value: Value<V>,
    actor: GaussianActor<P>,
    behavior: GaussianActor<P>,
    temperature: f64,
    gamma: f64,
    tau: f64,
    eps: f64,
    exp_threshold: f64,
    batch_size: usize,
    train: bool,
    critic_loss: CriticLoss,
    n_opts: usize,
    device: tch::Device,
    phantom: PhantomData<R>,
}

impl<Q, P, V, R> Inac<Q, P, V, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: EnsembleSize,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
    V: SubModel<Input = Tensor, Output = Tensor>,
{
    fn update_behavior(&mut self, obs: &Tensor, act: &Tensor) -> Result<f32> {
        let loss = -self.behavior.log_prob(obs, act).mean(Kind::Float);
        self.behavior.backward_step(&loss);
        to_scalar(&loss)
    }

    /// Soft value of the current policy, `min Q_tgt(s, a~) - temperature * log pi(a~|s)`.
    fn soft_value_tgt(&self, obs: &Tensor) -> Tensor {
        let (act, logp) = self.actor.sample(obs, false);
        self.critic.qvals_min_tgt(obs, &act) - self.temperature * logp
    }

    fn update_value(&mut self, obs: &Tensor) -> Result<f32> {
        let tgt = no_grad(|| self.soft_value_tgt(obs));
        let loss = (self.value.forward(obs) - tgt).square().mean(Kind::Float);
        self.value.backward_step(&loss);
        to_scalar(&loss)
    }

    fn update_critic(&mut self, batch: &BatchTensors) -> Result<(f32, f32)> {
        let tgt = no_grad(|| {
            let next_v = self.soft_value_tgt(&batch.next_obs);
            &batch.reward + self.gamma * (1.0 - &batch.is_terminal) * next_v
        });
        let preds = self.critic.qvals(&batch.obs, &batch.act);
        let loss = self.critic_loss.ensemble_loss(&preds, &tgt);
        self.critic.backward_step(&loss);
        Ok((to_scalar(&loss)?, to_scalar(&preds.mean(Kind::Float))?))
    }

    /// Weights of dataset actions in the actor loss.
    ///
    /// The advantage is taken from the target critic, so the critic step of
    /// the same update does not move the weights.
    fn actor_weights(&self, obs: &Tensor, act: &Tensor) -> Tensor {
        no_grad(|| {
            let adv = self.critic.qvals_min_tgt(obs, act) - self.value.forward(obs);
            let logp_beh = self.behavior.log_prob(obs, act);
            in_sample_weights(&adv, &logp_beh, self.temperature, self.eps, self.exp_threshold)
        })
    }

    fn update_actor(&mut self, obs: &Tensor, act: &Tensor) -> Result<f32> {
        let w = self.actor_weights(obs, act);
        let loss = -(w * self.actor.log_prob(obs, act)).mean(Kind::Float);
        self.actor.backward_step(&loss);
        to_scalar(&loss)
    }

    /// Performs an update with a batch and returns the metrics.
    pub fn update(&mut self, batch: BatchTensors) -> Result<Record> {
        batch.check()?;
        let loss_behavior = self.update_behavior(&batch.obs, &batch.act)?;
        let loss_value = self.update_value(&batch.obs)?;
        let (loss_critic, q_pred) = self.update_critic(&batch)?;
        let loss_actor = self.update_actor(&batch.obs, &batch.act)?;
        self.critic.soft_update(self.tau)?;
        self.n_opts += 1;
        trace!("InAC update {}", self.n_opts);

        Ok(Record::from_slice(&[
            ("loss/actor", RecordValue::Scalar(loss_actor)),
            ("loss/critic_q", RecordValue::Scalar(loss_critic)),
            ("loss/critic_v", RecordValue::Scalar(loss_value)),
            ("loss/behavior", RecordValue::Scalar(loss_behavior)),
            ("misc/q_pred", RecordValue::Scalar(q_pred)),
        ]))
    }

    /// Returns the actor.
    pub fn actor(&self) -> &GaussianActor<P> {
        &self.actor
    }

    /// Returns the estimated behavior policy.
    pub fn behavior(&self) -> &GaussianActor<P> {
        &self.behavior
    }
}

impl<Q, P, V, R> Policy for Inac<Q, P, V, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
    V: SubModel<Input = Tensor, Output = Tensor>,
{
    type Obs = Tensor;
    type Act = Tensor;

    fn sample(&mut self, obs: &Tensor) -> Tensor {
        no_grad(|| self.actor.sample(obs, !self.train).0)
    }
}

impl<Q, P, V, R> Configurable for Inac<Q, P, V, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + EnsembleSize + Debug + PartialEq + Clone,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    V: SubModel<Input = Tensor, Output = Tensor>,
    V::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    type Config = InacConfig<Q::Config, P::Config, V::Config>;

    /// Constructs [`Inac`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device = config.device.map_or(tch::Device::Cpu, Into::into);
        if let Some(seed) = config.seed {
            tch::manual_seed(seed);
        }

        let critic = EnsembleCritic::build(config.critic_config, device)?;
        let value = Value::build(config.value_config, device)?;
        let actor = GaussianActor::build(config.actor_config, device)?;
        let behavior = GaussianActor::build(config.behavior_config, device)?;
        info!(
            "Build InAC agent with {} critics (temperature = {})",
            critic.ensemble_size(),
            config.temperature
        );

        Ok(Self {
            critic,
            value,
            actor,
            behavior,
            temperature: config.temperature,
            gamma: config.gamma,
            tau: config.tau,
            eps: config.eps,
            exp_threshold: config.exp_threshold,
            batch_size: config.batch_size,
            train: config.train,
            critic_loss: config.critic_loss,
            n_opts: 0,
            device,
            phantom: PhantomData,
        })
    }
}

impl<Q, P, V, R> Agent<R> for Inac<Q, P, V, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + EnsembleSize + Debug + PartialEq + Clone,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
    V: SubModel<Input = Tensor, Output = Tensor>,
    V::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
    R: ReplayBufferBase,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record> {
        let batch = buffer.batch(self.batch_size)?;
        self.update(unpack_batch(batch, self.device))
    }

    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let paths = ["critic", "critic_tgt", "value", "actor", "behavior"]
            .iter()
            .map(|name| path.join(format!("{}.pt.tch", name)))
            .collect::<Vec<_>>();
        self.critic.save(&paths[0])?;
        self.critic.save_tgt(&paths[1])?;
        self.value.save(&paths[2])?;
        self.actor.save(&paths[3])?;
        self.behavior.save(&paths[4])?;
        Ok(paths)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.critic.load(&path.join("critic.pt.tch"))?;
        self.critic.load_tgt(&path.join("critic_tgt.pt.tch"))?;
        self.value.load(&path.join("value.pt.tch"))?;
        self.actor.load(&path.join("actor.pt.tch"))?;
        self.behavior.load(&path.join("behavior.pt.tch"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::TransitionBuffer,
        critic::CriticConfig,
        mlp::{EnsembleMlp, EnsembleMlpConfig, Mlp, Mlp2, MlpConfig},
        opt::OptimizerConfig,
    };
    use tch::{Device, Kind};

    type Agent_ = Inac<EnsembleMlp, Mlp2, Mlp, TransitionBuffer>;

    fn agent() -> Result<Agent_> {
        let opt_config = OptimizerConfig::Adam { lr: 1e-2 };
        let pi_config = MlpConfig::new(3, vec![8], 2, false).state_independent_std(true);
        let default = InacConfig::<EnsembleMlpConfig, MlpConfig, MlpConfig>::default();
        let config = InacConfig::default()
            .actor_config(default.actor_config.pi_config(pi_config.clone()))
            .behavior_config(default.behavior_config.pi_config(pi_config))
            .critic_config(
                CriticConfig::default()
                    .q_config(EnsembleMlpConfig::new(5, vec![8], 1, 2))
                    .opt_config(opt_config.clone()),
            )
            .value_config(
                CriticConfig::default()
                    .q_config(MlpConfig::new(3, vec![8], 1, false))
                    .opt_config(opt_config),
            )
            .seed(0);
        Agent_::build(config)
    }

    fn values(t: &Tensor) -> Result<Vec<f32>> {
        Ok(Vec::<f32>::try_from(&t.detach().to_kind(Kind::Float).flatten(0, -1))?)
    }

    #[test]
    fn test_in_sample_weights_clipping() -> Result<()> {
        let adv = Tensor::from_slice(&[100.0f32, -100.0, 0.5]);
        let logp_beh = Tensor::from_slice(&[0.0f32, 0.0, 0.25]);
        let w = values(&in_sample_weights(&adv, &logp_beh, 0.5, 1e-8, 10000.0))?;

        assert_eq!(w[0], 10000.0);
        assert!((w[1] as f64 - 1e-8).abs() < 1e-12);
        // exp(0.5 / 0.5 - 0.25)
        assert!((w[2] - 0.75f32.exp()).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_actor_weights_ignore_critic_step() -> Result<()> {
        let mut agent = agent()?;
        let batch = BatchTensors {
            obs: Tensor::randn([16, 3], (Kind::Float, Device::Cpu)),
            act: Tensor::randn([16, 2], (Kind::Float, Device::Cpu)).clamp(-1.0, 1.0),
            next_obs: Tensor::randn([16, 3], (Kind::Float, Device::Cpu)),
            reward: Tensor::ones([16], (Kind::Float, Device::Cpu)) * 5.0,
            is_terminal: Tensor::zeros([16], (Kind::Float, Device::Cpu)),
        };

        let w_before = values(&agent.actor_weights(&batch.obs, &batch.act))?;
        let q_before = values(&agent.critic.qvals_min(&batch.obs, &batch.act))?;
        agent.update_critic(&batch)?;
        let w_after = values(&agent.actor_weights(&batch.obs, &batch.act))?;
        let q_after = values(&agent.critic.qvals_min(&batch.obs, &batch.act))?;

        // The online critic moved but the weights did not.
        assert_ne!(q_before, q_after);
        assert_eq!(w_before, w_after);
        Ok(())
    }
}
