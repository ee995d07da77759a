use super::Td3bcConfig;
use crate::{
    actor::DeterministicActor,
    critic::EnsembleCritic,
    model::{ModelBase, SubModel, SubModel2},
    util::{to_scalar, unpack_batch, BatchTensors, CriticLoss, EnsembleSize},
};
use anyhow::Result;
use log::info;
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

/// TD3+BC agent.
///
/// The critic and its target are updated in every step. The actor and its
/// target are updated once in `actor_update_interval` steps.
pub struct Td3bc<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel<Input = Tensor, Output = Tensor>,
{
    critic: EnsembleCritic<Q>,
    actor: DeterministicActor<P>,
    gamma: f64,
    tau: f64,
    alpha: f64,
    actor_update_interval: usize,
    policy_noise: f64,
    noise_clip: f64,
    max_action: f64,
    batch_size: usize,
    train: bool,
    critic_loss: CriticLoss,
    n_opts: usize,
    device: tch::Device,
    phantom: PhantomData<R>,
}

impl<Q, P, R> Td3bc<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: EnsembleSize,
    P: SubModel<Input = Tensor, Output = Tensor>,
{
    /// Smoothed target actions, `clip(pi_tgt(s') * max_action + clip(noise, -c, c), -max_action, max_action)`.
    pub fn target_actions(&self, next_obs: &Tensor) -> Tensor {
        no_grad(|| {
            let act = self.actor.forward_tgt(next_obs) * self.max_action;
            let noise = (act.randn_like() * self.policy_noise)
                .clamp(-self.noise_clip, self.noise_clip);
            (act + noise).clamp(-self.max_action, self.max_action)
        })
    }

    fn update_critic(&mut self, batch: &BatchTensors) -> Result<Record> {
        let tgt = no_grad(|| {
            let next_act = self.target_actions(&batch.next_obs);
            let next_q = self.critic.qvals_min_tgt(&batch.next_obs, &next_act);
            &batch.reward + self.gamma * (1.0 - &batch.is_terminal) * next_q
        });

        let preds = self.critic.qvals(&batch.obs, &batch.act);
        let loss = self.critic_loss.ensemble_loss(&preds, &tgt);
        self.critic.backward_step(&loss);
        self.critic.soft_update(self.tau)?;

        Ok(Record::from_slice(&[
            ("loss/critic", RecordValue::Scalar(to_scalar(&loss)?)),
            ("misc/q_pred", RecordValue::Scalar(to_scalar(&preds.mean(Kind::Float))?)),
        ]))
    }

    /// Returns the actor loss and its behavior cloning term.
    ///
    /// `-alpha * mean(Q_1(s, pi(s))) / mean(|Q_1(s, pi(s))|) + mean((pi(s) - a)^2)`,
    /// where the normalizer is detached.
    pub fn compute_actor_loss(&self, batch: &BatchTensors) -> (Tensor, Tensor) {
        let act = self.actor.forward(&batch.obs) * self.max_action;
        let q = self.critic.qvals(&batch.obs, &act).get(0);
        let q_scale = q.abs().mean(Kind::Float).detach();
        let loss_bc = (&act - &batch.act).square().mean(Kind::Float);
        let loss = -(q.mean(Kind::Float) * self.alpha) / q_scale + &loss_bc;
        (loss, loss_bc)
    }

    fn update_actor(&mut self, batch: &BatchTensors) -> Result<Record> {
        let (loss, loss_bc) = self.compute_actor_loss(batch);
        self.actor.backward_step(&loss);
        self.actor.soft_update(self.tau)?;

        Ok(Record::from_slice(&[
            ("loss/actor", RecordValue::Scalar(to_scalar(&loss)?)),
            ("loss/bc", RecordValue::Scalar(to_scalar(&loss_bc)?)),
        ]))
    }

    /// Performs an update with a batch and returns the metrics.
    pub fn update(&mut self, batch: BatchTensors) -> Result<Record> {
        batch.check()?;
        let mut record = self.update_critic(&batch)?;
        self.n_opts += 1;
        if self.n_opts % self.actor_update_interval == 0 {
            record = record.merge(self.update_actor(&batch)?);
        }
        Ok(record)
    }

    /// Returns the critic.
    pub fn critic(&self) -> &EnsembleCritic<Q> {
        &self.critic
    }

    /// Returns the actor.
    pub fn actor(&self) -> &DeterministicActor<P> {
        &self.actor
    }
}

impl<Q, P, R> Policy for Td3bc<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel<Input = Tensor, Output = Tensor>,
{
    type Obs = Tensor;
    type Act = Tensor;

    fn sample(&mut self, obs: &Tensor) -> Tensor {
        no_grad(|| self.actor.forward(obs) * self.max_action)
    }
}

impl<Q, P, R> Configurable for Td3bc<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + EnsembleSize + Debug + PartialEq + Clone,
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
{
    type Config = Td3bcConfig<Q::Config, P::Config>;

    /// Constructs [`Td3bc`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device = config.device.map_or(tch::Device::Cpu, Into::into);
        if let Some(seed) = config.seed {
            tch::manual_seed(seed);
        }

        let critic = EnsembleCritic::build(config.critic_config, device)?;
        let actor = DeterministicActor::build(config.actor_config, device)?;
        info!("Build TD3+BC agent with {} critics", critic.ensemble_size());

        Ok(Self {
            critic,
            actor,
            gamma: config.gamma,
            tau: config.tau,
            alpha: config.alpha,
            actor_update_interval: config.actor_update_interval.max(1),
            policy_noise: config.policy_noise,
            noise_clip: config.noise_clip,
            max_action: config.max_action,
            batch_size: config.batch_size,
            train: config.train,
            critic_loss: config.critic_loss,
            n_opts: 0,
            device,
            phantom: PhantomData,
        })
    }
}

impl<Q, P, R> Agent<R> for Td3bc<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + EnsembleSize + Debug + PartialEq + Clone,
    P: SubModel<Input = Tensor, Output = Tensor>,
    P::Config: DeserializeOwned + Serialize + Debug + PartialEq + Clone,
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
        let paths = ["critic", "critic_tgt", "actor", "actor_tgt"]
            .iter()
            .map(|name| path.join(format!("{}.pt.tch", name)))
            .collect::<Vec<_>>();
        self.critic.save(&paths[0])?;
        self.critic.save_tgt(&paths[1])?;
        self.actor.save(&paths[2])?;
        self.actor.save_tgt(&paths[3])?;
        Ok(paths)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.critic.load(&path.join("critic.pt.tch"))?;
        self.critic.load_tgt(&path.join("critic_tgt.pt.tch"))?;
        self.actor.load(&path.join("actor.pt.tch"))?;
        self.actor.load_tgt(&path.join("actor_tgt.pt.tch"))?;
        Ok(())
    }
}
