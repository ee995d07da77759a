use super::{EntCoef, SacnConfig};
use crate::{
    actor::GaussianActor,
    critic::EnsembleCritic,
    diversity::DiversityPenalty,
    error::AgentError,
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

#[cfg_attr(doc, aquamarine::aquamarine)]
/// SAC with an ensemble of critics.
///
/// With a [`DiversityPenalty`], configured by [`SacnConfig::eta`], this is
/// EDAC. In both cases an optimization step consists of
///
/// 1. the critic update followed by the soft update of the target critic,
/// 2. the actor update,
/// 3. the update of the entropy coefficient when it is tuned automatically.
///
/// With `do_reverse_update`, 2 and 3 precede 1.
///
/// ```mermaid
/// graph LR
///     B[BatchTensors]-->C[EnsembleCritic]
///     C-->|min Q|A[GaussianActor]
///     B-->|obs, act|D[DiversityPenalty]
///     D-->|eta * diversity|C
///     A-->|log pi|E[EntCoef]
/// ```
pub struct Sacn<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    critic: EnsembleCritic<Q>,
    actor: GaussianActor<P>,
    ent_coef: EntCoef,
    diversity: Option<DiversityPenalty>,
    gamma: f64,
    tau: f64,
    do_reverse_update: bool,
    batch_size: usize,
    train: bool,
    reward_scale: f32,
    critic_loss: CriticLoss,
    n_opts: usize,
    device: tch::Device,
    phantom: PhantomData<R>,
}

impl<Q, P, R> Sacn<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: EnsembleSize,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    /// Returns the critic loss and its metrics.
    ///
    /// The loss is the ensemble Bellman residual, plus `eta` times the
    /// diversity of the action gradients for EDAC.
    pub fn compute_critic_loss(&self, batch: &BatchTensors) -> Result<(Tensor, Record)> {
        batch.check()?;
        let BatchTensors {
            obs,
            act,
            next_obs,
            reward,
            is_terminal,
        } = batch;

        let tgt = no_grad(|| {
            let (next_act, next_logp) = self.actor.sample(next_obs, false);
            let next_q = self.critic.qvals_min_tgt(next_obs, &next_act)
                - self.ent_coef.alpha() * next_logp;
            self.reward_scale as f64 * reward + self.gamma * (1.0 - is_terminal) * next_q
        });

        let preds = self.critic.qvals(obs, act);
        let loss = self.critic_loss.ensemble_loss(&preds, &tgt);
        let mut record = Record::from_slice(&[
            ("loss/critic", RecordValue::Scalar(to_scalar(&loss)?)),
            ("misc/q_pred", RecordValue::Scalar(to_scalar(&preds.mean(Kind::Float))?)),
            ("misc/q_target", RecordValue::Scalar(to_scalar(&tgt.mean(Kind::Float))?)),
        ]);

        let loss = match &self.diversity {
            None => loss,
            Some(diversity) => {
                let (loss, diversity) = diversity.apply(loss, &self.critic, obs, act)?;
                record.insert(
                    "loss/critic_diversity",
                    RecordValue::Scalar(to_scalar(&diversity)?),
                );
                loss
            }
        };

        Ok((loss, record))
    }

    /// Returns the actor loss and log probabilities of the sampled actions.
    pub fn compute_actor_loss(&self, obs: &Tensor) -> (Tensor, Tensor) {
        let (act, logp) = self.actor.sample(obs, false);
        let qval = self.critic.qvals_min(obs, &act);
        let loss = (self.ent_coef.alpha() * &logp - qval).mean(Kind::Float);
        (loss, logp)
    }

    fn update_critic(&mut self, batch: &BatchTensors) -> Result<Record> {
        let (loss, record) = self.compute_critic_loss(batch)?;
        self.critic.backward_step(&loss);
        self.critic.soft_update(self.tau)?;
        Ok(record)
    }

    fn update_actor(&mut self, obs: &Tensor) -> Result<Record> {
        let (loss, logp) = self.compute_actor_loss(obs);
        self.actor.backward_step(&loss);

        let mut record = Record::from_slice(&[
            ("loss/actor", RecordValue::Scalar(to_scalar(&loss)?)),
            (
                "misc/entropy",
                RecordValue::Scalar(-to_scalar(&logp.mean(Kind::Float))?),
            ),
        ]);

        if let Some(loss_alpha) = self.ent_coef.update(&logp) {
            record.insert("loss/alpha", RecordValue::Scalar(to_scalar(&loss_alpha)?));
        }
        record.insert(
            "misc/alpha",
            RecordValue::Scalar(to_scalar(&self.ent_coef.alpha().sum(Kind::Float))?),
        );

        Ok(record)
    }

    /// Performs an update with a batch and returns the metrics.
    pub fn update(&mut self, batch: BatchTensors) -> Result<Record> {
        batch.check()?;
        let record = match self.do_reverse_update {
            false => {
                let record = self.update_critic(&batch)?;
                record.merge(self.update_actor(&batch.obs)?)
            }
            true => {
                let record = self.update_actor(&batch.obs)?;
                record.merge(self.update_critic(&batch)?)
            }
        };
        self.n_opts += 1;
        trace!("SAC-N update {}", self.n_opts);
        Ok(record)
    }

    /// Returns the critic.
    pub fn critic(&self) -> &EnsembleCritic<Q> {
        &self.critic
    }

    /// Returns the actor.
    pub fn actor(&self) -> &GaussianActor<P> {
        &self.actor
    }
}

impl<Q, P, R> Policy for Sacn<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim,
{
    type Obs = Tensor;
    type Act = Tensor;

    /// Samples actions in training mode, otherwise returns the mode of the policy.
    fn sample(&mut self, obs: &Tensor) -> Tensor {
        no_grad(|| self.actor.sample(obs, !self.train).0)
    }
}

impl<Q, P, R> Configurable for Sacn<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + EnsembleSize + Debug + PartialEq + Clone,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
{
    type Config = SacnConfig<Q::Config, P::Config>;

    /// Constructs [`Sacn`] agent.
    fn build(config: Self::Config) -> Result<Self> {
        let device = config.device.map_or(tch::Device::Cpu, Into::into);
        if let Some(seed) = config.seed {
            tch::manual_seed(seed);
        }

        let critic = EnsembleCritic::build(config.critic_config, device)?;
        let diversity = config.eta.map(DiversityPenalty::new);
        if diversity.is_some() && critic.ensemble_size() < 2 {
            return Err(AgentError::EnsembleTooSmall(critic.ensemble_size()).into());
        }
        let actor = GaussianActor::build(config.actor_config, device)?;
        let ent_coef = EntCoef::new(config.ent_coef_mode, device)?;

        match &diversity {
            Some(d) => info!(
                "Build EDAC agent with {} critics (eta = {})",
                critic.ensemble_size(),
                d.eta()
            ),
            None => info!("Build SAC-N agent with {} critics", critic.ensemble_size()),
        }

        Ok(Self {
            critic,
            actor,
            ent_coef,
            diversity,
            gamma: config.gamma,
            tau: config.tau,
            do_reverse_update: config.do_reverse_update,
            batch_size: config.batch_size,
            train: config.train,
            reward_scale: config.reward_scale,
            critic_loss: config.critic_loss,
            n_opts: 0,
            device,
            phantom: PhantomData,
        })
    }
}

impl<Q, P, R> Agent<R> for Sacn<Q, P, R>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: DeserializeOwned + Serialize + EnsembleSize + Debug + PartialEq + Clone,
    P: SubModel<Input = Tensor, Output = (Tensor, Tensor)>,
    P::Config: DeserializeOwned + Serialize + OutDim + Debug + PartialEq + Clone,
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
        let paths = ["critic", "critic_tgt", "actor", "ent_coef"]
            .iter()
            .map(|name| path.join(format!("{}.pt.tch", name)))
            .collect::<Vec<_>>();
        self.critic.save(&paths[0])?;
        self.critic.save_tgt(&paths[1])?;
        self.actor.save(&paths[2])?;
        self.ent_coef.save(&paths[3])?;
        Ok(paths)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.critic.load(&path.join("critic.pt.tch"))?;
        self.critic.load_tgt(&path.join("critic_tgt.pt.tch"))?;
        self.actor.load(&path.join("actor.pt.tch"))?;
        self.ent_coef.load(&path.join("ent_coef.pt.tch"))?;
        Ok(())
    }
}
