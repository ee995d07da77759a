use anyhow::Result;
use clap::Parser;
use ndarray::{Array1, Array2};
use offrl_core::{
    record::{AggregateRecorder, BufferedRecorder, Record, RecordValue},
    Configurable, Evaluator, Policy, ReplayBufferBase, Trainer, TrainerConfig,
};
use offrl_tch_agent::{
    actor::GaussianActorConfig,
    buffer::{Dataset, TransitionBuffer, TransitionBufferConfig},
    critic::CriticConfig,
    mlp::{EnsembleMlp, EnsembleMlpConfig, Mlp2, MlpConfig},
    opt::OptimizerConfig,
    sacn::{EntCoefMode, Sacn, SacnConfig},
};
use offrl_tensorboard::TensorboardRecorder;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tch::Tensor;

const DIM_OBS: i64 = 2;
const DIM_ACT: i64 = 2;
const STEP_SIZE: f32 = 0.1;
const EPISODE_LEN: usize = 50;
const MODEL_DIR: &str = "offrl-tch-agent/examples/model/edac_synthetic";

/// Train EDAC agent on a dataset of a point moving on a plane
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The number of episodes in the dataset
    #[arg(long, default_value_t = 200)]
    n_episodes: usize,

    /// Standard deviation of the noise of the behavior policy
    #[arg(long, default_value_t = 0.5)]
    behavior_noise: f32,

    /// The number of optimization steps
    #[arg(long, default_value_t = 20000)]
    max_opts: usize,

    /// Interval of evaluation
    #[arg(long, default_value_t = 2000)]
    eval_interval: usize,

    /// The number of critics
    #[arg(long, default_value_t = 10)]
    ensemble_size: i64,

    /// Weight of the diversity penalty
    #[arg(long, default_value_t = 1.0)]
    eta: f64,

    /// Batch size
    #[arg(long, default_value_t = 256)]
    batch_size: usize,

    /// Write metrics to tensorboard, otherwise keep them in memory
    #[arg(long, default_value_t = false)]
    tensorboard: bool,

    /// Random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Moves the point and returns the next position and the reward.
fn step(pos: [f32; 2], act: [f32; 2]) -> ([f32; 2], f32) {
    let next = [
        pos[0] + STEP_SIZE * act[0].clamp(-1.0, 1.0),
        pos[1] + STEP_SIZE * act[1].clamp(-1.0, 1.0),
    ];
    let reward = -(next[0].powi(2) + next[1].powi(2)).sqrt();
    (next, reward)
}

/// Episodes of a noisy controller driving the point toward the origin.
fn create_dataset(args: &Args) -> Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let n = args.n_episodes * EPISODE_LEN;
    let mut obs = Vec::with_capacity(n * 2);
    let mut act = Vec::with_capacity(n * 2);
    let mut next_obs = Vec::with_capacity(n * 2);
    let mut reward = Vec::with_capacity(n);

    for _ in 0..args.n_episodes {
        let mut pos = [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)];
        for _ in 0..EPISODE_LEN {
            let a = [
                (-pos[0] + args.behavior_noise * rng.gen_range(-1.0..1.0)).clamp(-1.0, 1.0),
                (-pos[1] + args.behavior_noise * rng.gen_range(-1.0..1.0)).clamp(-1.0, 1.0),
            ];
            let (next, r) = step(pos, a);
            obs.extend_from_slice(&pos);
            act.extend_from_slice(&a);
            next_obs.extend_from_slice(&next);
            reward.push(r);
            pos = next;
        }
    }

    let to_array2 = |v: Vec<f32>| Array2::from_shape_vec((n, 2), v);
    Ok(Dataset {
        obs: to_array2(obs)?,
        act: to_array2(act)?,
        next_obs: to_array2(next_obs)?,
        reward: Array1::from(reward),
        terminal: Array1::from_elem(n, false),
        episode_end: Some(Array1::from_shape_fn(n, |i| (i + 1) % EPISODE_LEN == 0)),
    })
}

/// Rolls out the policy from fixed initial positions.
struct PointEvaluator {
    init_pos: Vec<[f32; 2]>,
}

impl<A: Policy<Obs = Tensor, Act = Tensor>> Evaluator<A> for PointEvaluator {
    fn evaluate(&mut self, agent: &mut A) -> Result<Record> {
        let mut total = 0f32;
        for init in self.init_pos.iter() {
            let mut pos = *init;
            for _ in 0..EPISODE_LEN {
                let obs = Tensor::from_slice(&pos).reshape([1, DIM_OBS]);
                let act = Vec::<f32>::try_from(&agent.sample(&obs).flatten(0, -1))?;
                let (next, r) = step(pos, [act[0], act[1]]);
                total += r;
                pos = next;
            }
        }
        let eval_return = total / self.init_pos.len() as f32;
        Ok(Record::from_slice(&[(
            "eval_return",
            RecordValue::Scalar(eval_return),
        )]))
    }
}

fn create_agent_config(args: &Args) -> SacnConfig<EnsembleMlpConfig, MlpConfig> {
    let opt_config = OptimizerConfig::Adam { lr: 3e-4 };
    let actor_config = GaussianActorConfig::default()
        .pi_config(MlpConfig::new(DIM_OBS, vec![64, 64], DIM_ACT, false))
        .opt_config(opt_config.clone());
    let critic_config = CriticConfig::default()
        .q_config(EnsembleMlpConfig::new(
            DIM_OBS + DIM_ACT,
            vec![64, 64],
            1,
            args.ensemble_size,
        ))
        .opt_config(opt_config);

    SacnConfig::default()
        .actor_config(actor_config)
        .critic_config(critic_config)
        .ent_coef_mode(EntCoefMode::auto_for_action_dim(DIM_ACT, 3e-4))
        .eta(Some(args.eta))
        .batch_size(args.batch_size)
        .seed(args.seed as i64)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    log::info!("Create replay buffer");
    let mut buffer = TransitionBuffer::build(
        TransitionBufferConfig::default().seed(args.seed),
        create_dataset(&args)?,
    )?;
    log::info!("{} samples", buffer.len());

    log::info!("Create agent");
    let agent_config = create_agent_config(&args);
    let mut agent = Sacn::<EnsembleMlp, Mlp2, TransitionBuffer>::build(agent_config)?;

    let mut trainer = Trainer::build(
        TrainerConfig::default()
            .max_opts(args.max_opts)
            .eval_interval(args.eval_interval)
            .flush_record_interval(args.eval_interval)
            .record_agent_info_interval(args.eval_interval / 10)
            .record_compute_cost_interval(args.eval_interval)
            .model_dir(MODEL_DIR),
    );

    let mut recorder: Box<dyn AggregateRecorder> = match args.tensorboard {
        true => Box::new(TensorboardRecorder::new(MODEL_DIR)),
        false => Box::new(BufferedRecorder::new()),
    };

    let mut evaluator = PointEvaluator {
        init_pos: vec![[0.8, 0.8], [-0.8, 0.5], [0.3, -0.9], [-0.5, -0.5]],
    };

    log::info!("Start training");
    trainer.train_offline(&mut agent, &mut buffer, recorder.as_mut(), &mut evaluator)?;

    Ok(())
}
