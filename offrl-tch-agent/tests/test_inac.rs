mod common;
use anyhow::Result;
use common::{batch, buffer, ACT_DIM, OBS_DIM};
use offrl_core::{Agent, Configurable, Policy};
use offrl_tch_agent::{
    actor::GaussianActorConfig,
    buffer::TransitionBuffer,
    critic::CriticConfig,
    inac::{Inac, InacConfig},
    mlp::{EnsembleMlp, EnsembleMlpConfig, Mlp, Mlp2, MlpConfig},
    opt::OptimizerConfig,
    util::to_scalar,
};
use tch::Kind;
use tempdir::TempDir;

type Agent_ = Inac<EnsembleMlp, Mlp2, Mlp, TransitionBuffer>;

fn config() -> InacConfig<EnsembleMlpConfig, MlpConfig, MlpConfig> {
    let opt_config = OptimizerConfig::Adam { lr: 3e-4 };
    let pi_config =
        MlpConfig::new(OBS_DIM, vec![16, 16], ACT_DIM, false).state_independent_std(true);
    let default = InacConfig::<EnsembleMlpConfig, MlpConfig, MlpConfig>::default();

    InacConfig::default()
        .actor_config(
            default
                .actor_config
                .pi_config(pi_config.clone())
                .opt_config(opt_config.clone()),
        )
        .behavior_config(
            default
                .behavior_config
                .pi_config(pi_config)
                .opt_config(opt_config.clone()),
        )
        .critic_config(
            CriticConfig::default()
                .q_config(EnsembleMlpConfig::new(OBS_DIM + ACT_DIM, vec![16, 16], 1, 2))
                .opt_config(opt_config.clone()),
        )
        .value_config(
            CriticConfig::default()
                .q_config(MlpConfig::new(OBS_DIM, vec![16, 16], 1, false))
                .opt_config(opt_config),
        )
        .batch_size(32)
        .seed(42)
}

#[test]
fn test_update_records() -> Result<()> {
    let mut buffer = buffer()?;
    let mut agent = Agent_::build(config())?;
    agent.train();

    for _ in 0..3 {
        let record = agent.opt_with_record(&mut buffer)?;
        for key in [
            "loss/actor",
            "loss/critic_q",
            "loss/critic_v",
            "loss/behavior",
        ] {
            let v = record.get_scalar(key)?;
            assert!(v.is_finite(), "{} = {}", key, v);
        }
        assert!(record.get_scalar("loss/critic_q")? >= 0.0);
        assert!(record.get_scalar("loss/critic_v")? >= 0.0);
    }
    Ok(())
}

#[test]
fn test_behavior_policy_fits_dataset() -> Result<()> {
    let mut buffer = buffer()?;
    let mut agent = Agent_::build(config())?;
    let batch = batch(&mut buffer, 64)?;
    let nll = |agent: &Agent_| -> Result<f32> {
        let logp = agent.behavior().log_prob(&batch.obs, &batch.act);
        to_scalar(&-logp.mean(Kind::Float))
    };

    let before = nll(&agent)?;
    for _ in 0..100 {
        agent.opt(&mut buffer)?;
    }
    assert!(nll(&agent)? < before);
    Ok(())
}

#[test]
fn test_actions_are_clipped() -> Result<()> {
    let mut buffer = buffer()?;
    let mut agent = Agent_::build(config())?;
    let batch = batch(&mut buffer, 16)?;

    agent.train();
    let act = agent.sample(&batch.obs);
    assert_eq!(act.size(), [16, ACT_DIM]);
    assert!(to_scalar(&act.abs().max())? <= 1.0);

    agent.eval();
    let act = agent.sample(&batch.obs);
    assert!(to_scalar(&act.abs().max())? < 1.0);
    Ok(())
}

#[test]
fn test_save_and_load() -> Result<()> {
    let dir = TempDir::new("inac")?;
    let mut buffer = buffer()?;
    let mut agent = Agent_::build(config())?;
    agent.opt(&mut buffer)?;
    assert_eq!(agent.save_params(dir.path())?.len(), 5);

    let mut agent_ = Agent_::build(config().seed(0))?;
    agent_.load_params(dir.path())?;
    agent.eval();
    agent_.eval();
    let batch = batch(&mut buffer, 8)?;
    assert_eq!(
        Vec::<f32>::try_from(&agent.sample(&batch.obs).flatten(0, -1))?,
        Vec::<f32>::try_from(&agent_.sample(&batch.obs).flatten(0, -1))?
    );
    Ok(())
}
