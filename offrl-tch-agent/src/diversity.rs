//! Diversity penalty on the action gradients of an ensemble of critics.
//!
//! EDAC adds to the ensemble Bellman residual the mean pairwise cosine
//! similarity of the gradients of the members w.r.t. the action:
//!
//! ```text
//! diversity = mean_b sum_{i != j} <g_i(b), g_j(b)> / (E - 1),
//! g_i(b) = grad_a Q_i(s_b, a_b) / (|grad_a Q_i(s_b, a_b)| + 1e-10)
//! ```
//!
//! The gradients are computed with `create_graph = true`, so the penalty is
//! differentiable w.r.t. the parameters of the critics. When all members
//! share the same gradient direction the penalty equals `E`.
use crate::{critic::EnsembleCritic, error::AgentError, model::SubModel2, util::EnsembleSize};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tch::{Kind, Tensor};

const NORM_EPS: f64 = 1e-10;

/// L2-normalizes gradients along the last axis.
///
/// A zero gradient stays zero.
pub fn normalize_grad(grad: &Tensor) -> Tensor {
    let norm = grad.norm_scalaropt_dim(2, [-1i64].as_slice(), true);
    grad / (norm + NORM_EPS)
}

/// Sum of off-diagonal inner products of normalized gradients
/// `[ensemble_size, batch_size, act_dim]`, averaged over the batch and divided
/// by `ensemble_size - 1`.
pub fn pairwise_similarity(grad: &Tensor) -> Result<Tensor> {
    let ensemble_size = grad.size().first().copied().unwrap_or(0);
    if ensemble_size < 2 {
        return Err(AgentError::EnsembleTooSmall(ensemble_size).into());
    }

    // [batch_size, ensemble_size, act_dim]
    let grad = grad.transpose(0, 1);
    let prod = grad.matmul(&grad.transpose(1, 2));
    let mask = 1.0 - Tensor::eye(ensemble_size, (Kind::Float, prod.device()));
    let masked: Tensor = prod * mask;
    let similarity = masked
        .sum_dim_intlist(Some([1i64, 2].as_slice()), false, Kind::Float)
        .mean(Kind::Float);

    Ok(similarity / (ensemble_size - 1) as f64)
}

/// Computes the diversity term of `critic` at the given observations and actions
/// `[batch_size, dim]`.
pub fn diversity_loss<Q>(critic: &EnsembleCritic<Q>, obs: &Tensor, act: &Tensor) -> Result<Tensor>
where
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    Q::Config: EnsembleSize,
{
    let ensemble_size = critic.ensemble_size();
    if ensemble_size < 2 {
        return Err(AgentError::EnsembleTooSmall(ensemble_size).into());
    }

    let device = critic.device();
    let obs = obs.to(device).unsqueeze(0).repeat([ensemble_size, 1, 1]);
    let act = act
        .to(device)
        .detach()
        .unsqueeze(0)
        .repeat([ensemble_size, 1, 1])
        .set_requires_grad(true);
    let q = critic.forward(&obs, &act).sum(Kind::Float);
    let grad = Tensor::f_run_backward(&[&q], &[&act], true, true)?
        .pop()
        .context("No gradient w.r.t. actions")?;

    pairwise_similarity(&normalize_grad(&grad))
}

/// Diversity penalty with weight `eta`.
///
/// An ensemble critic with this penalty is EDAC, without it SAC-N.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub struct DiversityPenalty {
    eta: f64,
}

impl DiversityPenalty {
    /// Creates a penalty with weight `eta`.
    pub fn new(eta: f64) -> Self {
        Self { eta }
    }

    /// Returns the weight of the penalty.
    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// Returns `base + eta * diversity` and the diversity term.
    pub fn apply<Q>(
        &self,
        base: Tensor,
        critic: &EnsembleCritic<Q>,
        obs: &Tensor,
        act: &Tensor,
    ) -> Result<(Tensor, Tensor)>
    where
        Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
        Q::Config: EnsembleSize,
    {
        let diversity = diversity_loss(critic, obs, act)?;
        Ok((base + self.eta * &diversity, diversity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        critic::CriticConfig,
        mlp::{EnsembleMlp, EnsembleMlpConfig},
        model::ModelBase,
        opt::OptimizerConfig,
        util::to_scalar,
    };
    use tch::{kind::FLOAT_CPU, Device};

    fn linear_critic(ensemble_size: i64) -> Result<EnsembleCritic<EnsembleMlp>> {
        let config = CriticConfig::default()
            .q_config(EnsembleMlpConfig::new(5, vec![], 1, ensemble_size))
            .opt_config(OptimizerConfig::Adam { lr: 1e-3 });
        EnsembleCritic::build(config, Device::Cpu)
    }

    #[test]
    fn test_identical_gradients() -> Result<()> {
        for k in [2i64, 3, 4] {
            let g = normalize_grad(&Tensor::randn([1, 5, 3], FLOAT_CPU));
            let grad = g.repeat([k, 1, 1]);
            let diversity = to_scalar(&pairwise_similarity(&grad)?)?;
            assert!((diversity - k as f32).abs() < 1e-5, "{} {}", k, diversity);
        }
        Ok(())
    }

    #[test]
    fn test_orthogonal_gradients() -> Result<()> {
        // Each member has its own unit vector
        let grad = Tensor::eye(3, (Kind::Float, Device::Cpu))
            .unsqueeze(1)
            .repeat([1, 4, 1]);
        let diversity = to_scalar(&pairwise_similarity(&grad)?)?;
        assert!(diversity.abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_zero_gradient_normalizes_to_zero() -> Result<()> {
        let grad = normalize_grad(&Tensor::zeros([3, 4, 2], FLOAT_CPU));
        assert_eq!(to_scalar(&grad.abs().sum(Kind::Float))?, 0.0);
        assert!(grad.isfinite().all().int64_value(&[]) == 1);
        Ok(())
    }

    #[test]
    fn test_normalize_grad() -> Result<()> {
        let grad = Tensor::from_slice(&[3f32, 4.0]).reshape([1, 1, 2]);
        let v = Vec::<f32>::try_from(&normalize_grad(&grad).flatten(0, -1))?;
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_single_member_is_rejected() -> Result<()> {
        let grad = Tensor::randn([1, 4, 2], FLOAT_CPU);
        assert!(pairwise_similarity(&grad).is_err());

        let critic = linear_critic(1)?;
        let obs = Tensor::randn([4, 3], FLOAT_CPU);
        let act = Tensor::randn([4, 2], FLOAT_CPU);
        let err = diversity_loss(&critic, &obs, &act).err().context("must fail")?;
        assert!(matches!(
            err.downcast_ref::<AgentError>(),
            Some(AgentError::EnsembleTooSmall(1))
        ));
        Ok(())
    }

    #[test]
    fn test_identical_members() -> Result<()> {
        let critic = linear_critic(3)?;
        tch::no_grad(|| {
            for (_, v) in critic.get_var_store().variables().iter() {
                let first = v.get(0).copy();
                for i in 1..3 {
                    v.get(i).copy_(&first);
                }
            }
        });

        // A batch of identical pairs
        let obs = Tensor::randn([1, 3], FLOAT_CPU).repeat([4, 1]);
        let act = Tensor::randn([1, 2], FLOAT_CPU).repeat([4, 1]);
        let diversity = to_scalar(&diversity_loss(&critic, &obs, &act)?)?;
        assert!((diversity - 3.0).abs() < 1e-5, "{}", diversity);
        Ok(())
    }

    #[test]
    fn test_gradient_reaches_critic_parameters() -> Result<()> {
        let critic = linear_critic(3)?;
        let obs = Tensor::randn([8, 3], FLOAT_CPU);
        let act = Tensor::randn([8, 2], FLOAT_CPU);
        let diversity = diversity_loss(&critic, &obs, &act)?;
        diversity.backward();

        let grad_norm = critic
            .get_var_store()
            .trainable_variables()
            .iter()
            .filter(|v| v.grad().defined())
            .map(|v| f64::try_from(v.grad().abs().sum(Kind::Float)))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum::<f64>();
        assert!(grad_norm > 0.0);
        Ok(())
    }

    #[test]
    fn test_apply() -> Result<()> {
        let critic = linear_critic(3)?;
        let obs = Tensor::randn([8, 3], FLOAT_CPU);
        let act = Tensor::randn([8, 2], FLOAT_CPU);
        for eta in [0.0, 0.5, 2.0] {
            let base = Tensor::from(1.5f32);
            let (loss, diversity) = DiversityPenalty::new(eta).apply(base, &critic, &obs, &act)?;
            let expected = 1.5 + eta as f32 * to_scalar(&diversity)?;
            assert!((to_scalar(&loss)? - expected).abs() < 1e-5);
        }
        Ok(())
    }
}
