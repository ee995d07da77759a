use super::{mlp, MlpConfig};
use crate::model::SubModel;
use tch::{nn, nn::Module, Device, Tensor};

enum LogStd {
    Head(nn::Linear),
    Param(Tensor),
}

/// Multilayer perceptron that outputs the mean and the log standard deviation
/// of a Gaussian distribution.
///
/// With [`MlpConfig::state_independent_std`], the log standard deviation is
/// a parameter vector broadcast over the batch.
pub struct Mlp2 {
    config: MlpConfig,
    device: Device,
    head_mean: nn::Linear,
    head_lstd: LogStd,
    seq: nn::Sequential,
}

impl SubModel for Mlp2 {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn forward(&self, input: &Self::Input) -> Self::Output {
        let x = self.seq.forward(&input.to(self.device));
        let mean = x.apply(&self.head_mean);
        let lstd = match &self.head_lstd {
            LogStd::Head(head) => x.apply(head),
            LogStd::Param(lstd) => lstd.expand_as(&mean),
        };
        (mean, lstd)
    }

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let seq = mlp("al", var_store, &config);
        let out_dim = config.out_dim;
        let in_dim = *config.units.last().unwrap_or(&config.in_dim);
        let p = &var_store.root();

        let head_mean = nn::linear(p / "ml", in_dim, out_dim, Default::default());
        let head_lstd = match config.state_independent_std {
            true => LogStd::Param(p.var("lstd", &[out_dim], nn::Init::Const(0.0))),
            false => LogStd::Head(nn::linear(p / "sl", in_dim, out_dim, Default::default())),
        };

        Self {
            config,
            device: var_store.device(),
            head_mean,
            head_lstd,
            seq,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_independent_std() {
        let vs = nn::VarStore::new(Device::Cpu);
        let config = MlpConfig::new(3, vec![8], 2, false).state_independent_std(true);
        let m = Mlp2::build(&vs, config);
        let (mean, lstd) = m.forward(&Tensor::randn([5, 3], tch::kind::FLOAT_CPU));
        assert_eq!(mean.size(), [5, 2]);
        assert_eq!(lstd.size(), [5, 2]);
        assert!(vs.variables().contains_key("lstd"));
    }

    #[test]
    fn test_state_dependent_std() {
        let vs = nn::VarStore::new(Device::Cpu);
        let m = Mlp2::build(&vs, MlpConfig::new(3, vec![], 2, false));
        let (_, lstd) = m.forward(&Tensor::randn([5, 3], tch::kind::FLOAT_CPU));
        assert_eq!(lstd.size(), [5, 2]);
        assert!(!vs.variables().contains_key("lstd"));
    }
}
