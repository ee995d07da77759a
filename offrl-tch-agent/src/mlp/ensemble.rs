use super::EnsembleMlpConfig;
use crate::model::SubModel2;
use tch::{nn, Device, Tensor};

/// An ensemble of multilayer perceptrons evaluated in a single batched pass.
///
/// The weights of the members are stacked as `[ensemble_size, in, out]` and
/// initialized independently with `U(-1/sqrt(in), 1/sqrt(in))`.
///
/// The inputs are concatenated along the last axis. Each input is either
/// `[batch_size, dim]`, fed to all members, or
/// `[ensemble_size, batch_size, dim]`, one slice per member.
/// The output is `[ensemble_size, batch_size, out_dim]`.
pub struct EnsembleMlp {
    config: EnsembleMlpConfig,
    device: Device,
    layers: Vec<(Tensor, Tensor)>,
}

impl EnsembleMlp {
    fn create_layers(var_store: &nn::VarStore, config: &EnsembleMlpConfig) -> Vec<(Tensor, Tensor)> {
        let p = &(var_store.root() / "ensemble");
        let e = config.ensemble_size;
        let mut in_dim = config.in_dim;
        let mut layers = vec![];

        for (i, &out_dim) in config.units.iter().chain([config.out_dim].iter()).enumerate() {
            let bound = 1.0 / (in_dim as f64).sqrt();
            let init = nn::Init::Uniform {
                lo: -bound,
                up: bound,
            };
            let w = p.var(&format!("w{}", i), &[e, in_dim, out_dim], init);
            let b = p.var(&format!("b{}", i), &[e, 1, out_dim], init);
            layers.push((w, b));
            in_dim = out_dim;
        }

        layers
    }

    /// Broadcasts a `[batch_size, dim]` input to all members.
    fn expand(&self, x: &Tensor) -> Tensor {
        let x = x.to(self.device);
        match x.dim() {
            2 => {
                let size = x.size();
                x.unsqueeze(0)
                    .expand([self.config.ensemble_size, size[0], size[1]], false)
            }
            _ => x,
        }
    }
}

impl SubModel2 for EnsembleMlp {
    type Config = EnsembleMlpConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn forward(&self, input1: &Self::Input1, input2: &Self::Input2) -> Self::Output {
        let mut x = Tensor::cat(&[self.expand(input1), self.expand(input2)], -1);
        let n_layers = self.layers.len();

        for (i, (w, b)) in self.layers.iter().enumerate() {
            x = x.matmul(w) + b;
            if i + 1 < n_layers {
                x = x.relu();
            }
        }

        x
    }

    fn build(var_store: &nn::VarStore, config: Self::Config) -> Self {
        let layers = Self::create_layers(var_store, &config);

        Self {
            config,
            device: var_store.device(),
            layers,
        }
    }

    fn clone_with_var_store(&self, var_store: &nn::VarStore) -> Self {
        Self::build(var_store, self.config.clone())
    }
}
