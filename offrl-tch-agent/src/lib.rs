//! Offline RL agents implemented with [tch](https://crates.io/crates/tch).
//!
//! * [`sacn::Sacn`] - SAC with an ensemble of critics (SAC-N). With a
//!   [`diversity::DiversityPenalty`] it becomes EDAC.
//! * [`td3bc::Td3bc`] - TD3 with a behavior cloning term.
//! * [`inac::Inac`] - In-sample actor critic.
//!
//! Batches are taken from [`buffer::TransitionBuffer`], which holds a static
//! dataset in memory.
pub mod actor;
pub mod buffer;
pub mod critic;
pub mod diversity;
pub mod error;
pub mod inac;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod sacn;
pub mod td3bc;
mod tensor_batch;
pub mod util;
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using tch-rs.
///
/// This enum is added because `tch::Device` does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),

    /// Metal performance shaders.
    Mps,

    /// Vulkan.
    Vulkan,
}

impl From<tch::Device> for Device {
    fn from(device: tch::Device) -> Self {
        match device {
            tch::Device::Cpu => Self::Cpu,
            tch::Device::Cuda(n) => Self::Cuda(n),
            tch::Device::Mps => Self::Mps,
            tch::Device::Vulkan => Self::Vulkan,
        }
    }
}

impl From<Device> for tch::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => Self::Cpu,
            Device::Cuda(n) => Self::Cuda(n),
            Device::Mps => Self::Mps,
            Device::Vulkan => Self::Vulkan,
        }
    }
}
