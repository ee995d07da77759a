//! Buffer holding an offline dataset.
mod base;
mod config;
pub use base::{Dataset, TransitionBuffer};
pub use config::TransitionBufferConfig;
