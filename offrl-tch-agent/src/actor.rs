//! Actors.
mod config;
mod deterministic;
mod gaussian;
pub use config::{DeterministicActorConfig, GaussianActorConfig, Squashing};
pub use deterministic::DeterministicActor;
pub use gaussian::{normal_logp, GaussianActor};
