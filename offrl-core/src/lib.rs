#![warn(missing_docs)]
//! Core components of offline reinforcement learning.
//!
//! This crate is independent of any tensor backend. It defines the interfaces
//! through which agents, offline datasets, metric sinks and evaluators interact,
//! and the offline [`Trainer`] which drives optimization steps over a static
//! dataset.
//!
//! * [`Agent`] - a trainable [`Policy`] updated with batches from a replay buffer
//! * [`ReplayBufferBase`] - produces batches implementing [`TransitionBatch`]
//! * [`record`] - metrics passed from agents to recorders
//! * [`Evaluator`] - evaluates an agent, typically by rolling out an environment
//! * [`Trainer`] - the training loop
pub mod error;
pub mod record;

mod base;
pub use base::{Agent, Configurable, Policy, ReplayBufferBase, TransitionBatch};

mod evaluator;
pub use evaluator::Evaluator;

mod trainer;
pub use trainer::{Trainer, TrainerConfig};
