//! Core interfaces.
mod agent;
mod batch;
mod policy;
mod replay_buffer;
pub use agent::Agent;
pub use batch::TransitionBatch;
pub use policy::{Configurable, Policy};
pub use replay_buffer::ReplayBufferBase;
