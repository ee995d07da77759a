//! Replay buffer interface.
//!
//! In offline reinforcement learning the buffer holds a static dataset and
//! only produces batches; nothing is pushed during training.
use anyhow::Result;

/// Interface for buffers that generate batches for training.
pub trait ReplayBufferBase {
    /// Configuration parameters for the buffer.
    type Config: Clone;

    /// The type of batch generated for training.
    type Batch;

    /// Returns the number of transitions in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer holds no transitions.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Constructs a batch of `size` transitions sampled from the buffer.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;
}
