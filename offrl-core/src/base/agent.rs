//! Agent.
use super::{Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Represents a trainable policy.
///
/// An agent owns its networks, their target copies and optimizers.
/// [`Agent::opt_with_record`] performs one optimization step with a batch
/// taken from the given buffer and returns the metrics of the step.
pub trait Agent<R: ReplayBufferBase>: Policy {
    /// Set the policy to training mode.
    fn train(&mut self);

    /// Set the policy to evaluation mode.
    fn eval(&mut self);

    /// Return if it is in training mode.
    fn is_train(&self) -> bool;

    /// Performs an optimization step.
    ///
    /// `buffer` is a replay buffer from which transitions will be taken
    /// for updating model parameters.
    fn opt(&mut self, buffer: &mut R) -> Result<()> {
        let _ = self.opt_with_record(buffer)?;
        Ok(())
    }

    /// Performs an optimization step and returns some information.
    ///
    /// An error aborts the step; the caller decides whether to abort training.
    fn opt_with_record(&mut self, buffer: &mut R) -> Result<Record>;

    /// Save the parameters of the agent in the given directory.
    ///
    /// This method commonly creates a number of files consisting the agent
    /// in the directory. For example, an agent with an ensemble critic saves
    /// the critics and their target networks in separate files.
    /// Returns the paths of the created files.
    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Load the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
