//! Evaluate an agent.
use crate::record::Record;
use anyhow::Result;

/// Evaluates an agent.
///
/// Rolling out the agent in an environment is outside of this library;
/// implementors wrap whatever simulator they use.
pub trait Evaluator<A> {
    /// Evaluates `agent`.
    ///
    /// The returned record must contain the scalar `"eval_return"`, which the
    /// [`Trainer`](crate::Trainer) uses to keep track of the best model.
    /// The caller of this method handles the training/evaluation mode of `agent`.
    fn evaluate(&mut self, agent: &mut A) -> Result<Record>;
}
